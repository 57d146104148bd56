pub mod chat;
pub mod chunking;
pub mod cleaning;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod fixtures;

pub use chat::{ChatMessage, OpenAiChatModel, Role};
pub use chunking::{build_chunks, ChunkingConfig, RecursiveCharacterSplitter, DEFAULT_SEPARATORS};
pub use cleaning::{
    fix_newlines, merge_hyphenated_words, remove_multiple_newlines, CleaningRule, TextCleaner,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, ServiceError};
pub use extractor::{parse_pdf, LopdfExtractor, PdfExtractor};
pub use ingest::{
    digest_file, index_chunks, ingest_pdf, ingest_pdf_with, IndexingReport, IngestionReport,
};
pub use models::{
    source_label, Answer, ChatTurn, Chunk, DocumentMetadata, IngestionOptions, OpenAiConfig,
    PageText, RetrievedChunk,
};
pub use orchestrator::{
    render_answer, ConversationCoordinator, ConversationOptions, LoopPhase, DEFAULT_TOP_K,
};
pub use stores::{LocalVectorStore, QdrantStore};
pub use traits::{ChatModel, VectorIndex};
