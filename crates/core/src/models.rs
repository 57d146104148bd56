use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text of one PDF page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub creation_date: String,
}

impl DocumentMetadata {
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("title".to_string(), Value::from(self.title.clone()));
        map.insert("author".to_string(), Value::from(self.author.clone()));
        map.insert(
            "creation_date".to_string(),
            Value::from(self.creation_date.clone()),
        );
        map
    }
}

/// A bounded slice of one page, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub page_number: u32,
    pub chunk_index: usize,
    pub source: String,
    pub document: DocumentMetadata,
}

impl Chunk {
    pub fn new(
        content: String,
        page_number: u32,
        chunk_index: usize,
        document: DocumentMetadata,
    ) -> Self {
        Self {
            content,
            page_number,
            chunk_index,
            source: source_label(page_number, chunk_index),
            document,
        }
    }

    /// Flat metadata mapping: the document fields plus `page_number`,
    /// `chunk` and `source`.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("page_number".to_string(), Value::from(self.page_number));
        map.insert("chunk".to_string(), Value::from(self.chunk_index));
        map.insert("source".to_string(), Value::from(self.source.clone()));
        map.extend(self.document.to_map());
        map
    }
}

pub fn source_label(page_number: u32, chunk_index: usize) -> String {
    format!("p{page_number}-{chunk_index}")
}

/// A stored chunk returned by a vector index, most similar first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    /// Keep only the first N chunks when set, to bound embedding cost.
    pub max_chunks: Option<usize>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            max_chunks: None,
        }
    }
}

/// Credentials and model names for an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_batch_size: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            temperature: 0.0,
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimensions: 1_536,
            embedding_batch_size: 64,
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("embedding_batch_size", &self.embedding_batch_size)
            .finish()
    }
}
