use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_chat_core::{
    index_chunks, ingest_pdf, render_answer, CharacterNgramEmbedder, ConversationCoordinator,
    ConversationOptions, Embedder, IngestionOptions, LocalVectorStore, OpenAiChatModel,
    OpenAiConfig, OpenAiEmbedder, QdrantStore, VectorIndex, DEFAULT_TOP_K,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    services: ServiceArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// OpenAI-compatible embeddings endpoint
    Openai,
    /// Local character-trigram hashing, no network
    Ngram,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// JSON index under --persist-dir
    Local,
    /// Qdrant server at --qdrant-url
    Qdrant,
}

#[derive(Args)]
struct ServiceArgs {
    /// API key for the OpenAI-compatible service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible service
    #[arg(
        long,
        env = "OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1",
        global = true
    )]
    api_base: String,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-ada-002", global = true)]
    embedding_model: String,

    /// Dimension of the embedding model's vectors
    #[arg(long, default_value = "1536", global = true)]
    embedding_dimensions: usize,

    /// Which embedder turns text into vectors
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai, global = true)]
    embedder: EmbedderKind,

    /// Which vector store holds the collection
    #[arg(long, value_enum, default_value_t = StoreKind::Local, global = true)]
    store: StoreKind,

    /// Directory of the local vector store
    #[arg(
        long,
        env = "PDF_CHAT_PERSIST_DIR",
        default_value = "./data/index",
        global = true
    )]
    persist_dir: PathBuf,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333", global = true)]
    qdrant_url: String,

    /// Collection name inside the vector store
    #[arg(long, default_value = "pdf_chunks", global = true)]
    collection: String,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, clean, chunk and embed a PDF into the collection.
    Ingest {
        /// PDF file to ingest.
        #[arg(long)]
        file: PathBuf,
        /// Maximum characters per chunk.
        #[arg(long, default_value = "1000")]
        chunk_size: usize,
        /// Characters shared by consecutive chunks of a page.
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
        /// Index only the first N chunks.
        #[arg(long)]
        max_chunks: Option<usize>,
    },
    /// Ask questions about the ingested document.
    Chat {
        /// Chat completion model name.
        #[arg(long, default_value = "gpt-4")]
        chat_model: String,
        /// Sampling temperature.
        #[arg(long, default_value = "0")]
        temperature: f32,
        /// Number of chunks retrieved per question.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Rephrase follow-up questions into standalone ones before retrieval.
        #[arg(long, default_value_t = false)]
        condense_question: bool,
    },
}

impl ServiceArgs {
    fn openai_config(&self) -> anyhow::Result<OpenAiConfig> {
        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set (or pass --api-key)"))?;

        Ok(OpenAiConfig {
            api_key,
            base_url: self.api_base.clone(),
            embedding_model: self.embedding_model.clone(),
            embedding_dimensions: self.embedding_dimensions,
            ..OpenAiConfig::default()
        })
    }

    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        Ok(match self.embedder {
            EmbedderKind::Openai => Box::new(OpenAiEmbedder::new(&self.openai_config()?)?),
            EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder::default()),
        })
    }

    async fn vector_index(
        &self,
        dimensions: usize,
        must_exist: bool,
    ) -> anyhow::Result<Box<dyn VectorIndex>> {
        Ok(match self.store {
            StoreKind::Local if must_exist => Box::new(
                LocalVectorStore::open_existing(&self.persist_dir, &self.collection).await?,
            ),
            StoreKind::Local => {
                Box::new(LocalVectorStore::open(&self.persist_dir, &self.collection).await?)
            }
            StoreKind::Qdrant => {
                let store = QdrantStore::new(&self.qdrant_url, &self.collection, dimensions);
                if !must_exist {
                    store.ensure_collection().await?;
                }
                Box::new(store)
            }
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    match cli.command {
        Command::Ingest {
            file,
            chunk_size,
            chunk_overlap,
            max_chunks,
        } => {
            let options = IngestionOptions {
                chunk_max_chars: chunk_size,
                chunk_overlap_chars: chunk_overlap,
                max_chunks,
            };
            let report = ingest_pdf(&file, &options)?;

            if report.chunks.is_empty() {
                warn!(path = %file.display(), "no text extracted, nothing to index");
            }

            let embedder = cli.services.embedder()?;
            let mut index = cli
                .services
                .vector_index(embedder.dimensions(), false)
                .await?;

            info!(
                path = %file.display(),
                collection = %cli.services.collection,
                chunk_count = report.chunks.len(),
                "indexing chunks"
            );
            let indexed = index_chunks(
                &report.document_id,
                &report.chunks,
                &embedder,
                &mut index,
                options.max_chunks,
            )
            .await?;

            println!(
                "{} chunks from {} page(s) indexed into {} at {}",
                indexed.indexed,
                report.page_count,
                cli.services.collection,
                Utc::now().to_rfc3339()
            );
            if indexed.discarded > 0 {
                println!("{} chunks skipped by --max-chunks", indexed.discarded);
            }
        }
        Command::Chat {
            chat_model,
            temperature,
            top_k,
            condense_question,
        } => {
            let embedder = cli.services.embedder()?;
            let index = cli
                .services
                .vector_index(embedder.dimensions(), true)
                .await?;
            let model = OpenAiChatModel::new(&OpenAiConfig {
                chat_model,
                temperature,
                ..cli.services.openai_config()?
            })?;

            let mut coordinator = ConversationCoordinator::new(
                embedder,
                index,
                model,
                ConversationOptions {
                    top_k,
                    condense_question,
                },
            );
            info!(collection = %cli.services.collection, "chat session ready");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("\nQuestion: ");
                std::io::stdout().flush()?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }

                let answer = coordinator.ask(question).await?;
                println!("{}", render_answer(&answer));
            }
        }
    }

    Ok(())
}
