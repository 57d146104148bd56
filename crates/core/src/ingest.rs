use crate::chunking::{build_chunks, ChunkingConfig};
use crate::cleaning::TextCleaner;
use crate::embeddings::Embedder;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::traits::VectorIndex;
use crate::{Chunk, DocumentMetadata, IngestError, IngestionOptions, ServiceError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Chunks of one PDF, ready to embed.
#[derive(Debug, Clone)]
pub struct IngestionReport {
    /// SHA-256 of the file contents; keys the document's entries in an index.
    pub document_id: String,
    pub source_path: PathBuf,
    pub metadata: DocumentMetadata,
    pub page_count: usize,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingReport {
    pub indexed: usize,
    pub discarded: usize,
}

/// Extracts, cleans and chunks the PDF at `path` with the default cleaning rules.
pub fn ingest_pdf(path: &Path, options: &IngestionOptions) -> Result<IngestionReport, IngestError> {
    ingest_pdf_with(&LopdfExtractor, &TextCleaner::default(), path, options)
}

pub fn ingest_pdf_with<X: PdfExtractor>(
    extractor: &X,
    cleaner: &TextCleaner,
    path: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;

    let (pages, metadata) = extractor.extract(path)?;
    let document_id = digest_file(path)?;
    let page_count = pages.len();

    let cleaned = cleaner.clean_pages(pages);
    let chunks = build_chunks(&cleaned, &metadata, config)?;

    info!(
        path = %path.display(),
        pages = page_count,
        chunks = chunks.len(),
        "pdf chunked"
    );

    Ok(IngestionReport {
        document_id,
        source_path: path.to_path_buf(),
        metadata,
        page_count,
        chunks,
    })
}

/// Embeds the chunks, writes them to `index` and flushes it. With
/// `max_chunks` set only that prefix of the chunks is indexed.
pub async fn index_chunks<E, V>(
    document_id: &str,
    chunks: &[Chunk],
    embedder: &E,
    index: &mut V,
    max_chunks: Option<usize>,
) -> Result<IndexingReport, ServiceError>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    let kept = max_chunks.map_or(chunks.len(), |limit| limit.min(chunks.len()));
    let discarded = chunks.len() - kept;
    if discarded > 0 {
        warn!(
            kept,
            discarded, "chunk limit reached, content past the limit is not indexed"
        );
    }

    let replaced = index.remove_document(document_id).await?;
    if replaced > 0 {
        debug!(replaced, "dropped entries from a previous ingestion of this document");
    }

    let selected = &chunks[..kept];
    if !selected.is_empty() {
        let texts = selected
            .iter()
            .map(|chunk| chunk.content.clone())
            .collect::<Vec<_>>();
        let embeddings = embedder.embed_batch(&texts).await?;
        index.upsert(document_id, selected, &embeddings).await?;
    }
    index.persist().await?;

    info!(indexed = kept, discarded, "chunks indexed");
    Ok(IndexingReport {
        indexed: kept,
        discarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{write_pdf, FixtureInfo};
    use crate::{CharacterNgramEmbedder, LocalVectorStore, PageText};
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn unique_text(chars: usize) -> String {
        let words = (0..chars / 6)
            .map(|n| format!("w{n:04}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{words}{}", " z".repeat((chars - words.len()) / 2))
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn missing_pdf_fails_before_any_work() {
        let result = ingest_pdf(Path::new("missing.pdf"), &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::NotFound(_))));
    }

    #[test]
    fn unreadable_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = ingest_pdf(&path, &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn invalid_chunk_options_are_rejected() {
        let options = IngestionOptions {
            chunk_max_chars: 100,
            chunk_overlap_chars: 150,
            max_chunks: None,
        };
        let result = ingest_pdf(Path::new("missing.pdf"), &options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn two_page_pdf_with_blank_second_page() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("two-pages.pdf");
        let text = unique_text(1_500);
        write_pdf(
            &path,
            &[&text, ""],
            Some(FixtureInfo {
                title: "Script",
                author: "Troupe",
                creation_date: Some("D:20230522195716"),
            }),
        )?;

        let report = ingest_pdf(&path, &IngestionOptions::default())?;

        assert_eq!(report.page_count, 1);
        assert_eq!(report.chunks.len(), 2);
        assert!(report.chunks.iter().all(|chunk| chunk.page_number == 1));
        let sources = report
            .chunks
            .iter()
            .map(|chunk| chunk.source.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sources, vec!["p1-0", "p1-1"]);
        for chunk in &report.chunks {
            assert!(chunk.content.chars().count() <= 1_000);
            let metadata = chunk.metadata();
            assert_eq!(metadata["title"], "Script");
            assert_eq!(metadata["author"], "Troupe");
            assert_eq!(metadata["creation_date"], "D:20230522195716");
        }
        Ok(())
    }

    struct FixedExtractor;

    impl PdfExtractor for FixedExtractor {
        fn extract(
            &self,
            _path: &Path,
        ) -> Result<(Vec<PageText>, DocumentMetadata), IngestError> {
            Ok((
                vec![PageText {
                    number: 2,
                    text: "inter-\nnational\nshipping".to_string(),
                }],
                DocumentMetadata::default(),
            ))
        }
    }

    #[test]
    fn pages_are_cleaned_before_chunking() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("any.pdf");
        fs::write(&path, b"bytes")?;

        let report = ingest_pdf_with(
            &FixedExtractor,
            &TextCleaner::default(),
            &path,
            &IngestionOptions::default(),
        )?;

        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].content, "international shipping");
        assert_eq!(report.chunks[0].source, "p2-0");
        Ok(())
    }

    fn sample_chunks(count: usize) -> Vec<Chunk> {
        (0..count)
            .map(|index| {
                Chunk::new(
                    format!("chunk number {index}"),
                    1,
                    index,
                    DocumentMetadata::default(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn indexing_persists_every_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = sample_chunks(5);
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;

        let report = index_chunks(
            "doc",
            &chunks,
            &CharacterNgramEmbedder::default(),
            &mut store,
            None,
        )
        .await?;

        assert_eq!(report, IndexingReport { indexed: 5, discarded: 0 });
        let reopened = LocalVectorStore::open_existing(dir.path(), "docs").await?;
        assert_eq!(reopened.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn chunk_limit_keeps_the_prefix() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = sample_chunks(5);
        let embedder = CharacterNgramEmbedder::default();
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;

        let report = index_chunks("doc", &chunks, &embedder, &mut store, Some(3)).await?;

        assert_eq!(report, IndexingReport { indexed: 3, discarded: 2 });
        let query = embedder.embed_text("chunk number 4");
        let hits = store.search(&query, 10).await?;
        let sources = hits
            .iter()
            .map(|hit| hit.chunk.source.clone())
            .collect::<HashSet<_>>();
        assert_eq!(
            sources,
            HashSet::from(["p1-0".to_string(), "p1-1".to_string(), "p1-2".to_string()])
        );
        Ok(())
    }

    #[tokio::test]
    async fn reindexing_the_same_document_is_idempotent() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let chunks = sample_chunks(4);
        let embedder = CharacterNgramEmbedder::default();

        for _ in 0..2 {
            let mut store = LocalVectorStore::open(dir.path(), "docs").await?;
            index_chunks("doc", &chunks, &embedder, &mut store, None).await?;
        }

        let store = LocalVectorStore::open_existing(dir.path(), "docs").await?;
        assert_eq!(store.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn rechunked_document_replaces_its_previous_entries(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;

        index_chunks("doc", &sample_chunks(4), &embedder, &mut store, None).await?;
        index_chunks("other", &sample_chunks(1), &embedder, &mut store, None).await?;
        let second = (0..2)
            .map(|index| {
                Chunk::new(
                    format!("wider chunk {index}"),
                    1,
                    index,
                    DocumentMetadata::default(),
                )
            })
            .collect::<Vec<_>>();
        index_chunks("doc", &second, &embedder, &mut store, None).await?;

        let store = LocalVectorStore::open_existing(dir.path(), "docs").await?;
        assert_eq!(store.len(), 3);
        let hits = store.search(&embedder.embed_text("chunk number 3"), 10).await?;
        let contents = hits
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(
            contents,
            HashSet::from(["wider chunk 0", "wider chunk 1", "chunk number 0"])
        );
        Ok(())
    }
}
