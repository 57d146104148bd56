use crate::stores::entry_id;
use crate::traits::VectorIndex;
use crate::{Chunk, RetrievedChunk, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    document_id: String,
    chunk: Chunk,
    vector: Vec<f32>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    collection: String,
    dimensions: Option<usize>,
    entries: BTreeMap<String, StoredEntry>,
}

/// A named collection kept in memory and persisted as
/// `{persist_dir}/{collection}/index.json`. Search is a cosine scan.
#[derive(Debug)]
pub struct LocalVectorStore {
    directory: PathBuf,
    data: CollectionFile,
}

impl LocalVectorStore {
    /// Opens the collection, starting empty when nothing has been persisted yet.
    pub async fn open(
        persist_dir: impl AsRef<Path>,
        collection: &str,
    ) -> Result<Self, ServiceError> {
        let directory = collection_dir(persist_dir.as_ref(), collection)?;
        let index_path = directory.join(INDEX_FILE);

        let data = if tokio::fs::try_exists(&index_path).await? {
            let bytes = tokio::fs::read(&index_path).await?;
            serde_json::from_slice::<CollectionFile>(&bytes)?
        } else {
            CollectionFile {
                collection: collection.to_string(),
                ..CollectionFile::default()
            }
        };

        debug!(
            collection,
            path = %index_path.display(),
            entries = data.entries.len(),
            "opened local collection"
        );

        Ok(Self { directory, data })
    }

    /// Opens a collection that must already exist on disk.
    pub async fn open_existing(
        persist_dir: impl AsRef<Path>,
        collection: &str,
    ) -> Result<Self, ServiceError> {
        let directory = collection_dir(persist_dir.as_ref(), collection)?;
        if !tokio::fs::try_exists(directory.join(INDEX_FILE)).await? {
            return Err(ServiceError::Request(format!(
                "collection {collection} not found in {}",
                persist_dir.as_ref().display()
            )));
        }
        Self::open(persist_dir, collection).await
    }

    pub fn collection(&self) -> &str {
        &self.data.collection
    }

    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }

    pub fn index_path(&self) -> PathBuf {
        self.directory.join(INDEX_FILE)
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), ServiceError> {
        match self.data.dimensions {
            Some(expected) if expected != actual => {
                Err(ServiceError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

fn collection_dir(persist_dir: &Path, collection: &str) -> Result<PathBuf, ServiceError> {
    let valid = !collection.trim().is_empty()
        && collection != "."
        && collection != ".."
        && !collection.contains(&['/', '\\'][..]);
    if !valid {
        return Err(ServiceError::Request(format!(
            "invalid collection name: {collection:?}"
        )));
    }
    Ok(persist_dir.join(collection))
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    async fn remove_document(&mut self, document_id: &str) -> Result<usize, ServiceError> {
        let before = self.data.entries.len();
        self.data
            .entries
            .retain(|_, entry| entry.document_id != document_id);
        Ok(before - self.data.entries.len())
    }

    async fn upsert(
        &mut self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ServiceError> {
        if chunks.len() != embeddings.len() {
            return Err(ServiceError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        for embedding in embeddings {
            self.check_dimensions(embedding.len())?;
            self.data.dimensions = Some(embedding.len());
        }

        let now = Utc::now();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = entry_id(document_id, &chunk.source).to_string();
            self.data.entries.insert(
                id,
                StoredEntry {
                    document_id: document_id.to_string(),
                    chunk: chunk.clone(),
                    vector: embedding.clone(),
                    updated_at: now,
                },
            );
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ServiceError> {
        self.check_dimensions(query_vector.len())?;

        let mut scored = self
            .data
            .entries
            .values()
            .map(|entry| (cosine_similarity(query_vector, &entry.vector), entry))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }

    async fn persist(&self) -> Result<(), ServiceError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let target = self.index_path();
        let staging = self.directory.join(format!("{INDEX_FILE}.tmp"));

        let bytes = serde_json::to_vec(&self.data)?;
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &target).await?;

        info!(
            collection = %self.data.collection,
            entries = self.data.entries.len(),
            path = %target.display(),
            "persisted collection"
        );
        Ok(())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentMetadata;
    use tempfile::tempdir;

    fn chunk(page: u32, index: usize, content: &str) -> Chunk {
        Chunk::new(content.to_string(), page, index, DocumentMetadata::default())
    }

    #[tokio::test]
    async fn search_orders_by_similarity() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;
        store
            .upsert(
                "doc",
                &[chunk(1, 0, "east"), chunk(1, 1, "north")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await?;

        let hits = store.search(&[0.1, 0.9], 1).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "north");
        Ok(())
    }

    #[tokio::test]
    async fn reingesting_updates_instead_of_duplicating() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;
        store
            .upsert("doc", &[chunk(1, 0, "old")], &[vec![1.0, 0.0]])
            .await?;
        store
            .upsert("doc", &[chunk(1, 0, "new")], &[vec![1.0, 0.0]])
            .await?;
        store
            .upsert("other-doc", &[chunk(1, 0, "else")], &[vec![0.0, 1.0]])
            .await?;

        assert_eq!(store.len(), 2);
        let hits = store.search(&[1.0, 0.0], 5).await?;
        assert_eq!(hits[0].chunk.content, "new");
        Ok(())
    }

    #[tokio::test]
    async fn removing_a_document_keeps_other_documents() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;
        store
            .upsert(
                "doc",
                &[chunk(1, 0, "a"), chunk(1, 1, "b")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await?;
        store
            .upsert("other-doc", &[chunk(1, 0, "c")], &[vec![1.0, 1.0]])
            .await?;

        assert_eq!(store.remove_document("doc").await?, 2);
        assert_eq!(store.remove_document("doc").await?, 0);
        assert_eq!(store.len(), 1);
        let hits = store.search(&[1.0, 1.0], 4).await?;
        assert_eq!(hits[0].chunk.content, "c");
        Ok(())
    }

    #[tokio::test]
    async fn persisted_collection_is_reloaded() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = LocalVectorStore::open(dir.path(), "走过天涯").await?;
        store
            .upsert("doc", &[chunk(3, 0, "kept")], &[vec![0.5, 0.5]])
            .await?;
        store.persist().await?;
        assert!(dir.path().join("走过天涯").join(INDEX_FILE).is_file());

        let reopened = LocalVectorStore::open_existing(dir.path(), "走过天涯").await?;
        assert_eq!(reopened.len(), 1);
        let hits = reopened.search(&[0.5, 0.5], 4).await?;
        assert_eq!(hits[0].chunk.page_number, 3);
        assert_eq!(hits[0].chunk.source, "p3-0");
        Ok(())
    }

    #[tokio::test]
    async fn missing_collection_is_an_error_for_queries() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let result = LocalVectorStore::open_existing(dir.path(), "absent").await;
        assert!(matches!(result, Err(ServiceError::Request(_))));
        Ok(())
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = LocalVectorStore::open(dir.path(), "docs").await?;
        store
            .upsert("doc", &[chunk(1, 0, "a")], &[vec![1.0, 0.0]])
            .await?;

        let upsert = store
            .upsert("doc", &[chunk(1, 1, "b")], &[vec![1.0, 0.0, 0.0]])
            .await;
        assert!(matches!(
            upsert,
            Err(ServiceError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(store.search(&[1.0], 1).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_collection_names_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for name in ["", "..", "a/b"] {
            assert!(LocalVectorStore::open(dir.path(), name).await.is_err());
        }
        Ok(())
    }
}
