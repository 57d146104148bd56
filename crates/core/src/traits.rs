use crate::chat::ChatMessage;
use crate::{Chunk, RetrievedChunk, ServiceError};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drops every entry written for `document_id` and returns how many went.
    async fn remove_document(&mut self, document_id: &str) -> Result<usize, ServiceError>;

    /// Inserts or replaces entries keyed by `document_id` and each chunk's source label.
    async fn upsert(
        &mut self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ServiceError>;

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ServiceError>;

    /// Makes every accepted write durable.
    async fn persist(&self) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    async fn remove_document(&mut self, document_id: &str) -> Result<usize, ServiceError> {
        (**self).remove_document(document_id).await
    }

    async fn upsert(
        &mut self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ServiceError> {
        (**self).upsert(document_id, chunks, embeddings).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ServiceError> {
        (**self).search(query_vector, top_k).await
    }

    async fn persist(&self) -> Result<(), ServiceError> {
        (**self).persist().await
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}
