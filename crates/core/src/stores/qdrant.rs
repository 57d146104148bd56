use crate::stores::entry_id;
use crate::traits::VectorIndex;
use crate::{Chunk, DocumentMetadata, RetrievedChunk, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

/// A collection on a Qdrant server, addressed by name.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        let mut endpoint = endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }
        Self {
            endpoint,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), ServiceError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        info!(collection = %self.collection, size = self.vector_size, "creating qdrant collection");
        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }
}

fn backend_error(status: StatusCode) -> ServiceError {
    ServiceError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn chunk_payload(document_id: &str, chunk: &Chunk) -> Value {
    let mut payload = chunk.metadata();
    payload.insert("content".to_string(), Value::from(chunk.content.clone()));
    payload.insert("document_id".to_string(), Value::from(document_id));
    Value::Object(payload)
}

fn document_filter(document_id: &str) -> Value {
    json!({
        "filter": {
            "must": [{ "key": "document_id", "match": { "value": document_id } }]
        }
    })
}

fn chunk_from_payload(payload: &Value) -> Option<Chunk> {
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let page_number = payload.get("page_number").and_then(Value::as_u64)?;
    let chunk_index = payload.get("chunk").and_then(Value::as_u64)?;
    let content = payload.get("content").and_then(Value::as_str)?;

    Some(Chunk {
        content: content.to_string(),
        page_number: u32::try_from(page_number).ok()?,
        chunk_index: usize::try_from(chunk_index).ok()?,
        source: text("source"),
        document: DocumentMetadata {
            title: text("title"),
            author: text("author"),
            creation_date: text("creation_date"),
        },
    })
}

#[async_trait]
impl VectorIndex for QdrantStore {
    /// Qdrant does not report how many points a filtered delete matched, so this returns 0.
    async fn remove_document(&mut self, document_id: &str) -> Result<usize, ServiceError> {
        debug!(collection = %self.collection, document_id, "deleting qdrant points of document");
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&document_filter(document_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(0)
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

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(ServiceError::DimensionMismatch {
                        expected: self.vector_size,
                        actual: embedding.len(),
                    });
                }

                Ok(json!({
                    "id": entry_id(document_id, &chunk.source).to_string(),
                    "vector": embedding,
                    "payload": chunk_payload(document_id, chunk),
                }))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        debug!(collection = %self.collection, points = points.len(), "upserting qdrant points");
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ServiceError> {
        if query_vector.len() != self.vector_size {
            return Err(ServiceError::DimensionMismatch {
                expected: self.vector_size,
                actual: query_vector.len(),
            });
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parse_search_response(&parsed)
    }

    /// Upserts already wait for the write to be applied.
    async fn persist(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn parse_search_response(parsed: &Value) -> Result<Vec<RetrievedChunk>, ServiceError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut result = Vec::new();
    for hit in hits {
        let Some(chunk) = hit.pointer("/payload").and_then(chunk_from_payload) else {
            continue;
        };
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        result.push(RetrievedChunk {
            chunk,
            score: score as f32,
        });
    }

    Ok(result)
}
