pub mod local;
pub mod qdrant;

pub use local::LocalVectorStore;
pub use qdrant::QdrantStore;

use uuid::Uuid;

/// Stable entry id for one chunk of one document, so re-ingesting a file
/// replaces its entries.
pub fn entry_id(document_id: &str, source: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{document_id}:{source}").as_bytes(),
    )
}
