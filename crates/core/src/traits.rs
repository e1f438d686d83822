use crate::error::{FetchError, GenerationError, IndexError};
use crate::models::{IndexItem, PromptTurn, VectorMatch};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Namespaced nearest-neighbor store. One namespace holds exactly one
/// document's vectors, which is what keeps similarity search from ever
/// crossing documents.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent per item id: re-upserting overwrites.
    async fn upsert(&self, namespace: &str, items: &[IndexItem]) -> Result<(), IndexError>;

    /// Top-k matches by descending similarity. An unknown namespace yields
    /// an empty Vec, never an error.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, IndexError>;

    /// Idempotent; deleting an absent namespace is a no-op success.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), IndexError>;
}

/// Fetches a document's raw bytes from wherever the upload service put them.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Streaming language-model backend. Fragments arrive in order on the
/// receiver; a closed channel without a prior error is normal completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn stream_chat(
        &self,
        prompt: &[PromptTurn],
    ) -> Result<mpsc::Receiver<Result<String, GenerationError>>, GenerationError>;
}
