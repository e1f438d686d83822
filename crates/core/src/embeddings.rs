use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Converts text into a fixed-length vector. Implementations must reject
/// empty input and tag upstream failures as transient or permanent.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Clone, Serialize)]
struct VectorizeRequest<'a> {
    documents: Vec<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
struct VectorizeResponse {
    vectors: Vec<Vec<f32>>,
}

/// Client for a `/vectorize` HTTP embedding backend that accepts a batch of
/// documents and returns one vector per document.
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    endpoint: String,
    api_key: Option<String>,
    dimensions: usize,
    client: Client,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            dimensions,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn status_is_transient(status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut request = self
            .client
            .post(format!("{}/vectorize", self.endpoint))
            .json(&VectorizeRequest {
                documents: vec![text],
            });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() || error.is_connect() {
                EmbeddingError::Transient(error.to_string())
            } else {
                EmbeddingError::Permanent(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("embedding backend returned {status}");
            return Err(if Self::status_is_transient(status) {
                EmbeddingError::Transient(message)
            } else {
                EmbeddingError::Permanent(message)
            });
        }

        let payload: VectorizeResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::Transient(error.to_string()))?;

        let vector = payload.vectors.into_iter().next().ok_or_else(|| {
            EmbeddingError::Permanent("embedding backend returned no vectors".to_string())
        })?;

        if vector.len() != self.dimensions {
            return Err(EmbeddingError::Permanent(format!(
                "embedding dimension {} is not {}",
                vector.len(),
                self.dimensions
            )));
        }

        Ok(vector)
    }
}

pub const HASH_EMBEDDER_DIMENSIONS: usize = 128;

/// Deterministic character-trigram hashing embedder for offline runs and
/// tests. Vectors are normalized to unit length so cosine similarity works
/// the same as with a model-backed client.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: HASH_EMBEDDER_DIMENSIONS,
        }
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::{EmbeddingClient, HashEmbedder};
    use crate::error::EmbeddingError;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        let second = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hash_embedder_outputs_fixed_length_unit_vector() {
        let embedder = HashEmbedder { dimensions: 32 };
        let vector = embedder.embed("some document text").await.unwrap();
        assert_eq!(vector.len(), 32);

        let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let embedder = HashEmbedder::default();
        let result = embedder.embed("   ").await;
        assert!(matches!(result, Err(EmbeddingError::EmptyInput)));
    }

    #[test]
    fn transient_and_permanent_are_distinguished() {
        assert!(EmbeddingError::Transient("503".to_string()).is_transient());
        assert!(!EmbeddingError::Permanent("bad key".to_string()).is_transient());
        assert!(!EmbeddingError::EmptyInput.is_transient());
    }
}
