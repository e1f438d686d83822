use crate::error::IndexError;
use crate::models::{ChunkMetadata, IndexItem, VectorMatch};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Pinecone-style HTTP vector index. `endpoint` is the index host; every
/// call carries the namespace so vectors stay partitioned per document.
#[derive(Clone)]
pub struct PineconeIndex {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl PineconeIndex {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn match_from_value(hit: &Value) -> VectorMatch {
        let id = hit
            .pointer("/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let score = hit
            .pointer("/score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as f32;
        let text = hit
            .pointer("/metadata/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let page_number = hit
            .pointer("/metadata/pageNumber")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let document_id = hit
            .pointer("/metadata/documentId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        VectorMatch {
            id,
            score,
            metadata: ChunkMetadata {
                text,
                page_number,
                document_id,
            },
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, items: &[IndexItem]) -> Result<(), IndexError> {
        if items.is_empty() {
            return Ok(());
        }

        let vectors = items
            .iter()
            .map(|item| {
                json!({
                    "id": item.id,
                    "values": item.vector,
                    "metadata": {
                        "text": item.metadata.text,
                        "pageNumber": item.metadata.page_number,
                        "documentId": item.metadata.document_id,
                    },
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({ "vectors": vectors, "namespace": namespace }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "pinecone".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, IndexError> {
        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({
                "vector": vector,
                "topK": top_k,
                "namespace": namespace,
                "includeMetadata": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "pinecone".to_string(),
                details: response.status().to_string(),
            });
        }

        // An unknown namespace comes back as a success with no matches.
        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits.iter().map(Self::match_from_value).collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), IndexError> {
        let response = self
            .client
            .post(format!("{}/vectors/delete", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({ "deleteAll": true, "namespace": namespace }))
            .send()
            .await?;

        let status = response.status();
        // Deleting a namespace that was never populated is a no-op success.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::BackendResponse {
                backend: "pinecone".to_string(),
                details: status.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PineconeIndex;
    use serde_json::json;

    #[test]
    fn match_parsing_reads_metadata_fields() {
        let hit = json!({
            "id": "doc-1-0",
            "score": 0.87,
            "metadata": {
                "text": "hello world",
                "pageNumber": 3,
                "documentId": "doc-1",
            },
        });

        let parsed = PineconeIndex::match_from_value(&hit);
        assert_eq!(parsed.id, "doc-1-0");
        assert!((parsed.score - 0.87).abs() < 1e-6);
        assert_eq!(parsed.metadata.text, "hello world");
        assert_eq!(parsed.metadata.page_number, 3);
        assert_eq!(parsed.metadata.document_id, "doc-1");
    }

    #[test]
    fn match_parsing_tolerates_missing_fields() {
        let hit = json!({ "id": "x" });
        let parsed = PineconeIndex::match_from_value(&hit);
        assert_eq!(parsed.score, 0.0);
        assert_eq!(parsed.metadata.page_number, 0);
        assert!(parsed.metadata.text.is_empty());
    }
}
