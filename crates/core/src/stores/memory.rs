use crate::error::IndexError;
use crate::models::{IndexItem, VectorMatch};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory vector index with brute-force cosine similarity. Not meant for
/// production volumes; it is the injectable fake for tests and the `--local`
/// CLI mode. Clones share the same underlying namespaces.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    namespaces: Arc<RwLock<HashMap<String, HashMap<String, IndexItem>>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, namespace: &str, items: &[IndexItem]) -> Result<(), IndexError> {
        let mut namespaces = self.namespaces.write().await;
        let entries = namespaces.entry(namespace.to_string()).or_default();
        for item in items {
            entries.insert(item.id.clone(), item.clone());
        }
        debug!(namespace, count = items.len(), "upserted vectors");
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, IndexError> {
        let namespaces = self.namespaces.read().await;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<VectorMatch> = entries
            .values()
            .map(|item| VectorMatch {
                id: item.id.clone(),
                score: Self::cosine_similarity(vector, &item.vector),
                metadata: item.metadata.clone(),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), IndexError> {
        let mut namespaces = self.namespaces.write().await;
        namespaces.remove(namespace);
        Ok(())
    }
}
