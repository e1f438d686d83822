use crate::error::RetrievalError;
use crate::models::RetrievedSnippet;
use crate::traits::VectorIndex;
use crate::EmbeddingClient;

pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a question and searches one document's namespace for the closest
/// page texts. Results can only ever come from the queried namespace, so
/// cross-document leakage is structurally impossible.
pub struct RetrievalEngine<E, V>
where
    E: EmbeddingClient,
    V: VectorIndex,
{
    embedder: E,
    index: V,
}

impl<E, V> RetrievalEngine<E, V>
where
    E: EmbeddingClient,
    V: VectorIndex,
{
    pub fn new(embedder: E, index: V) -> Self {
        Self { embedder, index }
    }

    /// Ranked context snippets for `query_text`, scoped to `document_id`.
    /// An embedding failure propagates; there is no silent empty-context
    /// fallback.
    pub async fn retrieve(
        &self,
        document_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        let vector = self.embedder.embed(query_text).await?;
        let matches = self.index.query(document_id, &vector, top_k).await?;

        Ok(matches
            .into_iter()
            .map(|m| RetrievedSnippet {
                text: m.metadata.text,
                page_number: m.metadata.page_number,
                score: m.score,
            })
            .collect())
    }
}
