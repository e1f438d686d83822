use crate::error::StoreError;
use crate::models::{ConversationTurn, Document, DocumentStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Record store for documents. Lookups are always scoped to an owner so a
/// foreign document id behaves exactly like a missing one.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: &Document) -> Result<(), StoreError>;

    async fn find_owned(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Status writes after a terminal state are ignored.
    async fn set_status(&self, document_id: &str, status: DocumentStatus) -> Result<(), StoreError>;

    async fn delete(&self, document_id: &str) -> Result<(), StoreError>;
}

/// Append-only conversation history per document.
#[async_trait]
pub trait TurnStore: Send + Sync {
    async fn append(&self, turn: &ConversationTurn) -> Result<(), StoreError>;

    /// The `limit` most recent turns for a document, ascending by creation
    /// time.
    async fn recent(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;
}

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: &Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn find_owned(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(document_id)
            .filter(|document| document.owner_id == owner_id)
            .cloned())
    }

    async fn set_status(&self, document_id: &str, status: DocumentStatus) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::UnknownDocument(document_id.to_string()))?;

        if !document.status.is_terminal() {
            document.status = status;
        }
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents.remove(document_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryTurnStore {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn append(&self, turn: &ConversationTurn) -> Result<(), StoreError> {
        let mut turns = self.turns.write().await;
        turns.push(turn.clone());
        Ok(())
    }

    async fn recent(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let turns = self.turns.read().await;
        let mut matching: Vec<ConversationTurn> = turns
            .iter()
            .filter(|turn| turn.document_id == document_id)
            .cloned()
            .collect();

        // Stable sort keeps insertion order for same-instant turns.
        matching.sort_by_key(|turn| turn.created_at);
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentStore, MemoryDocumentStore, MemoryTurnStore, TurnStore};
    use crate::models::{ConversationTurn, Document, DocumentStatus};

    #[tokio::test]
    async fn find_owned_hides_other_users_documents() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("alice", "https://files.example/a.pdf");
        store.create(&document).await.unwrap();

        let found = store.find_owned(&document.id, "alice").await.unwrap();
        assert!(found.is_some());

        let foreign = store.find_owned(&document.id, "bob").await.unwrap();
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn terminal_status_is_immutable() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("alice", "https://files.example/a.pdf");
        store.create(&document).await.unwrap();

        store
            .set_status(&document.id, DocumentStatus::Processing)
            .await
            .unwrap();
        store
            .set_status(&document.id, DocumentStatus::Failed)
            .await
            .unwrap();
        store
            .set_status(&document.id, DocumentStatus::Success)
            .await
            .unwrap();

        let found = store
            .find_owned(&document.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn set_status_on_unknown_document_fails() {
        let store = MemoryDocumentStore::new();
        let result = store.set_status("missing", DocumentStatus::Failed).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn recent_returns_last_n_ascending_per_document() {
        let store = MemoryTurnStore::new();
        for i in 0..4 {
            store
                .append(&ConversationTurn::user("doc-1", "alice", format!("q{i}")))
                .await
                .unwrap();
        }
        store
            .append(&ConversationTurn::user("doc-2", "alice", "other"))
            .await
            .unwrap();

        let recent = store.recent("doc-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "q2");
        assert_eq!(recent[1].text, "q3");
    }
}
