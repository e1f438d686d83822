use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl DocumentStatus {
    /// Success and Failed are terminal; a document never leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub source_url: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(owner_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            source_url: source_url.into(),
            status: DocumentStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Completion callback payload delivered by the upload service once the
/// document bytes are reachable at `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCompletion {
    pub owner_id: String,
    pub storage_key: String,
    pub url: String,
}

/// Metadata stored alongside every vector so retrieval can hand text and
/// page citations back without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub text: String,
    pub page_number: u32,
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub document_id: String,
    pub owner_id: String,
    pub role: TurnRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::with_role(document_id, owner_id, TurnRole::User, text)
    }

    pub fn assistant(
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::with_role(document_id, owner_id, TurnRole::Assistant, text)
    }

    fn with_role(
        document_id: impl Into<String>,
        owner_id: impl Into<String>,
        role: TurnRole,
        text: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            owner_id: owner_id.into(),
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// One ranked piece of context produced per query and consumed immediately
/// by prompt assembly; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSnippet {
    pub text: String,
    pub page_number: u32,
    pub score: f32,
}

/// One role-tagged message of the prompt handed to the language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: String,
    pub content: String,
}

impl PromptTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}
