use crate::error::ChatError;
use crate::models::{ConversationTurn, PromptTurn, RetrievedSnippet, TurnRole};
use crate::retrieval::RetrievalEngine;
use crate::store::{DocumentStore, TurnStore};
use crate::traits::{LanguageModel, VectorIndex};
use crate::EmbeddingClient;
use std::fmt::Write as _;
use tokio::sync::mpsc;
use tracing::warn;

/// How many prior turns are folded into the prompt.
pub const HISTORY_LIMIT: usize = 6;

const SYSTEM_INSTRUCTION: &str = "Use the following pieces of context (or the previous \
conversation if needed) to answer the user's question in markdown format. You can answer from \
general knowledge if you know the exact answer even when it is not present in the context. If \
you don't know the answer, just say that you don't know; don't try to make up an answer.";

/// Folds prior turns, retrieved context, and the question into one grounded
/// prompt. Sections for history and context appear only when nonempty.
pub fn build_grounded_prompt(
    history: &[ConversationTurn],
    snippets: &[RetrievedSnippet],
    question: &str,
) -> Vec<PromptTurn> {
    let mut body = String::new();

    if !history.is_empty() {
        body.push_str("**PREVIOUS CONVERSATION:**\n");
        for turn in history {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            let _ = writeln!(body, "*{speaker}:* {}", turn.text);
        }
        body.push('\n');
    }

    if !snippets.is_empty() {
        body.push_str("**CONTEXT:**\n");
        let texts: Vec<&str> = snippets.iter().map(|s| s.text.as_str()).collect();
        body.push_str(&texts.join("\n\n"));
        body.push_str("\n\n");
    }

    let _ = write!(body, "**USER INPUT:** {question}");

    vec![
        PromptTurn::system(SYSTEM_INSTRUCTION),
        PromptTurn::user(body),
    ]
}

/// Answers a question about one document: persists the user turn, retrieves
/// context, streams the model's reply, and persists the assistant turn only
/// when the stream finishes cleanly.
pub struct ConversationAssembler<E, V, L, D, T>
where
    E: EmbeddingClient,
    V: VectorIndex,
    L: LanguageModel,
    D: DocumentStore,
    T: TurnStore + Clone + 'static,
{
    retrieval: RetrievalEngine<E, V>,
    model: L,
    documents: D,
    turns: T,
    history_limit: usize,
    top_k: usize,
}

impl<E, V, L, D, T> ConversationAssembler<E, V, L, D, T>
where
    E: EmbeddingClient,
    V: VectorIndex,
    L: LanguageModel,
    D: DocumentStore,
    T: TurnStore + Clone + 'static,
{
    pub fn new(
        retrieval: RetrievalEngine<E, V>,
        model: L,
        documents: D,
        turns: T,
        top_k: usize,
    ) -> Self {
        Self {
            retrieval,
            model,
            documents,
            turns,
            history_limit: HISTORY_LIMIT,
            top_k,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Streams the answer as text fragments. The user turn is persisted up
    /// front so the question survives a failed generation; the assistant
    /// turn is persisted only on clean stream completion. If the caller
    /// drops the receiver, upstream consumption stops and nothing is
    /// persisted.
    pub async fn answer(
        &self,
        document_id: &str,
        owner_id: &str,
        question: &str,
    ) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError> {
        if owner_id.trim().is_empty() {
            return Err(ChatError::Unauthorized);
        }

        let document = self
            .documents
            .find_owned(document_id, owner_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(document_id.to_string()))?;

        self.turns
            .append(&ConversationTurn::user(&document.id, owner_id, question))
            .await?;

        let history = self.turns.recent(&document.id, self.history_limit).await?;
        let snippets = self
            .retrieval
            .retrieve(&document.id, question, self.top_k)
            .await?;

        let prompt = build_grounded_prompt(&history, &snippets, question);
        let mut upstream = self.model.stream_chat(&prompt).await?;

        let (tx, rx) = mpsc::channel(32);
        let turns = self.turns.clone();
        let turn_document_id = document.id.clone();
        let turn_owner_id = owner_id.to_string();

        tokio::spawn(async move {
            let mut full_text = String::new();

            while let Some(fragment) = upstream.recv().await {
                match fragment {
                    Ok(text) => {
                        full_text.push_str(&text);
                        if tx.send(Ok(text)).await.is_err() {
                            // Caller went away: stop pulling upstream tokens
                            // and persist nothing.
                            return;
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Err(ChatError::Generation(error))).await;
                        return;
                    }
                }
            }

            let turn = ConversationTurn::assistant(turn_document_id, turn_owner_id, full_text);
            if let Err(error) = turns.append(&turn).await {
                warn!(%error, "failed to persist assistant turn");
            }
        });

        Ok(rx)
    }
}
