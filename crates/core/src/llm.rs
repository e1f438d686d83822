use crate::error::GenerationError;
use crate::models::PromptTurn;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// What one SSE line contributes to the answer stream.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Fragment(String),
    Done,
    Ignored,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() {
        return SseLine::Ignored;
    }
    if line == "data: [DONE]" {
        return SseLine::Done;
    }

    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Ignored;
    };
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return SseLine::Ignored;
    };

    match value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(content) if !content.is_empty() => SseLine::Fragment(content.to_string()),
        _ => SseLine::Ignored,
    }
}

/// Streaming client for an OpenAI-compatible `/v1/chat/completions`
/// endpoint. Fragments are forwarded through a channel; dropping the
/// receiver stops the forwarder and the underlying byte stream.
#[derive(Clone)]
pub struct HttpChatModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpChatModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl LanguageModel for HttpChatModel {
    async fn stream_chat(
        &self,
        prompt: &[PromptTurn],
    ) -> Result<mpsc::Receiver<Result<String, GenerationError>>, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": prompt,
            "stream": true,
        });

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(forward_sse(Box::pin(response.bytes_stream()), tx));

        Ok(rx)
    }
}

/// Turns a raw SSE byte stream into answer fragments on the channel. Stops
/// on `[DONE]`, a stream error, or a dropped receiver.
async fn forward_sse<S, B, E>(mut stream: S, tx: mpsc::Sender<Result<String, GenerationError>>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    // SSE events can be split across network reads, so lines are
    // reassembled before parsing.
    let mut buffer = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(bytes) => {
                buffer.push_str(&String::from_utf8_lossy(bytes.as_ref()));
                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    match parse_sse_line(&line) {
                        SseLine::Fragment(content) => {
                            if tx.send(Ok(content)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Ignored => {}
                    }
                }
            }
            Err(error) => {
                let _ = tx
                    .send(Err(GenerationError::Stream(error.to_string())))
                    .await;
                return;
            }
        }
    }

    // A backend that closes without [DONE] can leave one unterminated line
    // in the buffer; it still carries content.
    if let SseLine::Fragment(content) = parse_sse_line(&buffer) {
        let _ = tx.send(Ok(content)).await;
    }
}
