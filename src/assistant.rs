//! Chat assistant backed by a hosted `generateContent` model endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const PROMPT_PREFIX: &str = "You are a media expert you give users short answer and ground it on the data whenever possible. User question: ";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("generation endpoint is not configured")]
    NotConfigured,
    #[error("generation endpoint returned HTTP {0}")]
    Status(u16),
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("could not decode generation response: {0}")]
    Decode(#[from] std::io::Error),
    #[error("the model did not return a usable answer")]
    EmptyResponse,
    #[error("generation worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn answer(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateRequest {
    /// Prior turns are replayed in order (assistant turns as `model`), then
    /// the question itself wrapped in the grounding prompt.
    fn from_chat(request: &ChatRequest) -> Self {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    ChatRole::User => "user".to_owned(),
                    ChatRole::Assistant => "model".to_owned(),
                },
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_owned(),
            parts: vec![Part {
                text: format!("{PROMPT_PREFIX}{}", request.query),
            }],
        });
        Self { contents }
    }
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().find_map(|candidate| candidate.content)?;
        let text: String = content.parts.into_iter().map(|part| part.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Clone)]
pub struct GenerativeClient {
    agent: ureq::Agent,
    base_url: Option<String>,
    model: String,
    api_key: Option<String>,
}

impl GenerativeClient {
    pub fn new(base_url: Option<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base_url,
            model: model.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> Result<String, AssistantError> {
        let base = self.base_url.as_deref().ok_or(AssistantError::NotConfigured)?;
        Ok(format!(
            "{}/v1beta/models/{}:generateContent",
            base.trim_end_matches('/'),
            self.model
        ))
    }

    fn generate_blocking(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError> {
        let endpoint = self.endpoint()?;
        let body = GenerateRequest::from_chat(request);

        let mut call = self.agent.post(&endpoint);
        if let Some(key) = &self.api_key {
            call = call.set("x-goog-api-key", key);
        }
        let response = call.send_json(&body).map_err(|err| match err {
            ureq::Error::Status(code, _) => AssistantError::Status(code),
            other => AssistantError::Transport(other.to_string()),
        })?;

        let parsed: GenerateResponse = response.into_json()?;
        let answer = parsed.text().ok_or(AssistantError::EmptyResponse)?;
        debug!(chars = answer.len(), "generation finished");
        Ok(ChatReply { answer })
    }
}

#[async_trait]
impl ChatModel for GenerativeClient {
    async fn answer(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError> {
        info!(query = %request.query, "chat prompt");
        let client = self.clone();
        let request = request.clone();
        task::spawn_blocking(move || client.generate_blocking(&request))
            .await
            .map_err(|err| AssistantError::Worker(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_replayed_before_the_question() {
        let request = ChatRequest {
            query: "Who directed it?".into(),
            history: vec![
                ChatTurn {
                    role: ChatRole::User,
                    content: "Tell me about Night Train".into(),
                },
                ChatTurn {
                    role: ChatRole::Assistant,
                    content: "It is a heist film.".into(),
                },
            ],
        };
        let body = serde_json::to_value(GenerateRequest::from_chat(&request)).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        let prompt = contents[2]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.starts_with("You are a media expert"));
        assert!(prompt.ends_with("User question: Who directed it?"));
    }

    #[test]
    fn response_text_joins_parts_and_rejects_blank_answers() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text().as_deref(), Some("Hello there"));

        let blank: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#).unwrap();
        assert_eq!(blank.text(), None);

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn chat_requests_accept_missing_history() {
        let request: ChatRequest = serde_json::from_str(r#"{"query":"hi"}"#).unwrap();
        assert!(request.history.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_fails_fast() {
        let client = GenerativeClient::new(None, DEFAULT_MODEL, None);
        let err = client
            .answer(&ChatRequest {
                query: "hi".into(),
                history: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::NotConfigured));
    }
}
