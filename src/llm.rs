//! Chat-completion client used for query classification, field extraction, SQL generation, and
//! answer synthesis.
//!
//! Every call is a stateless system + user message pair against an OpenAI-compatible
//! `/chat/completions` endpoint.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider could not be reached or rejected the credentials.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// One message of a chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Message with the `user` role.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    /// Message with the `assistant` role.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    /// Message with the `system` role.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
}

/// A system + user prompt with sampling controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Instructions sent with the `system` role.
    pub system: String,
    /// Prompt sent with the `user` role.
    pub user: String,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl ChatRequest {
    /// Build a request.
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
            temperature,
        }
    }
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Return the text of the first completion choice.
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError>;
}

/// Client for OpenAI-compatible chat-completion APIs.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatClient {
    /// Build a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ChatClientError> {
        let http = Client::builder()
            .user_agent("insightmed/chat")
            .build()
            .map_err(|error| ChatClientError::ProviderUnavailable(error.to_string()))?;
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; chat requests will be unauthenticated");
        }
        Ok(Self {
            http,
            base_url: config.openai_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                ChatMessage::system(request.system),
                ChatMessage::user(request.user),
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "n": 1,
        });

        let mut builder = self.http.post(self.endpoint()).json(&payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.map_err(|error| {
            ChatClientError::ProviderUnavailable(format!(
                "failed to reach chat API at {}: {error}",
                self.base_url
            ))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Err(ChatClientError::ProviderUnavailable(format!(
                "chat endpoint {} returned {status}",
                self.endpoint()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "chat API returned {status}: {body}"
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatClientError::InvalidResponse("no choices returned".into()))?;
        tracing::debug!(chars = content.len(), "Completion received");
        Ok(content)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::test_config;
    use httpmock::{Method::POST, MockServer};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Chat client that replays canned answers and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedChat {
        answers: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedChat {
        pub(crate) fn replying(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|a| Ok(a.to_string())).collect()),
                ..Self::default()
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                answers: Mutex::new(VecDeque::from([Err(message.to_string())])),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            self.requests.lock().expect("lock").push(request);
            match self.answers.lock().expect("lock").pop_front() {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(message)) => Err(ChatClientError::GenerationFailed(message)),
                None => Err(ChatClientError::InvalidResponse("no scripted answer".into())),
            }
        }
    }

    fn client(server: &MockServer) -> OpenAiChatClient {
        let mut config = test_config("http://127.0.0.1:9200");
        config.openai_url = server.url("/v1");
        config.openai_api_key = Some("sk-test".into());
        OpenAiChatClient::new(&config).expect("client")
    }

    #[tokio::test]
    async fn sends_system_and_user_messages_with_bearer_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(
                        r#"{"messages":[{"role":"system","content":"classify"},{"role":"user","content":"plot Jane"}],"max_tokens":10}"#,
                    );
                then.status(200).json_body(json!({
                    "choices": [ { "message": { "role": "assistant", "content": "1 bar" } } ]
                }));
            })
            .await;

        let answer = client(&server)
            .complete(ChatRequest::new("classify", "plot Jane", 10, 0.3))
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "1 bar");
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let error = client(&server)
            .complete(ChatRequest::new("s", "u", 5, 0.0))
            .await
            .expect_err("error");

        assert!(matches!(error, ChatClientError::GenerationFailed(ref m) if m.contains("rate limited")));
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .complete(ChatRequest::new("s", "u", 5, 0.0))
            .await
            .expect_err("error");

        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }
}
