//! Chat-completions client for answer generation.
//!
//! Speaks the OpenAI-compatible wire shape, so any backend exposing
//! `/chat/completions` works; the default endpoint is Groq.

use crate::error::GenerationError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";
pub const MAX_COMPLETION_TOKENS: u32 = 500;
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
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
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: MAX_COMPLETION_TOKENS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRaw {
    choices: Vec<ChatChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceRaw {
    message: ChatMessageRaw,
}

#[derive(Debug, Deserialize)]
struct ChatMessageRaw {
    content: String,
}

#[async_trait]
pub trait GenerationClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(GENERATION_TIMEOUT)
            .build()
            .expect("http client construction");
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            retry,
        }
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionsClient {
    /// Transport failures are retried under the policy; non-success
    /// statuses and malformed bodies are not, since the backend did
    /// answer.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let (status, body) = self
            .retry
            .run("generation request", || {
                let call = self
                    .client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(request);
                async move {
                    let response = call.send().await?;
                    let status = response.status();
                    let body = response.text().await?;
                    Ok::<_, reqwest::Error>((status, body))
                }
            })
            .await
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        completion_text(&body)
    }
}

fn completion_text(body: &str) -> Result<String, GenerationError> {
    let raw: ChatCompletionRaw = serde_json::from_str(body)
        .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;
    raw.choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("response carried no choices".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::{completion_text, GenerationRequest, MAX_COMPLETION_TOKENS};
    use crate::error::GenerationError;

    #[test]
    fn request_carries_system_then_user_turn() {
        let request = GenerationRequest::new("mixtral-8x7b-32768", "be terse", "what do I do?");
        let encoded = serde_json::to_value(&request).expect("serialize");

        assert_eq!(encoded["model"], "mixtral-8x7b-32768");
        assert_eq!(encoded["max_tokens"], MAX_COMPLETION_TOKENS);
        assert_eq!(encoded["messages"][0]["role"], "system");
        assert_eq!(encoded["messages"][0]["content"], "be terse");
        assert_eq!(encoded["messages"][1]["role"], "user");
    }

    #[test]
    fn completion_text_takes_first_choice() {
        let body = r#"{
            "choices": [
                { "message": { "role": "assistant", "content": "I build Rust services." } },
                { "message": { "role": "assistant", "content": "second" } }
            ]
        }"#;
        assert_eq!(
            completion_text(body).expect("parse"),
            "I build Rust services."
        );
    }

    #[test]
    fn missing_choices_is_malformed() {
        let error = completion_text(r#"{ "choices": [] }"#).unwrap_err();
        assert!(matches!(error, GenerationError::MalformedResponse(_)));

        let error = completion_text(r#"{ "id": "cmpl-1" }"#).unwrap_err();
        assert!(matches!(error, GenerationError::MalformedResponse(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let error = completion_text("upstream proxy timeout").unwrap_err();
        assert!(matches!(error, GenerationError::MalformedResponse(_)));
    }
}
