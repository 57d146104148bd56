use crate::embeddings::api_endpoint;
use crate::error::ServiceError;
use crate::models::OpenAiConfig;
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions from an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: Client::new(),
            endpoint: api_endpoint(&config.base_url, "chat/completions")?,
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        debug!(model = %self.model, messages = messages.len(), "requesting completion");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
                temperature: self.temperature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: "openai-chat".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let text = response.text().await?;
        parse_completion(&text)
    }
}

fn parse_completion(body: &str) -> Result<String, ServiceError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ServiceError::EmptyResponse {
            backend: "openai-chat".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_in_lowercase() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(ChatMessage::assistant("hi"))?;
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "hi");
        Ok(())
    }

    #[test]
    fn completion_text_is_taken_from_first_choice() -> Result<(), ServiceError> {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Forty-two."}}]}"#;
        assert_eq!(parse_completion(body)?, "Forty-two.");
        Ok(())
    }

    #[test]
    fn empty_choices_are_an_error() {
        let result = parse_completion(r#"{"choices":[]}"#);
        assert!(matches!(result, Err(ServiceError::EmptyResponse { .. })));

        let malformed = parse_completion("not json");
        assert!(matches!(malformed, Err(ServiceError::Serialization(_))));
    }
}
