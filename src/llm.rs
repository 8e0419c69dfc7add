//! Language-model collaborator abstraction.
//!
//! [`ChatModel`] is the seam to the external chat model: a list of
//! role-tagged messages in, one content string out. [`OpenAiChat`] calls the
//! OpenAI chat-completions API; like the embedder, each call is a single
//! attempt and transient faults come back as retryable
//! [`Error::ModelUnavailable`] for the whole-run backoff policy.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::models::ChatMessage;

/// External language model: send role-tagged messages, get back one string.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat model backed by the OpenAI chat-completions endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl OpenAiChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ModelUnavailable {
                message: e.to_string(),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::ModelUnavailable {
                message: format!("HTTP {}: {}", status, detail),
                retryable: status.as_u16() == 429 || status.is_server_error(),
            });
        }

        let json: serde_json::Value = response.json().await.map_err(|e| Error::ModelUnavailable {
            message: format!("invalid response body: {}", e),
            retryable: false,
        })?;

        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content` from the API response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::ModelUnavailable {
            message: "response missing choices[0].message.content".into(),
            retryable: false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "vuelo y hotel"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "vuelo y hotel");

        let bad = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&bad).is_err());
    }

    #[test]
    fn test_message_wire_format() {
        let messages = vec![
            ChatMessage::system("sistema"),
            ChatMessage::user("pregunta"),
            ChatMessage::assistant("respuesta"),
        ];
        let json = serde_json::to_value(&messages).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[2]["role"], "assistant");
        assert_eq!(json[1]["content"], "pregunta");
    }
}
