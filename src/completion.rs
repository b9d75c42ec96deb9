use crate::config::Config;
use crate::types::*;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("model refused to answer: {0}")]
    Refused(String),
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion endpoint answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

/// Language-model call that answers the conversation and pulls out
/// search keywords.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<KeyChat, CompletionError>;
}

/// JSON schema the model's reply must follow.
pub fn key_chat_format() -> serde_json::Value {
    serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "key_chat",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "response": { "type": "string" },
                    "extracted_keywords": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["response", "extracted_keywords"],
                "additionalProperties": false
            }
        }
    })
}

/// Turn the first choice into a [`KeyChat`], surfacing refusals.
pub fn parse_completion(response: CompletionResponse) -> Result<KeyChat, CompletionError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Malformed("no choices returned".to_string()))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(CompletionError::Refused(refusal));
    }
    let content = choice.message.content.ok_or_else(|| {
        CompletionError::Malformed(format!(
            "empty message (finish reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| CompletionError::Malformed(e.to_string()))
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self, CompletionError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<KeyChat, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending {} messages to {}", messages.len(), url);

        let request = CompletionRequest {
            model: &self.model,
            messages,
            response_format: key_chat_format(),
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let parsed: CompletionResponse = response.json().await?;
        let key_chat = parse_completion(parsed)?;
        info!("Extracted keywords: {:?}", key_chat.extracted_keywords);
        Ok(key_chat)
    }
}
