//! HTTP advisory oracle speaking the OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::advisory::AdvisoryOracle;
use crate::errors::AdvisoryError;

const SYSTEM_PROMPT: &str = "You rate merge conflicts. Reply with only a JSON object \
holding `difficulty_score` (number from 0 to 100) and `reason` (one short sentence).";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// Advisory oracle backed by a chat completions endpoint.
pub struct HttpOracle {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpOracle {
    /// `api_url` is the API base (e.g. `https://api.openai.com/v1/`).
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let endpoint = format!("{}/chat/completions", api_url.trim_end_matches('/'));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        info!(endpoint = %endpoint, model, "created advisory oracle");
        Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AdvisoryOracle for HttpOracle {
    #[instrument(skip(self, prompt), fields(endpoint = %self.endpoint))]
    async fn consult(&self, prompt: &str) -> Result<String, AdvisoryError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdvisoryError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    AdvisoryError::Transport(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AdvisoryError::HttpStatus { status, body });
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AdvisoryError::InvalidResponse(format!("bad envelope: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdvisoryError::InvalidResponse("no message content".into()))?;

        debug!(len = content.len(), "oracle answered");
        Ok(content)
    }
}
