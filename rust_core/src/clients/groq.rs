//! Groq chat-completions client (OpenAI-compatible wire format).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{http_client, retry_after, CompletionRequest, TextGenerator};
use crate::error::{CommentaryError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";
const SERVICE: &str = "groq";

pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
}

impl GroqClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(http_client(Duration::from_secs(30)), api_key)
    }

    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt}
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

/// Map a non-success status onto the error taxonomy
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> CommentaryError {
    let message = format!("HTTP {} {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        CommentaryError::GenerationRejected {
            reason: format!("rate limited: {message}"),
            retry_after,
        }
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        CommentaryError::upstream(SERVICE, message)
    } else {
        // quota, auth and content-policy refusals all land here
        CommentaryError::rejected(message)
    }
}

/// First non-empty completion text
fn extract_text(response: CompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .find_map(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| CommentaryError::rejected("empty completion"))
}

#[async_trait]
impl TextGenerator for GroqClient {
    #[tracing::instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))
            .map_err(|e| CommentaryError::upstream(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let hint = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, hint, &body));
        }

        let response = resp
            .json::<CompletionResponse>()
            .await
            .map_err(|e| CommentaryError::malformed(SERVICE, e))?;
        extract_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
