//! HTTP client for the Gemini `generateContent` endpoint.
//!
//! The `GenerateClient` trait keeps the synthesizer testable without real
//! HTTP calls.

use async_trait::async_trait;
use infographic_core::port::SynthesisError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One text-generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    /// Generation seed, so variants of one batch diverge
    pub seed: i32,
}

impl GenerateRequest {
    /// Wire body of `models/{model}:generateContent`
    pub fn to_body(&self) -> serde_json::Value {
        json!({
            "systemInstruction": { "parts": [{ "text": self.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": self.user_prompt }] }],
            "generationConfig": { "seed": self.seed },
        })
    }
}

/// Executes generation calls and returns the model's text
#[async_trait]
pub trait GenerateClient: Send + Sync {
    /// # Errors
    /// - `SynthesisError::Unreachable` on transport failure or timeout
    /// - `SynthesisError::Unauthorized` when the API key is rejected
    /// - `SynthesisError::Upstream` for other non-success statuses
    /// - `SynthesisError::MalformedResponse` when no text comes back
    async fn generate(&self, request: &GenerateRequest) -> Result<String, SynthesisError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize, Serialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Concatenated text of the first candidate
fn extract_text(body: &str) -> Result<String, SynthesisError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| SynthesisError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| SynthesisError::MalformedResponse("no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(SynthesisError::MalformedResponse(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

/// Map a non-success status and its body to a synthesis error
fn status_error(status: u16, body: &str) -> SynthesisError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    let key_rejected = status == 400 && message.contains("API key");
    if status == 401 || status == 403 || key_rejected {
        SynthesisError::Unauthorized(message)
    } else {
        SynthesisError::Upstream { status, message }
    }
}

/// Production client using reqwest
#[derive(Clone)]
pub struct ReqwestGeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl ReqwestGeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerateClient for ReqwestGeminiClient {
    #[tracing::instrument(skip(self, request), fields(model = %self.model, seed = request.seed))]
    async fn generate(&self, request: &GenerateRequest) -> Result<String, SynthesisError> {
        let url = self.url();

        tracing::debug!(url = %url, timeout_ms = self.timeout.as_millis() as u64, "Calling content generator");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&request.to_body())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Content generator request failed");
                SynthesisError::Unreachable(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SynthesisError::Unreachable(format!("failed to read body: {}", e)))?;

        tracing::info!(status = status, response_len = body.len(), "Content generator responded");

        if !(200..300).contains(&status) {
            return Err(status_error(status, &body));
        }
        extract_text(&body)
    }
}
