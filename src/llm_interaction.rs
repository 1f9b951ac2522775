use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::constants; // For API_KEY, COACH_MODEL and COACH_API_BASE

/// Everything that can go wrong on a single completion attempt.
///
/// The interaction loop does not branch on the variant: any of these ends up
/// as an `Error: ...` reply in the transcript.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("API_KEY is not set; add it to the environment or a .env file")]
    MissingApiKey,
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("generative language API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse API response: {0}")]
    Malformed(String),
    #[error("model returned no text: {0}")]
    Empty(String),
}

/// A remote text-completion capability: prompt in, reply text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    fn model(&self) -> &str;
}

// Structures matching the generateContent endpoint
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
}

/// Client for the Generative Language API. One attempt per call, no retry,
/// transport-default timeout.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds a client from the process-wide configuration.
    pub fn from_env() -> Self {
        Self::new(
            constants::API_KEY.clone(),
            constants::COACH_MODEL.as_str(),
            constants::COACH_API_BASE.as_str(),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn extract_text(response: GenerateResponse) -> Result<String, CompletionError> {
        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates in response".to_string());
            return Err(CompletionError::Empty(reason));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let trimmed = text.trim();
        if trimmed.is_empty() {
            let reason = candidate
                .finish_reason
                .map(|r| format!("finish reason {}", r))
                .unwrap_or_else(|| "empty candidate".to_string());
            return Err(CompletionError::Empty(reason));
        }
        Ok(trimmed.to_string())
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;
        let url = self.endpoint();
        let started = Instant::now();

        let request_payload = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request_payload)
            .send()
            .await
            .map_err(|source| CompletionError::Transport { url: url.clone(), source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| CompletionError::Transport { url: url.clone(), source })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(%status, %message, "Generative language API request failed");
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Malformed(e.to_string()))?;
        let reply = Self::extract_text(parsed)?;

        debug!(reply_len = reply.len(), "Received completion");
        info!(duration_ms = %started.elapsed().as_millis(), "Completion request finished");
        Ok(reply)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
