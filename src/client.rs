//! AI provider client
//!
//! The categorizer and the email generator only see the [`AiClient`] trait.
//! [`GeminiClient`] talks to the Gemini `generateContent` endpoint and maps
//! HTTP failures onto the quota / non-quota split the retry policy needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::AiConfig;
use crate::error::{OutreachError, Result};

/// Narrow capability interface over the text-generation service
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Ask for a single category label
    async fn classify(&self, prompt: &str) -> Result<String>;

    /// Ask for free-form text (email subject and body)
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: AiClient + ?Sized> AiClient for Arc<T> {
    async fn classify(&self, prompt: &str) -> Result<String> {
        self.as_ref().classify(prompt).await
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.as_ref().generate(prompt).await
    }
}

/// Stand-in used when no API key is available or `--no-ai` is passed.
/// Every call fails with [`OutreachError::AiDisabled`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAiClient;

#[async_trait]
impl AiClient for DisabledAiClient {
    async fn classify(&self, _prompt: &str) -> Result<String> {
        Err(OutreachError::AiDisabled)
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(OutreachError::AiDisabled)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini REST client
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `endpoint` - API base, e.g. `https://generativelanguage.googleapis.com/v1beta`
    /// * `model` - Model name, e.g. `gemini-2.5-flash`
    /// * `api_key` - API key sent as the `key` query parameter
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OutreachError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from config, reading the key from `ai.api_key_env`
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            OutreachError::ConfigError(format!(
                "{} not found in environment variables",
                config.api_key_env
            ))
        })?;
        if api_key.trim().is_empty() {
            return Err(OutreachError::ConfigError(format!(
                "{} is empty",
                config.api_key_env
            )));
        }

        Self::new(
            &config.endpoint,
            &config.model,
            &api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    /// Send one prompt and return the text of the first candidate
    async fn generate_content(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!("Sending {} char prompt to {}", prompt.len(), self.model);

        let response = self
            .http
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &body));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        extract_text(parsed)
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn map_status_error(status: u16, body: &str) -> OutreachError {
    let body_lower = body.to_lowercase();
    let message = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.trim())
    };

    if status == 429 || body_lower.contains("quota") || body_lower.contains("resource_exhausted") {
        return OutreachError::QuotaExceeded(message);
    }

    OutreachError::ApiError { status, message }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OutreachError::InvalidResponse(
            "response contained no text".to_string(),
        ));
    }

    Ok(text)
}

#[async_trait]
impl AiClient for GeminiClient {
    async fn classify(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt).await
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt).await
    }
}
