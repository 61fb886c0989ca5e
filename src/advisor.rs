//! Clinical advisor
//!
//! Text and image analyses are forwarded to a generative model. Every caller
//! treats advisor failure as recoverable and falls back to a canned answer,
//! so the advisor never needs to be reachable for the dashboard to work.

use crate::error::MonitorError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base URL of the Generative Language API
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Instruction sent alongside uploaded scans
pub const SCAN_PROMPT: &str =
    "Analyze this medical scan image for abnormalities. Provide a concise summary.";

/// Build the huddle prompt for a consultation
pub fn huddle_prompt(history_context: &str, heart_rate: i32, bp: &str, query: &str) -> String {
    format!(
        "You are a Clinical AI Panel. History: {history_context}\n\
         Vitals: HR {heart_rate}, BP {bp}. Query: {query}.\n\
         Provide a brief 'Huddle Response' with a Cardiologist and Neurologist perspective in 2 short sentences."
    )
}

/// A model able to answer clinical prompts
#[async_trait]
pub trait ClinicalAdvisor: Send + Sync {
    /// Short name used in logs and health output
    fn name(&self) -> &str;

    /// Whether calls can succeed at all
    fn is_available(&self) -> bool {
        true
    }

    /// Answer a text prompt
    async fn consult(&self, prompt: &str) -> Result<String, MonitorError>;

    /// Answer a prompt about an image
    async fn inspect(&self, prompt: &str, image: &[u8], mime_type: &str)
        -> Result<String, MonitorError>;
}

/// Advisor used when no model is configured. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAdvisor;

#[async_trait]
impl ClinicalAdvisor for OfflineAdvisor {
    fn name(&self) -> &str {
        "offline"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn consult(&self, _prompt: &str) -> Result<String, MonitorError> {
        Err(MonitorError::AdvisorUnavailable)
    }

    async fn inspect(
        &self,
        _prompt: &str,
        _image: &[u8],
        _mime_type: &str,
    ) -> Result<String, MonitorError> {
        Err(MonitorError::AdvisorUnavailable)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
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
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Gemini `generateContent` client
pub struct GeminiAdvisor {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiAdvisor {
    /// Create a client for the given key and model
    pub fn new(api_key: String, model: String) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MonitorError::Advisor(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn generate(&self, parts: Vec<Part<'_>>) -> Result<String, MonitorError> {
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MonitorError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::Transport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(MonitorError::Advisor(format!("{status}: {message}")));
        }

        extract_text(&body)
    }
}

#[async_trait]
impl ClinicalAdvisor for GeminiAdvisor {
    fn name(&self) -> &str {
        &self.model
    }

    async fn consult(&self, prompt: &str) -> Result<String, MonitorError> {
        self.generate(vec![Part::Text { text: prompt }]).await
    }

    async fn inspect(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, MonitorError> {
        self.generate(vec![
            Part::Text { text: prompt },
            Part::Inline {
                inline_data: InlineData {
                    mime_type,
                    data: BASE64.encode(image),
                },
            },
        ])
        .await
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: &str) -> Result<String, MonitorError> {
    let response: GenerateResponse = serde_json::from_str(body)?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(MonitorError::Advisor("model returned no text".to_string()));
    }
    Ok(text)
}
