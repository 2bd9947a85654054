//! Google Gemini `generateContent` backend

use super::prompt::PromptTemplate;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tanqih_core::{CleanRequest, CleaningService, ServiceError};

/// Finish reasons that mean the model refused the content
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Cleans text with a Gemini model over the REST API
pub struct GeminiService {
    http: Client,
    url: String,
    api_key: String,
    prompt: PromptTemplate,
}

impl GeminiService {
    /// Create a client for `model` at `endpoint`
    pub fn new(endpoint: &str, model: &str, api_key: String, prompt: PromptTemplate) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("tanqih/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            url: format!(
                "{}/models/{}:generateContent",
                endpoint.trim_end_matches('/'),
                model
            ),
            api_key,
            prompt,
        })
    }

    /// Request URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl CleaningService for GeminiService {
    fn clean(&self, request: &CleanRequest<'_>) -> std::result::Result<String, ServiceError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": self.prompt.render(request.text) }]
            }]
        });

        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(classify_transport)?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ServiceError::transient(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(classify_status(status, &text));
        }
        parse_response(&text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn classify_transport(err: reqwest::Error) -> ServiceError {
    if err.is_builder() {
        ServiceError::permanent(format!("invalid request: {err}"))
    } else if err.is_timeout() {
        ServiceError::transient(format!("request timed out: {err}"))
    } else {
        ServiceError::transient(format!("network error: {err}"))
    }
}

/// Map a non-success HTTP status to a service error
pub fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let message = format!("HTTP {}: {}", status.as_u16(), snippet(body));
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ServiceError::transient(message)
    } else {
        ServiceError::permanent(message)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Extract the cleaned text from a successful response body
///
/// Blocked content is permanent; an empty answer for any other reason is
/// worth another attempt.
pub fn parse_response(body: &str) -> std::result::Result<String, ServiceError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::transient(format!("malformed response: {e}")))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ServiceError::permanent(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ServiceError::transient("empty response: no candidates"));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();
    if !text.is_empty() {
        return Ok(text.to_string());
    }

    match candidate.finish_reason.as_deref() {
        Some(reason) if BLOCKED_FINISH_REASONS.contains(&reason) => Err(ServiceError::permanent(
            format!("response blocked: {reason}"),
        )),
        reason => Err(ServiceError::transient(format!(
            "empty response (finish reason {})",
            reason.unwrap_or("unknown")
        ))),
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let body = body.trim();
    match body.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}…", &body[..end]),
        None => body.to_string(),
    }
}
