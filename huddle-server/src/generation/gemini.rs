//! Google Generative Language API client.
//!
//! Requests JSON output (`responseMimeType: application/json`) and reports the
//! first candidate's finish reason alongside its text so the caller can
//! reject blocked responses.

use async_trait::async_trait;
use serde::Deserialize;

use super::{FinishReason, GenerationService, ServiceError, ServiceReply};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

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

impl GenerateResponse {
    fn into_reply(self) -> ServiceReply {
        // A blocked prompt produces no candidates, only feedback.
        let blocked = self
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| FinishReason::parse(&r));

        let Some(candidate) = self.candidates.into_iter().next() else {
            return ServiceReply {
                finish_reason: blocked,
                text: None,
            };
        };
        let text = candidate.content.map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        });
        ServiceReply {
            finish_reason: candidate
                .finish_reason
                .as_deref()
                .map(FinishReason::parse)
                .or(blocked),
            text,
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiService {
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl GeminiService {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: DEFAULT_MODEL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl GenerationService for GeminiService {
    async fn generate(&self, system: &str, prompt: &str) -> Result<ServiceReply, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Configuration("GOOGLE_AI_KEY is not set".to_string()))?;

        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.5,
                "maxOutputTokens": 8192,
            },
        });

        let resp = self
            .http
            .post(format!("{API_BASE}/models/{}:generateContent", self.model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("Failed to call Gemini API: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::Transport(format!("Failed to parse Gemini response: {e}")))?;
        Ok(parsed.into_reply())
    }
}

fn classify_status(status: u16, body: String) -> ServiceError {
    let lower = body.to_lowercase();
    if status == 429 || lower.contains("quota") || lower.contains("rate limit") {
        ServiceError::Quota(format!("{status}: {body}"))
    } else if status == 401 || status == 403 || lower.contains("api key") {
        ServiceError::Configuration(format!("{status}: {body}"))
    } else {
        ServiceError::Http { status, body }
    }
}
