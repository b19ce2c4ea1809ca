//! Generation client.
//!
//! [`GenerationService`] is the seam to the external model. [`GenerationClient`]
//! wraps exactly one call to it: it enforces its own deadline instead of
//! trusting the service's timeout, inspects the finish reason before looking
//! at the text, and classifies every outcome as transient or terminal.

pub mod contract;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{GenerationFailure, TerminalFailure, TransientFailure};

pub use gemini::GeminiService;

/// Why the service stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    ImageSafety,
    Recitation,
    /// `PROHIBITED_CONTENT`, `BLOCKLIST` or `SPII`.
    Prohibited(String),
    Other(String),
}

impl FinishReason {
    pub fn parse(reason: &str) -> Self {
        match reason.to_ascii_uppercase().as_str() {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "IMAGE_SAFETY" => FinishReason::ImageSafety,
            "RECITATION" => FinishReason::Recitation,
            "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => {
                FinishReason::Prohibited(reason.to_ascii_uppercase())
            }
            _ => FinishReason::Other(reason.to_string()),
        }
    }
}

/// What the service handed back for one call.
#[derive(Debug, Clone, Default)]
pub struct ServiceReply {
    pub finish_reason: Option<FinishReason>,
    pub text: Option<String>,
}

impl ServiceReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(FinishReason::Stop),
            text: Some(text.into()),
        }
    }
}

/// Failures reported by a [`GenerationService`] implementation.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("not configured: {0}")]
    Configuration(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport: {0}")]
    Transport(String),
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Single-shot call: `system` is the output contract, `prompt` the directive.
    async fn generate(&self, system: &str, prompt: &str) -> Result<ServiceReply, ServiceError>;
}

/// Raw text produced by a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub text: String,
}

pub struct GenerationClient {
    service: Arc<dyn GenerationService>,
    deadline: Duration,
}

impl GenerationClient {
    pub fn new(service: Arc<dyn GenerationService>, deadline: Duration) -> Self {
        Self { service, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn generate(&self, directive: &str) -> Result<RawOutput, GenerationFailure> {
        let call = self.service.generate(contract::SYSTEM_CONTRACT, directive);
        match tokio::time::timeout(self.deadline, call).await {
            Err(_) => Err(TransientFailure::Deadline(self.deadline).into()),
            Ok(Err(e)) => Err(classify_service_error(e)),
            Ok(Ok(reply)) => classify_reply(reply),
        }
    }
}

/// Policy rejections win over any accompanying text.
fn classify_reply(reply: ServiceReply) -> Result<RawOutput, GenerationFailure> {
    match reply.finish_reason {
        Some(FinishReason::Recitation | FinishReason::Prohibited(_)) => {
            return Err(TransientFailure::ContentPolicy.into());
        }
        Some(FinishReason::Safety | FinishReason::ImageSafety) => {
            return Err(TransientFailure::Safety.into());
        }
        _ => {}
    }
    match reply.text {
        Some(text) if !text.trim().is_empty() => Ok(RawOutput { text }),
        _ => Err(TransientFailure::Empty.into()),
    }
}

fn classify_service_error(err: ServiceError) -> GenerationFailure {
    let failure = match err {
        ServiceError::Configuration(msg) => TerminalFailure::Configuration(msg),
        ServiceError::Quota(msg) => TerminalFailure::Quota(msg),
        ServiceError::Http { status, body } => {
            TerminalFailure::Unclassified(format!("API Error: {status}: {body}"))
        }
        ServiceError::Transport(msg) => TerminalFailure::Unclassified(msg),
    };
    failure.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_parsing() {
        assert_eq!(FinishReason::parse("STOP"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("recitation"), FinishReason::Recitation);
        assert_eq!(FinishReason::parse("SAFETY"), FinishReason::Safety);
        assert_eq!(
            FinishReason::parse("blocklist"),
            FinishReason::Prohibited("BLOCKLIST".into())
        );
        assert_eq!(FinishReason::parse("IMAGE_SAFETY"), FinishReason::ImageSafety);
        assert_eq!(
            FinishReason::parse("LANGUAGE"),
            FinishReason::Other("LANGUAGE".into())
        );
    }

    #[test]
    fn prohibited_reasons_are_content_policy() {
        for reason in ["PROHIBITED_CONTENT", "BLOCKLIST", "SPII"] {
            let reply = ServiceReply {
                finish_reason: Some(FinishReason::parse(reason)),
                text: Some("{\"text\":\"ok\"}".into()),
            };
            assert_eq!(
                classify_reply(reply).unwrap_err(),
                GenerationFailure::Transient(TransientFailure::ContentPolicy),
                "{reason}"
            );
        }
        let reply = ServiceReply {
            finish_reason: Some(FinishReason::ImageSafety),
            text: None,
        };
        assert_eq!(
            classify_reply(reply).unwrap_err(),
            GenerationFailure::Transient(TransientFailure::Safety)
        );
    }

    #[test]
    fn rejection_beats_text() {
        let reply = ServiceReply {
            finish_reason: Some(FinishReason::Recitation),
            text: Some("{\"text\":\"ok\"}".into()),
        };
        assert_eq!(
            classify_reply(reply).unwrap_err(),
            GenerationFailure::Transient(TransientFailure::ContentPolicy)
        );

        let reply = ServiceReply {
            finish_reason: Some(FinishReason::Safety),
            text: Some("{}".into()),
        };
        assert_eq!(
            classify_reply(reply).unwrap_err(),
            GenerationFailure::Transient(TransientFailure::Safety)
        );
    }

    #[test]
    fn blank_text_is_empty() {
        let reply = ServiceReply {
            finish_reason: None,
            text: Some("  \n".into()),
        };
        assert_eq!(
            classify_reply(reply).unwrap_err(),
            GenerationFailure::Transient(TransientFailure::Empty)
        );
        assert!(classify_reply(ServiceReply::default()).is_err());
    }

    #[test]
    fn service_errors_are_terminal() {
        let f = classify_service_error(ServiceError::Quota("429".into()));
        assert!(!f.is_retryable());
        assert_eq!(f.kind(), "quota");
        let f = classify_service_error(ServiceError::Http {
            status: 500,
            body: "oops".into(),
        });
        assert_eq!(f.kind(), "terminal");
    }
}
