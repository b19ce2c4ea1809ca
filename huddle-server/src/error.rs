//! Error taxonomy.
//!
//! Only [`AdmissionError`] ever terminates a connection. Everything produced
//! below the invocation orchestrator is folded into a canonical response via
//! [`InvocationError::into_response`].

use std::time::Duration;

use thiserror::Error;

use crate::response::CanonicalResponse;

/// Why a connection was refused at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("missing channel reference")]
    MissingChannel,
    #[error("invalid channel reference: {0}")]
    InvalidChannel(String),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("not a channel member")]
    NotMember,
    #[error("channel lookup unavailable: {0}")]
    LookupUnavailable(String),
}

impl AdmissionError {
    /// Stable machine-readable reason sent to the connecting party.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::MissingCredential => "missing credential",
            AdmissionError::InvalidCredential(_) => "invalid credential",
            AdmissionError::MissingChannel => "missing channel reference",
            AdmissionError::InvalidChannel(_) => "invalid channel reference",
            AdmissionError::ChannelNotFound(_) => "channel not found",
            AdmissionError::NotMember => "not a channel member",
            AdmissionError::LookupUnavailable(_) => "channel lookup unavailable",
        }
    }
}

// ── Generation failures ────────────────────────────────────────────────

/// Failures worth another attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientFailure {
    #[error("no response within {0:?}")]
    Deadline(Duration),
    #[error("response blocked by content recitation policy")]
    ContentPolicy,
    #[error("response blocked by safety filters")]
    Safety,
    #[error("empty response from generation service")]
    Empty,
}

/// Failures that retrying cannot fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalFailure {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("quota: {0}")]
    Quota(String),
    #[error("{0}")]
    Unclassified(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationFailure {
    #[error(transparent)]
    Transient(#[from] TransientFailure),
    #[error(transparent)]
    Terminal(#[from] TerminalFailure),
}

impl GenerationFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationFailure::Transient(_))
    }

    /// Short label used in events.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationFailure::Transient(TransientFailure::Deadline(_)) => "deadline",
            GenerationFailure::Transient(TransientFailure::ContentPolicy) => "contentPolicy",
            GenerationFailure::Transient(TransientFailure::Safety) => "safety",
            GenerationFailure::Transient(TransientFailure::Empty) => "empty",
            GenerationFailure::Terminal(TerminalFailure::Configuration(_)) => "configuration",
            GenerationFailure::Terminal(TerminalFailure::Quota(_)) => "quota",
            GenerationFailure::Terminal(TerminalFailure::Unclassified(_)) => "terminal",
        }
    }
}

/// The payload could not be parsed, even after repair.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Generation succeeded but files the directive asked for are missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("AI response did not include required file(s): {}", missing.join(", "))]
pub struct PolicyViolation {
    pub missing: Vec<String>,
}

// ── Invocation ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("prompt is required")]
    EmptyDirective,
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationFailure),
    #[error("structural: {source}")]
    Structural {
        source: StructuralError,
        /// Best-effort diagnostic scraped from the raw output.
        diagnostic: String,
    },
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}

const GENERIC_APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

impl InvocationError {
    /// Fold into the canonical schema with a user-facing message per category.
    pub fn into_response(self) -> CanonicalResponse {
        match self {
            InvocationError::EmptyDirective => CanonicalResponse::failure(
                "Please provide a prompt to generate code.",
                "Prompt is required",
            ),
            InvocationError::Structural { diagnostic, .. } => CanonicalResponse::failure(
                "Sorry, I couldn't process that request. Please try again with a different prompt.",
                diagnostic,
            ),
            InvocationError::Policy(violation) => {
                let message = violation.to_string();
                CanonicalResponse::failure(message.clone(), message)
            }
            InvocationError::Generation(failure) => generation_response(failure),
        }
    }
}

fn generation_response(failure: GenerationFailure) -> CanonicalResponse {
    match failure {
        GenerationFailure::Transient(TransientFailure::Deadline(_)) => CanonicalResponse::failure(
            "The request took too long. Please try a simpler prompt.",
            "Request timed out",
        ),
        GenerationFailure::Transient(TransientFailure::ContentPolicy) => {
            CanonicalResponse::failure(
                "The AI blocked this response due to content policies. Please try rephrasing your request.",
                "AI response blocked due to content recitation",
            )
        }
        GenerationFailure::Transient(TransientFailure::Safety) => CanonicalResponse::failure(
            "The AI blocked this response due to safety filters. Please try a different request.",
            "AI response blocked due to safety filters",
        ),
        GenerationFailure::Transient(TransientFailure::Empty) => {
            CanonicalResponse::failure(GENERIC_APOLOGY, "Empty response from AI model")
        }
        GenerationFailure::Terminal(TerminalFailure::Quota(_)) => CanonicalResponse::failure(
            "The service is temporarily unavailable. Please try again later.",
            "API quota exceeded",
        ),
        GenerationFailure::Terminal(TerminalFailure::Configuration(_)) => {
            CanonicalResponse::failure(
                "There's a configuration issue. Please contact support.",
                "API key issue",
            )
        }
        GenerationFailure::Terminal(TerminalFailure::Unclassified(detail)) => {
            CanonicalResponse::failure(GENERIC_APOLOGY, detail)
        }
    }
}
