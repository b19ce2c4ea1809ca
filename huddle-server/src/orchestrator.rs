//! Invocation orchestrator.
//!
//! Drives the generation client through a bounded retry loop and turns its
//! output into a [`CanonicalResponse`]:
//!
//! 1. blank directives are answered immediately, no external call;
//! 2. transient failures (deadline, policy/safety block, empty output) are
//!    retried with a linear backoff and a rephrasing hint;
//! 3. output is repaired ([`crate::sanitize`]), parsed and normalized
//!    ([`crate::normalize`]); a structural failure is not retried;
//! 4. the required-artifact policy ([`crate::policy`]) runs last.
//!
//! [`InvocationOrchestrator::invoke`] never fails: every error is folded into
//! a response carrying `error`.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use crate::error::{GenerationFailure, InvocationError, StructuralError};
use crate::events::{EventSink, preview};
use crate::generation::{GenerationClient, RawOutput};
use crate::normalize;
use crate::policy;
use crate::response::CanonicalResponse;
use crate::sanitize;

/// Outputs longer than this are flagged, not rejected.
pub const LARGE_RESPONSE_CHARS: usize = 1_000_000;

const UNREADABLE_RESPONSE: &str =
    "The AI response could not be understood. Please try rephrasing your request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry that follows attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

/// Bookkeeping for one pass through the loop. Never persisted.
#[derive(Debug, Clone, Copy)]
struct Attempt {
    number: u32,
    last_failure: Option<&'static str>,
}

pub struct InvocationOrchestrator {
    client: GenerationClient,
    retry: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl InvocationOrchestrator {
    pub fn new(client: GenerationClient, retry: RetryPolicy, events: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            retry,
            events,
        }
    }

    pub async fn invoke(&self, directive: &str) -> CanonicalResponse {
        match self.run(directive).await {
            Ok(response) => response,
            Err(err) => {
                self.events.error(
                    "AI request failed",
                    json!({
                        "error": err.to_string(),
                        "promptSnippet": preview(directive, 200),
                    }),
                );
                err.into_response()
            }
        }
    }

    async fn run(&self, directive: &str) -> Result<CanonicalResponse, InvocationError> {
        if directive.trim().is_empty() {
            self.events.warn("AI request with no prompt", json!({}));
            return Err(InvocationError::EmptyDirective);
        }

        let mut attempt = Attempt {
            number: 1,
            last_failure: None,
        };
        let mut prompt = directive.to_string();
        loop {
            self.events.info(
                "Generating AI response",
                json!({
                    "attempt": attempt.number,
                    "promptLength": prompt.len(),
                    "promptPreview": preview(&prompt, 100),
                }),
            );

            let failure = match self.client.generate(&prompt).await {
                Ok(raw) => return self.finish(directive, &raw),
                Err(failure) => failure,
            };
            attempt.last_failure = Some(failure.kind());

            if !self.should_retry(&failure, attempt) {
                self.events.error(
                    "Generation failed",
                    json!({
                        "attempts": attempt.number,
                        "kind": attempt.last_failure,
                        "error": failure.to_string(),
                    }),
                );
                return Err(failure.into());
            }

            let wait = self.retry.backoff(attempt.number);
            self.events.warn(
                "Retryable AI error, attempting retry",
                json!({
                    "attempt": attempt.number,
                    "kind": attempt.last_failure,
                    "backoffMs": wait.as_millis() as u64,
                }),
            );
            tokio::time::sleep(wait).await;
            attempt.number += 1;
            prompt = retry_prompt(directive, attempt.number);
        }
    }

    fn should_retry(&self, failure: &GenerationFailure, attempt: Attempt) -> bool {
        failure.is_retryable() && attempt.number < self.retry.max_attempts
    }

    /// Repair, parse, normalize and police a successful generation.
    fn finish(&self, directive: &str, raw: &RawOutput) -> Result<CanonicalResponse, InvocationError> {
        let length = raw.text.chars().count();
        if length > LARGE_RESPONSE_CHARS {
            self.events
                .warn("AI response is very large", json!({ "responseLength": length }));
        }

        let repaired = sanitize::repair(&raw.text)
            .map_err(|e| self.structural(StructuralError::Parse(e), &raw.text))?;
        if repaired.was_repaired() {
            self.events.info(
                "Sanitized malformed JSON",
                json!({
                    "originalLength": raw.text.len(),
                    "sanitizedLength": repaired.text.len(),
                }),
            );
        }

        let (response, notes) = normalize::normalize_with_notes(&repaired.value)
            .map_err(|e| self.structural(e, &raw.text))?;
        if notes.used_files_alias {
            self.events
                .warn("AI response used 'files' instead of 'fileTree'", json!({}));
        }
        if notes.promoted_top_level {
            self.events
                .warn("AI response lacked 'fileTree'; promoted top-level entries", json!({}));
        }
        for (original, flat) in &notes.renamed {
            self.events.warn(
                "Flattened file path",
                json!({ "original": original, "sanitized": flat }),
            );
        }

        if let Err(violation) = policy::enforce(directive, &response.file_tree) {
            self.events.error(
                "AI response missing required files",
                json!({
                    "missingFiles": violation.missing,
                    "promptSnippet": preview(directive, 200),
                }),
            );
            return Err(violation.into());
        }

        self.events.info(
            "AI response successfully generated",
            json!({
                "files": response.file_tree.keys().collect::<Vec<_>>(),
                "textLength": response.text.len(),
            }),
        );
        Ok(response)
    }

    fn structural(&self, source: StructuralError, raw: &str) -> InvocationError {
        let chars = raw.chars().count();
        let suffix: String = raw.chars().skip(chars.saturating_sub(200)).collect();
        self.events.error(
            "Error parsing AI response",
            json!({
                "error": source.to_string(),
                "responseLength": raw.len(),
                "responsePreview": preview(raw, 200),
                "responseSuffix": suffix,
            }),
        );
        InvocationError::Structural {
            source,
            diagnostic: extract_diagnostic(raw),
        }
    }
}

/// Directive for attempt `attempt` (2-based), nudging toward a different answer.
pub fn retry_prompt(directive: &str, attempt: u32) -> String {
    format!(
        "{directive} (Attempt {attempt}: Please generate original code with unique variable names and structure)"
    )
}

static DIAGNOSTIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)error[\s:]*([^\n\r]+)").ok());

/// Scrape an `error: ...` fragment from unparseable output.
pub fn extract_diagnostic(raw: &str) -> String {
    DIAGNOSTIC
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNREADABLE_RESPONSE.to_string())
}
