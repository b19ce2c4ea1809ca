//! Invocation orchestrator acceptance tests: retry limit, deadline,
//! repair, normalization and the required-artifact policy.

mod common;

use std::time::Duration;

use common::{RecordingSink, ScriptedService, Step, generated, orchestrator};
use huddle_server::events::Level;
use huddle_server::generation::{FinishReason, ServiceError, ServiceReply};

fn blocked(reason: FinishReason) -> Step {
    Step::Reply(ServiceReply {
        finish_reason: Some(reason),
        text: Some("partial".to_string()),
    })
}

// ── Retry limit ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn safety_blocks_exhaust_three_attempts() {
    let service = ScriptedService::always(blocked(FinishReason::Safety));
    let events = RecordingSink::new();
    let orch = orchestrator(service.clone(), events.clone());

    let started = tokio::time::Instant::now();
    let response = orch.invoke("build a chat widget").await;

    assert_eq!(service.calls(), 3);
    assert_eq!(
        response.error.as_deref(),
        Some("AI response blocked due to safety filters")
    );
    assert!(response.file_tree.is_empty());
    // Backoff of 1s then 2s between the three attempts.
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(
        events
            .messages(Level::Warn)
            .iter()
            .filter(|m| *m == "Retryable AI error, attempting retry")
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn prohibited_content_with_valid_payload_is_never_output() {
    let service = ScriptedService::always(Step::Reply(ServiceReply {
        finish_reason: Some(FinishReason::parse("PROHIBITED_CONTENT")),
        text: Some(generated("blocked-but-text", &["a.js"])),
    }));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("anything in a.js").await;

    assert_eq!(service.calls(), 3);
    assert_eq!(
        response.error.as_deref(),
        Some("AI response blocked due to content recitation")
    );
    assert!(response.file_tree.is_empty());
    assert_ne!(response.text, "blocked-but-text");
}

#[tokio::test(start_paused = true)]
async fn blocklisted_prompt_without_text_is_a_policy_block() {
    let service = ScriptedService::always(Step::Reply(ServiceReply {
        finish_reason: Some(FinishReason::parse("BLOCKLIST")),
        text: None,
    }));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("anything").await;

    assert_eq!(service.calls(), 3);
    assert_eq!(
        response.error.as_deref(),
        Some("AI response blocked due to content recitation")
    );
}

#[tokio::test(start_paused = true)]
async fn image_safety_counts_as_a_safety_block() {
    let service = ScriptedService::always(blocked(FinishReason::parse("IMAGE_SAFETY")));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("draw something").await;

    assert_eq!(service.calls(), 3);
    assert_eq!(
        response.error.as_deref(),
        Some("AI response blocked due to safety filters")
    );
}

#[tokio::test(start_paused = true)]
async fn retries_carry_attempt_suffix_on_the_original_directive() {
    let service = ScriptedService::new([
        blocked(FinishReason::Recitation),
        Step::text(""),
        Step::text(generated("done", &["app.js"])),
    ]);
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("make a counter").await;

    assert!(!response.is_error(), "unexpected error: {:?}", response.error);
    let prompts = service.prompts();
    assert_eq!(prompts.len(), 3);
    assert_eq!(prompts[0], "make a counter");
    assert!(prompts[1].starts_with("make a counter (Attempt 2:"));
    assert!(prompts[2].starts_with("make a counter (Attempt 3:"));
    assert!(!prompts[2].contains("Attempt 2"));
}

#[tokio::test(start_paused = true)]
async fn recovers_on_second_attempt() {
    let service = ScriptedService::new([
        blocked(FinishReason::Recitation),
        Step::text(generated("Here is your page", &["index.html"])),
    ]);
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("a landing page in index.html").await;

    assert_eq!(service.calls(), 2);
    assert_eq!(response.text, "Here is your page");
    assert_eq!(response.file_tree["index.html"].contents, "// index.html");
    assert!(response.error.is_none());
}

#[tokio::test]
async fn terminal_failures_are_not_retried() {
    let service = ScriptedService::always(Step::Fail(ServiceError::Quota(
        "429 Too Many Requests".to_string(),
    )));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("anything").await;

    assert_eq!(service.calls(), 1);
    assert_eq!(response.error.as_deref(), Some("API quota exceeded"));
}

#[tokio::test]
async fn missing_configuration_is_terminal() {
    let service = ScriptedService::always(Step::Fail(ServiceError::Configuration(
        "GOOGLE_AI_KEY is not set".to_string(),
    )));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("anything").await;

    assert_eq!(service.calls(), 1);
    assert_eq!(response.error.as_deref(), Some("API key issue"));
}

// ── Deadline ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn each_attempt_is_bounded_by_the_deadline() {
    let service = ScriptedService::always(Step::Hang);
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let started = tokio::time::Instant::now();
    let response = orch.invoke("slow please").await;
    let elapsed = started.elapsed();

    assert_eq!(service.calls(), 3);
    assert_eq!(response.error.as_deref(), Some("Request timed out"));
    // Three 60s deadlines plus 1s and 2s of backoff.
    assert!(elapsed >= Duration::from_secs(183), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(185), "elapsed {elapsed:?}");
}

// ── Payload handling ───────────────────────────────────────────────────

#[tokio::test]
async fn literal_newline_in_string_is_repaired() {
    let raw = "{\"text\":\"line one\nline two\",\"fileTree\":{}}";
    let service = ScriptedService::always(Step::text(raw));
    let events = RecordingSink::new();
    let orch = orchestrator(service.clone(), events.clone());

    let response = orch.invoke("explain something").await;

    assert!(response.error.is_none());
    assert_eq!(response.text, "line oneline two");
    assert_eq!(service.calls(), 1);
    assert!(events.contains("Sanitized malformed JSON"));
}

#[tokio::test]
async fn unparseable_output_is_not_retried() {
    let service = ScriptedService::always(Step::text("definitely not json"));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("anything").await;

    assert_eq!(service.calls(), 1);
    assert!(response.text.starts_with("Sorry, I couldn't process that request"));
    assert_eq!(
        response.error.as_deref(),
        Some("The AI response could not be understood. Please try rephrasing your request.")
    );
}

#[tokio::test]
async fn files_alias_and_nested_paths_are_normalized() {
    let raw = serde_json::json!({
        "summary": "Two entry points",
        "files": {
            "src/app/index.js": { "contents": "app" },
            "lib/index.js": "lib",
        },
        "startCommand": { "mainItem": "  ", "commands": [] },
    })
    .to_string();
    let service = ScriptedService::always(Step::text(raw));
    let events = RecordingSink::new();
    let orch = orchestrator(service, events.clone());

    let response = orch.invoke("split it up").await;

    assert!(response.error.is_none());
    assert_eq!(response.text, "Two entry points");
    let names: Vec<_> = response.file_tree.keys().cloned().collect();
    assert_eq!(names, vec!["index-1.js", "index.js"]);
    assert_eq!(response.start_command.main_item, "node");
    assert_eq!(response.start_command.commands, vec!["server.js"]);
    assert!(events.contains("AI response used 'files' instead of 'fileTree'"));
}

// ── Required artifacts ─────────────────────────────────────────────────

#[tokio::test]
async fn missing_required_file_fails_the_invocation() {
    let service = ScriptedService::always(Step::text(generated("Here", &["package.json"])));
    let events = RecordingSink::new();
    let orch = orchestrator(service.clone(), events.clone());

    let response = orch
        .invoke("create a package.json and server.js for a minimal HTTP server")
        .await;

    assert_eq!(service.calls(), 1);
    assert!(response.file_tree.is_empty());
    assert_eq!(
        response.error.as_deref(),
        Some("AI response did not include required file(s): server.js")
    );
    assert!(events.contains("AI response missing required files"));
}

#[tokio::test]
async fn required_files_present_passes() {
    let service = ScriptedService::always(Step::text(generated(
        "Here",
        &["server.js", "package.json"],
    )));
    let orch = orchestrator(service, RecordingSink::new());

    let response = orch.invoke("write server.js and package.json").await;

    assert!(response.error.is_none());
    assert_eq!(response.file_tree.len(), 2);
}

#[tokio::test]
async fn empty_directive_makes_no_call() {
    let service = ScriptedService::always(Step::text(generated("x", &[])));
    let orch = orchestrator(service.clone(), RecordingSink::new());

    let response = orch.invoke("   ").await;

    assert_eq!(service.calls(), 0);
    assert_eq!(response.error.as_deref(), Some("Prompt is required"));
    assert_eq!(response.text, "Please provide a prompt to generate code.");
}
