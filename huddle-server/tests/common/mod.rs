//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use huddle_server::events::{EventSink, Level};
use huddle_server::generation::{
    GenerationClient, GenerationService, ServiceError, ServiceReply,
};
use huddle_server::orchestrator::{InvocationOrchestrator, RetryPolicy};

pub const TIMEOUT_MS: u64 = 5000;

/// One scripted outcome of a generation call.
#[derive(Clone)]
pub enum Step {
    Reply(ServiceReply),
    Fail(ServiceError),
    /// Never completes; only the deadline ends it.
    Hang,
}

impl Step {
    pub fn text(text: impl Into<String>) -> Self {
        Step::Reply(ServiceReply::text(text))
    }
}

/// Plays back a script, repeating the last step once it runs out.
pub struct ScriptedService {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new([step])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next_step(&self) -> Step {
        let next = self.steps.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Hang),
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<ServiceReply, ServiceError> {
        self.prompts.lock().push(prompt.to_string());
        match self.next_step() {
            Step::Reply(reply) => Ok(reply),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Records every emitted event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Level, String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, m, _)| m.clone())
            .collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.events.lock().iter().any(|(_, m, _)| m == message)
    }

    /// Poll until `message` has been emitted.
    pub async fn wait_for(&self, message: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(TIMEOUT_MS);
        while !self.contains(message) {
            if tokio::time::Instant::now() >= deadline {
                panic!("Timeout waiting for event: {message}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, level: Level, message: &str, detail: Value) {
        self.events.lock().push((level, message.to_string(), detail));
    }
}

pub fn orchestrator(
    service: Arc<ScriptedService>,
    events: Arc<RecordingSink>,
) -> InvocationOrchestrator {
    InvocationOrchestrator::new(
        GenerationClient::new(service, Duration::from_secs(60)),
        RetryPolicy::default(),
        events,
    )
}

/// A well-formed generation payload containing `files`.
pub fn generated(text: &str, files: &[&str]) -> String {
    let tree: serde_json::Map<String, Value> = files
        .iter()
        .map(|name| {
            (
                name.to_string(),
                serde_json::json!({ "file": { "contents": format!("// {name}") } }),
            )
        })
        .collect();
    serde_json::json!({
        "text": text,
        "fileTree": tree,
        "buildCommand": { "mainItem": "npm", "commands": ["install"] },
        "startCommand": { "mainItem": "node", "commands": ["server.js"] },
    })
    .to_string()
}
