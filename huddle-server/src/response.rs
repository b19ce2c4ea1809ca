//! The canonical assistant response.
//!
//! Every result the invocation pipeline produces, success or failure, is
//! coerced into [`CanonicalResponse`] before it reaches the router. Clients
//! only ever see this shape, serialized as the body of an assistant message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One generated file. Keys in the tree are flat file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub contents: String,
}

impl FileEntry {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

/// A build or start step: the program to run and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub main_item: String,
    pub commands: Vec<String>,
}

impl CommandSpec {
    /// `npm install`
    pub fn install_default() -> Self {
        Self {
            main_item: "npm".to_string(),
            commands: vec!["install".to_string()],
        }
    }

    /// `node server.js`
    pub fn start_default() -> Self {
        Self {
            main_item: "node".to_string(),
            commands: vec!["server.js".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResponse {
    /// Narrative shown to participants. Never empty.
    pub text: String,
    pub file_tree: BTreeMap<String, FileEntry>,
    pub build_command: CommandSpec,
    pub start_command: CommandSpec,
    /// Present only when the pipeline could not produce a usable result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CanonicalResponse {
    /// An error envelope: empty file tree, default commands, `error` set.
    pub fn failure(text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_tree: BTreeMap::new(),
            build_command: CommandSpec::install_default(),
            start_command: CommandSpec::start_default(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Serialize for transport. Falls back to a minimal hand-built error body
    /// if serialization somehow fails, so callers always get a string.
    pub fn to_body(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "text": "Sorry, I encountered an error. Please try again.",
                "fileTree": {},
                "buildCommand": CommandSpec::install_default(),
                "startCommand": CommandSpec::start_default(),
                "error": format!("response serialization failed: {e}"),
            })
            .to_string()
        })
    }
}
