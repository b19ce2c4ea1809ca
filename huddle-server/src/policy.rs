//! Required-artifact policy.
//!
//! If a directive names one of a fixed set of well-known files, the generated
//! tree must contain it. Missing files fail the invocation even though the
//! generation call itself succeeded.

use std::collections::BTreeMap;

use crate::error::PolicyViolation;
use crate::response::FileEntry;

/// Manifest, entry point, markup entry, stylesheet and bundler config.
pub const REQUIRED_ARTIFACTS: &[&str] = &[
    "package.json",
    "server.js",
    "index.html",
    "tailwind.css",
    "vite.config.js",
];

/// Files named in `directive` that are absent from `tree`, in token order.
pub fn missing_artifacts(directive: &str, tree: &BTreeMap<String, FileEntry>) -> Vec<String> {
    let directive = directive.to_lowercase();
    let present: Vec<String> = tree.keys().map(|k| k.to_lowercase()).collect();
    REQUIRED_ARTIFACTS
        .iter()
        .filter(|token| directive.contains(*token))
        .filter(|token| !present.iter().any(|k| k == *token))
        .map(|token| token.to_string())
        .collect()
}

pub fn enforce(directive: &str, tree: &BTreeMap<String, FileEntry>) -> Result<(), PolicyViolation> {
    let missing = missing_artifacts(directive, tree);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PolicyViolation { missing })
    }
}
