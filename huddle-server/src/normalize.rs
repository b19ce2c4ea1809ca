//! Coercion of loosely-shaped generation output into [`CanonicalResponse`].
//!
//! The decoded payload is classified once into typed variants ([`RawFile`],
//! [`FileSource`]) and the rest of the module works on those, instead of
//! probing `serde_json::Value` fields at every step.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::StructuralError;
use crate::response::{CanonicalResponse, CommandSpec, FileEntry};

/// Top-level keys that are never promoted to files.
const RESERVED_KEYS: &[&str] = &[
    "text",
    "fileTree",
    "files",
    "buildCommand",
    "startCommand",
    "error",
    "summary",
    "description",
    "metadata",
];

/// Notes about repairs the normalizer had to make. Callers log these.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Adjustments {
    /// Files came from `files` instead of `fileTree`.
    pub used_files_alias: bool,
    /// Files were promoted from top-level keys.
    pub promoted_top_level: bool,
    /// `text` was synthesized.
    pub synthesized_text: bool,
    /// Original path → flat name, for every entry whose key changed.
    pub renamed: Vec<(String, String)>,
}

/// Accepted shapes for a single file entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFile {
    Inline(String),
    Direct { contents: String },
    Wrapped { file: WrappedFile },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WrappedFile {
    Nested { contents: String },
    Inline(String),
}

impl RawFile {
    fn decode(value: &Value) -> Option<Self> {
        RawFile::deserialize(value).ok()
    }

    fn into_contents(self) -> String {
        match self {
            RawFile::Inline(s) | RawFile::Direct { contents: s } => s,
            RawFile::Wrapped { file } => match file {
                WrappedFile::Nested { contents } | WrappedFile::Inline(contents) => contents,
            },
        }
    }

    /// Top-level promotion only accepts values that clearly carry contents.
    fn is_promotable(&self) -> bool {
        !matches!(
            self,
            RawFile::Wrapped {
                file: WrappedFile::Inline(_)
            }
        )
    }
}

/// Where the file entries were found.
enum FileSource<'a> {
    Tree(&'a Map<String, Value>),
    FilesAlias(&'a Map<String, Value>),
    Promoted(Vec<(&'a String, &'a Value)>),
    Absent,
}

impl<'a> FileSource<'a> {
    fn locate(raw: &'a Map<String, Value>) -> Self {
        if let Some(Value::Object(tree)) = raw.get("fileTree") {
            return FileSource::Tree(tree);
        }
        if let Some(Value::Object(files)) = raw.get("files") {
            return FileSource::FilesAlias(files);
        }
        let promoted: Vec<_> = raw
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .filter(|(_, value)| RawFile::decode(value).is_some_and(|f| f.is_promotable()))
            .collect();
        if promoted.is_empty() {
            FileSource::Absent
        } else {
            FileSource::Promoted(promoted)
        }
    }

    fn entries(self) -> Vec<(&'a String, &'a Value)> {
        match self {
            FileSource::Tree(map) | FileSource::FilesAlias(map) => map.iter().collect(),
            FileSource::Promoted(entries) => entries,
            FileSource::Absent => Vec::new(),
        }
    }
}

/// Normalize a decoded payload. Fails only if `raw` is not a JSON object.
pub fn normalize(raw: &Value) -> Result<CanonicalResponse, StructuralError> {
    normalize_with_notes(raw).map(|(resp, _)| resp)
}

/// Like [`normalize`], also reporting what had to be adjusted.
pub fn normalize_with_notes(
    raw: &Value,
) -> Result<(CanonicalResponse, Adjustments), StructuralError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| StructuralError::NotAnObject(json_kind(raw)))?;
    let mut notes = Adjustments::default();

    let source = FileSource::locate(obj);
    match &source {
        FileSource::FilesAlias(_) => notes.used_files_alias = true,
        FileSource::Promoted(_) => notes.promoted_top_level = true,
        _ => {}
    }
    let file_tree = flatten_tree(source.entries(), &mut notes.renamed);

    let text = ["text", "summary", "description"]
        .iter()
        .find_map(|key| non_blank(obj.get(*key)))
        .map(str::to_string)
        .unwrap_or_else(|| {
            notes.synthesized_text = true;
            fallback_text(file_tree.len())
        });

    let response = CanonicalResponse {
        text,
        file_tree,
        build_command: normalize_command(obj.get("buildCommand"), CommandSpec::install_default),
        start_command: normalize_command(obj.get("startCommand"), CommandSpec::start_default),
        error: non_blank(obj.get("error")).map(|e| e.trim().to_string()),
    };
    Ok((response, notes))
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn fallback_text(file_count: usize) -> String {
    match file_count {
        0 => "Processed your request.".to_string(),
        1 => "Generated 1 file for your request.".to_string(),
        n => format!("Generated {n} files for your request."),
    }
}

fn normalize_command(value: Option<&Value>, fallback: fn() -> CommandSpec) -> CommandSpec {
    let Some(Value::Object(cmd)) = value else {
        return fallback();
    };
    let Some(main_item) = non_blank(cmd.get("mainItem")) else {
        return fallback();
    };
    let commands: Vec<String> = match cmd.get("commands") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    CommandSpec {
        main_item: main_item.trim().to_string(),
        commands: if commands.is_empty() {
            fallback().commands
        } else {
            commands
        },
    }
}

/// Decode entries and flatten their paths, keeping keys unique.
fn flatten_tree(
    entries: Vec<(&String, &Value)>,
    renamed: &mut Vec<(String, String)>,
) -> BTreeMap<String, FileEntry> {
    let mut tree = BTreeMap::new();
    for (path, value) in entries {
        let Some(file) = RawFile::decode(value) else {
            continue;
        };
        let Some(leaf) = leaf_name(path) else {
            continue;
        };
        let name = unique_name(leaf, &tree);
        if name != *path {
            renamed.push((path.clone(), name.clone()));
        }
        tree.insert(name, FileEntry::new(file.into_contents()));
    }
    tree
}

/// Last non-empty path segment, split on `/` and `\`.
fn leaf_name(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\'])
        .map(str::trim)
        .find(|seg| !seg.is_empty())
}

/// `name` if free, otherwise `base-N.ext` for the smallest free N >= 1.
fn unique_name(name: &str, taken: &BTreeMap<String, FileEntry>) -> String {
    if !taken.contains_key(name) {
        return name.to_string();
    }
    let (base, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| format!("{base}-{n}{ext}"))
        .find(|candidate| !taken.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
