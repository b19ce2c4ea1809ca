//! Channel lookup.
//!
//! Channels (projects) and their rosters live in an external store. The
//! gateway only needs to resolve a reference to a record; [`StaticDirectory`]
//! serves records from a TOML file:
//!
//! ```toml
//! [[channel]]
//! id = "todo-app"
//! name = "Todo app"
//! members = ["alice@example.com", "bob@example.com"]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::identity::Identity;

const MAX_CHANNEL_ID_LEN: usize = 64;

/// A well-formed channel reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    /// 1–64 characters of `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let well_formed = !raw.is_empty()
            && raw.len() <= MAX_CHANNEL_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A channel as known to the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub name: String,
    /// Identities allowed in. Empty means any authenticated identity.
    pub members: Vec<String>,
}

impl ChannelRecord {
    pub fn admits(&self, identity: &Identity) -> bool {
        self.members.is_empty() || self.members.iter().any(|m| identity.answers_to(m))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("channel not found")]
    NotFound,
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn resolve(&self, id: &ChannelId) -> Result<ChannelRecord, LookupError>;
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default, rename = "channel")]
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    members: Vec<String>,
}

/// In-memory directory, usually loaded from a TOML file.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    channels: HashMap<ChannelId, ChannelRecord>,
}

impl StaticDirectory {
    pub fn new(records: impl IntoIterator<Item = ChannelRecord>) -> Self {
        Self {
            channels: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let file: DirectoryFile = toml::from_str(text).context("Invalid channel directory")?;
        let mut records = Vec::with_capacity(file.channels.len());
        for entry in file.channels {
            let id = ChannelId::parse(&entry.id)
                .with_context(|| format!("Invalid channel id {:?}", entry.id))?;
            records.push(ChannelRecord {
                name: entry.name.unwrap_or_else(|| id.to_string()),
                id,
                members: entry.members,
            });
        }
        Ok(Self::new(records))
    }

    /// Load from `path`. A missing file yields an empty directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("Channel directory {} not found, no channels available", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let dir = Self::from_toml(&text)?;
        tracing::info!("Loaded {} channels from {}", dir.len(), path.display());
        Ok(dir)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl ChannelDirectory for StaticDirectory {
    async fn resolve(&self, id: &ChannelId) -> Result<ChannelRecord, LookupError> {
        self.channels.get(id).cloned().ok_or(LookupError::NotFound)
    }
}
