//! Source Registry
//!
//! Maps a `source` query value to the user agent its origin expects. The
//! registry itself is owned outside the relay; the relay only reads it.
//!
//! Resolution rules:
//! - no `source` → default user agent
//! - registered source with a user agent → that user agent
//! - registered source without one → default user agent
//! - unregistered source, strict lookup → [`RelayError::SourceNotFound`]
//! - unregistered source, lenient lookup → default user agent
//!
//! File format (`SOURCES_FILE`):
//!
//! ```json
//! { "sources": [ { "key": "live-a", "name": "Live A", "user_agent": "okhttp/3.15" } ] }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::types::{RelayError, Result};

/// Read-only view of the external source configuration
pub trait SourceRegistry: Send + Sync {
    /// Look up a source by key. `Ok(None)` means known, no custom user agent.
    fn user_agent_for(&self, key: &str) -> Option<Option<String>>;

    /// Default user agent for unnamed sources
    fn default_user_agent(&self) -> &str;

    /// Resolve the user agent for an optional source key.
    ///
    /// `strict` rejects keys the registry does not know; otherwise they get
    /// the default user agent.
    fn resolve(&self, source: Option<&str>, strict: bool) -> Result<String> {
        let key = match source.map(str::trim).filter(|s| !s.is_empty()) {
            Some(key) => key,
            None => return Ok(self.default_user_agent().to_string()),
        };

        match self.user_agent_for(key) {
            Some(Some(ua)) => Ok(ua),
            Some(None) => Ok(self.default_user_agent().to_string()),
            None if strict => Err(RelayError::SourceNotFound(key.to_string())),
            None => {
                debug!(source = key, "Unknown source, using default user agent");
                Ok(self.default_user_agent().to_string())
            }
        }
    }
}

/// One configured source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

/// Registry backed by a fixed list loaded at startup
#[derive(Debug, Clone)]
pub struct StaticSourceRegistry {
    sources: HashMap<String, SourceEntry>,
    default_user_agent: String,
}

impl StaticSourceRegistry {
    pub fn new(entries: Vec<SourceEntry>, default_user_agent: impl Into<String>) -> Self {
        let sources = entries
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();

        Self {
            sources,
            default_user_agent: default_user_agent.into(),
        }
    }

    /// Registry with no sources; every named source is unknown
    pub fn empty(default_user_agent: impl Into<String>) -> Self {
        Self::new(Vec::new(), default_user_agent)
    }

    /// Parse the JSON sources document
    pub fn from_json(json: &str, default_user_agent: impl Into<String>) -> Result<Self> {
        let file: SourcesFile = serde_json::from_str(json)
            .map_err(|e| RelayError::Internal(format!("Invalid sources file: {e}")))?;
        Ok(Self::new(file.sources, default_user_agent))
    }

    /// Load from a JSON file on disk
    pub fn load(path: &Path, default_user_agent: impl Into<String>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&json, default_user_agent)?;
        info!(path = %path.display(), sources = registry.len(), "Source registry loaded");
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceRegistry for StaticSourceRegistry {
    fn user_agent_for(&self, key: &str) -> Option<Option<String>> {
        self.sources
            .get(key)
            .map(|entry| entry.user_agent.clone().filter(|ua| !ua.trim().is_empty()))
    }

    fn default_user_agent(&self) -> &str {
        &self.default_user_agent
    }
}
