//! Feed configuration.

use serde::{Deserialize, Serialize};

use opwatch_proto::OperationKind;

use crate::error::{Error, Result};

/// Default capacity of the tailer channel.
pub const DEFAULT_TAILER_CAPACITY: usize = 1024;

/// Event-name substrings to drop, per operation kind.
///
/// Accepts both `insert_paths` and the camel-case `insertPaths` spelling
/// when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Substrings excluded from insert events.
    #[serde(alias = "insertPaths")]
    pub insert_paths: Vec<String>,
    /// Substrings excluded from update events.
    #[serde(alias = "updatePaths")]
    pub update_paths: Vec<String>,
    /// Substrings excluded from delete events.
    #[serde(alias = "deletePaths")]
    pub delete_paths: Vec<String>,
}

impl ExclusionConfig {
    /// Create a configuration that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Add an insert exclusion.
    pub fn exclude_insert(mut self, substring: impl Into<String>) -> Self {
        self.insert_paths.push(substring.into());
        self
    }

    /// Add an update exclusion.
    pub fn exclude_update(mut self, substring: impl Into<String>) -> Self {
        self.update_paths.push(substring.into());
        self
    }

    /// Add a delete exclusion.
    pub fn exclude_delete(mut self, substring: impl Into<String>) -> Self {
        self.delete_paths.push(substring.into());
        self
    }

    /// The exclusion list for an operation kind.
    pub fn paths_for(&self, kind: OperationKind) -> &[String] {
        match kind {
            OperationKind::Insert => &self.insert_paths,
            OperationKind::Update => &self.update_paths,
            OperationKind::Delete => &self.delete_paths,
        }
    }

    /// Check if no exclusions are configured.
    pub fn is_empty(&self) -> bool {
        self.insert_paths.is_empty() && self.update_paths.is_empty() && self.delete_paths.is_empty()
    }
}

/// Change feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Exclusion rules.
    pub exclusions: ExclusionConfig,
    /// Whether the injected logger is allowed to emit.
    pub debug_mode: bool,
    /// Capacity of the channel between the tailer and the dispatcher.
    pub tailer_capacity: usize,
}

impl FeedConfig {
    /// Create a configuration with the given exclusions.
    ///
    /// Debug mode starts off, so the injected logger stays silent until
    /// enabled with [`FeedConfig::with_debug_mode`].
    pub fn new(exclusions: ExclusionConfig) -> Self {
        Self {
            exclusions,
            debug_mode: false,
            tailer_capacity: DEFAULT_TAILER_CAPACITY,
        }
    }

    /// Set debug mode.
    pub fn with_debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Set the tailer channel capacity.
    pub fn with_tailer_capacity(mut self, capacity: usize) -> Self {
        self.tailer_capacity = capacity.max(1);
        self
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new(ExclusionConfig::default())
    }
}
