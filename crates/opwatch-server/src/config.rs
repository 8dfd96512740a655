//! Server configuration.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::Value as Json;

use opwatch_core::{ConnectionRegistry, ExclusionConfig, FeedConfig, DEFAULT_TAILER_CAPACITY};

use crate::error::{Error, Result};

/// opwatch server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Newline-delimited JSON records to replay. `None` reads stdin.
    pub input: Option<PathBuf>,

    /// JSON file with `insertPaths` / `updatePaths` / `deletePaths`.
    pub exclusions_path: Option<PathBuf>,

    /// JSON fixture of in-memory databases used for update re-fetches.
    pub fixtures_path: Option<PathBuf>,

    /// Event names whose events are printed.
    pub watch: Vec<String>,

    /// Forward feed diagnostics to the log.
    pub debug: bool,

    /// Capacity of the tailer channel.
    pub capacity: usize,
}

impl ServerConfig {
    /// Create a configuration that reads stdin and watches nothing.
    pub fn new() -> Self {
        Self {
            input: None,
            exclusions_path: None,
            fixtures_path: None,
            watch: Vec::new(),
            debug: false,
            capacity: DEFAULT_TAILER_CAPACITY,
        }
    }

    /// Set the input file.
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Set the exclusions file.
    pub fn with_exclusions(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclusions_path = Some(path.into());
        self
    }

    /// Set the fixtures file.
    pub fn with_fixtures(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixtures_path = Some(path.into());
        self
    }

    /// Watch an event name.
    pub fn watch(mut self, name: impl Into<String>) -> Self {
        self.watch.push(name.into());
        self
    }

    /// Enable or disable debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the tailer channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Check if records come from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input.is_none()
    }

    /// Build the feed configuration, loading the exclusions file if set.
    pub fn feed_config(&self) -> Result<FeedConfig> {
        let exclusions = match &self.exclusions_path {
            Some(path) => load_exclusions(path)?,
            None => ExclusionConfig::default(),
        };
        Ok(FeedConfig::new(exclusions)
            .with_debug_mode(self.debug)
            .with_tailer_capacity(self.capacity))
    }

    /// Build the connection registry, loading the fixtures file if set.
    pub fn registry(&self) -> Result<ConnectionRegistry> {
        match &self.fixtures_path {
            Some(path) => load_fixtures(path),
            None => Ok(ConnectionRegistry::new()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Load an exclusion configuration from a JSON file.
pub fn load_exclusions(path: &Path) -> Result<ExclusionConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(ExclusionConfig::from_json(&text)?)
}

/// Load a connection registry from a JSON fixture file.
pub fn load_fixtures(path: &Path) -> Result<ConnectionRegistry> {
    let text = std::fs::read_to_string(path)?;
    let fixture: Json = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    Ok(ConnectionRegistry::from_fixture(&fixture)?)
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "opwatch-server")]
#[command(version, about = "Replay change-log records and print watched events", long_about = None)]
pub struct Args {
    /// Newline-delimited JSON records to replay (default: stdin).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Exclusion configuration file (JSON).
    #[arg(short, long)]
    pub exclusions: Option<PathBuf>,

    /// In-memory database fixture used for update re-fetches (JSON).
    #[arg(short, long)]
    pub fixtures: Option<PathBuf>,

    /// Event name to print, e.g. `update:shop.orders.status`. Repeatable.
    #[arg(short, long)]
    pub watch: Vec<String>,

    /// Forward feed diagnostics to the log.
    #[arg(long)]
    pub debug: bool,

    /// Tailer channel capacity.
    #[arg(long, default_value_t = DEFAULT_TAILER_CAPACITY)]
    pub capacity: usize,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            input: self.input,
            exclusions_path: self.exclusions,
            fixtures_path: self.fixtures,
            watch: self.watch,
            debug: self.debug,
            capacity: self.capacity.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.reads_stdin());
        assert!(config.watch.is_empty());
        assert!(!config.debug);
        assert_eq!(config.capacity, DEFAULT_TAILER_CAPACITY);
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "opwatch-server",
            "--input",
            "records.ndjson",
            "-w",
            "insert:shop.orders",
            "--watch",
            "update:shop.orders.status",
            "--debug",
            "--capacity",
            "0",
        ]);
        let config = args.into_config();

        assert_eq!(config.input, Some(PathBuf::from("records.ndjson")));
        assert_eq!(config.watch, vec!["insert:shop.orders", "update:shop.orders.status"]);
        assert!(config.debug);
        assert_eq!(config.capacity, 1);
    }

    #[test]
    fn test_feed_config_loads_exclusions() {
        let file = write_temp(r#"{"updatePaths": ["secret"], "deletePaths": ["audit"]}"#);
        let config = ServerConfig::new().with_exclusions(file.path()).with_debug(true);

        let feed = config.feed_config().unwrap();
        assert_eq!(feed.exclusions.update_paths, vec!["secret".to_string()]);
        assert_eq!(feed.exclusions.delete_paths, vec!["audit".to_string()]);
        assert!(feed.exclusions.insert_paths.is_empty());
        assert!(feed.debug_mode);
    }

    #[test]
    fn test_feed_config_rejects_bad_exclusions() {
        let file = write_temp(r#"{"updatePaths": 3}"#);
        let err = ServerConfig::new().with_exclusions(file.path()).feed_config().unwrap_err();
        assert!(matches!(err, Error::Core(opwatch_core::Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let config = ServerConfig::new().with_fixtures("/nonexistent/opwatch/fixtures.json");
        assert!(matches!(config.registry(), Err(Error::Io(_))));
    }

    #[test]
    fn test_registry_from_fixture_file() {
        let file = write_temp(r#"{"shop": {"orders": [{"_id": 1}]}, "legacy": null}"#);
        let registry = ServerConfig::new().with_fixtures(file.path()).registry().unwrap();

        assert!(registry.get("shop").is_some());
        assert!(registry.contains("legacy"));
        assert!(registry.get("legacy").is_none());
    }

    #[test]
    fn test_registry_rejects_invalid_json() {
        let file = write_temp("{not json");
        let err = ServerConfig::new().with_fixtures(file.path()).registry().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
