/// Configuration for recorders and the manager.
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Maximum number of entries kept on one scope's undo stack.
/// Oldest entries are evicted when this limit is exceeded.
const DEFAULT_MAX_UNDO_DEPTH: usize = 10_000;

/// What to do with a change whose anchoring frontier the store can no
/// longer resolve during a historical undo or redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Move the change to the opposite stack unchanged so it can be retried.
    #[default]
    Retain,
    /// Drop the change from history.
    Discard,
}

/// Configuration for the history system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Max entries per scope undo stack (0 = unbounded).
    pub max_undo_depth: usize,
    /// Policy for changes whose frontier cannot be resolved.
    pub unresolved_policy: UnresolvedPolicy,
    /// After a historical amendment, rebuild the opposite direction's
    /// patches from a diff of the new state instead of keeping the
    /// originally recorded ones.
    pub recompute_patches_on_amend: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            unresolved_policy: UnresolvedPolicy::default(),
            recompute_patches_on_amend: false,
        }
    }
}

impl HistoryConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads config from `path`.
    /// Returns defaults on any error (missing file, parse error, etc.).
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse history config at {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read history config at {}: {e}", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HistoryConfig::default();
        assert_eq!(config.max_undo_depth, 10_000);
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::Retain);
        assert!(!config.recompute_patches_on_amend);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HistoryConfig::from_json(r#"{"unresolved_policy": "discard"}"#).unwrap();
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::Discard);
        assert_eq!(config.max_undo_depth, 10_000);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(HistoryConfig::from_json("{ not json").is_err());
        assert!(HistoryConfig::from_json(r#"{"unresolved_policy": "explode"}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"{"max_undo_depth": 5, "recompute_patches_on_amend": true}"#)
            .unwrap();
        let config = HistoryConfig::load_or_default(&path);
        assert_eq!(config.max_undo_depth, 5);
        assert!(config.recompute_patches_on_amend);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HistoryConfig::load_or_default(&dir.path().join("absent.json"));
        assert_eq!(config, HistoryConfig::default());
    }

    #[test]
    fn test_load_broken_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert_eq!(HistoryConfig::load_or_default(&path), HistoryConfig::default());
    }
}
