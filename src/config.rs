//! Engine configuration.
//!
//! [`EngineConfig`] is read from TOML. Every field has a default, so an empty file (or no
//! file at all) is a valid configuration:
//!
//! ```toml
//! # where Context::save / Context::load keep profiles and device groups
//! context_path = "context.json"
//! # deadline for releasing a profile's subscriptions; 0 unsubscribes inline
//! unsubscribe_timeout_ms = 250
//! ```

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Upper bound for `unsubscribe_timeout_ms` (one minute).
pub const MAX_UNSUBSCRIBE_TIMEOUT_MS: u64 = 60_000;

fn default_context_path() -> PathBuf {
    PathBuf::from("context.json")
}

fn default_unsubscribe_timeout_ms() -> u64 {
    250
}

/// Runtime settings for a [`Context`](crate::context::Context).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Location of the persisted context document.
    #[serde(default = "default_context_path")]
    pub context_path: PathBuf,
    /// Deadline for best-effort unsubscription during deactivation.
    #[serde(default = "default_unsubscribe_timeout_ms")]
    pub unsubscribe_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_path: default_context_path(),
            unsubscribe_timeout_ms: default_unsubscribe_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Same as [`Default`] but storing the context at `path`.
    pub fn with_context_path(path: impl Into<PathBuf>) -> Self {
        Self {
            context_path: path.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: EngineConfig =
            toml::from_str(s).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or return defaults if it does not exist.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no engine config; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.context_path.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig("context_path is empty".into()));
        }
        if self.unsubscribe_timeout_ms > MAX_UNSUBSCRIBE_TIMEOUT_MS {
            return Err(EngineError::InvalidConfig(format!(
                "unsubscribe_timeout_ms must be at most {MAX_UNSUBSCRIBE_TIMEOUT_MS}, got {}",
                self.unsubscribe_timeout_ms
            )));
        }
        Ok(())
    }

    /// The unsubscribe deadline, or `None` to unsubscribe inline.
    pub fn unsubscribe_timeout(&self) -> Option<Duration> {
        match self.unsubscribe_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.unsubscribe_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_timeout_means_inline() {
        let config = EngineConfig::from_toml_str("unsubscribe_timeout_ms = 0").unwrap();
        assert_eq!(config.unsubscribe_timeout(), None);
    }

    #[test]
    fn rejects_out_of_range_and_unknown_keys() {
        let err = EngineConfig::from_toml_str("unsubscribe_timeout_ms = 600000").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));

        let err = EngineConfig::from_toml_str("timeout = 3").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));

        let err = EngineConfig::from_toml_str("context_path = \"\"").unwrap_err();
        assert!(err.to_string().contains("context_path"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("engine.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "context_path = \"profiles/ctx.json\"\nunsubscribe_timeout_ms = 10\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.context_path, PathBuf::from("profiles/ctx.json"));
        assert_eq!(config.unsubscribe_timeout(), Some(Duration::from_millis(10)));
    }
}
