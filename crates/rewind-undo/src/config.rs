#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! [`UndoConfig`] collects the tunables of a [`Context`](crate::Context).
//! With the `config` feature it can be loaded from TOML or JSON:
//!
//! ```toml
//! # rewind.toml
//! live_observe = true
//! max_history = 500
//!
//! [combine]
//! max_chars = 40
//! leading_kinds = ["typing", "enter"]
//! trailing_kinds = ["typing"]
//! ```
//!
//! ```rust,ignore
//! let config = UndoConfig::from_toml_file("rewind.toml")?.validated()?;
//! ```
//!
//! Missing keys take their [`Default`] values.

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::change::CombineConfig;

/// Configuration of one undo context.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct UndoConfig {
    /// Diff mutation records (`true`) or whole-root snapshots (`false`).
    pub live_observe: bool,
    /// Change sets kept in history; the oldest are evicted first.
    pub max_history: usize,
    /// When consecutive change sets merge.
    pub combine: CombineConfig,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            live_observe: true,
            max_history: 1000,
            combine: CombineConfig::default(),
        }
    }
}

impl UndoConfig {
    /// No eviction (for testing).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_history: usize::MAX,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_live_observe(mut self, live_observe: bool) -> Self {
        self.live_observe = live_observe;
        self
    }

    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    #[must_use]
    pub fn with_max_combine_chars(mut self, max_chars: usize) -> Self {
        self.combine.max_chars = max_chars;
        self
    }

    #[must_use]
    pub fn with_combine(mut self, combine: CombineConfig) -> Self {
        self.combine = combine;
        self
    }

    /// Load from a TOML string.
    #[cfg(feature = "config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Problems with the current values. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_history == 0 {
            errors.push("max_history must be > 0".into());
        }
        if self.combine.max_chars > 0 && self.combine.trailing_kinds.is_empty() {
            errors.push("combine.trailing_kinds is empty but combine.max_chars > 0".into());
        }
        if self
            .combine
            .leading_kinds
            .iter()
            .chain(&self.combine.trailing_kinds)
            .any(String::is_empty)
        {
            errors.push("combine kinds must not be empty strings".into());
        }
        errors
    }

    /// `self` if [`validate`](Self::validate) finds nothing.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when loading a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config")]
    Toml(toml::de::Error),
    /// JSON parse error.
    #[cfg(feature = "config")]
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            #[cfg(feature = "config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
