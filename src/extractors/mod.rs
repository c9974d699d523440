//! Extraction engines.
//!
//! Each engine is a pure function of the normalized text, the read-only
//! configuration snapshot and its lexicon:
//! - [`pattern`]: labeled regular-expression rules
//! - [`gazetteer`]: category dictionaries of surface forms
//! - [`model`]: guarded adapter around an external statistical recognizer
//!
//! Engines never resolve overlaps; that is the merger's job.

pub mod gazetteer;
pub mod model;
pub mod pattern;

use std::fmt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Failures while loading a lexicon file.
#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    /// File could not be read.
    #[error("failed to read lexicon {path}: {source}")]
    Io {
        /// Lexicon path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// JSON lexicon is malformed.
    #[error("failed to parse JSON lexicon {path}: {source}")]
    Json {
        /// Lexicon path.
        path: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// TOML lexicon is malformed.
    #[error("failed to parse TOML lexicon {path}: {source}")]
    Toml {
        /// Lexicon path.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}

/// Load a lexicon from a `.toml` file, or from JSON for any other extension.
///
/// # Errors
///
/// Returns [`LexiconError`] if the file cannot be read or parsed.
pub fn load_lexicon<T: DeserializeOwned>(path: &Path) -> Result<T, LexiconError> {
    let display = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
        path: display.clone(),
        source,
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(&contents).map_err(|source| LexiconError::Toml {
            path: display,
            source,
        })
    } else {
        serde_json::from_str(&contents).map_err(|source| LexiconError::Json {
            path: display,
            source,
        })
    }
}

/// Normalized reason class of a skipped step, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// Engine disabled in configuration.
    FeatureFlagDisabled,
    /// Declared language not supported by the engine.
    UnsupportedLanguage,
    /// Normalized text below the engine's minimum length.
    TextTooShort,
    /// External model could not be loaded.
    ModelNotInstalled,
    /// External model raised during invocation.
    ModelError,
    /// External model exceeded its wall-clock budget.
    Timeout,
    /// Anything else (for example a rejected pattern rule).
    Other,
}

impl SkipKind {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeatureFlagDisabled => "feature_flag_disabled",
            Self::UnsupportedLanguage => "unsupported_language",
            Self::TextTooShort => "text_too_short",
            Self::ModelNotInstalled => "model_not_installed",
            Self::ModelError => "model_error",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

/// A non-fatal explanation for why a step produced no candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipNotice {
    /// Reason class.
    pub kind: SkipKind,
    /// Human-readable reason.
    pub reason: String,
}

impl SkipNotice {
    /// Build a notice.
    pub fn new(kind: SkipKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SkipNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}
