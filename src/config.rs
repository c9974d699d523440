//! Configuration loading and validation.
//!
//! A [`PipelineConfig`] is resolved once per process and shared as an
//! immutable snapshot; every engine and filter reads the values it needs
//! from it as a plain parameter.
//!
//! Precedence: `NER_*` env vars > TOML file > built-in defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::Source;

/// Version tag of the extraction layer. Bump on significant rule/model changes.
pub const LAYER_VERSION: &str = "1.0.0";

/// Rank given to sources missing from the priority table (worst).
pub const UNKNOWN_SOURCE_RANK: u32 = u32::MAX;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "NER_CONFIG_PATH";

/// Canonical rewrite applied to a label by the post-filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalFormat {
    /// `d/m/yyyy` style dates to `YYYY-MM-DD`.
    Date,
    /// Italian-formatted currency amounts to `1234.56`.
    Amount,
    /// Trim and uppercase.
    Uppercase,
}

/// Configuration validation failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// An engine confidence default is outside `[0, 1]`.
    #[error("confidence for {engine} engine must be in [0, 1], got {value}")]
    InvalidConfidence {
        /// Engine name.
        engine: &'static str,
        /// Offending value.
        value: f64,
    },
    /// Model timeout is not a positive finite number of seconds.
    #[error("model timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    /// Maximum text length of zero would reject every input.
    #[error("max_text_length must be greater than zero")]
    ZeroMaxTextLength,
}

/// All runtime-tunable parameters of the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Version tag reported in `meta.layer_version`.
    pub layer_version: String,

    /// Hard cap (in characters) on accepted input text.
    pub max_text_length: usize,

    /// Entity values always discarded (case-insensitive).
    pub blacklist: Vec<String>,

    /// Per-engine enable flags.
    pub engines: EnginesConfig,

    /// Per-engine confidence defaults.
    pub confidence: ConfidenceConfig,

    /// Statistical engine guards and identity.
    pub model: ModelConfig,

    /// Version tags stamped on pattern and gazetteer entities.
    pub versions: VersionsConfig,

    /// Source name to priority rank (lower wins).
    pub source_priority: BTreeMap<String, u32>,

    /// Per-entity-type enable flags. Absent labels are enabled.
    pub entity_types: BTreeMap<String, bool>,

    /// Label to canonical format rewrite.
    pub canonical: BTreeMap<String, CanonicalFormat>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let source_priority = [("pattern", 0), ("gazetteer", 1), ("model", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();

        let entity_types = [
            "EMAIL",
            "TAX_CODE",
            "VAT_NUMBER",
            "IBAN",
            "PHONE",
            "DATE",
            "AMOUNT",
            "CASE_NUMBER",
        ]
        .into_iter()
        .map(|label| (label.to_owned(), true))
        .collect();

        let canonical = [
            ("DATE", CanonicalFormat::Date),
            ("AMOUNT", CanonicalFormat::Amount),
            ("TAX_CODE", CanonicalFormat::Uppercase),
            ("VAT_NUMBER", CanonicalFormat::Uppercase),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();

        Self {
            layer_version: LAYER_VERSION.to_owned(),
            max_text_length: 100_000,
            blacklist: Vec::new(),
            engines: EnginesConfig::default(),
            confidence: ConfidenceConfig::default(),
            model: ModelConfig::default(),
            versions: VersionsConfig::default(),
            source_priority,
            entity_types,
            canonical,
        }
    }
}

/// Engine feature flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Pattern engine enabled.
    pub pattern: bool,
    /// Gazetteer engine enabled.
    pub gazetteer: bool,
    /// Statistical engine enabled.
    pub model: bool,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            pattern: true,
            gazetteer: true,
            model: true,
        }
    }
}

/// Confidence assigned when a rule or entry carries no override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Pattern engine default.
    pub pattern: f64,
    /// Gazetteer engine default.
    pub gazetteer: f64,
    /// Statistical engine confidence (applied to every model span).
    pub model: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            pattern: 0.95,
            gazetteer: 0.85,
            model: 0.75,
        }
    }
}

/// Statistical engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier; also the version tag of model entities.
    pub name: String,
    /// Minimum normalized text length (chars) before the model is invoked.
    pub min_text_length: usize,
    /// Wall-clock budget for one model invocation.
    pub timeout_seconds: f64,
    /// Declared languages the model accepts (case-insensitive).
    pub supported_languages: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "it_core_news_lg".to_owned(),
            min_text_length: 50,
            timeout_seconds: 30.0,
            supported_languages: vec!["it".to_owned(), "en".to_owned()],
        }
    }
}

/// Version tags for rule-based engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    /// Pattern rule set version.
    pub pattern: String,
    /// Gazetteer dictionary version.
    pub gazetteer: String,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            pattern: "pattern-v1.0".to_owned(),
            gazetteer: "gazetteer-v1.0".to_owned(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration: explicit path, else `$NER_CONFIG_PATH`, else
    /// `~/.entity-extraction/config.toml` when present, else defaults.
    /// Env overrides are applied last, then the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if a named config file cannot be read or parsed, or
    /// if the resulting configuration is invalid.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// Load with a custom env resolver (avoids `set_var` in tests).
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::load`].
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = match resolve_config_path(explicit, &env) {
            Some(path) => load_config(&path)?,
            None => {
                info!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(&env);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string into config (no env overrides, no validation).
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid config TOML.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).map_err(|e| anyhow::anyhow!("failed to parse config TOML: {e}"))
    }

    /// Apply `NER_*` overrides. Invalid values are logged and ignored.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        for (key, slot) in [
            ("NER_PATTERN_CONFIDENCE", &mut self.confidence.pattern),
            ("NER_GAZETTEER_CONFIDENCE", &mut self.confidence.gazetteer),
            ("NER_MODEL_CONFIDENCE", &mut self.confidence.model),
            ("NER_TIMEOUT_SECONDS", &mut self.model.timeout_seconds),
        ] {
            if let Some(v) = env(key) {
                match v.trim().parse() {
                    Ok(n) => *slot = n,
                    Err(_) => warn!(var = key, value = %v, "ignoring invalid env override"),
                }
            }
        }

        for (key, slot) in [
            ("NER_MIN_TEXT_LENGTH", &mut self.model.min_text_length),
            ("NER_MAX_TEXT_LENGTH", &mut self.max_text_length),
        ] {
            if let Some(v) = env(key) {
                match v.trim().parse() {
                    Ok(n) => *slot = n,
                    Err(_) => warn!(var = key, value = %v, "ignoring invalid env override"),
                }
            }
        }

        for (key, slot) in [
            ("NER_ENGINE_PATTERN", &mut self.engines.pattern),
            ("NER_ENGINE_GAZETTEER", &mut self.engines.gazetteer),
            ("NER_ENGINE_MODEL", &mut self.engines.model),
        ] {
            if let Some(v) = env(key) {
                match parse_flag(&v) {
                    Some(flag) => *slot = flag,
                    None => warn!(var = key, value = %v, "ignoring invalid env override"),
                }
            }
        }

        if let Some(v) = env("NER_MODEL_NAME") {
            self.model.name = v;
        }
        if let Some(v) = env("NER_SUPPORTED_LANGUAGES") {
            self.model.supported_languages = split_list(&v);
        }
        if let Some(v) = env("NER_BLACKLIST") {
            self.blacklist = split_list(&v);
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (engine, value) in [
            ("pattern", self.confidence.pattern),
            ("gazetteer", self.confidence.gazetteer),
            ("model", self.confidence.model),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidConfidence { engine, value });
            }
        }
        let timeout = self.model.timeout_seconds;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout(timeout));
        }
        if self.max_text_length == 0 {
            return Err(ConfigError::ZeroMaxTextLength);
        }
        Ok(())
    }

    /// Whether a label is enabled. Unknown labels default to enabled.
    pub fn is_entity_type_enabled(&self, label: &str) -> bool {
        self.entity_types.get(label).copied().unwrap_or(true)
    }

    /// Whether `language` is in the supported set (case-insensitive).
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.model
            .supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Priority rank of a source; unknown sources rank worst.
    pub fn source_rank(&self, source: Source) -> u32 {
        self.source_priority
            .get(source.as_str())
            .copied()
            .unwrap_or(UNKNOWN_SOURCE_RANK)
    }

    /// Canonical rewrite configured for a label, if any.
    pub fn canonical_format(&self, label: &str) -> Option<CanonicalFormat> {
        self.canonical.get(label).copied()
    }

    /// Model invocation budget as a [`Duration`].
    pub fn model_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.model.timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs(30))
    }

    /// Engine flag snapshot reported in `meta.feature_flags`.
    pub fn feature_flags(&self) -> BTreeMap<String, bool> {
        [
            ("engine_pattern", self.engines.pattern),
            ("engine_gazetteer", self.engines.gazetteer),
            ("engine_model", self.engines.model),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }

    /// Render as TOML (for the `config` subcommand).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow::anyhow!("failed to render config: {e}"))
    }
}

/// Load a config file from TOML.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: PipelineConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    info!(path = %path.display(), "loaded config from file");
    Ok(config)
}

/// Resolve the default config directory (`~/.entity-extraction/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".entity-extraction"))
}

fn resolve_config_path(
    explicit: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(p));
    }
    let default_path = config_dir().ok()?.join("config.toml");
    default_path.exists().then_some(default_path)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
