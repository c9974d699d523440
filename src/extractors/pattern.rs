//! Pattern engine: labeled regular-expression rules.
//!
//! Rules are compiled once when the engine is built. A rule that fails to
//! compile is rejected (and reported on every run) without affecting the
//! others. Patterns compile case-insensitively.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::offset::CharIndex;
use crate::types::{Entity, Source};

/// One pattern rule as written in a lexicon file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Regular expression (Rust `regex` syntax).
    #[serde(alias = "regex_pattern")]
    pub pattern: String,
    /// Result label. Defaults to the lexicon key the rule is listed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Capture group whose span becomes the entity. `0` is the whole match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
    /// Per-rule confidence override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Per-rule version override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PatternRule {
    /// Rule matching the whole pattern with engine defaults.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            label: None,
            group: None,
            confidence: None,
            version: None,
        }
    }

    /// Report matches under `label` instead of the lexicon key.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Report only the given capture group.
    #[must_use]
    pub fn with_group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }

    /// Override the engine default confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Mapping of result label to its rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternLexicon {
    /// Rules per label, iterated in label order.
    pub rules: BTreeMap<String, Vec<PatternRule>>,
}

impl PatternLexicon {
    /// Add a rule under `label`.
    pub fn insert(&mut self, label: impl Into<String>, rule: PatternRule) {
        self.rules.entry(label.into()).or_default().push(rule);
    }

    /// Total number of rules across all labels.
    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Built-in rules for Italian business correspondence.
    pub fn builtin() -> Self {
        let mut lexicon = Self::default();
        lexicon.insert(
            "EMAIL",
            PatternRule::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b"),
        );
        // Codice fiscale.
        lexicon.insert(
            "TAX_CODE",
            PatternRule::new(r"\b[A-Z]{6}\d{2}[A-Z]\d{2}[A-Z]\d{3}[A-Z]\b"),
        );
        // Partita IVA, either IT-prefixed or anchored by a keyword.
        lexicon.insert("VAT_NUMBER", PatternRule::new(r"\bIT\s?\d{11}\b"));
        lexicon.insert(
            "VAT_NUMBER",
            PatternRule::new(r"(?:P\.?\s?IVA|partita\s+iva)[\s:]*(\d{11})\b").with_group(1),
        );
        // Uppercase only, otherwise "ab12 word" style text matches. At least
        // three full groups, so "IT" + 11 digit VAT numbers stay out.
        lexicon.insert(
            "IBAN",
            PatternRule::new(r"(?-i)\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){3,7}(?:\s?[A-Z0-9]{1,3})?\b"),
        );
        lexicon.insert(
            "PHONE",
            PatternRule::new(r"\+39[\s.\-]?\d{2,4}[\s.\-]?\d{3,4}(?:[\s.\-]?\d{3,4})?\b"),
        );
        lexicon.insert("PHONE", PatternRule::new(r"\b0\d{1,3}[\s.\-]?\d{6,8}\b"));
        lexicon.insert(
            "PHONE",
            PatternRule::new(r"\b3\d{2}[\s.\-]?\d{3}[\s.\-]?\d{4}\b"),
        );
        lexicon.insert(
            "DATE",
            PatternRule::new(
                r"\b(?:0?[1-9]|[12]\d|3[01])[/\-.](?:0?[1-9]|1[0-2])[/\-.](?:\d{4}|\d{2})\b",
            ),
        );
        lexicon.insert(
            "AMOUNT",
            PatternRule::new(
                r"€\s?(?:\d{1,3}(?:\.\d{3})+|\d+)(?:,\d{1,2})?|\b(?:\d{1,3}(?:\.\d{3})+|\d+)(?:,\d{1,2})?\s?€",
            ),
        );
        // Practice / case references.
        lexicon.insert(
            "CASE_NUMBER",
            PatternRule::new(r"\b(?:PRAT|PRT|PRATICA|RIFER|REF)[\s/\-.]?\d{4,10}\b"),
        );
        lexicon.insert("CASE_NUMBER", PatternRule::new(r"\bNr?\.?\s*\d{6,10}\b"));
        lexicon
    }
}

/// A rule that could not be compiled.
#[derive(Debug, thiserror::Error)]
pub enum PatternRuleError {
    /// Regular expression failed to parse.
    #[error("invalid pattern for {label} rule #{index}: {source}")]
    InvalidRegex {
        /// Rule label.
        label: String,
        /// Position of the rule within its label.
        index: usize,
        /// Parser error.
        source: regex::Error,
    },
    /// Capture group does not exist in the pattern.
    #[error("{label} rule #{index} names group {group} but the pattern has {available}")]
    MissingGroup {
        /// Rule label.
        label: String,
        /// Position of the rule within its label.
        index: usize,
        /// Requested group.
        group: usize,
        /// Number of groups (including group 0).
        available: usize,
    },
    /// Confidence override outside `[0, 1]`.
    #[error("{label} rule #{index} has confidence {value} outside [0, 1]")]
    InvalidConfidence {
        /// Rule label.
        label: String,
        /// Position of the rule within its label.
        index: usize,
        /// Offending value.
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct CompiledRule {
    key: String,
    label: String,
    regex: Regex,
    group: usize,
    confidence: Option<f64>,
    version: Option<String>,
}

/// Compiled pattern rule set.
#[derive(Debug, Default)]
pub struct PatternEngine {
    rules: Vec<CompiledRule>,
    rejected: Vec<PatternRuleError>,
}

impl PatternEngine {
    /// Compile every rule of `lexicon`, collecting the ones that fail.
    pub fn compile(lexicon: &PatternLexicon) -> Self {
        let mut engine = Self::default();
        for (label, rules) in &lexicon.rules {
            for (index, rule) in rules.iter().enumerate() {
                match compile_rule(label, index, rule) {
                    Ok(compiled) => engine.rules.push(compiled),
                    Err(e) => {
                        warn!(error = %e, "rejected pattern rule");
                        engine.rejected.push(e);
                    }
                }
            }
        }
        debug!(
            compiled = engine.rules.len(),
            rejected = engine.rejected.len(),
            "pattern rules compiled"
        );
        engine
    }

    /// Rules rejected at compile time.
    pub fn rejected(&self) -> &[PatternRuleError] {
        &self.rejected
    }

    /// Number of usable rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Every match of every enabled rule, as `source=pattern` candidates.
    ///
    /// A rule is not matched at all when its lexicon key or its result
    /// label is disabled in `config.entity_types`.
    /// Overlapping matches from different rules are all returned.
    pub fn extract(&self, text: &str, config: &PipelineConfig) -> Vec<Entity> {
        let index = CharIndex::new(text);
        let mut entities = Vec::new();

        for rule in &self.rules {
            if !config.is_entity_type_enabled(&rule.key)
                || !config.is_entity_type_enabled(&rule.label)
            {
                continue;
            }
            let confidence = rule.confidence.unwrap_or(config.confidence.pattern);
            let version = rule
                .version
                .as_deref()
                .unwrap_or(&config.versions.pattern);

            for caps in rule.regex.captures_iter(text) {
                let Some(m) = caps.get(rule.group) else {
                    continue;
                };
                if m.as_str().trim().is_empty() {
                    continue;
                }
                let (start, end) = index.char_span(m.start(), m.end());
                match Entity::new(
                    m.as_str(),
                    rule.label.as_str(),
                    start,
                    end,
                    Source::Pattern,
                    confidence,
                    version,
                ) {
                    Ok(entity) => entities.push(entity),
                    Err(e) => warn!(label = %rule.label, error = %e, "dropping pattern match"),
                }
            }
        }

        debug!(candidates = entities.len(), "pattern engine finished");
        entities
    }
}

fn compile_rule(
    label: &str,
    index: usize,
    rule: &PatternRule,
) -> Result<CompiledRule, PatternRuleError> {
    let regex = RegexBuilder::new(&rule.pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternRuleError::InvalidRegex {
            label: label.to_owned(),
            index,
            source,
        })?;

    let group = rule.group.unwrap_or(0);
    let available = regex.captures_len();
    if group >= available {
        return Err(PatternRuleError::MissingGroup {
            label: label.to_owned(),
            index,
            group,
            available,
        });
    }

    if let Some(value) = rule.confidence {
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternRuleError::InvalidConfidence {
                label: label.to_owned(),
                index,
                value,
            });
        }
    }

    Ok(CompiledRule {
        key: label.to_owned(),
        label: rule.label.clone().unwrap_or_else(|| label.to_owned()),
        regex,
        group,
        confidence: rule.confidence,
        version: rule.version.clone(),
    })
}
