//! Gazetteer engine: case-insensitive dictionary lookup with word boundaries.
//!
//! Matches are labeled with the category key, never with the canonical
//! term. The engine appends to the entities it is given and leaves overlap
//! handling to the merger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::types::{Entity, Source};

/// One dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    /// Canonical term. Used as the only surface form when none are listed.
    #[serde(alias = "lemma")]
    pub canonical_term: String,
    /// Spellings to search for.
    #[serde(default)]
    pub surface_forms: Vec<String>,
    /// Per-entry confidence override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Per-entry version override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl GazetteerEntry {
    /// Entry with explicit surface forms.
    pub fn new<I, S>(canonical_term: impl Into<String>, surface_forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            canonical_term: canonical_term.into(),
            surface_forms: surface_forms.into_iter().map(Into::into).collect(),
            confidence: None,
            version: None,
        }
    }

    /// Surface forms to search, falling back to the canonical term.
    pub fn forms(&self) -> Vec<&str> {
        if self.surface_forms.is_empty() {
            vec![self.canonical_term.as_str()]
        } else {
            self.surface_forms.iter().map(String::as_str).collect()
        }
    }
}

/// Category key to entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gazetteer {
    /// Entries per category, iterated in category order.
    pub categories: BTreeMap<String, Vec<GazetteerEntry>>,
}

impl Gazetteer {
    /// Add an entry under `category`.
    pub fn insert(&mut self, category: impl Into<String>, entry: GazetteerEntry) {
        self.categories.entry(category.into()).or_default().push(entry);
    }

    /// True when no category has entries.
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone)]
struct Form {
    category: String,
    folded: Vec<char>,
    confidence: Option<f64>,
    version: Option<String>,
}

/// Prepared dictionary ready for scanning.
#[derive(Debug, Clone, Default)]
pub struct GazetteerEngine {
    forms: Vec<Form>,
}

impl GazetteerEngine {
    /// Case-fold every surface form once.
    pub fn new(gazetteer: &Gazetteer) -> Self {
        let mut forms = Vec::new();
        for (category, entries) in &gazetteer.categories {
            for entry in entries {
                for form in entry.forms() {
                    if form.trim().is_empty() {
                        warn!(%category, term = %entry.canonical_term, "skipping blank surface form");
                        continue;
                    }
                    forms.push(Form {
                        category: category.clone(),
                        folded: form.chars().map(fold).collect(),
                        confidence: entry.confidence,
                        version: entry.version.clone(),
                    });
                }
            }
        }
        Self { forms }
    }

    /// Number of searchable surface forms.
    pub fn form_count(&self) -> usize {
        self.forms.len()
    }

    /// Return `existing` followed by every gazetteer match in `text`.
    ///
    /// When the engine is disabled `existing` is returned unchanged.
    /// Categories disabled in `config.entity_types` are skipped.
    pub fn enhance(
        &self,
        text: &str,
        existing: Vec<Entity>,
        config: &PipelineConfig,
    ) -> Vec<Entity> {
        if !config.engines.gazetteer {
            return existing;
        }

        let chars: Vec<char> = text.chars().collect();
        let folded: Vec<char> = chars.iter().copied().map(fold).collect();
        let mut entities = existing;
        let before = entities.len();

        for form in &self.forms {
            if !config.is_entity_type_enabled(&form.category) {
                continue;
            }
            let confidence = form.confidence.unwrap_or(config.confidence.gazetteer);
            let version = form
                .version
                .as_deref()
                .unwrap_or(&config.versions.gazetteer);

            for start in find_all(&folded, &form.folded) {
                let end = start.saturating_add(form.folded.len());
                if !at_word_boundary(&chars, start, end) {
                    continue;
                }
                let surface: String = chars.get(start..end).unwrap_or_default().iter().collect();
                if surface.trim().is_empty() {
                    continue;
                }
                match Entity::new(
                    surface,
                    form.category.as_str(),
                    start,
                    end,
                    Source::Gazetteer,
                    confidence,
                    version,
                ) {
                    Ok(entity) => entities.push(entity),
                    Err(e) => warn!(category = %form.category, error = %e, "dropping gazetteer match"),
                }
            }
        }

        debug!(
            matches = entities.len().saturating_sub(before),
            "gazetteer engine finished"
        );
        entities
    }
}

/// Simple one-to-one lowercase mapping, so char offsets stay aligned.
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Start index of every (possibly overlapping) occurrence of `needle`.
fn find_all(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(i, _)| i)
        .collect()
}

fn at_word_boundary(chars: &[char], start: usize, end: usize) -> bool {
    let before = start.checked_sub(1).and_then(|i| chars.get(i));
    let after = chars.get(end);
    !matches!(before, Some(c) if c.is_alphanumeric()) && !matches!(after, Some(c) if c.is_alphanumeric())
}
