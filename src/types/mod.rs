//! Core value types shared by every extraction engine and pipeline stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Engine that produced a candidate entity.
///
/// Sources carry no intrinsic ordering. Conflict resolution ranks them only
/// through the configured priority table, looked up by [`Source::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Labeled pattern rules.
    Pattern,
    /// Dictionary of category surface forms.
    Gazetteer,
    /// External statistical recognizer.
    Model,
}

impl Source {
    /// Stable lowercase name used in output and priority tables.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Gazetteer => "gazetteer",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when an entity would violate its invariants.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EntityError {
    /// Span is empty or reversed.
    #[error("invalid span [{start}, {end}): start must be < end")]
    InvalidSpan {
        /// Start offset.
        start: usize,
        /// End offset.
        end: usize,
    },
    /// Confidence is NaN or outside `[0.0, 1.0]`.
    #[error("confidence {0} outside [0.0, 1.0]")]
    InvalidConfidence(f64),
    /// Source name is not a known engine.
    #[error("unknown entity source '{0}'")]
    UnknownSource(String),
}

/// One extracted span with full provenance.
///
/// Entities are value objects: fields are private and there are no setters.
/// Canonicalization builds a new entity via [`Entity::with_text`].
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    text: String,
    label: String,
    start: usize,
    end: usize,
    source: Source,
    confidence: f64,
    version: String,
}

impl Entity {
    /// Build an entity, checking the span and confidence invariants.
    ///
    /// Offsets are half-open character offsets into the normalized text.
    /// Empty or whitespace text is allowed here; engines and filters drop it
    /// (see [`Entity::is_valid`]).
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] if `start >= end` or `confidence` is not a
    /// finite value in `[0.0, 1.0]`.
    pub fn new(
        text: impl Into<String>,
        label: impl Into<String>,
        start: usize,
        end: usize,
        source: Source,
        confidence: f64,
        version: impl Into<String>,
    ) -> Result<Self, EntityError> {
        if start >= end {
            return Err(EntityError::InvalidSpan { start, end });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EntityError::InvalidConfidence(confidence));
        }
        Ok(Self {
            text: text.into(),
            label: label.into(),
            start,
            end,
            source,
            confidence,
            version: version.into(),
        })
    }

    /// Surface form as it appears in the normalized text (or its canonical rewrite).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Entity type tag. Open vocabulary.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Inclusive start character offset.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive end character offset.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Engine that produced this entity.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Confidence in `[0.0, 1.0]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Rule set, dictionary or model version that produced this entity.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// True when the text is non-empty after trimming.
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// True when the two half-open spans intersect.
    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Number of characters covered by the span.
    pub fn span_length(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// A new entity with identical span and provenance but different text.
    pub fn with_text(&self, text: impl Into<String>) -> Entity {
        Entity {
            text: text.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:'{}' [{},{}) src={} conf={:.2}",
            self.label, self.text, self.start, self.end, self.source, self.confidence
        )
    }
}

/// Half-open span as serialized in the output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

/// Serialized entity shape: `{type, value, span, confidence, source, version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity label.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Surface or canonical value.
    pub value: String,
    /// Character span.
    pub span: SpanRecord,
    /// Confidence rounded to four decimals.
    pub confidence: f64,
    /// Producing engine name.
    pub source: String,
    /// Producing rule/dictionary/model version.
    #[serde(default)]
    pub version: String,
}

impl From<&Entity> for EntityRecord {
    fn from(entity: &Entity) -> Self {
        Self {
            entity_type: entity.label.clone(),
            value: entity.text.clone(),
            span: SpanRecord {
                start: entity.start,
                end: entity.end,
            },
            confidence: (entity.confidence * 10_000.0).round() / 10_000.0,
            source: entity.source.as_str().to_owned(),
            version: entity.version.clone(),
        }
    }
}

impl TryFrom<EntityRecord> for Entity {
    type Error = EntityError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        let source = match record.source.as_str() {
            "pattern" => Source::Pattern,
            "gazetteer" => Source::Gazetteer,
            "model" => Source::Model,
            other => return Err(EntityError::UnknownSource(other.to_owned())),
        };
        Entity::new(
            record.value,
            record.entity_type,
            record.span.start,
            record.span.end,
            source,
            record.confidence,
            record.version,
        )
    }
}
