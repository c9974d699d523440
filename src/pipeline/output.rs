//! Output envelope: `{entities, meta, errors}`.
//!
//! The envelope is created before any work starts, so a valid (possibly
//! failed) envelope exists at every point of a run. Serialization never
//! fails: on error a minimal failed envelope is emitted instead.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::config::PipelineConfig;
use crate::types::{Entity, EntityRecord};

/// Component name used for failures of the run as a whole.
pub const PIPELINE_COMPONENT: &str = "pipeline";

/// Component name used when the envelope itself cannot be serialized.
pub const SERIALIZER_COMPONENT: &str = "serializer";

/// Run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Extraction completed (possibly with fallbacks).
    Ok,
    /// Extraction did not take place.
    Failed,
}

impl RunStatus {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

/// A non-fatal or fatal error attributed to one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Component that reported the error.
    pub component: String,
    /// What happened.
    pub message: String,
}

/// Run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMeta {
    /// Conversation identifier, or `UNKNOWN`.
    pub id_conversazione: String,
    /// Message identifier, or `UNKNOWN`.
    pub id_messaggio: String,
    /// Run outcome.
    pub status: RunStatus,
    /// Version tag of the extraction layer.
    pub layer_version: String,
    /// Total wall-clock time of the run.
    pub processing_time_ms: f64,
    /// Wall-clock time per step.
    pub component_timings_ms: BTreeMap<String, f64>,
    /// Engine flag snapshot.
    pub feature_flags: BTreeMap<String, bool>,
    /// Skip and fallback notices.
    pub fallbacks: Vec<String>,
    /// Always equal to `entities.len()`.
    pub entity_count: usize,
}

/// The full output envelope of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Final entities.
    pub entities: Vec<EntityRecord>,
    /// Run metadata.
    pub meta: OutputMeta,
    /// Error records.
    pub errors: Vec<ErrorRecord>,
}

impl ExtractionOutput {
    /// Empty `ok` envelope for the given message.
    pub fn new(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            entities: Vec::new(),
            meta: OutputMeta {
                id_conversazione: conversation_id.into(),
                id_messaggio: message_id.into(),
                status: RunStatus::Ok,
                layer_version: config.layer_version.clone(),
                processing_time_ms: 0.0,
                component_timings_ms: BTreeMap::new(),
                feature_flags: config.feature_flags(),
                fallbacks: Vec::new(),
                entity_count: 0,
            },
            errors: Vec::new(),
        }
    }

    /// Replace the entity list, keeping `entity_count` in sync.
    pub fn set_entities(&mut self, entities: &[Entity]) {
        self.entities = entities.iter().map(EntityRecord::from).collect();
        self.meta.entity_count = self.entities.len();
    }

    /// Record a skip/fallback notice.
    pub fn add_fallback(&mut self, notice: impl Into<String>) {
        self.meta.fallbacks.push(notice.into());
    }

    /// Record an error attributed to `component`.
    pub fn add_error(&mut self, component: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ErrorRecord {
            component: component.into(),
            message: message.into(),
        });
    }

    /// Mark the run failed: no entities, one `pipeline` error record.
    pub fn set_failed(&mut self, message: impl Into<String>) {
        self.meta.status = RunStatus::Failed;
        self.entities.clear();
        self.meta.entity_count = 0;
        self.add_error(PIPELINE_COMPONENT, message);
    }

    /// Record the duration of one step.
    pub fn record_timing(&mut self, step: &str, elapsed: Duration) {
        self.meta
            .component_timings_ms
            .insert(step.to_owned(), millis(elapsed));
    }

    /// Record the total run duration.
    pub fn set_processing_time(&mut self, elapsed: Duration) {
        self.meta.processing_time_ms = millis(elapsed);
    }

    /// True when the run completed.
    pub fn is_ok(&self) -> bool {
        self.meta.status == RunStatus::Ok
    }

    /// Envelope as a JSON value; falls back to a minimal failed envelope.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| self.fallback(&e))
    }

    /// Envelope as JSON text; falls back to a minimal failed envelope.
    pub fn to_json(&self, pretty: bool) -> String {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        rendered.unwrap_or_else(|e| self.fallback(&e).to_string())
    }

    fn fallback(&self, err: &serde_json::Error) -> Value {
        error!(error = %err, "envelope serialization failed");
        fallback_envelope(
            &self.meta.id_conversazione,
            &self.meta.id_messaggio,
            &self.meta.layer_version,
            &format!("serialization failed: {err}"),
        )
    }
}

/// Minimal failed envelope built from plain strings only.
pub fn fallback_envelope(
    conversation_id: &str,
    message_id: &str,
    layer_version: &str,
    message: &str,
) -> Value {
    json!({
        "entities": [],
        "meta": {
            "id_conversazione": conversation_id,
            "id_messaggio": message_id,
            "status": RunStatus::Failed.as_str(),
            "layer_version": layer_version,
            "processing_time_ms": 0.0,
            "component_timings_ms": {},
            "feature_flags": {},
            "fallbacks": [],
            "entity_count": 0
        },
        "errors": [{"component": SERIALIZER_COMPONENT, "message": message}]
    })
}

fn millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1_000_000.0).round() / 1000.0
}
