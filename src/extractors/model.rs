//! Statistical engine adapter.
//!
//! The recognizer itself lives behind [`NerModel`]; this module only decides
//! whether to call it and how to read its answer. Guards run in a fixed order
//! (feature flag, language, text length, availability) and each failure
//! becomes a [`SkipNotice`] instead of an error.
//!
//! Invocation happens on the blocking pool under `tokio::time::timeout`.
//! A timed-out call is abandoned, not cancelled: the blocking thread runs to
//! completion in the background.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use super::{SkipKind, SkipNotice};
use crate::config::PipelineConfig;
use crate::types::{Entity, Source};

/// One span reported by a recognizer, in character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpan {
    /// Surface text.
    pub text: String,
    /// Entity label assigned by the model.
    pub label: String,
    /// Inclusive start character offset.
    pub start: usize,
    /// Exclusive end character offset.
    pub end: usize,
}

/// Failures raised by a recognizer.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Inference failed.
    #[error("inference failed: {0}")]
    Inference(String),
    /// The model rejected the input.
    #[error("input rejected: {0}")]
    InvalidInput(String),
}

/// A loaded recognizer.
pub trait NerModel: Send + Sync {
    /// Recognize entities in `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if inference fails.
    fn extract(&self, text: &str) -> Result<Vec<ModelSpan>, ModelError>;
}

/// Something that may be able to produce a recognizer.
pub trait NerCapability: Send + Sync {
    /// Try to load `model_id`. `None` means not installed.
    fn attempt_load(&self, model_id: &str) -> Option<Arc<dyn NerModel>>;
}

/// Capability with no recognizer installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl NerCapability for Unavailable {
    fn attempt_load(&self, _model_id: &str) -> Option<Arc<dyn NerModel>> {
        None
    }
}

type Handle = Option<Arc<dyn NerModel>>;

/// Cache of load attempts keyed by model id.
///
/// Failed loads are cached too, so a missing model costs one lookup per
/// process. Loading happens under the lock so concurrent first loads of the
/// same model do not race.
pub struct ModelRegistry {
    capability: Arc<dyn NerCapability>,
    cache: Mutex<HashMap<String, Handle>>,
}

impl ModelRegistry {
    /// Registry backed by `capability`.
    pub fn new(capability: Arc<dyn NerCapability>) -> Self {
        Self {
            capability,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with no recognizer available.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(Unavailable))
    }

    /// Cached handle for `model_id`, loading it on first use.
    pub fn get_or_load(&self, model_id: &str) -> Handle {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = cache.get(model_id) {
            return handle.clone();
        }
        let handle = self.capability.attempt_load(model_id);
        if handle.is_none() {
            warn!(model = model_id, "NER model not installed");
        } else {
            debug!(model = model_id, "NER model loaded");
        }
        cache.insert(model_id.to_owned(), handle.clone());
        handle
    }

    /// Forget every cached load attempt.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached load attempts (successful or not).
    pub fn cached_count(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("cached", &self.cached_count())
            .finish_non_exhaustive()
    }
}

/// Result of one adapter call: candidates, or the reason there are none.
#[derive(Debug, Default)]
pub struct ModelOutcome {
    /// `source=model` candidates.
    pub entities: Vec<Entity>,
    /// Why the model was not run or produced nothing usable.
    pub skip: Option<SkipNotice>,
}

impl ModelOutcome {
    fn skipped(notice: SkipNotice) -> Self {
        debug!(kind = notice.kind.as_str(), reason = %notice.reason, "NER skipped");
        Self {
            entities: Vec::new(),
            skip: Some(notice),
        }
    }
}

/// Guarded entry point to the statistical engine.
#[derive(Debug, Clone)]
pub struct ModelAdapter {
    registry: Arc<ModelRegistry>,
}

impl ModelAdapter {
    /// Adapter over a shared registry.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this adapter loads through.
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Evaluate the flag, language and length guards.
    ///
    /// A missing language is not a failure.
    pub fn check_guards(
        text: &str,
        language: Option<&str>,
        config: &PipelineConfig,
    ) -> Option<SkipNotice> {
        if !config.engines.model {
            return Some(SkipNotice::new(
                SkipKind::FeatureFlagDisabled,
                "engine disabled via feature flag",
            ));
        }
        if let Some(lang) = language {
            if !config.is_language_supported(lang) {
                return Some(SkipNotice::new(
                    SkipKind::UnsupportedLanguage,
                    format!(
                        "language '{lang}' not in supported languages [{}]",
                        config.model.supported_languages.join(", ")
                    ),
                ));
            }
        }
        let length = text.chars().count();
        if length < config.model.min_text_length {
            return Some(SkipNotice::new(
                SkipKind::TextTooShort,
                format!(
                    "text length {length} < min_text_length={}",
                    config.model.min_text_length
                ),
            ));
        }
        None
    }

    /// Run the recognizer on `text` if every guard passes.
    ///
    /// Never fails: load failures, model errors, panics and timeouts all
    /// come back as a skip notice with no entities.
    pub async fn extract(
        &self,
        text: &str,
        language: Option<&str>,
        config: &PipelineConfig,
    ) -> ModelOutcome {
        if let Some(notice) = Self::check_guards(text, language, config) {
            return ModelOutcome::skipped(notice);
        }

        let registry = Arc::clone(&self.registry);
        let model_id = config.model.name.clone();
        let owned_text = text.to_owned();
        let task = tokio::task::spawn_blocking(move || {
            registry
                .get_or_load(&model_id)
                .map(|model| model.extract(&owned_text))
        });

        let budget = config.model_timeout();
        let spans = match tokio::time::timeout(budget, task).await {
            Err(_) => {
                return ModelOutcome::skipped(SkipNotice::new(
                    SkipKind::Timeout,
                    format!("NER model timed out after {:.1}s", budget.as_secs_f64()),
                ));
            }
            Ok(Err(join_err)) => {
                return ModelOutcome::skipped(SkipNotice::new(
                    SkipKind::ModelError,
                    format!("NER model error: {join_err}"),
                ));
            }
            Ok(Ok(None)) => {
                return ModelOutcome::skipped(SkipNotice::new(
                    SkipKind::ModelNotInstalled,
                    format!("model '{}' not installed", config.model.name),
                ));
            }
            Ok(Ok(Some(Err(e)))) => {
                return ModelOutcome::skipped(SkipNotice::new(
                    SkipKind::ModelError,
                    format!("NER model error: {e}"),
                ));
            }
            Ok(Ok(Some(Ok(spans)))) => spans,
        };

        let text_len = text.chars().count();
        let entities: Vec<Entity> = spans
            .into_iter()
            .filter(|span| !span.text.trim().is_empty())
            .filter_map(|span| {
                if span.end > text_len {
                    warn!(start = span.start, end = span.end, text_len, "model span out of range");
                    return None;
                }
                Entity::new(
                    span.text,
                    span.label,
                    span.start,
                    span.end,
                    Source::Model,
                    config.confidence.model,
                    config.model.name.as_str(),
                )
                .map_err(|e| warn!(error = %e, "dropping model span"))
                .ok()
            })
            .collect();

        debug!(candidates = entities.len(), "model engine finished");
        ModelOutcome {
            entities,
            skip: None,
        }
    }
}
