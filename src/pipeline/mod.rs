//! Pipeline controller.
//!
//! A run goes validation → normalization → engines → merge → post-filters
//! → envelope. Engines degrade to fallback notices; validation failures and
//! anything unexpected (including panics) become a `failed` envelope. The
//! caller always gets an [`ExtractionOutput`].
//!
//! The pattern and model engines run concurrently; the gazetteer runs after
//! the model because it overlays the model's entities.

pub mod filters;
pub mod input;
pub mod merge;
pub mod normalize;
pub mod output;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::extractors::gazetteer::{Gazetteer, GazetteerEngine};
use crate::extractors::model::{ModelAdapter, ModelRegistry, NerCapability};
use crate::extractors::pattern::{PatternEngine, PatternLexicon};
use crate::extractors::{load_lexicon, LexiconError, SkipKind, SkipNotice};
use crate::types::Entity;

use self::output::ExtractionOutput;

/// Component name for validator errors and warnings.
pub const VALIDATOR_COMPONENT: &str = "input_validator";

/// Errors raised while assembling a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration snapshot is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A lexicon file could not be loaded.
    #[error(transparent)]
    Lexicon(#[from] LexiconError),
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    patterns: PatternLexicon,
    gazetteer: Gazetteer,
    registry: Option<Arc<ModelRegistry>>,
}

impl PipelineBuilder {
    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in pattern rules.
    #[must_use]
    pub fn patterns(mut self, patterns: PatternLexicon) -> Self {
        self.patterns = patterns;
        self
    }

    /// Use `gazetteer` (empty by default).
    #[must_use]
    pub fn gazetteer(mut self, gazetteer: Gazetteer) -> Self {
        self.gazetteer = gazetteer;
        self
    }

    /// Load pattern rules from a JSON or TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Lexicon`] if the file cannot be loaded.
    pub fn patterns_file(self, path: &Path) -> Result<Self, PipelineError> {
        Ok(self.patterns(load_lexicon(path)?))
    }

    /// Load the gazetteer from a JSON or TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Lexicon`] if the file cannot be loaded.
    pub fn gazetteer_file(self, path: &Path) -> Result<Self, PipelineError> {
        Ok(self.gazetteer(load_lexicon(path)?))
    }

    /// Load statistical models through `capability`.
    #[must_use]
    pub fn model_capability(mut self, capability: Arc<dyn NerCapability>) -> Self {
        self.registry = Some(Arc::new(ModelRegistry::new(capability)));
        self
    }

    /// Share an existing model registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the configuration and compile the lexicons.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let patterns = PatternEngine::compile(&self.patterns);
        let gazetteer = GazetteerEngine::new(&self.gazetteer);
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ModelRegistry::unavailable()));
        info!(
            pattern_rules = patterns.rule_count(),
            rejected_rules = patterns.rejected().len(),
            gazetteer_forms = gazetteer.form_count(),
            model = %self.config.model.name,
            "pipeline ready"
        );
        Ok(Pipeline {
            config: Arc::new(self.config),
            patterns: Arc::new(patterns),
            gazetteer: Arc::new(gazetteer),
            model: ModelAdapter::new(registry),
        })
    }
}

/// Candidates from all engines plus what went wrong along the way.
struct EngineRun {
    candidates: Vec<Entity>,
    fallbacks: Vec<String>,
    timings: Vec<(&'static str, Duration)>,
}

/// The extraction pipeline. Cheap to clone; clones share lexicons and the
/// model registry.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    patterns: Arc<PatternEngine>,
    gazetteer: Arc<GazetteerEngine>,
    model: ModelAdapter,
}

impl Pipeline {
    /// Start building a pipeline with default config and built-in rules.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder {
            config: PipelineConfig::default(),
            patterns: PatternLexicon::builtin(),
            gazetteer: Gazetteer::default(),
            registry: None,
        }
    }

    /// The configuration snapshot used by every run.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The model registry shared by clones of this pipeline.
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.model.registry()
    }

    /// Same lexicons and registry, different configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `config` is invalid.
    pub fn with_config(&self, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            ..self.clone()
        })
    }

    /// Process one raw record. Never fails and never panics to the caller.
    pub async fn run(&self, raw: Value) -> ExtractionOutput {
        let started = Instant::now();
        let (conversation_id, message_id) = input::raw_ids(&raw);

        let this = self.clone();
        match tokio::spawn(async move { this.run_inner(raw).await }).await {
            Ok(out) => out,
            Err(join_err) => {
                error!(
                    error_class = "hard",
                    component = output::PIPELINE_COMPONENT,
                    error = %join_err,
                    "pipeline run aborted"
                );
                let mut out = ExtractionOutput::new(conversation_id, message_id, &self.config);
                out.set_failed(format!("unexpected failure: {join_err}"));
                out.set_processing_time(started.elapsed());
                log_summary(&out);
                out
            }
        }
    }

    /// Engines, merge and post-filters on plain text, without validation,
    /// normalization or envelope. Spans refer to `text` as given.
    pub async fn extract_text(&self, text: &str, language: Option<&str>) -> Vec<Entity> {
        let engines = self.run_engines(text, language).await;
        for notice in &engines.fallbacks {
            debug!(fallback = %notice, "engine fallback");
        }
        let merged = merge::merge(engines.candidates, &self.config);
        filters::apply_all(merged, &self.config)
    }

    async fn run_inner(&self, raw: Value) -> ExtractionOutput {
        let started = Instant::now();
        let config = &self.config;

        let step = Instant::now();
        let validated = match input::validate(&raw, config.max_text_length) {
            Ok(v) => v,
            Err(field_errors) => {
                let (conversation_id, message_id) = input::raw_ids(&raw);
                let mut out = ExtractionOutput::new(conversation_id, message_id, config);
                for fe in &field_errors {
                    out.add_error(VALIDATOR_COMPONENT, fe.to_string());
                }
                out.record_timing("step1_validation", step.elapsed());
                error!(
                    error_class = "hard",
                    component = VALIDATOR_COMPONENT,
                    errors = field_errors.len(),
                    "input validation failed"
                );
                out.set_failed(format!(
                    "input validation failed with {} error(s)",
                    field_errors.len()
                ));
                out.set_processing_time(started.elapsed());
                log_summary(&out);
                return out;
            }
        };
        let input = validated.input;
        let mut out = ExtractionOutput::new(&input.conversation_id, &input.message_id, config);
        for warning in validated.warnings {
            warn!(error_class = "soft", component = VALIDATOR_COMPONENT, %warning, "input warning");
            out.add_error(VALIDATOR_COMPONENT, warning);
        }
        out.record_timing("step1_validation", step.elapsed());

        let step = Instant::now();
        let (text, norm_log) = normalize::normalize(&input.text);
        debug!(changed = ?norm_log.changed_steps(), chars = text.chars().count(), "text normalized");
        out.record_timing("step2_normalization", step.elapsed());

        let engines = self.run_engines(&text, input.language.as_deref()).await;
        for notice in engines.fallbacks {
            out.add_fallback(notice);
        }
        for (name, elapsed) in engines.timings {
            out.record_timing(name, elapsed);
        }

        let step = Instant::now();
        let merged = merge::merge(engines.candidates, config);
        out.record_timing("step6_merge", step.elapsed());

        let step = Instant::now();
        let entities = filters::apply_all(merged, config);
        out.record_timing("step7_filters", step.elapsed());

        out.set_entities(&entities);
        out.set_processing_time(started.elapsed());
        log_summary(&out);
        out
    }

    async fn run_engines(&self, text: &str, language: Option<&str>) -> EngineRun {
        let config = &self.config;
        let mut fallbacks = Vec::new();
        let mut timings = Vec::new();

        // The model future goes first so its blocking task is already
        // running while the pattern engine works.
        let model_fut = async {
            let step = Instant::now();
            let outcome = self.model.extract(text, language, config).await;
            (outcome, step.elapsed())
        };
        let pattern_fut = async {
            let step = Instant::now();
            let found = config
                .engines
                .pattern
                .then(|| self.patterns.extract(text, config));
            (found, step.elapsed())
        };
        let ((model_outcome, model_elapsed), (pattern_found, pattern_elapsed)) =
            tokio::join!(model_fut, pattern_fut);
        timings.push(("step3_pattern", pattern_elapsed));
        timings.push(("step4_model", model_elapsed));

        let pattern_entities = match pattern_found {
            Some(found) => {
                for rejected in self.patterns.rejected() {
                    warn!(
                        error_class = "soft",
                        component = "pattern",
                        kind = SkipKind::Other.as_str(),
                        error = %rejected,
                        "pattern rule skipped"
                    );
                    fallbacks.push(format!("pattern rule skipped: {rejected}"));
                }
                found
            }
            None => {
                fallbacks.push(fallback("pattern", &flag_off()));
                Vec::new()
            }
        };
        if let Some(notice) = &model_outcome.skip {
            fallbacks.push(fallback("model", notice));
        }

        let step = Instant::now();
        if !config.engines.gazetteer {
            fallbacks.push(fallback("gazetteer", &flag_off()));
        }
        let mut candidates = self.gazetteer.enhance(text, model_outcome.entities, config);
        timings.push(("step5_gazetteer", step.elapsed()));

        debug!(
            pattern = pattern_entities.len(),
            model_and_gazetteer = candidates.len(),
            "engines finished"
        );
        candidates.extend(pattern_entities);
        EngineRun {
            candidates,
            fallbacks,
            timings,
        }
    }
}

fn flag_off() -> SkipNotice {
    SkipNotice::new(SkipKind::FeatureFlagDisabled, "engine disabled via feature flag")
}

/// Log a fallback with its reason class and render it for the envelope.
fn fallback(engine: &str, notice: &SkipNotice) -> String {
    warn!(
        error_class = "soft",
        component = engine,
        kind = notice.kind.as_str(),
        reason = %notice.reason,
        "engine fallback"
    );
    format!("{engine} engine skipped: {notice}")
}

fn log_summary(out: &ExtractionOutput) {
    let mut per_type: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &out.entities {
        let count = per_type.entry(record.entity_type.as_str()).or_insert(0);
        *count = count.saturating_add(1);
    }
    info!(
        id_messaggio = %out.meta.id_messaggio,
        status = out.meta.status.as_str(),
        entity_count = out.meta.entity_count,
        processing_time_ms = out.meta.processing_time_ms,
        fallbacks = out.meta.fallbacks.len(),
        per_type = ?per_type,
        "pipeline run finished"
    );
}
