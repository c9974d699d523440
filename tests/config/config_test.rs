//! Coverage for config parsing, env overrides and path resolution.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use entity_extraction::config::{
    config_dir, load_config, CanonicalFormat, ConfigError, PipelineConfig, CONFIG_PATH_ENV,
};
use entity_extraction::types::Source;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).expect("should write config");
    path
}

#[test]
fn config_dir_resolves() {
    let path = config_dir().expect("config dir should resolve");
    assert!(path.ends_with(".entity-extraction"));
}

#[test]
fn parse_partial_config_keeps_defaults() {
    let config = PipelineConfig::from_toml(
        r#"
blacklist = ["n/a"]

[engines]
model = false

[model]
min_text_length = 10
"#,
    )
    .expect("should parse");

    assert_eq!(config.blacklist, vec!["n/a".to_owned()]);
    assert!(!config.engines.model);
    assert!(config.engines.pattern);
    assert_eq!(config.model.min_text_length, 10);
    assert_eq!(config.model.name, "it_core_news_lg");
    assert_eq!(config.model_timeout(), Duration::from_secs(30));
    assert_eq!(config.source_rank(Source::Gazetteer), 1);
}

#[test]
fn parse_priorities_types_and_canonical_forms() {
    let config = PipelineConfig::from_toml(
        r#"
[source_priority]
model = 0
pattern = 1

[entity_types]
PHONE = false

[canonical]
TAX_CODE = "uppercase"
"#,
    )
    .expect("should parse");

    assert_eq!(config.source_rank(Source::Model), 0);
    assert_eq!(config.source_rank(Source::Pattern), 1);
    assert!(!config.is_entity_type_enabled("PHONE"));
    assert!(config.is_entity_type_enabled("EMAIL"));
    assert_eq!(
        config.canonical_format("TAX_CODE"),
        Some(CanonicalFormat::Uppercase)
    );
}

#[test]
fn invalid_toml_is_an_error() {
    assert!(PipelineConfig::from_toml("[engines\nmodel = ").is_err());
}

#[test]
fn load_with_reads_explicit_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = write_config(tmp.path(), "max_text_length = 500\n");

    let config = PipelineConfig::load_with(Some(&path), env_of(&[])).expect("should load");
    assert_eq!(config.max_text_length, 500);
}

#[test]
fn load_with_uses_path_from_env() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = write_config(tmp.path(), "[confidence]\npattern = 0.9\n");
    let path_str = path.to_str().expect("utf-8 path");

    let config = PipelineConfig::load_with(None, env_of(&[(CONFIG_PATH_ENV, path_str)]))
        .expect("should load");
    assert!((config.confidence.pattern - 0.9).abs() < f64::EPSILON);
}

#[test]
fn env_overrides_win_over_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = write_config(tmp.path(), "[engines]\nmodel = true\n");

    let config = PipelineConfig::load_with(
        Some(&path),
        env_of(&[
            ("NER_ENGINE_MODEL", "no"),
            ("NER_MIN_TEXT_LENGTH", "20"),
            ("NER_TIMEOUT_SECONDS", "2.5"),
            ("NER_SUPPORTED_LANGUAGES", "it, fr ,"),
            ("NER_BLACKLIST", "test,  demo"),
            ("NER_MODEL_NAME", "custom_model"),
        ]),
    )
    .expect("should load");

    assert!(!config.engines.model);
    assert_eq!(config.model.min_text_length, 20);
    assert_eq!(config.model_timeout(), Duration::from_millis(2500));
    assert_eq!(config.model.supported_languages, vec!["it", "fr"]);
    assert_eq!(config.blacklist, vec!["test", "demo"]);
    assert_eq!(config.model.name, "custom_model");
}

#[test]
fn invalid_override_is_ignored() {
    let mut config = PipelineConfig::default();
    config.apply_overrides(env_of(&[
        ("NER_ENGINE_PATTERN", "maybe"),
        ("NER_MAX_TEXT_LENGTH", "lots"),
        ("NER_MODEL_CONFIDENCE", "high"),
    ]));
    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn out_of_range_override_fails_validation() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = write_config(tmp.path(), "");
    let result = PipelineConfig::load_with(Some(&path), env_of(&[("NER_MODEL_CONFIDENCE", "1.5")]));
    assert!(result.is_err());
}

#[test]
fn validate_reports_each_problem() {
    let mut config = PipelineConfig::default();
    config.confidence.gazetteer = -0.1;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidConfidence { engine: "gazetteer", .. })
    ));

    let mut config = PipelineConfig::default();
    config.model.timeout_seconds = 0.0;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));

    let mut config = PipelineConfig::default();
    config.max_text_length = 0;
    assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxTextLength)));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let missing = tmp.path().join("nope.toml");
    assert!(load_config(&missing).is_err());
    assert!(PipelineConfig::load_with(Some(&missing), env_of(&[])).is_err());
}

#[test]
fn rendered_config_loads_back() {
    let mut config = PipelineConfig::default();
    config.blacklist = vec!["prova".to_owned()];
    config.entity_types.insert("IBAN".to_owned(), false);
    let rendered = config.to_toml().expect("should render");
    let parsed = PipelineConfig::from_toml(&rendered).expect("should parse");
    assert_eq!(parsed, config);
}

#[test]
fn feature_flags_mirror_engines() {
    let mut config = PipelineConfig::default();
    config.engines.gazetteer = false;
    let flags = config.feature_flags();
    assert_eq!(flags.get("engine_pattern"), Some(&true));
    assert_eq!(flags.get("engine_gazetteer"), Some(&false));
    assert_eq!(flags.get("engine_model"), Some(&true));
}
