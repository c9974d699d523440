//! Tests for the built-in pattern rules and lexicon loading.

use entity_extraction::config::PipelineConfig;
use entity_extraction::extractors::load_lexicon;
use entity_extraction::extractors::pattern::{PatternEngine, PatternLexicon};
use entity_extraction::types::{Entity, Source};

fn builtin() -> PatternEngine {
    PatternEngine::compile(&PatternLexicon::builtin())
}

fn find<'a>(entities: &'a [Entity], label: &str) -> Vec<&'a str> {
    entities
        .iter()
        .filter(|e| e.label() == label)
        .map(Entity::text)
        .collect()
}

// ── Built-in rules ──

#[test]
fn email_tax_code_and_iban() {
    let text = "Sono Mario (RSSMRA85M01H501Z), scrivete a mario.rossi@example.it. \
                IBAN: IT60 X054 2811 1010 0000 0123 456.";
    let found = builtin().extract(text, &PipelineConfig::default());
    assert_eq!(find(&found, "TAX_CODE"), vec!["RSSMRA85M01H501Z"]);
    assert_eq!(find(&found, "EMAIL"), vec!["mario.rossi@example.it"]);
    assert_eq!(find(&found, "IBAN"), vec!["IT60 X054 2811 1010 0000 0123 456"]);
    assert!(found.iter().all(|e| e.source() == Source::Pattern));
}

#[test]
fn compact_iban_is_matched_whole() {
    let found = builtin().extract("IBAN IT60X0542811101000000123456 ok", &PipelineConfig::default());
    assert_eq!(find(&found, "IBAN"), vec!["IT60X0542811101000000123456"]);
}

#[test]
fn phones() {
    let text = "Chiamate il +39 333 123 4567 oppure lo 02 12345678.";
    let found = builtin().extract(text, &PipelineConfig::default());
    let phones = find(&found, "PHONE");
    assert!(phones.contains(&"+39 333 123 4567"));
    assert!(phones.contains(&"02 12345678"));
}

#[test]
fn vat_number_with_prefix_and_keyword() {
    let text = "P.IVA 12345678901 e anche IT 98765432109.";
    let found = builtin().extract(text, &PipelineConfig::default());
    let vats = find(&found, "VAT_NUMBER");
    assert_eq!(vats, vec!["IT 98765432109", "12345678901"]);
}

#[test]
fn case_numbers() {
    let found = builtin().extract(
        "Rif. pratica PRAT2025001234 e nr. 1234567",
        &PipelineConfig::default(),
    );
    assert_eq!(find(&found, "CASE_NUMBER"), vec!["PRAT2025001234", "nr. 1234567"]);
}

#[test]
fn amounts_with_prefix_or_suffix_euro() {
    let found = builtin().extract("Totale € 1.500,00 più 30 € di spese", &PipelineConfig::default());
    assert_eq!(find(&found, "AMOUNT"), vec!["€ 1.500,00", "30 €"]);
}

#[test]
fn amounts_without_thousands_separator() {
    let found = builtin().extract(
        "Pagati € 1500 ieri, poi 1500,50€ e infine 2500 € oggi",
        &PipelineConfig::default(),
    );
    assert_eq!(find(&found, "AMOUNT"), vec!["€ 1500", "1500,50€", "2500 €"]);
}

#[test]
fn prefixed_vat_number_is_not_an_iban() {
    let found = builtin().extract("Partita IVA IT12345678901 del fornitore", &PipelineConfig::default());
    assert_eq!(find(&found, "VAT_NUMBER"), vec!["IT12345678901"]);
    assert!(find(&found, "IBAN").is_empty());
}

#[test]
fn scenario_text_yields_only_expected_labels() {
    let text = "Contattami a mario.rossi@example.it il 10/03/2025, importo € 1.500,00.";
    let found = builtin().extract(text, &PipelineConfig::default());
    let mut labels: Vec<&str> = found.iter().map(Entity::label).collect();
    labels.sort_unstable();
    assert_eq!(labels, vec!["AMOUNT", "DATE", "EMAIL"]);
}

// ── Lexicon files ──

#[test]
fn toml_lexicon_replaces_builtin_rules() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("patterns.toml");
    std::fs::write(
        &path,
        r#"
[[TICKET]]
pattern = 'TCK-\d{5}'
confidence = 0.8
version = "tickets-v3"

[[TICKET]]
regex_pattern = 'ticket\s+n\.\s*(\d{5})'
group = 1
"#,
    )
    .expect("should write lexicon");

    let lexicon: PatternLexicon = load_lexicon(&path).expect("lexicon should load");
    assert_eq!(lexicon.rule_count(), 2);

    let engine = PatternEngine::compile(&lexicon);
    let found = engine.extract("Aperto TCK-00042, vedi ticket n. 00043", &PipelineConfig::default());
    assert_eq!(find(&found, "TICKET"), vec!["TCK-00042", "00043"]);
    assert_eq!(found[0].version(), "tickets-v3");
    assert_eq!(found[1].version(), "pattern-v1.0");
}

#[test]
fn invalid_rule_in_file_is_reported_and_others_survive() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("patterns.json");
    std::fs::write(
        &path,
        r#"{"BAD": [{"pattern": "[a-"}], "GOOD": [{"pattern": "\\bok\\b"}]}"#,
    )
    .expect("should write lexicon");

    let lexicon: PatternLexicon = load_lexicon(&path).expect("lexicon should load");
    let engine = PatternEngine::compile(&lexicon);
    assert_eq!(engine.rejected().len(), 1);
    assert_eq!(engine.extract("ok", &PipelineConfig::default()).len(), 1);
}
