//! Tests for the gazetteer engine against a business dictionary.

use entity_extraction::config::PipelineConfig;
use entity_extraction::extractors::gazetteer::{Gazetteer, GazetteerEngine, GazetteerEntry};
use entity_extraction::extractors::load_lexicon;
use entity_extraction::types::{Entity, Source};

fn dictionary() -> Gazetteer {
    let mut gazetteer = Gazetteer::default();
    gazetteer.insert(
        "ORG",
        GazetteerEntry::new("ACME", ["ACME", "ACME S.p.A.", "ACME srl"]),
    );
    gazetteer.insert("ORG", GazetteerEntry::new("FIAT", ["FIAT", "Fiat Group"]));
    gazetteer.insert(
        "PRODUCT",
        GazetteerEntry {
            confidence: Some(0.7),
            ..GazetteerEntry::new("MUTUO", ["mutuo", "mutuo ipotecario"])
        },
    );
    gazetteer
}

#[test]
fn every_occurrence_becomes_a_candidate() {
    let engine = GazetteerEngine::new(&dictionary());
    let found = engine.enhance(
        "ACME e Fiat Group, poi ancora acme.",
        Vec::new(),
        &PipelineConfig::default(),
    );
    let texts: Vec<&str> = found.iter().map(Entity::text).collect();
    // "FIAT" also matches inside "Fiat Group"; the merger resolves that.
    assert_eq!(texts, vec!["ACME", "acme", "Fiat", "Fiat Group"]);
    assert!(found.iter().all(|e| e.label() == "ORG"));
    assert!(found.iter().all(|e| e.source() == Source::Gazetteer));
    assert!(found.iter().all(|e| e.version() == "gazetteer-v1.0"));
}

#[test]
fn entry_confidence_overrides_default() {
    let engine = GazetteerEngine::new(&dictionary());
    let found = engine.enhance(
        "Richiesta di mutuo ipotecario",
        Vec::new(),
        &PipelineConfig::default(),
    );
    assert_eq!(found.len(), 2);
    assert!(found
        .iter()
        .all(|e| e.label() == "PRODUCT" && (e.confidence() - 0.7).abs() < f64::EPSILON));
}

#[test]
fn input_entities_are_passed_through_first() {
    let engine = GazetteerEngine::new(&dictionary());
    let model_entity =
        Entity::new("ACME", "ORG", 0, 4, Source::Model, 0.75, "it_core_news_lg").expect("valid");
    let found = engine.enhance(
        "ACME ha risposto",
        vec![model_entity.clone()],
        &PipelineConfig::default(),
    );
    assert_eq!(found.len(), 2);
    assert_eq!(found[0], model_entity);
    assert_eq!(found[1].source(), Source::Gazetteer);
}

#[test]
fn json_dictionary_with_lemma_field_loads() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("gazetteer.json");
    std::fs::write(
        &path,
        r#"{"BANK": [{"lemma": "Intesa", "surface_forms": ["Intesa", "Intesa Sanpaolo"]}]}"#,
    )
    .expect("should write gazetteer");

    let gazetteer: Gazetteer = load_lexicon(&path).expect("gazetteer should load");
    let engine = GazetteerEngine::new(&gazetteer);
    assert_eq!(engine.form_count(), 2);
    let found = engine.enhance("Conto presso Intesa Sanpaolo", Vec::new(), &PipelineConfig::default());
    let texts: Vec<&str> = found.iter().map(Entity::text).collect();
    assert_eq!(texts, vec!["Intesa", "Intesa Sanpaolo"]);
    assert!(found.iter().all(|e| e.label() == "BANK"));
}
