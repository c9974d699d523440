//! Pipeline behaviour with an installed (mock) recognizer.

use std::sync::Arc;

use entity_extraction::config::PipelineConfig;
use entity_extraction::Pipeline;

use super::common::{gazetteer, record, PanickingModel, Serve, TermModel, BODY};

fn pipeline_serving(serve: Arc<Serve>) -> Pipeline {
    Pipeline::builder()
        .gazetteer(gazetteer())
        .model_capability(serve)
        .build()
        .expect("pipeline should build")
}

#[tokio::test]
async fn model_entities_join_the_merge() {
    let serve = Serve::new(TermModel(vec![("Mario Rossi", "PER"), ("ACME", "ORG")]));
    let out = pipeline_serving(serve).run(record(BODY)).await;

    assert!(out.meta.fallbacks.is_empty());
    let person = out
        .entities
        .iter()
        .find(|e| e.entity_type == "PER")
        .expect("person from model");
    assert_eq!(person.value, "Mario Rossi");
    assert_eq!(person.source, "model");
    assert_eq!(person.version, "it_core_news_lg");

    // Gazetteer outranks the model on the overlapping organization.
    let org = out
        .entities
        .iter()
        .find(|e| e.entity_type == "ORG")
        .expect("organization");
    assert_eq!(org.value, "ACME S.p.A.");
    assert_eq!(org.source, "gazetteer");
}

#[tokio::test]
async fn model_wins_when_ranked_first() {
    let serve = Serve::new(TermModel(vec![("ACME S.p.A.", "COMPANY")]));
    let mut config = PipelineConfig::default();
    config.source_priority.insert("model".to_owned(), 0);
    config.source_priority.insert("gazetteer".to_owned(), 1);
    config.source_priority.insert("pattern".to_owned(), 2);
    let pipeline = pipeline_serving(serve)
        .with_config(config)
        .expect("valid config");

    let out = pipeline.run(record(BODY)).await;
    let org = out
        .entities
        .iter()
        .find(|e| e.value == "ACME S.p.A.")
        .expect("organization");
    assert_eq!(org.entity_type, "COMPANY");
    assert_eq!(org.source, "model");
}

#[tokio::test]
async fn panicking_model_degrades_to_fallback() {
    let out = pipeline_serving(Serve::new(PanickingModel))
        .run(record(BODY))
        .await;
    assert!(out.is_ok());
    assert!(out
        .meta
        .fallbacks
        .iter()
        .any(|f| f.starts_with("model engine skipped: NER model error")));
    assert_eq!(out.entities.len(), 7);
}

#[tokio::test]
async fn blacklist_applies_to_model_entities() {
    let serve = Serve::new(TermModel(vec![("Mario Rossi", "PER")]));
    let mut config = PipelineConfig::default();
    config.blacklist = vec!["MARIO ROSSI".to_owned()];
    let pipeline = pipeline_serving(serve)
        .with_config(config)
        .expect("valid config");
    let out = pipeline.run(record(BODY)).await;
    assert!(out.entities.iter().all(|e| e.entity_type != "PER"));
}

#[tokio::test]
async fn concurrent_runs_load_the_model_once() {
    let serve = Serve::new(TermModel(vec![("Mario", "PER")]));
    let pipeline = pipeline_serving(Arc::clone(&serve));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let p = pipeline.clone();
        handles.push(tokio::spawn(async move { p.run(record(BODY)).await }));
    }
    for handle in handles {
        let out = handle.await.expect("run task should not panic");
        assert!(out.is_ok());
    }
    assert_eq!(serve.load_count(), 1);

    pipeline.registry().clear();
    pipeline.run(record(BODY)).await;
    assert_eq!(serve.load_count(), 2);
}
