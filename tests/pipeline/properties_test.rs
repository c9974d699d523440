//! Output invariants checked over a handful of varied inputs.

use entity_extraction::pipeline::output::ExtractionOutput;
use entity_extraction::Pipeline;

use super::common::{gazetteer, record, Serve, TermModel, BODY};

const INPUTS: &[&str] = &[
    BODY,
    "Contattami a mario.rossi@example.it il 10/03/2025, importo € 1.500,00.",
    "Nessuna entità in questo testo, solo parole comuni e nient'altro da segnalare.",
    "Chiamare 02 1234 5678 oppure 347 1234567 entro il 01-02-2024 per la pratica RG 1234/2024.",
    "ACME ACME S.p.A. ACME srl acme   acme s.p.a.\n\n\n\nIT60X0542811101000000123456",
    "Partita IVA IT12345678901, P.IVA: 12345678901, totale 2.000 € e 3,50 €.",
];

fn pipeline() -> Pipeline {
    Pipeline::builder()
        .gazetteer(gazetteer())
        .model_capability(Serve::new(TermModel(vec![
            ("Mario Rossi", "PER"),
            ("ACME", "ORG"),
            ("pratica", "MISC"),
        ])))
        .build()
        .expect("pipeline should build")
}

fn check(out: &ExtractionOutput) {
    assert!(out.is_ok(), "errors: {:?}", out.errors);
    assert_eq!(out.meta.entity_count, out.entities.len());

    let mut spans: Vec<(usize, usize)> = Vec::new();
    for entity in &out.entities {
        assert!(entity.span.end > entity.span.start, "{entity:?}");
        assert!((0.0..=1.0).contains(&entity.confidence), "{entity:?}");
        assert!(
            matches!(entity.source.as_str(), "pattern" | "gazetteer" | "model"),
            "{entity:?}"
        );
        assert!(!entity.value.trim().is_empty(), "{entity:?}");
        spans.push((entity.span.start, entity.span.end));
    }

    // Sorted by start and pairwise disjoint.
    for pair in spans.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "not sorted: {spans:?}");
        assert!(pair[0].1 <= pair[1].0, "overlap: {spans:?}");
    }

    let value = out.to_value();
    let keys: Vec<&String> = value.as_object().expect("object").keys().collect();
    assert_eq!(keys.len(), 3);
    for key in ["entities", "meta", "errors"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
}

#[tokio::test]
async fn every_output_satisfies_invariants() {
    let pipeline = pipeline();
    for text in INPUTS {
        let out = pipeline.run(record(text)).await;
        check(&out);
    }
}

#[tokio::test]
async fn same_input_same_entities() {
    let pipeline = pipeline();
    for text in INPUTS {
        let first = pipeline.run(record(text)).await;
        let second = pipeline.run(record(text)).await;
        assert_eq!(first.entities, second.entities);
        assert_eq!(first.meta.fallbacks, second.meta.fallbacks);
        assert_eq!(first.errors, second.errors);
    }
}

#[tokio::test]
async fn blank_after_normalization_yields_no_entities() {
    let out = pipeline().run(record("   \n\n  \t ")).await;
    // Validation either rejects the blank body or the run finds nothing.
    assert!(out.entities.is_empty());
    assert_eq!(out.meta.entity_count, 0);
}
