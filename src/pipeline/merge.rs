//! Deterministic conflict resolution over the full candidate pool.
//!
//! Steps: drop blank candidates, collapse exact duplicates, order for
//! evaluation, resolve overlaps greedily, sort for output.
//!
//! Known limitation: a candidate is compared only with the first accepted
//! entity it overlaps. Chains of three or more mutually overlapping spans
//! from different sources are not fully resolved in one pass.
//!
//! When two sources share a rank in `source_priority`, the entity accepted
//! first is kept; span length and confidence only decide within one source.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::types::Entity;

type DedupKey = (String, String, usize, usize, &'static str, u64);

fn dedup_key(e: &Entity) -> DedupKey {
    (
        e.label().to_owned(),
        e.text().to_owned(),
        e.start(),
        e.end(),
        e.source().as_str(),
        e.confidence().to_bits(),
    )
}

/// Collapse `candidates` into a non-overlapping, stably ordered list.
pub fn merge(candidates: Vec<Entity>, config: &PipelineConfig) -> Vec<Entity> {
    let total = candidates.len();
    let rank = |e: &Entity| config.source_rank(e.source());

    let mut seen = HashSet::new();
    let mut pool: Vec<Entity> = candidates
        .into_iter()
        .filter(Entity::is_valid)
        .filter(|e| seen.insert(dedup_key(e)))
        .collect();

    pool.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then_with(|| b.span_length().cmp(&a.span_length()))
            .then_with(|| rank(a).cmp(&rank(b)))
            .then_with(|| b.confidence().total_cmp(&a.confidence()))
    });

    let mut accepted: Vec<Entity> = Vec::with_capacity(pool.len());
    for candidate in pool {
        match accepted.iter().position(|kept| kept.overlaps(&candidate)) {
            None => accepted.push(candidate),
            Some(idx) => {
                let Some(kept) = accepted.get_mut(idx) else {
                    continue;
                };
                if beats(&candidate, kept, config) {
                    *kept = candidate;
                }
            }
        }
    }

    accepted.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then_with(|| a.label().cmp(b.label()))
            .then_with(|| rank(a).cmp(&rank(b)))
    });

    debug!(candidates = total, merged = accepted.len(), "merge finished");
    accepted
}

/// Whether `candidate` should replace the overlapping `kept` entity.
fn beats(candidate: &Entity, kept: &Entity, config: &PipelineConfig) -> bool {
    let (cand_rank, kept_rank) = (
        config.source_rank(candidate.source()),
        config.source_rank(kept.source()),
    );
    if cand_rank != kept_rank {
        return cand_rank < kept_rank;
    }
    if candidate.source() != kept.source() {
        return false;
    }
    match candidate.span_length().cmp(&kept.span_length()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.confidence() > kept.confidence(),
    }
}
