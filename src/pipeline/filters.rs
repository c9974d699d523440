//! Post-filter chain: empty, blacklist, type flags, canonical formats.
//!
//! Every filter is total and keeps input order. Canonicalization replaces
//! an entity with a new one carrying the rewritten text; when the text is
//! already canonical the original entity is kept.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::{CanonicalFormat, PipelineConfig};
use crate::types::Entity;

static DATE_PARTS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{4}|\d{2})$").ok()
});
static AMOUNT_PARTS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(?:\.\d{3})+|\d+)(?:,(\d{1,2}))?$").ok()
});

const CURRENCY_SYMBOLS: &[char] = &['€', '$', '£'];

/// Drop entities whose text is empty or whitespace.
pub fn drop_empty(entities: Vec<Entity>) -> Vec<Entity> {
    entities.into_iter().filter(Entity::is_valid).collect()
}

/// Drop entities whose text equals a blacklist entry, ignoring case only.
pub fn drop_blacklisted(entities: Vec<Entity>, blacklist: &[String]) -> Vec<Entity> {
    if blacklist.is_empty() {
        return entities;
    }
    let banned: HashSet<String> = blacklist.iter().map(|b| b.to_lowercase()).collect();
    entities
        .into_iter()
        .filter(|e| !banned.contains(&e.text().to_lowercase()))
        .collect()
}

/// Drop entities whose label is explicitly disabled.
pub fn drop_disabled_types(entities: Vec<Entity>, config: &PipelineConfig) -> Vec<Entity> {
    entities
        .into_iter()
        .filter(|e| config.is_entity_type_enabled(e.label()))
        .collect()
}

/// Rewrite texts of labels that have a canonical format.
pub fn canonicalize(entities: Vec<Entity>, config: &PipelineConfig) -> Vec<Entity> {
    entities
        .into_iter()
        .map(|entity| {
            let rewritten = match config.canonical_format(entity.label()) {
                Some(CanonicalFormat::Date) => canonical_date(entity.text()),
                Some(CanonicalFormat::Amount) => canonical_amount(entity.text()),
                Some(CanonicalFormat::Uppercase) => Some(entity.text().trim().to_uppercase()),
                None => None,
            };
            match rewritten {
                Some(text) if text != entity.text() => entity.with_text(text),
                _ => entity,
            }
        })
        .collect()
}

/// Run the whole chain in order.
pub fn apply_all(entities: Vec<Entity>, config: &PipelineConfig) -> Vec<Entity> {
    let before = entities.len();
    let entities = drop_empty(entities);
    let entities = drop_blacklisted(entities, &config.blacklist);
    let entities = drop_disabled_types(entities, config);
    let entities = canonicalize(entities, config);
    debug!(before, after = entities.len(), "post-filters applied");
    entities
}

/// `d/m/yy[yy]` (separator `/`, `-` or `.`) to `YYYY-MM-DD`.
///
/// Two-digit years below 50 are 20xx, the rest 19xx. No calendar check.
pub fn canonical_date(text: &str) -> Option<String> {
    let caps = DATE_PARTS.as_ref()?.captures(text.trim())?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year_str = caps.get(3)?.as_str();
    let year: u32 = year_str.parse().ok()?;
    let year = match (year_str.len(), year) {
        (2, y) if y < 50 => y.checked_add(2000)?,
        (2, y) => y.checked_add(1900)?,
        (_, y) => y,
    };
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

/// Italian amount (`€ 1.500,00`, `50 €`, `1500,5`) to `1500.00` style.
pub fn canonical_amount(text: &str) -> Option<String> {
    let bare = text
        .trim()
        .trim_start_matches(CURRENCY_SYMBOLS)
        .trim_end_matches(CURRENCY_SYMBOLS)
        .trim();
    let caps = AMOUNT_PARTS.as_ref()?.captures(bare)?;

    let digits: String = caps.get(1)?.as_str().chars().filter(|c| *c != '.').collect();
    let integer = match digits.trim_start_matches('0') {
        "" => "0",
        significant => significant,
    };
    let decimal = match caps.get(2).map(|m| m.as_str()) {
        None => "00".to_owned(),
        Some(d) => format!("{d:0<2}"),
    };
    Some(format!("{integer}.{decimal}"))
}
