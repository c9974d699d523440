//! Soft text normalization.
//!
//! Every entity span refers to the text produced here, so the steps are
//! logged with their before/after lengths to make a run reproducible
//! offline.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

static HORIZONTAL_WS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[ \t]+").ok());
static BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

/// One applied normalization step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizationStep {
    /// Step identifier.
    pub name: &'static str,
    /// What the step does.
    pub description: &'static str,
    /// Character count before the step.
    pub chars_before: usize,
    /// Character count after the step.
    pub chars_after: usize,
}

/// Ordered record of the steps applied to one text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationLog {
    /// Steps in application order.
    pub steps: Vec<NormalizationStep>,
}

impl NormalizationLog {
    fn record(&mut self, name: &'static str, description: &'static str, before: &str, after: &str) {
        self.steps.push(NormalizationStep {
            name,
            description,
            chars_before: before.chars().count(),
            chars_after: after.chars().count(),
        });
    }

    /// Names of the steps that changed the text length.
    pub fn changed_steps(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter(|s| s.chars_before != s.chars_after)
            .map(|s| s.name)
            .collect()
    }
}

/// Normalize `text`: NFKC, trim, collapse horizontal whitespace runs,
/// collapse three or more newlines to two.
pub fn normalize(text: &str) -> (String, NormalizationLog) {
    let mut log = NormalizationLog::default();

    let nfkc: String = text.nfkc().collect();
    log.record("unicode_nfkc", "Unicode NFKC normalization", text, &nfkc);

    let trimmed = nfkc.trim().to_owned();
    log.record("strip", "strip leading and trailing whitespace", &nfkc, &trimmed);

    let spaced = replace_all(&HORIZONTAL_WS, &trimmed, " ");
    log.record(
        "collapse_spaces",
        "collapse runs of spaces and tabs to one space",
        &trimmed,
        &spaced,
    );

    let lined = replace_all(&BLANK_LINES, &spaced, "\n\n");
    log.record(
        "collapse_newlines",
        "collapse three or more newlines to two",
        &spaced,
        &lined,
    );

    (lined, log)
}

fn replace_all(re: &LazyLock<Option<Regex>>, text: &str, with: &str) -> String {
    match re.as_ref() {
        Some(re) => re.replace_all(text, with).into_owned(),
        None => text.to_owned(),
    }
}
