//! Input validation.
//!
//! Turns a raw JSON record into a typed [`ExtractionInput`], or into the
//! list of every field that is wrong with it. Field names follow the
//! upstream contract (`id_conversazione`, `testo_normalizzato`, ...);
//! English aliases are accepted as well. Unknown fields are ignored.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Identifier used in the envelope when the record has none.
pub const UNKNOWN_ID: &str = "UNKNOWN";

static HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

const CONVERSATION_ID: (&str, &str) = ("id_conversazione", "conversation_id");
const MESSAGE_ID: (&str, &str) = ("id_messaggio", "message_id");
const TEXT: (&str, &str) = ("testo_normalizzato", "text");
const LANGUAGE: (&str, &str) = ("lingua", "language");
const TIMESTAMP: (&str, &str) = ("timestamp", "timestamp");
const SENDER: (&str, &str) = ("mittente", "sender");
const RECIPIENT: (&str, &str) = ("destinatario", "recipient");
const PRE_ANNOTATIONS: (&str, &str) = ("pre_annotazioni", "pre_annotations");
const ROUTING_RULES: (&str, &str) = ("regole_routing", "routing_rules");
const UPSTREAM_TAGS: (&str, &str) = ("tag_upstream", "upstream_tags");

/// A validated, immutable input record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionInput {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Message identifier.
    pub message_id: String,
    /// Message body, already stripped of markup upstream.
    pub text: String,
    /// Lowercased language code, if declared.
    pub language: Option<String>,
    /// ISO-8601 timestamp as received.
    pub timestamp: String,
    /// Sender identifier.
    pub sender: String,
    /// Recipient identifier.
    pub recipient: String,
    /// Upstream annotations, passed through untouched.
    pub pre_annotations: Option<Value>,
    /// Routing rules applied upstream.
    pub routing_rules: Option<Value>,
    /// Free-form upstream tags.
    pub upstream_tags: Option<Value>,
}

/// What is wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// Required field absent or null.
    Missing,
    /// Field present with the wrong JSON type.
    WrongType,
    /// Field present but empty.
    Empty,
    /// Text above the configured maximum length.
    TooLong,
    /// Text contains markup.
    Html,
    /// Timestamp is not ISO-8601.
    InvalidTimestamp,
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name (contract name, not alias).
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
    /// Failure class.
    pub kind: FieldErrorKind,
}

impl FieldError {
    fn new(field: &str, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.to_owned(),
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A validated record plus non-blocking warnings.
#[derive(Debug, Clone)]
pub struct Validated {
    /// The typed record.
    pub input: ExtractionInput,
    /// Warnings that do not stop the run.
    pub warnings: Vec<String>,
}

/// Validate a raw record.
///
/// # Errors
///
/// Returns every [`FieldError`] found; the list is never empty.
pub fn validate(raw: &Value, max_text_length: usize) -> Result<Validated, Vec<FieldError>> {
    let Some(obj) = raw.as_object() else {
        return Err(vec![FieldError::new(
            "$root",
            FieldErrorKind::WrongType,
            "input must be a JSON object",
        )]);
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let conversation_id = required_string(obj, CONVERSATION_ID, &mut errors);
    let message_id = required_string(obj, MESSAGE_ID, &mut errors);
    let sender = required_string(obj, SENDER, &mut errors);
    let recipient = required_string(obj, RECIPIENT, &mut errors);

    let text = required_string(obj, TEXT, &mut errors);
    if let Some(text) = &text {
        check_text(text, max_text_length, &mut errors);
    }

    let timestamp = required_string(obj, TIMESTAMP, &mut errors);
    if let Some(ts) = &timestamp {
        if !is_iso_timestamp(ts) {
            errors.push(FieldError::new(
                TIMESTAMP.0,
                FieldErrorKind::InvalidTimestamp,
                format!("'{ts}' is not an ISO-8601 timestamp"),
            ));
        }
    }

    let language = match lookup(obj, LANGUAGE) {
        None | Some(Value::Null) => {
            warnings.push(
                "lingua is null; language guard of the model engine is bypassed".to_owned(),
            );
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(FieldError::new(
                LANGUAGE.0,
                FieldErrorKind::Empty,
                "must be a non-empty string or null",
            ));
            None
        }
        Some(Value::String(s)) => Some(s.trim().to_lowercase()),
        Some(_) => {
            errors.push(FieldError::new(
                LANGUAGE.0,
                FieldErrorKind::WrongType,
                "expected a string or null",
            ));
            None
        }
    };

    match (conversation_id, message_id, text, timestamp, sender, recipient) {
        (
            Some(conversation_id),
            Some(message_id),
            Some(text),
            Some(timestamp),
            Some(sender),
            Some(recipient),
        ) if errors.is_empty() => Ok(Validated {
            input: ExtractionInput {
                conversation_id,
                message_id,
                text,
                language,
                timestamp,
                sender,
                recipient,
                pre_annotations: optional(obj, PRE_ANNOTATIONS),
                routing_rules: optional(obj, ROUTING_RULES),
                upstream_tags: optional(obj, UPSTREAM_TAGS),
            },
            warnings,
        }),
        _ => Err(errors),
    }
}

/// Best-effort identifiers for the envelope of a record that may be invalid.
pub fn raw_ids(raw: &Value) -> (String, String) {
    let id = |names: (&str, &str)| {
        raw.as_object()
            .and_then(|obj| lookup(obj, names))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_ID)
            .to_owned()
    };
    (id(CONVERSATION_ID), id(MESSAGE_ID))
}

fn lookup<'a>(obj: &'a Map<String, Value>, (name, alias): (&str, &str)) -> Option<&'a Value> {
    obj.get(name).or_else(|| obj.get(alias))
}

fn required_string(
    obj: &Map<String, Value>,
    names: (&str, &str),
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let field = names.0;
    match lookup(obj, names) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, FieldErrorKind::Missing, "field required"));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            errors.push(FieldError::new(field, FieldErrorKind::Empty, "must not be empty"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(field, FieldErrorKind::WrongType, "expected a string"));
            None
        }
    }
}

fn optional(obj: &Map<String, Value>, names: (&str, &str)) -> Option<Value> {
    lookup(obj, names).filter(|v| !v.is_null()).cloned()
}

fn check_text(text: &str, max_len: usize, errors: &mut Vec<FieldError>) {
    let field = TEXT.0;
    if text.trim().is_empty() {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::Empty,
            "must not be empty or whitespace-only",
        ));
        return;
    }
    let len = text.chars().count();
    if len > max_len {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::TooLong,
            format!("exceeds maximum length of {max_len} chars (got {len})"),
        ));
    }
    if HTML_TAG.as_ref().is_some_and(|re| re.is_match(text)) {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::Html,
            "must not contain HTML tags",
        ));
    }
}

fn is_iso_timestamp(ts: &str) -> bool {
    DateTime::parse_from_rfc3339(ts).is_ok()
        || NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(ts, "%Y-%m-%d").is_ok()
}
