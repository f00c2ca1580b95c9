//! Record validation.
//!
//! Every record entering a stage or the store passes through
//! [`Validator::validate`]. Validation inspects all fields before
//! reporting, so a single error lists every problem with the record.
//!
//! Presence follows loose truthiness: `null`, `false`, `0`, `""` and an
//! empty array all count as absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationError};
use crate::models::DocumentRecord;

/// Checks raw record fields and builds a [`DocumentRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    dims: Option<usize>,
}

impl Validator {
    /// A validator that accepts embeddings of any length.
    pub fn new() -> Self {
        Self { dims: None }
    }

    /// A validator that also requires present embeddings to have `dims` entries.
    pub fn with_dims(dims: usize) -> Self {
        Self { dims: Some(dims) }
    }

    pub fn validate(&self, fields: &Map<String, Value>) -> Result<DocumentRecord, ValidationError> {
        let mut errors = Vec::new();

        let title = required_string(fields, "title", &mut errors);
        let body = required_string(fields, "body", &mut errors);

        let date = match fields.get("date") {
            Some(v) if is_truthy(v) => match coerce_date(v) {
                Some(d) => Some(d),
                None => {
                    errors.push(FieldError::InvalidDate(v.to_string()));
                    None
                }
            },
            _ => {
                errors.push(FieldError::Missing("date"));
                None
            }
        };

        let embedding = match fields.get("embedding") {
            Some(v) if is_truthy(v) => match parse_embedding(v) {
                Some(vec) => match self.dims {
                    Some(expected) if vec.len() != expected => {
                        errors.push(FieldError::EmbeddingDimensions {
                            expected,
                            actual: vec.len(),
                        });
                        None
                    }
                    _ => Some(vec),
                },
                None => {
                    errors.push(FieldError::InvalidEmbedding);
                    None
                }
            },
            _ => None,
        };

        if !errors.is_empty() {
            return Err(ValidationError::new(errors));
        }

        // All three are Some when no errors were recorded.
        match (title, body, date) {
            (Some(title), Some(body), Some(date)) => Ok(DocumentRecord {
                title,
                body,
                date,
                embedding,
                image: passthrough(fields, "image"),
                kind: passthrough(fields, "type"),
            }),
            _ => Err(ValidationError::new(vec![FieldError::NotAnObject])),
        }
    }
}

/// Validate with no embedding dimension constraint.
pub fn validate(fields: &Map<String, Value>) -> Result<DocumentRecord, ValidationError> {
    Validator::new().validate(fields)
}

/// Loose truthiness used for presence checks.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn required_string(
    fields: &Map<String, Value>,
    name: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match fields.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(v) if is_truthy(v) => {
            errors.push(FieldError::WrongType {
                field: name,
                expected: "string",
            });
            None
        }
        _ => {
            errors.push(FieldError::Missing(name));
            None
        }
    }
}

fn passthrough(fields: &Map<String, Value>, name: &str) -> Option<Value> {
    fields.get(name).filter(|v| is_truthy(v)).cloned()
}

fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Coerce a date value: ISO-8601 text (full or reduced precision, any
/// offset form), naive date-time, or epoch milliseconds.
pub fn coerce_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(ms).single()
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // `%#z` takes `+02`, `+0200` and `+02:00`; a trailing `Z` is rewritten first.
    let zoned = match s.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{}+00:00", rest),
        None => s.to_string(),
    };
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(&zoned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    let day = match s.len() {
        4 if s.bytes().all(|b| b.is_ascii_digit()) => {
            NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1)
        }
        7 => NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
    };
    day.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
