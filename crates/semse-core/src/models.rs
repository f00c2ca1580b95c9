//! Core data models used throughout semse.
//!
//! A [`DocumentRecord`] is created by the structuring stage, gains an
//! embedding in the embedding stage, and is wrapped into a
//! [`KeyedRecord`] exactly once before it is written to the store.
//! Files produced between stages hold either shape; [`RecordEnvelope`]
//! accepts both at the ingestion boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{FieldError, ValidationError};

/// Separator between the namespace prefix and the unique id of a key.
pub const KEY_SEPARATOR: char = ':';

/// The canonical document flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,
    /// Original text, never transformed.
    pub body: String,
    #[serde(with = "iso_millis")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
}

impl DocumentRecord {
    pub fn new(title: impl Into<String>, body: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            date,
            embedding: None,
            image: None,
            kind: None,
        }
    }

    /// Text submitted to the embedding service: title heading followed by body.
    pub fn embedding_text(&self) -> String {
        format!("<h1>{}</h1>\n{}", self.title, self.body)
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Strip trailing separators from a namespace prefix (`"documents:"` → `"documents"`).
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches(KEY_SEPARATOR)
}

/// A storage key of the form `<namespace-prefix>:<unique-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Mint a fresh key under `prefix`. Every call yields a new id.
    pub fn mint(prefix: &str) -> Self {
        Self(format!(
            "{}{}{}",
            normalize_prefix(prefix),
            KEY_SEPARATOR,
            Uuid::new_v4()
        ))
    }

    /// Accept a previously assigned key. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the key lives under `prefix:`.
    pub fn in_namespace(&self, prefix: &str) -> bool {
        self.strip_namespace(prefix).is_some()
    }

    /// The key with `prefix:` removed, as exposed to external consumers.
    pub fn strip_namespace(&self, prefix: &str) -> Option<&str> {
        self.0
            .strip_prefix(normalize_prefix(prefix))
            .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
    }

    /// File stem used when outputs are named by key.
    ///
    /// `None` when the key holds a path separator, so a stored key can
    /// never name a file outside the output directory.
    pub fn file_stem(&self) -> Option<String> {
        if self.0.contains(['/', '\\', '\0']) {
            return None;
        }
        Some(self.0.replace(KEY_SEPARATOR, "_"))
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated record bound to its storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedRecord {
    pub key: RecordKey,
    pub value: DocumentRecord,
}

/// The two on-disk record shapes, normalized at the ingestion boundary.
///
/// `{title, body, date, ...}` is a bare record; `{key, value: {...}}` is a
/// keyed record. Fields are kept untyped here and pass through the
/// validator before any further processing.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEnvelope {
    Bare(Map<String, Value>),
    Keyed {
        key: Option<RecordKey>,
        value: Map<String, Value>,
    },
}

impl RecordEnvelope {
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut obj) = value else {
            return Err(ValidationError::new(vec![FieldError::NotAnObject]));
        };

        match obj.remove("value") {
            Some(Value::Object(value)) => {
                let key = obj
                    .get("key")
                    .and_then(Value::as_str)
                    .and_then(RecordKey::parse);
                Ok(RecordEnvelope::Keyed { key, value })
            }
            // A non-object `value` is an ordinary field of a bare record.
            Some(other) => {
                obj.insert("value".to_string(), other);
                Ok(RecordEnvelope::Bare(obj))
            }
            None => Ok(RecordEnvelope::Bare(obj)),
        }
    }

    /// The record fields, whichever shape carried them.
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            RecordEnvelope::Bare(fields) => fields,
            RecordEnvelope::Keyed { value, .. } => value,
        }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, RecordEnvelope::Keyed { .. })
    }

    pub fn key(&self) -> Option<&RecordKey> {
        match self {
            RecordEnvelope::Bare(_) => None,
            RecordEnvelope::Keyed { key, .. } => key.as_ref(),
        }
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            RecordEnvelope::Bare(fields) => fields,
            RecordEnvelope::Keyed { value, .. } => value,
        }
    }

    /// Back to JSON in the shape this envelope was read from.
    pub fn into_json(self) -> Value {
        match self {
            RecordEnvelope::Bare(fields) => Value::Object(fields),
            RecordEnvelope::Keyed { key, value } => serde_json::json!({
                "key": key.as_ref().map(RecordKey::as_str).unwrap_or_default(),
                "value": value,
            }),
        }
    }
}

/// One ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Storage key with the namespace prefix removed.
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(with = "iso_millis")]
    pub date: DateTime<Utc>,
    /// Cosine distance to the query vector; lower is closer.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
}

/// ISO-8601 with millisecond precision, the on-disk date format.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> DocumentRecord {
        DocumentRecord::new(
            "Title",
            "Body text",
            Utc.with_ymd_and_hms(2024, 2, 28, 8, 57, 26).unwrap(),
        )
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("documents:"), "documents");
        assert_eq!(normalize_prefix("documents"), "documents");
        assert_eq!(normalize_prefix("documents:heise::"), "documents:heise");
    }

    #[test]
    fn test_minted_keys_are_namespaced_and_distinct() {
        let a = RecordKey::mint("documents:");
        let b = RecordKey::mint("documents");
        assert!(a.as_str().starts_with("documents:"));
        assert!(!a.as_str().starts_with("documents::"));
        assert_ne!(a, b);
        assert!(a.in_namespace("documents"));
        assert_eq!(a.strip_namespace("documents").unwrap().len(), 36);
    }

    #[test]
    fn test_strip_namespace_requires_separator() {
        let key = RecordKey::parse("documents:heise:42").unwrap();
        assert_eq!(key.strip_namespace("documents"), Some("heise:42"));
        assert_eq!(key.strip_namespace("documents:heise"), Some("42"));
        assert_eq!(key.strip_namespace("doc"), None);
        assert_eq!(key.file_stem().as_deref(), Some("documents_heise_42"));
    }

    #[test]
    fn test_file_stem_rejects_path_separators() {
        for raw in ["documents:../../x", "documents:a/b", "documents:..\\x", "documents:a\0b"] {
            let key = RecordKey::parse(raw).unwrap();
            assert!(key.file_stem().is_none(), "{}", raw);
        }
        let dots = RecordKey::parse("documents:..").unwrap();
        assert_eq!(dots.file_stem().as_deref(), Some("documents_.."));
    }

    #[test]
    fn test_parse_rejects_blank_key() {
        assert!(RecordKey::parse("").is_none());
        assert!(RecordKey::parse("   ").is_none());
    }

    #[test]
    fn test_record_serializes_date_as_iso_millis() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["date"], "2024-02-28T08:57:26.000Z");
        assert!(value.get("embedding").is_none());
        assert!(value.get("type").is_none());
    }

    #[test]
    fn test_embedding_text() {
        assert_eq!(sample().embedding_text(), "<h1>Title</h1>\nBody text");
    }

    #[test]
    fn test_envelope_detects_keyed_shape() {
        let env = RecordEnvelope::from_json(json!({
            "key": "documents:abc",
            "value": {"title": "t", "body": "b", "date": 0}
        }))
        .unwrap();
        assert!(env.is_keyed());
        assert_eq!(env.key().unwrap().as_str(), "documents:abc");
        assert_eq!(env.fields()["title"], "t");
    }

    #[test]
    fn test_envelope_bare_shape() {
        let env = RecordEnvelope::from_json(json!({"title": "t", "body": "b"})).unwrap();
        assert!(!env.is_keyed());
        assert!(env.key().is_none());
        assert_eq!(env.fields()["body"], "b");
    }

    #[test]
    fn test_envelope_rejects_non_object() {
        let err = RecordEnvelope::from_json(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.errors(), &[FieldError::NotAnObject]);
    }

    #[test]
    fn test_into_json_preserves_shape_and_fields() {
        let mut keyed = RecordEnvelope::from_json(json!({
            "key": "documents:k",
            "value": {"title": "t", "custom": 1}
        }))
        .unwrap();
        keyed.fields_mut().insert("embedding".into(), json!([0.5]));
        let out = keyed.into_json();
        assert_eq!(out["key"], "documents:k");
        assert_eq!(out["value"]["custom"], 1);
        assert_eq!(out["value"]["embedding"], json!([0.5]));

        let bare = RecordEnvelope::from_json(json!({"title": "t"})).unwrap();
        let out = bare.into_json();
        assert_eq!(out, json!({"title": "t"}));
    }
}
