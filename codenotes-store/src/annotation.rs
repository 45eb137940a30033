//! Annotation types
//!
//! Core types for representing line annotations and the per-project
//! document they are persisted in.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version tag written into every annotation document
pub const DOCUMENT_VERSION: &str = "1.0";

/// Unique identifier for annotations.
///
/// New ids are UUID v4 strings. Ids read back from disk are kept verbatim,
/// whatever their shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    /// Create a new random AnnotationId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AnnotationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AnnotationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A note attached to one line of one file in a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Unique identifier, immutable
    pub id: AnnotationId,
    /// Path of the annotated file, relative to the project root
    pub file_path: String,
    /// 1-indexed line at creation time
    pub line: u32,
    /// Reserved, always 0
    #[serde(default)]
    pub column: u32,
    /// Free-form note text
    pub text: String,
    /// Display name of the author
    pub author: String,
    /// Milliseconds since epoch, refreshed on every text edit
    pub timestamp: i64,
    /// Absolute path of the owning project
    pub project_path: String,
}

impl Annotation {
    /// Create a new annotation with a fresh id and the current time
    pub fn new(
        project_path: impl Into<String>,
        file_path: impl Into<String>,
        line: u32,
        text: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: AnnotationId::new(),
            file_path: file_path.into(),
            line,
            column: 0,
            text: text.into(),
            author: author.into(),
            timestamp: now_millis(),
            project_path: project_path.into(),
        }
    }

    /// Replace the text and move the timestamp forward.
    ///
    /// The new timestamp is strictly greater than the old one even when the
    /// clock has not ticked since the last edit, as long as the old one is
    /// a representable instant (see [`Annotation::edited_at`]).
    pub fn edit_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.timestamp = now_millis().max(self.timestamp.saturating_add(1));
    }

    /// Timestamp as a UTC datetime, if it is in range
    pub fn edited_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// On-disk document holding every annotation of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationData {
    pub version: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl AnnotationData {
    /// Wrap a collection in a current-version document
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            annotations,
        }
    }
}

impl Default for AnnotationData {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(text: &str) -> Annotation {
        Annotation::new("/tmp/proj", "src/a.ts", 10, text, "Alice")
    }

    #[test]
    fn test_new_annotation_defaults() {
        let a = sample("fix this");
        assert_eq!(a.column, 0);
        assert_eq!(a.line, 10);
        assert!(Uuid::parse_str(a.id.as_str()).is_ok());
        assert!(a.timestamp > 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| AnnotationId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_edit_text_moves_timestamp_forward() {
        let mut a = sample("before");
        a.timestamp = i64::MAX / 2;
        let before = a.timestamp;
        a.edit_text("after");
        assert_eq!(a.text, "after");
        assert!(a.timestamp > before);
    }

    #[test]
    fn test_edit_text_at_max_timestamp_does_not_overflow() {
        let json = r#"{"id":"x","filePath":"a.rs","line":1,"text":"t","author":"A","timestamp":9223372036854775807,"projectPath":"/p"}"#;
        let mut a: Annotation = serde_json::from_str(json).unwrap();
        a.edit_text("new");
        assert_eq!(a.text, "new");
        assert_eq!(a.timestamp, i64::MAX);
        assert!(a.edited_at().is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut a = sample("multi\nline");
        a.id = AnnotationId::from("abc");
        a.timestamp = 1234567890000;
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "abc",
                "filePath": "src/a.ts",
                "line": 10,
                "column": 0,
                "text": "multi\nline",
                "author": "Alice",
                "timestamp": 1234567890000i64,
                "projectPath": "/tmp/proj",
            })
        );
    }

    #[test]
    fn test_document_round_trip() {
        let data = AnnotationData::new(vec![sample("one"), sample("two"), sample("three")]);
        let json = serde_json::to_string_pretty(&data).unwrap();
        let parsed: AnnotationData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(parsed.version, DOCUMENT_VERSION);
    }

    #[test]
    fn test_missing_column_defaults_to_zero() {
        let json = r#"{"id":"x","filePath":"a.rs","line":1,"text":"t","author":"A","timestamp":1,"projectPath":"/p"}"#;
        let a: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(a.column, 0);
    }

    #[test]
    fn test_edited_at() {
        let mut a = sample("t");
        a.timestamp = 0;
        assert_eq!(a.edited_at().unwrap().timestamp(), 0);
    }
}
