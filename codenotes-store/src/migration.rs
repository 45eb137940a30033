//! Document version handling
//!
//! Every annotation document carries a `version` tag. Parsing goes through
//! here so that a future format change has one place to add an upgrade
//! step keyed on that tag.

use serde_json::Value;
use thiserror::Error;

use crate::annotation::{AnnotationData, DOCUMENT_VERSION};

/// Why a document could not be turned into [`AnnotationData`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Not valid JSON, or not the expected shape
    #[error("malformed annotation document: {0}")]
    Malformed(String),
    /// Well-formed, but written by a format this build does not know
    #[error("unsupported annotation document version '{0}'")]
    UnsupportedVersion(String),
}

/// Parse raw document bytes, upgrading older formats to the current one
pub fn parse_document(bytes: &[u8]) -> Result<AnnotationData, DocumentError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DocumentError::Malformed(e.to_string()))?;

    let version = match value.get("version") {
        Some(Value::String(v)) => v.clone(),
        // Early writers omitted the tag; their layout matches 1.0.
        None => {
            log::debug!("Annotation document has no version tag, treating as {DOCUMENT_VERSION}");
            DOCUMENT_VERSION.to_string()
        }
        Some(other) => {
            return Err(DocumentError::Malformed(format!(
                "version must be a string, found {other}"
            )))
        }
    };

    match version.as_str() {
        DOCUMENT_VERSION => {
            let mut data: AnnotationData = serde_json::from_value(value)
                .map_err(|e| DocumentError::Malformed(e.to_string()))?;
            data.version = DOCUMENT_VERSION.to_string();
            // Edits must be able to move a timestamp strictly forward.
            if let Some(bad) = data.annotations.iter().find(|a| a.edited_at().is_none()) {
                return Err(DocumentError::Malformed(format!(
                    "annotation {} has out-of-range timestamp {}",
                    bad.id, bad.timestamp
                )));
            }
            Ok(data)
        }
        _ => Err(DocumentError::UnsupportedVersion(version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version_passes_through() {
        let json = br#"{"version":"1.0","annotations":[{"id":"a","filePath":"x.rs","line":3,"column":0,"text":"t","author":"A","timestamp":5,"projectPath":"/p"}]}"#;
        let data = parse_document(json).unwrap();
        assert_eq!(data.version, "1.0");
        assert_eq!(data.annotations.len(), 1);
        assert_eq!(data.annotations[0].line, 3);
    }

    #[test]
    fn test_missing_version_is_current() {
        let data = parse_document(br#"{"annotations":[]}"#).unwrap();
        assert_eq!(data.version, DOCUMENT_VERSION);
        assert!(data.annotations.is_empty());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = parse_document(br#"{"version":"9.0","annotations":[]}"#).unwrap_err();
        assert_eq!(err, DocumentError::UnsupportedVersion("9.0".into()));
    }

    #[test]
    fn test_out_of_range_timestamp_rejected() {
        let json = br#"{"version":"1.0","annotations":[{"id":"a","filePath":"x.rs","line":3,"text":"t","author":"A","timestamp":9223372036854775807,"projectPath":"/p"}]}"#;
        let err = parse_document(json).unwrap_err();
        assert!(matches!(&err, DocumentError::Malformed(reason) if reason.contains("out-of-range")));
        assert!(err.to_string().starts_with("malformed annotation document"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_document(b"{ not json"),
            Err(DocumentError::Malformed(_))
        ));
        assert!(matches!(
            parse_document(br#"{"version":1}"#),
            Err(DocumentError::Malformed(_))
        ));
        assert!(matches!(
            parse_document(br#"{"version":"1.0","annotations":[{"id":"a"}]}"#),
            Err(DocumentError::Malformed(_))
        ));
    }
}
