use serde::{Deserialize, Serialize};

use codesync_embed::SparseVector;

use crate::error::StoreError;

/// Named dense vector field in every collection.
pub const DENSE_VECTOR: &str = "dense";
/// Named sparse vector field in every collection.
pub const SPARSE_VECTOR: &str = "sparse";

pub const FILE_PATH_FIELD: &str = "metadata.filePath";
pub const FILE_NAME_FIELD: &str = "metadata.fileName";
pub const FILE_EXTENSION_FIELD: &str = "metadata.fileExtension";

/// Page size used when scanning ids by filter.
pub const SCROLL_PAGE_SIZE: u32 = 100;

/// Per-fragment file metadata stored alongside the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_path: String,
    pub file_name: String,
    pub file_extension: String,
    pub file_size: u64,
    /// Milliseconds since the Unix epoch.
    pub file_last_modified: i64,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    pub code_string: String,
    pub metadata: FileMetadata,
}

impl RecordPayload {
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }

    /// # Errors
    ///
    /// Returns an error if the value does not have the payload shape.
    pub fn from_json(value: serde_json::Value) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridVector {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// One stored fragment. Records are replaced, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub vector: HybridVector,
    pub payload: RecordPayload,
}

/// Equality conditions on file metadata. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFilter {
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_extension: Option<String>,
}

impl PayloadFilter {
    #[must_use]
    pub fn for_file(file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Self::default()
        }
    }

    /// `(payload key, expected value)` pairs for every set field.
    #[must_use]
    pub fn conditions(&self) -> Vec<(&'static str, &str)> {
        [
            (FILE_PATH_FIELD, self.file_path.as_deref()),
            (FILE_NAME_FIELD, self.file_name.as_deref()),
            (FILE_EXTENSION_FIELD, self.file_extension.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }

    /// Like [`Self::conditions`], but an empty filter is an error rather
    /// than "match everything".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Filter`] if no field is set.
    pub fn required_conditions(&self) -> Result<Vec<(&'static str, &str)>, StoreError> {
        let conditions = self.conditions();
        if conditions.is_empty() {
            return Err(StoreError::Filter(
                "at least one equality condition is required".into(),
            ));
        }
        Ok(conditions)
    }

    #[must_use]
    pub fn matches(&self, metadata: &FileMetadata) -> bool {
        self.file_path
            .as_deref()
            .is_none_or(|p| p == metadata.file_path)
            && self
                .file_name
                .as_deref()
                .is_none_or(|n| n == metadata.file_name)
            && self
                .file_extension
                .as_deref()
                .is_none_or(|e| e == metadata.file_extension)
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub limit: u64,
    pub score_threshold: f32,
    pub include_payload: bool,
    pub filter: Option<PayloadFilter>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            score_threshold: 0.0,
            include_payload: true,
            filter: None,
        }
    }
}

impl QueryOptions {
    /// Candidates fetched per prefetch branch before fusion.
    #[must_use]
    pub fn prefetch_limit(&self) -> u64 {
        self.limit.saturating_mul(2)
    }
}

#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub score: f32,
    pub payload: Option<RecordPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(path: &str) -> FileMetadata {
        FileMetadata {
            file_path: path.into(),
            file_name: "a.js".into(),
            file_extension: "js".into(),
            file_size: 120,
            file_last_modified: 1_700_000_000_000,
            start_line: 1,
            end_line: 4,
        }
    }

    #[test]
    fn payload_serializes_with_camel_case_keys() {
        let payload = RecordPayload {
            code_string: "function a() {}".into(),
            metadata: metadata("src/a.js"),
        };
        let json = payload.to_json().unwrap();
        assert_eq!(json["codeString"], "function a() {}");
        assert_eq!(json["metadata"]["filePath"], "src/a.js");
        assert_eq!(json["metadata"]["fileLastModified"], 1_700_000_000_000_i64);
        assert_eq!(RecordPayload::from_json(json).unwrap(), payload);
    }

    #[test]
    fn empty_filter_is_rejected() {
        let err = PayloadFilter::default().required_conditions().unwrap_err();
        assert!(matches!(err, StoreError::Filter(_)));
    }

    #[test]
    fn filter_conditions_use_metadata_keys() {
        let filter = PayloadFilter {
            file_path: Some("src/a.js".into()),
            file_extension: Some("js".into()),
            ..PayloadFilter::default()
        };
        assert_eq!(
            filter.required_conditions().unwrap(),
            vec![("metadata.filePath", "src/a.js"), ("metadata.fileExtension", "js")]
        );
    }

    #[test]
    fn filter_matches_all_set_fields() {
        let md = metadata("src/a.js");
        assert!(PayloadFilter::for_file("src/a.js").matches(&md));
        assert!(!PayloadFilter::for_file("src/b.js").matches(&md));
        assert!(PayloadFilter::default().matches(&md));
        let mixed = PayloadFilter {
            file_path: Some("src/a.js".into()),
            file_name: Some("other.js".into()),
            file_extension: None,
        };
        assert!(!mixed.matches(&md));
    }

    #[test]
    fn query_options_defaults() {
        let opts = QueryOptions::default();
        assert_eq!(opts.limit, 10);
        assert_eq!(opts.prefetch_limit(), 20);
        assert!(opts.include_payload);
        assert!(opts.filter.is_none());
    }
}
