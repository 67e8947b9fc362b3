use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical shape of one archive item after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CanonicalRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deduplicated, in payload order.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Deduplicated, in payload order.
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Quilt block number parsed from the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<i64>,
    /// Untouched upstream payload.
    #[serde(default)]
    pub raw: Value,
}

impl CanonicalRecord {
    /// Whether any content field survived normalization.
    pub fn has_content(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.date.is_some()
            || self.location.is_some()
            || !self.subjects.is_empty()
            || !self.contributors.is_empty()
    }
}
