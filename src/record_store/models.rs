use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of visiting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// First time this id was seen.
    New,
    /// Content hash differs from the stored one, fields were overwritten.
    Changed,
    /// Same content, only `last_checked` moved.
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::New => "new",
            UpsertOutcome::Changed => "changed",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }

    /// Whether the stored content was written.
    pub fn wrote_content(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// A persisted record as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub item_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub contributors: Vec<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub block_number: Option<i64>,
    pub raw: Value,
    pub content_hash: String,
    /// Unix timestamp in milliseconds.
    pub first_seen: i64,
    /// Unix timestamp in milliseconds.
    pub last_updated: i64,
    /// Unix timestamp in milliseconds.
    pub last_checked: i64,
    pub images_downloaded: bool,
    /// Pages found by the most recent visit that ran page discovery.
    pub page_count: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    ItemId,
    Title,
    FirstSeen,
    LastUpdated,
    LastChecked,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::ItemId => "item_id",
            SortField::Title => "title",
            SortField::FirstSeen => "first_seen",
            SortField::LastUpdated => "last_updated",
            SortField::LastChecked => "last_checked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "item_id" => Some(SortField::ItemId),
            "title" => Some(SortField::Title),
            "first_seen" => Some(SortField::FirstSeen),
            "last_updated" => Some(SortField::LastUpdated),
            "last_checked" => Some(SortField::LastChecked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub const MAX_PAGE_SIZE: usize = 100;

/// Pagination and ordering for [`RecordStore::list`](super::RecordStore::list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort_by: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

impl RecordQuery {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }
}

/// Aggregate view of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_records: usize,
    pub with_images: usize,
    pub without_images: usize,
    /// Records whose content changed in the last 7 days.
    pub updated_last_7_days: usize,
    /// Records first seen in the last 30 days.
    pub new_last_30_days: usize,
    pub last_updated: Option<i64>,
    pub database_size_bytes: u64,
    /// `PRAGMA quick_check` reported ok.
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_paging() {
        let query = RecordQuery {
            page: 3,
            page_size: 10,
            ..RecordQuery::default()
        };
        assert_eq!(query.limit(), 10);
        assert_eq!(query.offset(), 20);

        let clamped = RecordQuery {
            page: 0,
            page_size: 5000,
            ..RecordQuery::default()
        };
        assert_eq!(clamped.limit(), MAX_PAGE_SIZE);
        assert_eq!(clamped.offset(), 0);
    }

    #[test]
    fn test_sort_field_round_trip() {
        for field in [
            SortField::ItemId,
            SortField::Title,
            SortField::FirstSeen,
            SortField::LastUpdated,
            SortField::LastChecked,
        ] {
            assert_eq!(SortField::parse(field.column()), Some(field));
        }
        assert_eq!(SortField::parse("title; DROP TABLE records"), None);
    }
}
