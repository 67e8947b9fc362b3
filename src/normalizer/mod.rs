//! Pure mapping from the archive's loosely structured item payload to [`CanonicalRecord`].
//!
//! Every field has an ordered list of candidate paths. Nested `item.*` paths come first since
//! that is where the item API puts most fields; top-level paths cover older payloads.
//! Normalization never fails. Fields that are missing or unusable are left empty.

mod extract;
mod record;

pub use record::CanonicalRecord;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

const TITLE_PATHS: &[&str] = &["item.title", "title"];
const DESCRIPTION_PATHS: &[&str] = &[
    "item.description",
    "description",
    "item.summary",
    "summary",
];
const SUBJECT_PATHS: &[&str] = &[
    "item.subjects",
    "subjects",
    "item.subject",
    "subject",
    "item.subject_headings",
    "subject_headings",
];
const CONTRIBUTOR_PATHS: &[&str] = &[
    "item.contributor_names",
    "item.contributors",
    "item.contributor",
    "contributor_names",
    "contributors",
    "contributor",
    "item.names",
    "names",
];
const DATE_PATHS: &[&str] = &[
    "item.date",
    "date",
    "item.created_published",
    "created_published",
    "item.dates",
    "dates",
];
const LOCATION_PATHS: &[&str] = &[
    "item.location",
    "location",
    "item.locations",
    "locations",
    "item.place",
    "place",
];

lazy_static! {
    static ref BLOCK_NUMBER: Regex = Regex::new(r"(?i)\bblock\s*(?:no\.?|#)?\s*(\d+)").unwrap();
}

/// Extracts the quilt block number from a title like "AIDS Quilt Block 2621".
pub fn block_number_from_title(title: &str) -> Option<i64> {
    BLOCK_NUMBER
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn normalize(payload: &Value) -> CanonicalRecord {
    let title = extract::first_scalar(payload, TITLE_PATHS);
    let block_number = title.as_deref().and_then(block_number_from_title);

    CanonicalRecord {
        description: extract::first_scalar(payload, DESCRIPTION_PATHS),
        subjects: extract::first_strings(payload, SUBJECT_PATHS),
        contributors: extract::first_strings(payload, CONTRIBUTOR_PATHS),
        date: extract::first_scalar(payload, DATE_PATHS),
        location: extract::first_scalar(payload, LOCATION_PATHS),
        title,
        block_number,
        raw: payload.clone(),
    }
}
