use crate::normalizer::CanonicalRecord;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fields that define whether a record changed. Raw payload and derived fields are excluded.
#[derive(Serialize)]
struct HashProjection<'a> {
    title: Option<&'a str>,
    description: Option<&'a str>,
    subjects: Vec<&'a str>,
    contributors: Vec<&'a str>,
    date: Option<&'a str>,
    location: Option<&'a str>,
}

fn sorted(values: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = values.iter().map(String::as_str).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// SHA-256 over the canonical projection, hex encoded.
pub fn content_hash(record: &CanonicalRecord) -> String {
    let projection = HashProjection {
        title: record.title.as_deref(),
        description: record.description.as_deref(),
        subjects: sorted(&record.subjects),
        contributors: sorted(&record.contributors),
        date: record.date.as_deref(),
        location: record.location.as_deref(),
    };
    // Serializing a struct of strings cannot fail
    let canonical = serde_json::to_vec(&projection).unwrap_or_default();
    format!("{:x}", Sha256::digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(title: &str, subjects: &[&str]) -> CanonicalRecord {
        CanonicalRecord {
            title: Some(title.to_string()),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            ..CanonicalRecord::default()
        }
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = content_hash(&record("Block 1", &["a"]));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_set_order() {
        assert_eq!(
            content_hash(&record("Block 1", &["a", "b"])),
            content_hash(&record("Block 1", &["b", "a"]))
        );
    }

    #[test]
    fn test_hash_changes_with_title() {
        assert_ne!(
            content_hash(&record("Block 1", &["a", "b"])),
            content_hash(&record("Block 1 Updated", &["a", "b"]))
        );
    }

    #[test]
    fn test_hash_ignores_raw_payload() {
        let mut a = record("Block 1", &["a"]);
        let mut b = a.clone();
        a.raw = json!({"fetched_at": 1});
        b.raw = json!({"fetched_at": 2});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_hash_distinguishes_fields() {
        let as_title = CanonicalRecord {
            title: Some("x".into()),
            ..CanonicalRecord::default()
        };
        let as_location = CanonicalRecord {
            location: Some("x".into()),
            ..CanonicalRecord::default()
        };
        assert_ne!(content_hash(&as_title), content_hash(&as_location));
    }
}
