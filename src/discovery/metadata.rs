//! Page discovery from an already-fetched item payload, without extra requests.

use super::models::page_id;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

const COUNT_FIELDS: &[&str] = &["segments", "digitized_items", "image_count", "pages"];

lazy_static! {
    static ref PAGE_ID: Regex = Regex::new(r"ms(\d{4,})").unwrap();
}

fn scopes(payload: &Value) -> impl Iterator<Item = &Value> {
    payload.get("item").into_iter().chain(std::iter::once(payload))
}

fn as_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `resources[].files`: either a count or one entry per page.
fn count_from_resources(payload: &Value) -> Option<u32> {
    scopes(payload)
        .filter_map(|scope| scope.get("resources")?.as_array())
        .flatten()
        .filter_map(|resource| match resource.get("files")? {
            Value::Array(files) => u32::try_from(files.len()).ok(),
            other => as_count(other),
        })
        .find(|n| *n > 0)
}

fn count_from_fields(payload: &Value) -> Option<u32> {
    scopes(payload)
        .flat_map(|scope| COUNT_FIELDS.iter().filter_map(move |f| scope.get(*f)))
        .filter_map(as_count)
        .find(|n| *n > 0)
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Explicit `msNNNN` ids in image and resource URLs.
fn explicit_page_numbers(payload: &Value) -> BTreeSet<u32> {
    let mut strings = Vec::new();
    for scope in scopes(payload) {
        for key in ["image_url", "files"] {
            if let Some(value) = scope.get(key) {
                collect_strings(value, &mut strings);
            }
        }
        if let Some(resources) = scope.get("resources").and_then(Value::as_array) {
            for resource in resources {
                for key in ["url", "image", "files"] {
                    if let Some(value) = resource.get(key) {
                        collect_strings(value, &mut strings);
                    }
                }
            }
        }
    }

    strings
        .iter()
        .flat_map(|s| PAGE_ID.captures_iter(s))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .collect()
}

/// Page ids derivable from the payload, capped at `max_pages`. `None` if the payload says nothing.
pub fn pages_from_metadata(payload: &Value, max_pages: u32) -> Option<BTreeSet<String>> {
    if let Some(count) = count_from_resources(payload).or_else(|| count_from_fields(payload)) {
        return Some((1..=count.min(max_pages)).map(page_id).collect());
    }

    let explicit: BTreeSet<String> = explicit_page_numbers(payload)
        .into_iter()
        .filter(|n| *n <= max_pages)
        .map(page_id)
        .collect();
    if explicit.is_empty() {
        None
    } else {
        Some(explicit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(pages: &BTreeSet<String>) -> Vec<&str> {
        pages.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_resource_file_count() {
        let payload = json!({"item": {}, "resources": [{"files": 3}]});
        let pages = pages_from_metadata(&payload, 100).unwrap();
        assert_eq!(ids(&pages), vec!["ms0001", "ms0002", "ms0003"]);
    }

    #[test]
    fn test_resource_file_list_counts_entries() {
        let payload = json!({"item": {"resources": [{"files": [[{"url": "a"}], [{"url": "b"}]]}]}});
        assert_eq!(pages_from_metadata(&payload, 100).unwrap().len(), 2);
    }

    #[test]
    fn test_count_fields_accept_digit_strings() {
        let payload = json!({"item": {"image_count": "4"}});
        assert_eq!(pages_from_metadata(&payload, 100).unwrap().len(), 4);

        let top_level = json!({"segments": 2});
        assert_eq!(pages_from_metadata(&top_level, 100).unwrap().len(), 2);
    }

    #[test]
    fn test_count_is_capped() {
        let payload = json!({"item": {"pages": 5000}});
        let pages = pages_from_metadata(&payload, 100).unwrap();
        assert_eq!(pages.len(), 100);
        assert_eq!(pages.iter().last().map(String::as_str), Some("ms0100"));
    }

    #[test]
    fn test_zero_or_garbage_counts_are_ignored() {
        let payload = json!({"item": {"pages": 0, "segments": "many", "image_count": -3}});
        assert_eq!(pages_from_metadata(&payload, 100), None);
    }

    #[test]
    fn test_explicit_page_ids() {
        let payload = json!({
            "item": {
                "image_url": ["https://tile.loc.gov/x:afc2019048_0001:ms0001/full/pct:25/0/default.jpg"],
                "resources": [
                    {"url": "https://www.loc.gov/resource/afc2019048.afc2019048_0001/?sp=1&ms0003"},
                    {"image": "https://tile.loc.gov/x:afc2019048_0001:ms0002/info.json"}
                ]
            }
        });
        let pages = pages_from_metadata(&payload, 100).unwrap();
        assert_eq!(ids(&pages), vec!["ms0001", "ms0002", "ms0003"]);
    }

    #[test]
    fn test_nothing_useful() {
        assert_eq!(pages_from_metadata(&json!({"item": {"title": "x"}}), 100), None);
        assert_eq!(pages_from_metadata(&json!(null), 100), None);
    }
}
