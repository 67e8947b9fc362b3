use serde_json::Value;

/// Keys whose string value stands in for an object in a list of names or subjects.
const OBJECT_LABEL_KEYS: &[&str] = &["title", "name", "label", "value"];

/// Resolves a dotted path such as `item.title` against a JSON value.
pub fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(payload, |current, key| current.as_object()?.get(key))
}

/// Flattens a payload value into trimmed, non-empty strings, deduplicated in order.
pub fn strings_of(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_strings(value, &mut out);
    let mut seen = std::collections::HashSet::new();
    out.retain(|s| seen.insert(s.clone()));
    out
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(label) = OBJECT_LABEL_KEYS
                .iter()
                .filter_map(|k| map.get(*k))
                .find(|v| v.is_string())
            {
                collect_strings(label, out);
            }
        }
    }
}

/// First candidate path holding at least one usable string.
pub fn first_strings(payload: &Value, paths: &[&str]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| lookup(payload, path))
        .map(strings_of)
        .find(|values| !values.is_empty())
        .unwrap_or_default()
}

/// Like [`first_strings`] but collapsed to a scalar: singletons as-is, multiples joined.
pub fn first_scalar(payload: &Value, paths: &[&str]) -> Option<String> {
    let values = first_strings(payload, paths);
    match values.len() {
        0 => None,
        1 => values.into_iter().next(),
        _ => Some(values.join("; ")),
    }
}
