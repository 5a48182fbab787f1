//! Property-name fallback resolution.
//!
//! Upstream datasets spell the same concept under different column
//! names. Each logical field carries an ordered candidate list in its
//! level definition and [`resolve`] is the only place those lists are
//! walked.

use geo_hierarchy_models::PropertyBag;

/// Returns the first candidate key whose value is a non-empty string or a
/// number, trimmed and rendered as text.
///
/// Nulls, empty strings, booleans, arrays, and objects are skipped so
/// the next candidate gets a chance.
#[must_use]
pub fn resolve(properties: &PropertyBag, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .find_map(|key| properties.get(key).and_then(value_as_text))
}

fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
