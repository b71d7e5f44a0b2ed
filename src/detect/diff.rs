//! Field-level record comparison

use crate::record::Record;
use crate::storage::FieldChange;
use std::collections::BTreeMap;

/// Longest value rendering in a human-readable difference line
const DIFF_VALUE_MAX_CHARS: usize = 100;

/// Symmetric field-level difference between two records
///
/// Every field present in either record and unequal between them yields an
/// entry; a field absent on one side appears as `None`.
pub fn field_diff(old: &Record, new: &Record) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();

    let keys = old.fields.keys().chain(new.fields.keys());
    for key in keys {
        if changes.contains_key(key) {
            continue;
        }
        let old_value = old.get(key);
        let new_value = new.get(key);
        if old_value != new_value {
            changes.insert(
                key.clone(),
                FieldChange {
                    old: old_value.cloned(),
                    new: new_value.cloned(),
                },
            );
        }
    }

    changes
}

/// Human-readable difference lines between an original and a stored record
pub fn describe_differences(original: &Record, stored: &Record) -> Vec<String> {
    field_diff(original, stored)
        .iter()
        .map(|(key, change)| {
            format!(
                "{}: '{}' != '{}'",
                key,
                render_value(change.old.as_ref()),
                render_value(change.new.as_ref()),
            )
        })
        .collect()
}

fn render_value(value: Option<&serde_json::Value>) -> String {
    let rendered = match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "None".to_string(),
    };
    match rendered.char_indices().nth(DIFF_VALUE_MAX_CHARS) {
        Some((idx, _)) => rendered[..idx].to_string(),
        None => rendered,
    }
}
