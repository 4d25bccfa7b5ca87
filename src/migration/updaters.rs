//! File updaters (§4.6): per-tag transforms run over the raw operation
//! payload before typed decoding, so that old document shapes keep working.

use serde_json::Value;

/// `columns: ["a","b"]` -> `columns: [{"column":"a"},{"column":"b"}]`,
/// preserving order.
pub fn update_create_index_columns_list(payload: &mut Value) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    let Some(Value::Array(columns)) = obj.get("columns") else {
        return;
    };
    if !columns.iter().all(Value::is_string) {
        return;
    }
    let rewritten: Vec<Value> = columns
        .iter()
        .filter_map(Value::as_str)
        .map(|name| serde_json::json!({ "column": name }))
        .collect();
    obj.insert("columns".to_string(), Value::Array(rewritten));
}

/// `columns: {a:{}, b:{sort:"DESC"}}` -> an ordered array, copying each
/// column's per-column settings. `serde_json::Map` preserves insertion order
/// only when built with the `preserve_order` feature; absent that, the
/// resulting order is whatever the source map iterates in (§9 Open
/// Question 3 — the legacy map form is not order-preserving in general).
pub fn update_create_index_columns_map_to_array(payload: &mut Value) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    let Some(Value::Object(columns)) = obj.get("columns").cloned() else {
        return;
    };
    let rewritten: Vec<Value> = columns
        .into_iter()
        .map(|(name, mut settings)| {
            if let Some(settings_obj) = settings.as_object_mut() {
                settings_obj.insert("column".to_string(), Value::String(name));
                settings
            } else {
                serde_json::json!({ "column": name })
            }
        })
        .collect();
    obj.insert("columns".to_string(), Value::Array(rewritten));
}

/// Runs the registered chain, in order, for the given tag. Only
/// `create_index` has updaters today; other tags pass through untouched.
pub fn apply(tag: &str, payload: &mut Value) {
    if tag == "create_index" {
        update_create_index_columns_list(payload);
        update_create_index_columns_map_to_array(payload);
    }
}
