//! Payload truncation applied before a body is persisted

use serde_json::{json, Value};

/// Replaces the message payload of an oversized request body
pub const REQUEST_TRUNCATION_MARKER: &str = "[Truncated: request body exceeds size limit]";

/// Number of characters kept in an oversized response preview
pub const RESPONSE_PREVIEW_CHARS: usize = 1000;

/// Field of a request body that carries the conversation payload
const MESSAGE_FIELD: &str = "messages";

fn serialized_len(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

/// Truncate a request body whose serialized form exceeds `max_size` bytes.
///
/// Only the `messages` field is replaced, every other field is kept so the
/// record still shows model, parameters and tool definitions. A body that is
/// not a JSON object has nothing to preserve and becomes the marker itself.
///
/// Returns the body to store and whether it was truncated.
pub fn truncate_request_body(body: Value, max_size: usize) -> (Value, bool) {
    if serialized_len(&body) <= max_size {
        return (body, false);
    }

    match body {
        Value::Object(mut object) => {
            object.insert(
                MESSAGE_FIELD.to_string(),
                Value::String(REQUEST_TRUNCATION_MARKER.to_string()),
            );
            (Value::Object(object), true)
        }
        _ => (Value::String(REQUEST_TRUNCATION_MARKER.to_string()), true),
    }
}

/// Replace an oversized response body with a structural summary
///
/// `{"type": "truncated", "originalLength": n, "preview": "<first 1000 chars>..."}`
pub fn truncate_response_body(body: Value, max_size: usize) -> (Value, bool) {
    let serialized = match serde_json::to_string(&body) {
        Ok(s) => s,
        Err(_) => return (body, false),
    };

    if serialized.len() <= max_size {
        return (body, false);
    }

    let preview: String = serialized.chars().take(RESPONSE_PREVIEW_CHARS).collect();

    (
        json!({
            "type": "truncated",
            "originalLength": serialized.len(),
            "preview": format!("{}...", preview),
        }),
        true,
    )
}
