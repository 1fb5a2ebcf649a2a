//! Canonical text extraction from heterogeneous chunk payloads.

use serde_json::Value;

/// Extract text from a chunk payload of unspecified shape.
///
/// Handles a plain string, a list of strings, and a list of content-part
/// objects (e.g. `{"type": "text", "text": "..."}` or `{"text": "..."}`).
/// List elements without a string `text` field contribute nothing; any other
/// payload shape yields the empty string. Never fails, and concatenation
/// order equals input order.
pub fn extract_chunk_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(text) => text.as_str(),
                Value::Object(fields) => {
                    fields.get("text").and_then(Value::as_str).unwrap_or("")
                }
                _ => "",
            })
            .collect(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_string_passes_through() {
        assert_eq!(extract_chunk_text(&json!("hello")), "hello");
        assert_eq!(extract_chunk_text(&json!("")), "");
    }

    #[test]
    fn test_list_of_strings_concatenated_in_order() {
        assert_eq!(extract_chunk_text(&json!(["a", "b", "c"])), "abc");
    }

    #[test]
    fn test_content_part_objects() {
        let content = json!([
            {"type": "text", "text": "para"},
            {"text": "cetamol"},
        ]);
        assert_eq!(extract_chunk_text(&content), "paracetamol");
    }

    #[test]
    fn test_mixed_parts_preserve_order() {
        // The documented example: [{"type":"text","text":"hi"}, "!"] -> "hi!"
        let content = json!([{"type": "text", "text": "hi"}, "!"]);
        assert_eq!(extract_chunk_text(&content), "hi!");
    }

    #[test]
    fn test_parts_without_string_text_contribute_nothing() {
        let content = json!([
            {"type": "tool_use", "id": "t1"},
            {"text": 42},
            "ok",
            null,
            7,
        ]);
        assert_eq!(extract_chunk_text(&content), "ok");
    }

    #[test]
    fn test_unrecognized_shapes_yield_empty() {
        assert_eq!(extract_chunk_text(&json!(null)), "");
        assert_eq!(extract_chunk_text(&json!(12.5)), "");
        assert_eq!(extract_chunk_text(&json!({"text": "not a list"})), "");
    }
}
