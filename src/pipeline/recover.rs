//! Response recovery: model reply text → JSON field map.
//!
//! Models are told to answer with a bare JSON object, and mostly do. The two
//! deviations seen in practice are a fenced code block around the object and
//! chatty prose before or after it. Both are undone here, in order:
//!
//! 1. [`normalize_reply`] trims and strips one outer fence.
//! 2. [`recover_object`] slices from the first `{` to the last `}` when the
//!    text is not already an object. This can mis-slice a reply holding two
//!    separate objects; that case fails in the parser.
//! 3. [`parse_fields`] parses and injects `DocumentType` when absent.

use crate::error::PageError;
use crate::output::DOCUMENT_TYPE_KEY;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```[^\n]*\n(.*?)\s*```\z").unwrap());

/// Trim the reply and strip a fenced-code-block wrapper, whatever its
/// language tag.
pub fn normalize_reply(reply: &str) -> Cow<'_, str> {
    let trimmed = reply.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => Cow::Owned(caps[1].trim().to_string()),
        None => Cow::Borrowed(trimmed),
    }
}

fn looks_like_object(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}

/// Return the JSON object candidate inside `text`, or `None` when there is
/// no `{ … }` pair to slice.
pub fn recover_object(text: &str) -> Option<&str> {
    if looks_like_object(text) {
        return Some(text);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &text[start..=end];
    looks_like_object(candidate).then_some(candidate)
}

/// Parse a reply into a field map, tagging it with `doc_type` if the model
/// did not classify the page itself.
pub fn parse_fields(reply: &str, doc_type: &str) -> Result<Map<String, Value>, PageError> {
    let normalized = normalize_reply(reply);
    let candidate = recover_object(&normalized).ok_or(PageError::NoJsonFound)?;

    let mut fields: Map<String, Value> =
        serde_json::from_str(candidate).map_err(|e| PageError::JsonDecode {
            detail: e.to_string(),
        })?;

    fields
        .entry(DOCUMENT_TYPE_KEY)
        .or_insert_with(|| Value::String(doc_type.to_string()));
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_reply_with_language_tag() {
        let reply = "```json\n{\"WagesTipsOtherComp\": \"50000.00\"}\n```";
        let fields = parse_fields(reply, "W-2").unwrap();
        assert_eq!(
            Value::Object(fields),
            json!({"WagesTipsOtherComp": "50000.00", "DocumentType": "W-2"})
        );
    }

    #[test]
    fn fence_tag_does_not_matter() {
        let body = "{\"A\": \"1\", \"B\": [{\"C\": \"2\"}]}";
        let bare = parse_fields(body, "Invoice").unwrap();
        for wrapped in [
            format!("```json\n{body}\n```"),
            format!("```\n{body}\n```"),
            format!("```JSON \n{body}```"),
            format!("  \n```javascript\n{body}\n```\n\n"),
            format!("```json {body} ```"),
        ] {
            assert_eq!(parse_fields(&wrapped, "Invoice").unwrap(), bare, "{wrapped:?}");
        }

        // One-line fences are not stripped; bracket slicing recovers them.
        let one_line = format!("```json {body} ```");
        assert_eq!(normalize_reply(&one_line), one_line.as_str());
    }

    #[test]
    fn prose_around_object_is_sliced() {
        let fields =
            parse_fields("Here is the data: {\"TotalAmount\": \"120.00\"} Thanks!", "Invoice")
                .unwrap();
        assert_eq!(
            Value::Object(fields),
            json!({"TotalAmount": "120.00", "DocumentType": "Invoice"})
        );
    }

    #[test]
    fn no_braces_is_no_json_found() {
        assert_eq!(
            parse_fields("I cannot process this image.", "W-2").unwrap_err(),
            PageError::NoJsonFound
        );
        assert_eq!(recover_object("} backwards {"), None);
        assert_eq!(recover_object(""), None);
    }

    #[test]
    fn two_fragments_fail_to_decode() {
        let err = parse_fields("first {\"a\": 1} then {\"b\": 2}", "Other").unwrap_err();
        assert!(matches!(err, PageError::JsonDecode { .. }));
        assert!(err.to_string().starts_with("JSONDecodeError: "));
    }

    #[test]
    fn model_document_type_is_kept() {
        let fields = parse_fields(r#"{"DocumentType": "1099-INT", "Box1": "12.50"}"#, "Other")
            .unwrap();
        assert_eq!(fields["DocumentType"], json!("1099-INT"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn exact_object_round_trips() {
        let fields = parse_fields(r#"{"EmployerName": "ACME, Inc.", "StateInfo": []}"#, "W-2")
            .unwrap();
        assert_eq!(
            Value::Object(fields),
            json!({"EmployerName": "ACME, Inc.", "StateInfo": [], "DocumentType": "W-2"})
        );
    }

    #[test]
    fn unfenced_text_is_only_trimmed() {
        assert_eq!(normalize_reply("  {\"a\":1}\n"), "{\"a\":1}");
        assert_eq!(normalize_reply("```json\n{}\n```"), "{}");
    }
}
