//! JSON verbose (`{"d": ...}`) classification ladder.

use super::PayloadType;
use serde_json::{Map, Value};

type VerbosePredicate = fn(&Value) -> bool;

/// Ordered predicates over the token inside the `d` envelope; the first match wins.
///
/// | # | Type | Condition |
/// |---|------|-----------|
/// | 1 | Feed | inner token is an array |
/// | 2 | Feed | V2 `{"results": [...]}` wrapper, items not all `uri`-only |
/// | 3 | Link | V2 `{"results": [...]}` wrapper of `uri`-only items |
/// | 4 | Entry | object with more than one member, or a lone `__metadata` |
/// | 5 | ServiceDoc | single `EntitySets` array |
/// | 6 | Link | object holding only `uri` |
/// | 7 | Property | any other single-member object |
///
/// Rows 2 and 3 sit before Entry so that a `results` + `__count` pair is not taken for an
/// entry.
pub(crate) const VERBOSE_LADDER: &[(PayloadType, VerbosePredicate)] = &[
    (PayloadType::Feed, is_feed),
    (PayloadType::Feed, is_results_feed),
    (PayloadType::Link, is_results_links),
    (PayloadType::Entry, is_entry),
    (PayloadType::ServiceDoc, is_service_doc),
    (PayloadType::Link, is_link),
    (PayloadType::Property, is_single_property),
];

/// `{"error": {"message": {...}}}` at the top level (no `d` envelope).
pub fn is_error_object(top: &Map<String, Value>) -> bool {
    top.len() == 1
        && top
            .get("error")
            .and_then(Value::as_object)
            .and_then(|e| e.get("message"))
            .map(Value::is_object)
            .unwrap_or(false)
}

fn results(inner: &Value) -> Option<&Vec<Value>> {
    inner.get("results").and_then(Value::as_array)
}

fn is_uri_only(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.len() == 1 && o.get("uri").map(Value::is_string).unwrap_or(false))
        .unwrap_or(false)
}

fn is_link_collection(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(is_uri_only)
}

fn is_feed(inner: &Value) -> bool {
    inner.is_array()
}

fn is_results_feed(inner: &Value) -> bool {
    results(inner)
        .map(|items| !is_link_collection(items))
        .unwrap_or(false)
}

fn is_results_links(inner: &Value) -> bool {
    results(inner)
        .map(|items| is_link_collection(items))
        .unwrap_or(false)
}

fn is_link(inner: &Value) -> bool {
    is_uri_only(inner)
}

fn is_entry(inner: &Value) -> bool {
    inner
        .as_object()
        .map(|o| o.len() > 1 || o.contains_key("__metadata"))
        .unwrap_or(false)
}

fn is_service_doc(inner: &Value) -> bool {
    inner
        .as_object()
        .map(|o| o.len() == 1 && o.get("EntitySets").map(Value::is_array).unwrap_or(false))
        .unwrap_or(false)
}

fn is_single_property(inner: &Value) -> bool {
    inner.as_object().map(|o| o.len() == 1).unwrap_or(false)
}

pub fn classify(payload: &str) -> PayloadType {
    if payload.trim().is_empty() {
        return PayloadType::None;
    }
    let Ok(Value::Object(top)) = serde_json::from_str::<Value>(payload) else {
        return PayloadType::Other;
    };
    if is_error_object(&top) {
        return PayloadType::Error;
    }
    let inner = match top.get("d") {
        Some(inner) if top.len() == 1 => inner,
        _ => return PayloadType::Other,
    };
    VERBOSE_LADDER
        .iter()
        .find(|(_, predicate)| predicate(inner))
        .map(|(payload_type, _)| *payload_type)
        .unwrap_or(PayloadType::Other)
}

/// A verbose entry whose `__metadata` carries a `media_src`.
pub fn is_media_link_entry(payload: &str) -> bool {
    serde_json::from_str::<Value>(payload)
        .ok()
        .as_ref()
        .and_then(|v| v.get("d"))
        .and_then(|d| d.get("__metadata"))
        .map(|m| m.get("media_src").is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_ladder() {
        let cases = [
            (r#"{"d":[{"ID":1}]}"#, PayloadType::Feed),
            (r#"{"d":[]}"#, PayloadType::Feed),
            (r#"{"d":{"results":[{"ID":1}],"__count":"1"}}"#, PayloadType::Feed),
            (r#"{"d":{"ID":1,"Name":"Widget"}}"#, PayloadType::Entry),
            (r#"{"d":{"__metadata":{"uri":"x"}}}"#, PayloadType::Entry),
            (r#"{"d":{"EntitySets":["Products"]}}"#, PayloadType::ServiceDoc),
            (r#"{"d":{"uri":"http://svc/Products(1)"}}"#, PayloadType::Link),
            (r#"{"d":{"results":[{"uri":"a"},{"uri":"b"}]}}"#, PayloadType::Link),
            (r#"{"d":[{"uri":"http://svc/Products(1)"}]}"#, PayloadType::Feed),
            (r#"{"d":{"Name":"Widget"}}"#, PayloadType::Property),
            (r#"{"error":{"code":"","message":{"lang":"en","value":"x"}}}"#, PayloadType::Error),
            (r#"{"d":{}}"#, PayloadType::Other),
            (r#"{"x":{}}"#, PayloadType::Other),
            ("[1,2]", PayloadType::Other),
            ("", PayloadType::None),
        ];
        for (payload, expected) in cases {
            assert_eq!(classify(payload), expected, "payload: {}", payload);
        }
    }

    #[test]
    fn test_array_is_a_feed_before_any_link_check() {
        let links = r#"{"d":[{"uri":"http://svc/Products(1)"},{"uri":"http://svc/Products(2)"}]}"#;
        assert_eq!(classify(links), PayloadType::Feed);
        let inner: Value = serde_json::from_str(r#"[{"uri":"x"}]"#).unwrap();
        let first = VERBOSE_LADDER.iter().position(|(_, p)| p(&inner));
        assert_eq!(first, Some(0));
    }

    #[test]
    fn test_error_requires_message_object() {
        assert_eq!(
            classify(r#"{"error":{"code":"","message":"plain"}}"#),
            PayloadType::Other
        );
    }

    #[test]
    fn test_media_link_entry() {
        assert!(is_media_link_entry(
            r#"{"d":{"__metadata":{"uri":"x","media_src":"Photos(1)/$value"},"ID":1}}"#
        ));
        assert!(!is_media_link_entry(r#"{"d":{"__metadata":{"uri":"x"},"ID":1}}"#));
    }
}
