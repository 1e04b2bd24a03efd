//! Atom / XML classification ladder.

use super::format::ATOM_NS;
use super::PayloadType;
use roxmltree::{Document, Node};

/// OData metadata namespaces (V4 and V1-V3).
pub const METADATA_NAMESPACES: [&str; 2] = [
    "http://docs.oasis-open.org/odata/ns/metadata",
    "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata",
];

type XmlPredicate = fn(Node) -> bool;

/// Ordered predicates over the document root; the first match wins.
///
/// `ref` elements anywhere take precedence over `feed`, since a V4 entity-reference
/// collection is serialised as a feed of `m:ref` elements.
pub(crate) const XML_LADDER: &[(PayloadType, XmlPredicate)] = &[
    (PayloadType::ServiceDoc, is_service_root),
    (PayloadType::Metadata, is_edmx_root),
    (PayloadType::IndividualProperty, is_metadata_value_root),
    (PayloadType::Error, is_error_root),
    (PayloadType::Link, is_link_root),
    (PayloadType::EntityRef, has_ref_element),
    (PayloadType::Delta, is_delta_feed),
    (PayloadType::Feed, is_feed_root),
    (PayloadType::Entry, is_entry_root),
    (PayloadType::Property, is_well_formed),
];

fn is_service_root(root: Node) -> bool {
    local(root) == "service"
}

fn is_edmx_root(root: Node) -> bool {
    local(root) == "Edmx"
}

fn is_metadata_value_root(root: Node) -> bool {
    local(root) == "value" && in_metadata_ns(root)
}

fn is_error_root(root: Node) -> bool {
    local(root) == "error"
}

fn is_link_root(root: Node) -> bool {
    matches!(local(root), "uri" | "links")
}

fn has_ref_element(root: Node) -> bool {
    root.descendants().any(|n| n.is_element() && local(n) == "ref")
}

fn is_delta_feed(root: Node) -> bool {
    is_feed_root(root)
        && root
            .descendants()
            .any(|n| n.is_element() && local(n) == "deleted-entry")
}

fn is_feed_root(root: Node) -> bool {
    local(root) == "feed"
}

fn is_entry_root(root: Node) -> bool {
    local(root) == "entry"
}

fn is_well_formed(_root: Node) -> bool {
    true
}

fn local<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

fn in_metadata_ns(node: Node) -> bool {
    node.tag_name()
        .namespace()
        .map(|ns| METADATA_NAMESPACES.contains(&ns))
        .unwrap_or(false)
}

fn parse(payload: &str) -> Option<Document<'_>> {
    Document::parse(payload.trim_start_matches('\u{feff}').trim()).ok()
}

pub fn classify(payload: &str) -> PayloadType {
    if payload.trim().is_empty() {
        return PayloadType::None;
    }
    let Some(doc) = parse(payload) else {
        return PayloadType::Other;
    };
    let root = doc.root_element();
    XML_LADDER
        .iter()
        .find(|(_, predicate)| predicate(root))
        .map(|(payload_type, _)| *payload_type)
        .unwrap_or(PayloadType::Other)
}

/// An Atom entry whose `content` element points at an external media resource.
pub fn is_media_link_entry(payload: &str) -> bool {
    let Some(doc) = parse(payload) else {
        return false;
    };
    let root = doc.root_element();
    if local(root) != "entry" {
        return false;
    }
    root.children()
        .filter(|n| n.is_element())
        .any(|n| {
            local(n) == "content"
                && n.tag_name().namespace() == Some(ATOM_NS)
                && n.attribute("src").is_some()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_roots() {
        let cases = [
            (r#"<service xmlns="http://www.w3.org/2007/app"/>"#, PayloadType::ServiceDoc),
            (
                r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx"/>"#,
                PayloadType::Metadata,
            ),
            (
                r#"<m:value xmlns:m="http://docs.oasis-open.org/odata/ns/metadata">Widget</m:value>"#,
                PayloadType::IndividualProperty,
            ),
            (
                r#"<m:error xmlns:m="http://docs.oasis-open.org/odata/ns/metadata"><m:code/><m:message>x</m:message></m:error>"#,
                PayloadType::Error,
            ),
            (
                r#"<uri xmlns="http://schemas.microsoft.com/ado/2007/08/dataservices">http://svc/Products(1)</uri>"#,
                PayloadType::Link,
            ),
            (
                r#"<links xmlns="http://schemas.microsoft.com/ado/2007/08/dataservices"><uri>a</uri></links>"#,
                PayloadType::Link,
            ),
            (
                r#"<m:ref xmlns:m="http://docs.oasis-open.org/odata/ns/metadata" id="http://svc/Products(1)"/>"#,
                PayloadType::EntityRef,
            ),
            (
                r#"<d:Name xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices">Widget</d:Name>"#,
                PayloadType::Property,
            ),
        ];
        for (payload, expected) in cases {
            assert_eq!(classify(payload), expected, "payload: {}", payload);
        }
    }

    #[test]
    fn test_value_root_outside_metadata_ns_is_property() {
        assert_eq!(classify("<value>1</value>"), PayloadType::Property);
    }

    #[test]
    fn test_feed_entry_delta_and_ref_feed() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry/></feed>"#;
        let entry = r#"<entry xmlns="http://www.w3.org/2005/Atom"><content/></entry>"#;
        let delta = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:at="http://purl.org/atompub/tombstones/1.0"><at:deleted-entry ref="x"/></feed>"#;
        let ref_feed = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:m="http://docs.oasis-open.org/odata/ns/metadata"><m:ref id="a"/></feed>"#;
        assert_eq!(classify(feed), PayloadType::Feed);
        assert_eq!(classify(entry), PayloadType::Entry);
        assert_eq!(classify(delta), PayloadType::Delta);
        assert_eq!(classify(ref_feed), PayloadType::EntityRef);
    }

    #[test]
    fn test_malformed_is_other() {
        assert_eq!(classify("<feed>"), PayloadType::Other);
        assert_eq!(classify(""), PayloadType::None);
    }

    #[test]
    fn test_media_link_entry() {
        let mle = r#"<entry xmlns="http://www.w3.org/2005/Atom"><content type="image/png" src="Photos(1)/$value"/></entry>"#;
        let plain = r#"<entry xmlns="http://www.w3.org/2005/Atom"><content type="application/xml"/></entry>"#;
        assert!(is_media_link_entry(mle));
        assert!(!is_media_link_entry(plain));
        assert!(!is_media_link_entry("{}"));
    }
}
