//! Atom and CSDL rules.

use super::fn_rule;
use crate::context::ServiceContext;
use crate::payload::format::ATOM_NS;
use crate::payload::{PayloadFormat, PayloadType};
use crate::rules::{RequirementLevel, Rule, RuleDescriptor, RuleError, RuleVerdict};
use crate::version::ODataVersion;
use roxmltree::{Document, Node};
use std::sync::Arc;

pub(super) fn rules() -> Vec<Arc<dyn Rule>> {
    vec![
        fn_rule(
            RuleDescriptor::new("Feed.Core.2003", "Core", RequirementLevel::Must)
                .with_description("An Atom feed has an atom:id child.")
                .with_payload_type(PayloadType::Feed)
                .with_payload_format(PayloadFormat::Atom),
            atom_feed_has_id,
        ),
        fn_rule(
            RuleDescriptor::new("Entry.Core.2010", "Core", RequirementLevel::Should)
                .with_description("A media link entry's atom:content with src also declares type.")
                .with_payload_type(PayloadType::Entry)
                .with_payload_format(PayloadFormat::Atom)
                .with_media_link_entry(true),
            media_content_has_type,
        ),
        fn_rule(
            RuleDescriptor::new("Metadata.Core.5001", "Core", RequirementLevel::Must)
                .with_description("The Edmx Version matches the protocol version of the response.")
                .with_payload_type(PayloadType::Metadata),
            edmx_version_matches,
        ),
    ]
}

fn parse(ctx: &ServiceContext) -> Result<Document<'_>, RuleError> {
    Document::parse(ctx.response_payload().trim_start_matches('\u{feff}').trim())
        .map_err(|e| RuleError::Payload(e.to_string()))
}

fn atom_children<'a, 'input>(
    node: Node<'a, 'input>,
    local: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| {
        n.is_element() && n.tag_name().name() == local && n.tag_name().namespace() == Some(ATOM_NS)
    })
}

fn atom_feed_has_id(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let doc = parse(ctx)?;
    let has_id = atom_children(doc.root_element(), "id")
        .any(|id| id.text().map(|t| !t.trim().is_empty()).unwrap_or(false));
    Ok(RuleVerdict::check(has_id, "feed has no non-empty atom:id"))
}

fn media_content_has_type(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let doc = parse(ctx)?;
    let media: Vec<Node> = atom_children(doc.root_element(), "content")
        .filter(|c| c.attribute("src").is_some())
        .collect();
    if media.is_empty() {
        return Ok(RuleVerdict::not_applicable("entry content has no src attribute"));
    }
    Ok(RuleVerdict::check(
        media.iter().all(|c| c.attribute("type").is_some()),
        "atom:content with src has no type attribute",
    ))
}

fn edmx_version_matches(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let doc = parse(ctx)?;
    let Some(declared) = doc.root_element().attribute("Version") else {
        return Ok(RuleVerdict::fail("Edmx element has no Version attribute"));
    };
    let ok = match ctx.version() {
        ODataVersion::V4 => declared.starts_with("4."),
        ODataVersion::V1 | ODataVersion::V2 | ODataVersion::V3 => declared == "1.0",
        _ => return Ok(RuleVerdict::not_applicable("response version is unknown")),
    };
    Ok(RuleVerdict::check(
        ok,
        format!(
            "Edmx Version {} does not match protocol version {}",
            declared,
            ctx.version()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::testing::context;
    use crate::rules::VerificationResult;

    const ATOM: &str = "Content-Type: application/atom+xml\r\nDataServiceVersion: 3.0\r\n";

    #[test]
    fn test_atom_feed_id() {
        let with_id = context(
            ATOM,
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><id>http://svc/Products</id></feed>"#,
            "http://svc/Products",
            None,
        );
        let without = context(ATOM, r#"<feed xmlns="http://www.w3.org/2005/Atom"/>"#, "http://svc/Products", None);
        assert_eq!(atom_feed_has_id(&with_id).unwrap().result, VerificationResult::Pass);
        assert_eq!(atom_feed_has_id(&without).unwrap().result, VerificationResult::Fail);
    }

    #[test]
    fn test_media_content_type() {
        let mle = context(
            ATOM,
            r#"<entry xmlns="http://www.w3.org/2005/Atom"><content src="Photos(1)/$value"/></entry>"#,
            "http://svc/Photos(1)",
            None,
        );
        assert!(mle.is_media_link_entry());
        assert_eq!(media_content_has_type(&mle).unwrap().result, VerificationResult::Fail);
    }

    #[test]
    fn test_edmx_version() {
        let v4 = "Content-Type: application/xml\r\nOData-Version: 4.0\r\n";
        let doc = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx"/>"#;
        let legacy = r#"<edmx:Edmx Version="1.0" xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx"/>"#;
        let ok = context(v4, doc, "http://svc/$metadata", None);
        let mismatch = context(v4, legacy, "http://svc/$metadata", None);
        assert_eq!(ok.payload_type(), PayloadType::Metadata);
        assert_eq!(edmx_version_matches(&ok).unwrap().result, VerificationResult::Pass);
        assert_eq!(edmx_version_matches(&mismatch).unwrap().result, VerificationResult::Fail);
    }
}
