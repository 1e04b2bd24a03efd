//! Rule applicability: descriptor constraints against a built context.

use super::RuleDescriptor;
use crate::context::ServiceContext;

/// Whether every declared constraint of `descriptor` holds for `ctx`.
///
/// Pure: computed from the descriptor and the context alone, without running the rule.
pub fn is_rule_applicable(descriptor: &RuleDescriptor, ctx: &ServiceContext) -> bool {
    mismatch(descriptor, ctx).is_none()
}

/// The first constraint that excludes the rule, by dimension name.
pub fn mismatch(descriptor: &RuleDescriptor, ctx: &ServiceContext) -> Option<&'static str> {
    if let Some(payload_type) = descriptor.payload_type {
        if payload_type != ctx.payload_type() {
            return Some("payload_type");
        }
    }
    if let Some(format) = descriptor.payload_format {
        if format != ctx.payload_format() {
            return Some("payload_format");
        }
    }
    if let Some(version) = descriptor.version {
        if !version.contains(ctx.version()) {
            return Some("version");
        }
    }
    if descriptor.require_metadata == Some(true) && !ctx.has_metadata() {
        return Some("require_metadata");
    }
    if let Some(offline) = descriptor.is_offline_context {
        if offline != ctx.is_offline_context() {
            return Some("is_offline_context");
        }
    }
    if let Some(projection) = descriptor.projection {
        if Some(projection) != ctx.projection() {
            return Some("projection");
        }
    }
    if let Some(is_mle) = descriptor.is_media_link_entry {
        if is_mle != ctx.is_media_link_entry() {
            return Some("is_media_link_entry");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HttpResponse;
    use crate::payload::{PayloadFormat, PayloadType};
    use crate::rules::RequirementLevel;
    use crate::version::ODataVersion;

    fn entry_ctx(headers: &str) -> ServiceContext {
        ServiceContext::builder(
            HttpResponse::new(
                200,
                headers,
                r#"{"@odata.context":"http://svc/$metadata#Products/$entity","ID":1}"#,
            ),
            "http://svc/Products(1)",
        )
        .build()
        .unwrap()
    }

    fn descriptor() -> RuleDescriptor {
        RuleDescriptor::new("Entry.Core.9", "Core", RequirementLevel::Must)
    }

    #[test]
    fn test_payload_type_and_format() {
        let ctx = entry_ctx("Content-Type: application/json\r\nOData-Version: 4.0\r\n");
        assert!(is_rule_applicable(&descriptor().with_payload_type(PayloadType::Entry), &ctx));
        assert_eq!(
            mismatch(&descriptor().with_payload_type(PayloadType::Feed), &ctx),
            Some("payload_type")
        );
        assert_eq!(
            mismatch(&descriptor().with_payload_format(PayloadFormat::Atom), &ctx),
            Some("payload_format")
        );
    }

    #[test]
    fn test_version_range() {
        let ctx = entry_ctx("Content-Type: application/json\r\nOData-Version: 4.0\r\n");
        assert!(is_rule_applicable(&descriptor().with_version(ODataVersion::V3V4), &ctx));
        assert!(is_rule_applicable(&descriptor().with_version(ODataVersion::All), &ctx));
        assert!(!is_rule_applicable(&descriptor().with_version(ODataVersion::V1V2), &ctx));
        assert!(!is_rule_applicable(&descriptor().with_version(ODataVersion::V3), &ctx));
    }

    #[test]
    fn test_metadata_requirement() {
        let ctx = entry_ctx("Content-Type: application/json\r\nOData-Version: 4.0\r\n");
        assert_eq!(
            mismatch(&descriptor().with_require_metadata(true), &ctx),
            Some("require_metadata")
        );
        assert!(is_rule_applicable(&descriptor().with_require_metadata(false), &ctx));
    }

    #[test]
    fn test_flags() {
        let ctx = entry_ctx("Content-Type: application/json\r\nOData-Version: 4.0\r\n");
        assert!(is_rule_applicable(&descriptor().with_offline_context(false), &ctx));
        assert!(!is_rule_applicable(&descriptor().with_offline_context(true), &ctx));
        assert!(!is_rule_applicable(&descriptor().with_media_link_entry(true), &ctx));
        // No projection was derived, so neither declared value matches.
        assert!(!is_rule_applicable(&descriptor().with_projection(false), &ctx));
        assert!(!is_rule_applicable(&descriptor().with_projection(true), &ctx));
    }
}
