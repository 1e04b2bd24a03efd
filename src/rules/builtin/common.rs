//! Header rules that apply to every response.

use super::fn_rule;
use crate::context::ServiceContext;
use crate::rules::{RequirementLevel, Rule, RuleDescriptor, RuleError, RuleVerdict};
use std::sync::Arc;

pub(super) fn rules() -> Vec<Arc<dyn Rule>> {
    vec![
        fn_rule(
            RuleDescriptor::new("Common.Core.0001", "Core", RequirementLevel::Must)
                .with_description("A response with a body must declare its Content-Type."),
            content_type_declared,
        ),
        fn_rule(
            RuleDescriptor::new("Common.Core.0002", "Core", RequirementLevel::Should)
                .with_description(
                    "A response should carry an OData-Version or DataServiceVersion header.",
                ),
            version_header_present,
        ),
    ]
}

fn content_type_declared(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    if ctx.response_payload().trim().is_empty() {
        return Ok(RuleVerdict::not_applicable("response has no body"));
    }
    Ok(RuleVerdict::check(
        ctx.response_header("Content-Type").is_some(),
        "Content-Type header is missing",
    ))
}

fn version_header_present(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let present = ctx.response_header("OData-Version").is_some()
        || ctx.response_header("DataServiceVersion").is_some();
    Ok(RuleVerdict::check(
        present,
        "neither OData-Version nor DataServiceVersion is present",
    ))
}
