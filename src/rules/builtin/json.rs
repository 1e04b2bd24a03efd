//! JSON Light and JSON verbose rules.

use super::fn_rule;
use crate::context::ServiceContext;
use crate::metadata::projected_properties;
use crate::payload::{json_light, PayloadFormat, PayloadType};
use crate::rules::{RequirementLevel, Rule, RuleDescriptor, RuleError, RuleVerdict};
use crate::version::ODataVersion;
use serde_json::{Map, Value};
use std::sync::Arc;

pub(super) fn rules() -> Vec<Arc<dyn Rule>> {
    vec![
        fn_rule(
            RuleDescriptor::new("ServiceDoc.Core.1001", "Core", RequirementLevel::Must)
                .with_description("Each service document element has string name and url members.")
                .with_payload_type(PayloadType::ServiceDoc)
                .with_payload_format(PayloadFormat::JsonLight),
            service_document_elements,
        ),
        fn_rule(
            RuleDescriptor::new("Entry.Core.2001", "Core", RequirementLevel::Should)
                .with_description("Entry members are declared properties of the entity type.")
                .with_payload_type(PayloadType::Entry)
                .with_payload_format(PayloadFormat::JsonLight)
                .with_require_metadata(true),
            entry_properties_declared,
        ),
        fn_rule(
            RuleDescriptor::new("Feed.Core.2002", "Core", RequirementLevel::Must)
                .with_description("A feed next link annotation is a string.")
                .with_payload_type(PayloadType::Feed)
                .with_payload_format(PayloadFormat::JsonLight),
            feed_next_link_is_string,
        ),
        fn_rule(
            RuleDescriptor::new("Entry.Core.2011", "Core", RequirementLevel::Must)
                .with_description("A verbose entry's __metadata carries a string uri.")
                .with_payload_type(PayloadType::Entry)
                .with_payload_format(PayloadFormat::Json),
            verbose_entry_has_uri,
        ),
        fn_rule(
            RuleDescriptor::new("Error.Core.3001", "Core", RequirementLevel::Must)
                .with_description("A V4 error object has string code and message members.")
                .with_payload_type(PayloadType::Error)
                .with_payload_format(PayloadFormat::JsonLight)
                .with_version(ODataVersion::V4),
            v4_error_members,
        ),
        Arc::new(IndividualPropertyValue::new()),
    ]
}

fn body(ctx: &ServiceContext) -> Result<Map<String, Value>, RuleError> {
    ctx.json_body()
        .ok_or_else(|| RuleError::Payload("body is not a JSON object".to_string()))
}

fn service_document_elements(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let body = body(ctx)?;
    let Some(elements) = body.get("value").and_then(Value::as_array) else {
        return Ok(RuleVerdict::fail("service document has no value array"));
    };
    let bad: Vec<usize> = elements
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            !(e.get("name").map(Value::is_string).unwrap_or(false)
                && e.get("url").map(Value::is_string).unwrap_or(false))
        })
        .map(|(i, _)| i)
        .collect();
    Ok(RuleVerdict::check(
        bad.is_empty(),
        format!("service document elements {:?} lack a string name or url", bad),
    ))
}

fn entry_properties_declared(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let body = body(ctx)?;
    let Some(md) = ctx.metadata() else {
        return Ok(RuleVerdict::not_applicable("metadata document did not parse"));
    };
    let Some(et) = json_light::context_target(&body, ctx.version(), Some(md))
        .and_then(|target| md.entity_type_of(&target.name))
    else {
        return Ok(RuleVerdict::not_applicable("entity type could not be resolved"));
    };
    if et.open_type {
        return Ok(RuleVerdict::not_applicable("open types allow dynamic properties"));
    }
    let observed = projected_properties(&body, et, md);
    Ok(RuleVerdict::check(
        observed.undeclared.is_empty(),
        format!(
            "properties not declared on {}: {}",
            et.qualified_name(),
            observed.undeclared.join(", ")
        ),
    ))
}

fn feed_next_link_is_string(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let body = body(ctx)?;
    match body.get("@odata.nextLink").or_else(|| body.get("odata.nextLink")) {
        None => Ok(RuleVerdict::pass()),
        Some(link) => Ok(RuleVerdict::check(link.is_string(), "next link is not a string")),
    }
}

fn verbose_entry_has_uri(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let body = body(ctx)?;
    let Some(metadata) = body.get("d").and_then(|d| d.get("__metadata")) else {
        return Ok(RuleVerdict::not_applicable("entry has no __metadata"));
    };
    Ok(RuleVerdict::check(
        metadata.get("uri").map(Value::is_string).unwrap_or(false),
        "__metadata.uri is missing or not a string",
    ))
}

fn v4_error_members(ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
    let body = body(ctx)?;
    let error = body
        .get(json_light::V4_ERROR)
        .ok_or_else(|| RuleError::Payload("no error member".to_string()))?;
    let code = error.get("code").map(Value::is_string).unwrap_or(false);
    let message = error.get("message").map(Value::is_string).unwrap_or(false);
    Ok(RuleVerdict::check(
        code && message,
        "error object must carry string code and message",
    ))
}

/// A JSON Light individual primitive or collection property wraps its value in `value`.
/// Complex properties are serialised inline and are not applicable.
pub struct IndividualPropertyValue {
    descriptor: RuleDescriptor,
}

impl IndividualPropertyValue {
    pub fn new() -> Self {
        Self {
            descriptor: RuleDescriptor::new(
                "IndividualProperty.Core.4201",
                "Core",
                RequirementLevel::Must,
            )
            .with_description("An individual primitive or collection property has a value member.")
            .with_payload_type(PayloadType::IndividualProperty)
            .with_payload_format(PayloadFormat::JsonLight)
            .with_version(ODataVersion::V3V4)
            .with_require_metadata(true),
        }
    }
}

impl Default for IndividualPropertyValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for IndividualPropertyValue {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn verify(&self, ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
        let body = body(ctx)?;
        let Some(md) = ctx.metadata() else {
            return Ok(RuleVerdict::not_applicable("metadata document did not parse"));
        };
        let Some(target) = json_light::context_target(&body, ctx.version(), Some(md)) else {
            return Ok(RuleVerdict::not_applicable("no context URL"));
        };
        let property = target
            .property
            .as_deref()
            .and_then(|name| md.entity_type_of(&target.name).map(|et| (et, name)))
            .and_then(|(et, name)| md.property(et, name));
        let Some(property) = property else {
            return Ok(RuleVerdict::not_applicable("property is not declared in metadata"));
        };
        if !property.is_collection() && md.complex_type(property.element_type()).is_some() {
            return Ok(RuleVerdict::not_applicable("complex property is serialised inline"));
        }
        Ok(RuleVerdict::check(
            body.contains_key("value"),
            format!("individual property '{}' has no value member", property.name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::V4_METADATA;
    use crate::rules::builtin::testing::context;
    use crate::rules::VerificationResult;

    const V4: &str = "Content-Type: application/json\r\nOData-Version: 4.0\r\n";

    #[test]
    fn test_individual_property_value() {
        let rule = IndividualPropertyValue::new();
        let with_value = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata#Products(1)/Name","value":"Widget"}"#,
            "http://svc/Products(1)/Name",
            Some(V4_METADATA),
        );
        let without_value = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata#Products(1)/Name","Name":"Widget"}"#,
            "http://svc/Products(1)/Name",
            Some(V4_METADATA),
        );
        let complex = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata#Products(1)/Address","Street":"x"}"#,
            "http://svc/Products(1)/Address",
            Some(V4_METADATA),
        );
        assert_eq!(rule.verify(&with_value).unwrap().result, VerificationResult::Pass);
        assert_eq!(rule.verify(&without_value).unwrap().result, VerificationResult::Fail);
        assert_eq!(
            rule.verify(&complex).unwrap().result,
            VerificationResult::NotApplicable
        );
    }

    #[test]
    fn test_entry_properties_declared() {
        let ok = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata#Products/$entity","ID":1,"Name":"x","Category@odata.navigationLink":"c"}"#,
            "http://svc/Products(1)",
            Some(V4_METADATA),
        );
        let extra = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata#Products/$entity","ID":1,"Colour":"red"}"#,
            "http://svc/Products(1)",
            Some(V4_METADATA),
        );
        assert_eq!(entry_properties_declared(&ok).unwrap().result, VerificationResult::Pass);
        let verdict = entry_properties_declared(&extra).unwrap();
        assert_eq!(verdict.result, VerificationResult::Fail);
        assert!(verdict.message.unwrap().contains("Colour"));
    }

    #[test]
    fn test_service_document_and_feed() {
        let sd = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata","value":[{"name":"Products","url":"Products"},{"name":"Me"}]}"#,
            "http://svc/",
            None,
        );
        assert_eq!(service_document_elements(&sd).unwrap().result, VerificationResult::Fail);

        let feed = context(
            V4,
            r#"{"@odata.context":"http://svc/$metadata#Products","value":[],"@odata.nextLink":5}"#,
            "http://svc/Products",
            None,
        );
        assert_eq!(feed_next_link_is_string(&feed).unwrap().result, VerificationResult::Fail);
    }

    #[test]
    fn test_verbose_entry_and_error() {
        let v2 = "Content-Type: application/json\r\nDataServiceVersion: 2.0\r\n";
        let entry = context(v2, r#"{"d":{"__metadata":{"uri":"http://svc/Products(1)"},"ID":1}}"#, "http://svc/Products(1)", None);
        assert_eq!(verbose_entry_has_uri(&entry).unwrap().result, VerificationResult::Pass);

        let error = context(V4, r#"{"error":{"code":1,"message":"boom"}}"#, "http://svc/Nope", None);
        assert_eq!(v4_error_members(&error).unwrap().result, VerificationResult::Fail);

        let not_json = context(V4, "<x/>", "http://svc/", None);
        assert!(matches!(v4_error_members(&not_json), Err(RuleError::Payload(_))));
    }
}
