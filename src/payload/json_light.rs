//! JSON Light classification ladder (V3 `odata.metadata`, V4 `@odata.context`).
//!
//! The semantic type is read off the context URL in the payload's *first* member. The
//! fragment after `$metadata#` is split on `/` and matched against an ordered table of
//! mutually exclusive predicates:
//!
//! | # | Type | Condition |
//! |---|------|-----------|
//! | 0 | Error | single `odata.error` (V3, object message) / `error` (V4, string message) member |
//! | 1 | ServiceDoc | context URL ends with `$metadata` |
//! | 2 | Delta | ends with `$delta` (V4) or `@delta` (V3) |
//! | 3 | EntityRef | ends with `$ref` / `Collection($ref)`, or has a `$links` segment (V3) |
//! | 4 | Property | single fragment segment holding a qualified primitive/complex type name |
//! | 5 | Feed | target is an entity set (optionally with a `(a,b)` select list), body `value` is an array of objects (or empty) |
//! | 5 | Entry | target is an entity set or singleton, body has no `value` array |
//! | 6 | IndividualProperty | `entitySet(key)/property` with a normal declared property |
//!
//! Without a metadata document, steps 5 and 6 fall back to syntax: any unqualified
//! identifier is taken as an entity set, and a key predicate followed by a further segment
//! is taken as an individual property. A key containing a `/` therefore splits into an
//! extra segment, loses its key predicate and classifies as `Other`.

use super::PayloadType;
use crate::metadata::MetadataDocument;
use crate::version::ODataVersion;
use serde_json::{Map, Value};

pub const V3_CONTEXT: &str = "odata.metadata";
pub const V4_CONTEXT: &str = "@odata.context";
pub const V3_ERROR: &str = "odata.error";
pub const V4_ERROR: &str = "error";

const MEDIA_ANNOTATIONS: [&str; 6] = [
    "odata.mediaReadLink",
    "@odata.mediaReadLink",
    "odata.mediaEditLink",
    "@odata.mediaEditLink",
    "odata.mediaContentType",
    "@odata.mediaContentType",
];

/// A parsed JSON Light context URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUrl {
    pub raw: String,
    /// Everything before `$metadata`.
    pub service_root: String,
    /// Text after `$metadata#`; `None` when the URL ends with `$metadata`.
    pub fragment: Option<String>,
    /// Non-empty `/`-separated fragment segments.
    pub segments: Vec<String>,
}

impl ContextUrl {
    /// Parse a context URL. Returns `None` when it does not reference `$metadata`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_matches('"');
        let idx = raw.rfind("$metadata")?;
        let after = &raw[idx + "$metadata".len()..];
        let fragment = if after.is_empty() {
            None
        } else {
            Some(after.strip_prefix('#')?.to_string())
        };
        let segments = fragment
            .as_deref()
            .map(|f| {
                f.split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            raw: raw.to_string(),
            service_root: raw[..idx].to_string(),
            fragment,
            segments,
        })
    }

    pub fn is_service_document(&self) -> bool {
        self.fragment.is_none()
    }

    pub fn is_delta(&self) -> bool {
        self.fragment.is_some() && (self.raw.ends_with("$delta") || self.raw.ends_with("/@delta"))
    }

    pub fn is_entity_ref(&self) -> bool {
        self.fragment.is_some()
            && !self.is_delta()
            && (self.raw.ends_with("$ref")
                || self.raw.ends_with("Collection($ref)")
                || self.segments.iter().any(|s| s == "$links"))
    }
}

/// Where the fragment points, after container prefixes and markers are removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextTarget {
    /// Entity-set, singleton or type name from the leading segment (key predicate removed).
    pub name: String,
    pub has_key: bool,
    /// Parenthesised select list such as `Products(ID,Name)`, in place of a key.
    pub select_list: bool,
    /// `$entity` (V4) or `@Element` (V3) was present.
    pub entry_marker: bool,
    /// First segment after the target that is neither a marker nor a type cast.
    pub property: Option<String>,
}

impl ContextTarget {
    fn analyse(url: &ContextUrl, metadata: Option<&MetadataDocument>) -> Self {
        let mut segments: &[String] = &url.segments;
        if segments.len() > 1
            && segments[0].contains('.')
            && metadata.map(|m| m.container(&segments[0]).is_some()).unwrap_or(false)
        {
            segments = &segments[1..];
        }

        let Some((head, rest)) = segments.split_first() else {
            return Self::default();
        };
        let (name, parens) = split_parenthesised(head);
        let select_list = parens.map(is_select_list).unwrap_or(false);
        let mut target = ContextTarget {
            name: name.to_string(),
            has_key: parens.is_some() && !select_list,
            select_list,
            ..Default::default()
        };

        for segment in rest {
            match segment.as_str() {
                "$entity" | "@Element" => target.entry_marker = true,
                s if is_type_cast(s, metadata) => {}
                s => {
                    target.property = Some(s.to_string());
                    break;
                }
            }
        }
        target
    }
}

pub(crate) fn split_key_predicate(segment: &str) -> (&str, bool) {
    let (name, parens) = split_parenthesised(segment);
    (name, parens.is_some())
}

/// Name and the text inside a trailing `(...)`, if any.
fn split_parenthesised(segment: &str) -> (&str, Option<&str>) {
    match segment.find('(') {
        Some(open) if segment.ends_with(')') && open > 0 => {
            (&segment[..open], Some(&segment[open + 1..segment.len() - 1]))
        }
        _ => (segment, None),
    }
}

/// `ID,Name` or `*` rather than a key such as `1`, `'a'` or `A=1,B=2`.
fn is_select_list(inner: &str) -> bool {
    !inner.is_empty()
        && inner.split(',').all(|item| {
            let item = item.trim();
            item == "*"
                || (item.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
                    && item.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '*')
                    && !matches!(item, "true" | "false" | "null"))
        })
}

fn is_type_cast(segment: &str, metadata: Option<&MetadataDocument>) -> bool {
    segment.contains('.')
        && match metadata {
            Some(m) => m.entity_type(segment).is_some(),
            None => true,
        }
}

/// Everything a ladder predicate may inspect.
pub(crate) struct LightInput<'a> {
    pub url: ContextUrl,
    pub target: ContextTarget,
    pub body: &'a Map<String, Value>,
    pub metadata: Option<&'a MetadataDocument>,
}

impl<'a> LightInput<'a> {
    fn has_value_array(&self) -> bool {
        self.body.get("value").map(Value::is_array).unwrap_or(false)
    }

    fn feed_shaped(&self) -> bool {
        match self.body.get("value").and_then(Value::as_array) {
            Some(items) => items.first().map(Value::is_object).unwrap_or(true),
            None => false,
        }
    }

    /// Neither a service document, delta, reference nor primitive/complex property.
    fn structural(&self) -> bool {
        !self.url.is_service_document()
            && !self.url.is_delta()
            && !self.url.is_entity_ref()
            && !is_primitive_and_complex(&self.url, self.metadata)
    }

    /// Whether the target names an entity set (or, when `allow_singleton`, a singleton).
    fn target_resolves(&self, allow_singleton: bool) -> bool {
        let name = self.target.name.as_str();
        match self.metadata {
            Some(m) => {
                m.entity_set(name).is_some() || (allow_singleton && m.singleton(name).is_some())
            }
            None => is_plain_identifier(name),
        }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('.')
        && !name.starts_with('$')
        && !name.starts_with("Collection(")
}

/// A fragment that is exactly one qualified type name of a primitive or complex type
/// (e.g. `$metadata#Edm.String`, `$metadata#Collection(NS.Address)`).
pub fn is_primitive_and_complex(url: &ContextUrl, metadata: Option<&MetadataDocument>) -> bool {
    if url.segments.len() != 1 {
        return false;
    }
    let segment = url.segments[0].as_str();
    if !segment.contains('.') {
        return false;
    }
    match metadata {
        Some(m) => m.is_primitive_or_complex_type(segment),
        None => true,
    }
}

type LightPredicate = fn(&LightInput) -> bool;

/// Ordered context-URL predicates. Each one excludes the others, so the order only
/// documents precedence; it never decides a tie.
pub(crate) const JSON_LIGHT_LADDER: &[(PayloadType, LightPredicate)] = &[
    (PayloadType::ServiceDoc, is_service_doc),
    (PayloadType::Delta, is_delta),
    (PayloadType::EntityRef, is_entity_ref),
    (PayloadType::Property, is_property),
    (PayloadType::Feed, is_feed),
    (PayloadType::Entry, is_entry),
    (PayloadType::IndividualProperty, is_individual_property),
];

fn is_service_doc(input: &LightInput) -> bool {
    input.url.is_service_document()
}

fn is_delta(input: &LightInput) -> bool {
    input.url.is_delta()
}

fn is_entity_ref(input: &LightInput) -> bool {
    input.url.is_entity_ref()
}

fn is_property(input: &LightInput) -> bool {
    !input.url.is_service_document()
        && !input.url.is_delta()
        && !input.url.is_entity_ref()
        && is_primitive_and_complex(&input.url, input.metadata)
}

fn is_feed(input: &LightInput) -> bool {
    input.structural()
        && input.target.property.is_none()
        && !input.target.has_key
        && !input.target.entry_marker
        && input.target_resolves(false)
        && input.feed_shaped()
}

fn is_entry(input: &LightInput) -> bool {
    input.structural()
        && input.target.property.is_none()
        && input.target_resolves(true)
        && !input.has_value_array()
}

fn is_individual_property(input: &LightInput) -> bool {
    if !input.structural() {
        return false;
    }
    let Some(property) = input.target.property.as_deref() else {
        return false;
    };
    match input.metadata {
        Some(m) => m
            .entity_type_of(&input.target.name)
            .map(|et| m.is_normal_property(et, property))
            .unwrap_or(false),
        None => input.target.has_key && is_plain_identifier(&input.target.name),
    }
}

/// A JSON Light error object, version-specific as to member name and message shape.
pub fn is_error(body: &Map<String, Value>, version: ODataVersion) -> bool {
    if body.len() != 1 {
        return false;
    }
    let v3 = || {
        body.get(V3_ERROR)
            .and_then(|e| e.get("message"))
            .map(Value::is_object)
            .unwrap_or(false)
    };
    let v4 = || {
        body.get(V4_ERROR)
            .and_then(|e| e.get("message"))
            .map(Value::is_string)
            .unwrap_or(false)
    };
    match version {
        ODataVersion::V3 => v3(),
        ODataVersion::V4 => v4(),
        _ => v3() || v4(),
    }
}

/// The context URL member accepted for a version: V3 reads `odata.metadata`, V4 reads
/// `@odata.context`, anything else accepts either.
fn context_member(version: ODataVersion, name: &str) -> bool {
    match version {
        ODataVersion::V3 => name == V3_CONTEXT,
        ODataVersion::V4 => name == V4_CONTEXT,
        _ => name == V3_CONTEXT || name == V4_CONTEXT,
    }
}

fn parse_object(payload: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Read and parse the context URL from the first member of a body.
pub fn context_url(body: &Map<String, Value>, version: ODataVersion) -> Option<ContextUrl> {
    let (name, value) = body.iter().next()?;
    if !context_member(version, name) {
        return None;
    }
    ContextUrl::parse(value.as_str()?)
}

pub(crate) fn build_input<'a>(
    body: &'a Map<String, Value>,
    version: ODataVersion,
    metadata: Option<&'a MetadataDocument>,
) -> Option<LightInput<'a>> {
    let url = context_url(body, version)?;
    let target = ContextTarget::analyse(&url, metadata);
    Some(LightInput {
        url,
        target,
        body,
        metadata,
    })
}

/// Target of the context URL in a body's first member, e.g. `Products` / key / `Name` for
/// `$metadata#Products(1)/Name`.
pub fn context_target(
    body: &Map<String, Value>,
    version: ODataVersion,
    metadata: Option<&MetadataDocument>,
) -> Option<ContextTarget> {
    build_input(body, version, metadata).map(|input| input.target)
}

/// Every ladder branch whose predicate holds. Used to check mutual exclusivity.
pub(crate) fn matching_branches(input: &LightInput) -> Vec<PayloadType> {
    JSON_LIGHT_LADDER
        .iter()
        .filter(|(_, predicate)| predicate(input))
        .map(|(payload_type, _)| *payload_type)
        .collect()
}

pub fn classify(
    payload: &str,
    version: ODataVersion,
    metadata: Option<&MetadataDocument>,
) -> PayloadType {
    if payload.trim().is_empty() {
        return PayloadType::None;
    }
    let Some(body) = parse_object(payload) else {
        return PayloadType::Other;
    };
    classify_body(&body, version, metadata)
}

pub fn classify_body(
    body: &Map<String, Value>,
    version: ODataVersion,
    metadata: Option<&MetadataDocument>,
) -> PayloadType {
    if is_error(body, version) {
        return PayloadType::Error;
    }
    let Some(input) = build_input(body, version, metadata) else {
        return PayloadType::Other;
    };
    JSON_LIGHT_LADDER
        .iter()
        .find(|(_, predicate)| predicate(&input))
        .map(|(payload_type, _)| *payload_type)
        .unwrap_or(PayloadType::Other)
}

/// Version implied by the first member name: `odata.metadata` → V3, `@odata.context` → V4.
pub fn infer_version(payload: &str) -> ODataVersion {
    let Some(body) = parse_object(payload) else {
        return ODataVersion::Unknown;
    };
    match body.keys().next().map(String::as_str) {
        Some(V3_CONTEXT) => ODataVersion::V3,
        Some(V4_CONTEXT) => ODataVersion::V4,
        _ => ODataVersion::Unknown,
    }
}

/// An entry carrying media-resource annotations.
pub fn is_media_link_entry(payload: &str) -> bool {
    parse_object(payload)
        .map(|body| MEDIA_ANNOTATIONS.iter().any(|a| body.contains_key(*a)))
        .unwrap_or(false)
}
