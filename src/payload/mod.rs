//! 负载分类层：识别响应的序列化格式与语义类型。
//!
//! # Payload Classification
//!
//! Determines, for an arbitrary HTTP response, which serialization family it uses
//! ([`PayloadFormat`]) and what kind of OData resource it represents ([`PayloadType`]).
//!
//! Classification is a total function: malformed or unexpected input degrades to
//! [`PayloadFormat::Other`] / [`PayloadType::Other`] / [`PayloadType::None`] and never errors.
//!
//! ## Ladders
//!
//! Each format family is classified by an ordered table of predicates; the first match wins.
//!
//! | Family | Module | Precedence |
//! |--------|--------|------------|
//! | Atom / XML | [`xml`] | ServiceDoc, Metadata, IndividualProperty, Error, Link, EntityRef, Delta, Feed, Entry, Property |
//! | JSON verbose | [`json_verbose`] | Error, Feed, Feed (`results`), Link (`results`), Entry, ServiceDoc, Link, Property |
//! | JSON Light | [`json_light`] | Error, ServiceDoc, Delta, EntityRef, Property, Feed, Entry, IndividualProperty |

pub mod format;
pub mod json_light;
pub mod json_verbose;
pub mod xml;

use crate::context::headers;
use crate::metadata::MetadataDocument;
use crate::version::{self, ODataVersion};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Serialization family of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PayloadFormat {
    #[default]
    None,
    Atom,
    Xml,
    /// JSON verbose (`d`-wrapped, V1/V2).
    Json,
    /// JSON Light (`odata.metadata` / `@odata.context`, V3+).
    JsonLight,
    Image,
    Other,
}

/// Semantic kind of an OData payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PayloadType {
    #[default]
    None,
    ServiceDoc,
    Metadata,
    Feed,
    Entry,
    Property,
    IndividualProperty,
    Link,
    EntityRef,
    Delta,
    Error,
    RawValue,
    Other,
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Result of classifying one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub format: PayloadFormat,
    pub payload_type: PayloadType,
    pub version: ODataVersion,
}

/// Classify the semantic type of a payload whose format is already known.
pub fn classify_type(
    payload: &str,
    format: PayloadFormat,
    version: ODataVersion,
    metadata: Option<&MetadataDocument>,
) -> PayloadType {
    match format {
        PayloadFormat::None => PayloadType::None,
        PayloadFormat::Atom | PayloadFormat::Xml => xml::classify(payload),
        PayloadFormat::Json => json_verbose::classify(payload),
        PayloadFormat::JsonLight => json_light::classify(payload, version, metadata),
        PayloadFormat::Image => PayloadType::RawValue,
        PayloadFormat::Other => PayloadType::Other,
    }
}

/// Classify a response: format, then version, then semantic type.
pub fn classify_payload(
    payload: &str,
    header_block: &str,
    metadata: Option<&MetadataDocument>,
) -> Classification {
    let mut version = version::resolve(header_block);
    let format = format::sniff_with_version(header_block, payload, version);

    if version == ODataVersion::Unknown && format == PayloadFormat::JsonLight {
        version = json_light::infer_version(payload);
    }

    let payload_type = if format == PayloadFormat::Other
        && !payload.trim().is_empty()
        && headers::content_type(header_block)
            .map(|mt| format::is_raw_value_mime(&mt.mime))
            .unwrap_or(false)
    {
        PayloadType::RawValue
    } else {
        classify_type(payload, format, version, metadata)
    };

    debug!(
        format = %format,
        payload_type = %payload_type,
        version = %version,
        payload_len = payload.len(),
        "payload classified"
    );

    Classification {
        format,
        payload_type,
        version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_none() {
        let c = classify_payload("", "", None);
        assert_eq!(c.format, PayloadFormat::None);
        assert_eq!(c.payload_type, PayloadType::None);
        assert_eq!(c.version, ODataVersion::Unknown);
    }

    #[test]
    fn test_raw_value_from_text_plain() {
        let c = classify_payload("42", "Content-Type: text/plain\r\nDataServiceVersion: 2.0\r\n", None);
        assert_eq!(c.format, PayloadFormat::Other);
        assert_eq!(c.payload_type, PayloadType::RawValue);
        assert_eq!(c.version, ODataVersion::V2);
    }

    #[test]
    fn test_image_is_raw_value() {
        let c = classify_payload("\u{89}PNG....", "Content-Type: image/png\r\n", None);
        assert_eq!(c.format, PayloadFormat::Image);
        assert_eq!(c.payload_type, PayloadType::RawValue);
    }

    #[test]
    fn test_json_light_version_is_inferred_without_headers() {
        let c = classify_payload(r#"{"@odata.context":"http://svc/$metadata","value":[]}"#, "", None);
        assert_eq!(c.format, PayloadFormat::JsonLight);
        assert_eq!(c.version, ODataVersion::V4);
        assert_eq!(c.payload_type, PayloadType::ServiceDoc);
    }

    #[test]
    fn test_garbage_never_panics() {
        for input in ["\u{0}\u{1}\u{2}", "<<<>>>", "{\"d\":", "]]", "\u{feff}", "<a><b></a>"] {
            let c = classify_payload(input, "", None);
            assert!(matches!(c.payload_type, PayloadType::None | PayloadType::Other));
        }
    }
}
