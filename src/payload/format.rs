//! Serialization-family sniffing from `Content-Type` (primary) or payload shape (fallback).

use super::PayloadFormat;
use crate::context::headers::{self, MediaType};
use crate::version::{self, ODataVersion};
use serde_json::Value;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const APP_NS: &str = "http://www.w3.org/2007/app";

/// Sniff the format of a response, resolving its version from the same header block.
pub fn sniff(header_block: &str, payload: &str) -> PayloadFormat {
    sniff_with_version(header_block, payload, version::resolve(header_block))
}

/// Sniff the format of a response whose version has already been resolved.
pub fn sniff_with_version(
    header_block: &str,
    payload: &str,
    version: ODataVersion,
) -> PayloadFormat {
    if let Some(mt) = headers::content_type(header_block) {
        if let Some(format) = from_media_type(&mt, version, payload) {
            return format;
        }
    }
    sniff_payload(payload)
}

/// MIME types whose bodies are raw values (`$value` requests).
pub fn is_raw_value_mime(mime: &str) -> bool {
    matches!(mime, "text/plain" | "application/octet-stream")
}

/// Map a known MIME family to a format. Unknown families return `None` so the caller can
/// fall back to structural sniffing.
pub fn from_media_type(
    mt: &MediaType,
    version: ODataVersion,
    payload: &str,
) -> Option<PayloadFormat> {
    let format = match mt.mime.as_str() {
        "application/json" => json_family(mt, version, payload),
        "application/atom+xml" | "application/atomsvc+xml" => PayloadFormat::Atom,
        "application/xml" | "text/xml" => PayloadFormat::Xml,
        m if m.starts_with("image/") => PayloadFormat::Image,
        m if is_raw_value_mime(m) => PayloadFormat::Other,
        _ => return None,
    };
    Some(format)
}

fn json_family(mt: &MediaType, version: ODataVersion, payload: &str) -> PayloadFormat {
    match mt.param("odata") {
        Some("verbose") => return PayloadFormat::Json,
        Some("light" | "minimalmetadata" | "fullmetadata" | "nometadata") => {
            return PayloadFormat::JsonLight
        }
        _ => {}
    }
    if mt.param("odata.metadata").is_some() {
        return PayloadFormat::JsonLight;
    }

    match version {
        v if v.is_json_light_generation() => PayloadFormat::JsonLight,
        ODataVersion::V1 | ODataVersion::V2 | ODataVersion::V1V2 => PayloadFormat::Json,
        _ => match sniff_payload(payload) {
            PayloadFormat::Json => PayloadFormat::Json,
            _ => PayloadFormat::JsonLight,
        },
    }
}

/// Structural sniffing: XML first, then JSON, else `Other`. Empty input is `None`.
pub fn sniff_payload(payload: &str) -> PayloadFormat {
    let trimmed = payload.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return PayloadFormat::None;
    }

    if let Ok(doc) = roxmltree::Document::parse(trimmed) {
        return xml_family(doc.root_element());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if is_verbose_shape(&value) => PayloadFormat::Json,
        Ok(_) => PayloadFormat::JsonLight,
        Err(_) => PayloadFormat::Other,
    }
}

fn xml_family(root: roxmltree::Node) -> PayloadFormat {
    let ns = root.tag_name().namespace().unwrap_or_default();
    match root.tag_name().name() {
        "feed" | "entry" if ns == ATOM_NS => PayloadFormat::Atom,
        "service" if ns == APP_NS => PayloadFormat::Atom,
        _ => PayloadFormat::Xml,
    }
}

/// A single top-level `d` member wrapping an object or array.
pub fn is_verbose_shape(value: &Value) -> bool {
    match value.as_object() {
        Some(top) if top.len() == 1 => matches!(top.get("d"), Some(Value::Object(_) | Value::Array(_))),
        _ => false,
    }
}
