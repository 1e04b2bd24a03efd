//! 协议版本解析：从响应头确定 OData 协议版本。
//!
//! OData protocol version resolution from response headers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::headers;

/// OData protocol version, including the range sentinels rule descriptors use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ODataVersion {
    #[default]
    Unknown,
    V1,
    V2,
    V3,
    V4,
    /// Range sentinel: V1 or V2.
    V1V2,
    /// Range sentinel: V3 or V4.
    V3V4,
    /// Wildcard: every version, including `Unknown`.
    All,
}

impl ODataVersion {
    /// Whether `self` (a descriptor's declared version) admits `other` (a context's version).
    ///
    /// A concrete version admits only itself; range sentinels admit their members and
    /// themselves; `All` admits everything.
    pub fn contains(self, other: ODataVersion) -> bool {
        match self {
            ODataVersion::All => true,
            ODataVersion::V1V2 => matches!(
                other,
                ODataVersion::V1 | ODataVersion::V2 | ODataVersion::V1V2
            ),
            ODataVersion::V3V4 => matches!(
                other,
                ODataVersion::V3 | ODataVersion::V4 | ODataVersion::V3V4
            ),
            concrete => concrete == other,
        }
    }

    /// True for the JSON Light generation (V3 and later).
    pub fn is_json_light_generation(self) -> bool {
        matches!(
            self,
            ODataVersion::V3 | ODataVersion::V4 | ODataVersion::V3V4
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ODataVersion::Unknown => "unknown",
            ODataVersion::V1 => "1.0",
            ODataVersion::V2 => "2.0",
            ODataVersion::V3 => "3.0",
            ODataVersion::V4 => "4.0",
            ODataVersion::V1V2 => "1-2",
            ODataVersion::V3V4 => "3-4",
            ODataVersion::All => "*",
        }
    }
}

impl std::fmt::Display for ODataVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static V1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1\.0\s*;?\s*$").unwrap());
static V2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^2\.0\s*;?\s*$").unwrap());
static V3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^3\.0\s*;?\s*$").unwrap());
static V4_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^4\.01?\s*;?\s*$").unwrap());

/// Parse a single version header value.
///
/// Only the segment before the first `;` is considered, so implementation tags such as
/// `"2.0; pyslet 0.4"` are discarded.
pub fn parse_version_value(raw: &str) -> ODataVersion {
    let value = raw.split(';').next().unwrap_or("").trim();

    if value.starts_with("1-2") {
        return ODataVersion::V1V2;
    }
    if value.starts_with("3-4") {
        return ODataVersion::V3V4;
    }
    if value.starts_with('*') {
        return ODataVersion::All;
    }

    if V1_RE.is_match(value) {
        ODataVersion::V1
    } else if V2_RE.is_match(value) {
        ODataVersion::V2
    } else if V3_RE.is_match(value) {
        ODataVersion::V3
    } else if V4_RE.is_match(value) {
        ODataVersion::V4
    } else {
        ODataVersion::Unknown
    }
}

/// Resolve the protocol version of a response from its header block.
///
/// The legacy `DataServiceVersion` header wins over `OData-Version` when both are present.
pub fn resolve(header_block: &str) -> ODataVersion {
    if let Some(value) = headers::header_value(header_block, "DataServiceVersion") {
        return parse_version_value(&value);
    }
    if let Some(value) = headers::header_value(header_block, "OData-Version") {
        return parse_version_value(&value);
    }
    ODataVersion::Unknown
}
