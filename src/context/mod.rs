//! 验证上下文：一次 HTTP 交换的不可变聚合。
//!
//! # Service Context
//!
//! A [`ServiceContext`] bundles everything the rules read for one validation unit: the
//! response payload and headers, the optional metadata document, the destination URI, the
//! classification triple and the contextual flags (offline, media link entry, projection).
//!
//! It is built once by [`ServiceContextBuilder`] (or [`build_context`]) and shared read-only
//! across concurrently dispatched rules. The only way to change a built context is
//! [`ServiceContext::with_revised_metadata`], which derives a new one.

pub mod headers;

use crate::metadata::{projected_properties, EntityType, MetadataDocument};
use crate::payload::{self, json_light, json_verbose, xml, PayloadFormat, PayloadType};
use crate::version::ODataVersion;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A captured HTTP response: status, raw header block and decoded body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status_code: u16,
    /// `Name: value` lines separated by CRLF.
    pub headers: String,
    pub payload: String,
}

impl HttpResponse {
    pub fn new(status_code: u16, headers: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: headers.into(),
            payload: payload.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        headers::header_value(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Amount of control information a JSON Light response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OdataMetadataType {
    Full,
    Minimal,
    None,
}

impl OdataMetadataType {
    /// Read from the `Content-Type` parameters. Only JSON Light responses have one; when the
    /// parameter is absent the protocol default (minimal) applies.
    pub fn from_headers(header_block: &str, format: PayloadFormat) -> Option<Self> {
        if format != PayloadFormat::JsonLight {
            return None;
        }
        let mt = headers::content_type(header_block);
        let param = mt.as_ref().and_then(|mt| {
            mt.param("odata.metadata")
                .or_else(|| mt.param("odata"))
                .map(str::to_string)
        });
        let kind = match param.as_deref() {
            Some("full" | "fullmetadata") => OdataMetadataType::Full,
            Some("none" | "nometadata") => OdataMetadataType::None,
            _ => OdataMetadataType::Minimal,
        };
        Some(kind)
    }
}

/// One validation unit. Immutable once built.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    response_payload: String,
    response_headers: String,
    status_code: u16,
    metadata_raw: Option<String>,
    metadata: Option<Arc<MetadataDocument>>,
    destination: Url,
    format: PayloadFormat,
    payload_type: PayloadType,
    version: ODataVersion,
    odata_metadata_type: Option<OdataMetadataType>,
    is_offline_context: bool,
    is_media_link_entry: bool,
    projection: Option<bool>,
    request_headers: Vec<(String, String)>,
    /// Flags the caller set explicitly, replayed when metadata is revised.
    media_link_entry_override: Option<bool>,
    projection_override: Option<bool>,
}

impl ServiceContext {
    pub fn builder(response: HttpResponse, destination: impl Into<String>) -> ServiceContextBuilder {
        ServiceContextBuilder::new(response, destination)
    }

    pub fn response_payload(&self) -> &str {
        &self.response_payload
    }

    pub fn response_headers(&self) -> &str {
        &self.response_headers
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        headers::header_value(&self.response_headers, name)
    }

    /// The metadata document text as supplied, when non-empty.
    pub fn metadata_document(&self) -> Option<&str> {
        self.metadata_raw.as_deref()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata_raw.is_some()
    }

    /// The parsed metadata model. `None` when no document was supplied or it did not parse.
    pub fn metadata(&self) -> Option<&MetadataDocument> {
        self.metadata.as_deref()
    }

    pub fn destination(&self) -> &Url {
        &self.destination
    }

    pub fn payload_format(&self) -> PayloadFormat {
        self.format
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    pub fn odata_metadata_type(&self) -> Option<OdataMetadataType> {
        self.odata_metadata_type
    }

    pub fn is_offline_context(&self) -> bool {
        self.is_offline_context
    }

    pub fn is_media_link_entry(&self) -> bool {
        self.is_media_link_entry
    }

    pub fn projection(&self) -> Option<bool> {
        self.projection
    }

    pub fn request_headers(&self) -> &[(String, String)] {
        &self.request_headers
    }

    /// Service root of the exchange. See [`service_root`].
    pub fn service_root(&self) -> Url {
        service_root(&self.destination, &self.response_payload, self.metadata())
    }

    /// Response body as a JSON object, for JSON formats.
    pub fn json_body(&self) -> Option<Map<String, Value>> {
        match serde_json::from_str::<Value>(&self.response_payload) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// A new context built from the same exchange with a replaced metadata document. The
    /// offline flag, request headers and any explicitly set media-link or projection flag
    /// carry over; classification and the unset flags are derived again.
    pub fn with_revised_metadata(&self, metadata: Option<&str>) -> Result<ServiceContext> {
        let mut builder = ServiceContextBuilder::new(
            HttpResponse::new(
                self.status_code,
                self.response_headers.clone(),
                self.response_payload.clone(),
            ),
            self.destination.as_str(),
        )
        .request_headers(self.request_headers.clone())
        .offline(self.is_offline_context);
        builder.media_link_entry = self.media_link_entry_override;
        builder.projection = self.projection_override;
        if let Some(md) = metadata {
            builder = builder.metadata(md);
        }
        builder.build()
    }
}

/// Builder for [`ServiceContext`]. Unset flags are derived from the response.
#[derive(Debug, Clone)]
pub struct ServiceContextBuilder {
    response: HttpResponse,
    destination: String,
    metadata: Option<String>,
    request_headers: Vec<(String, String)>,
    offline: Option<bool>,
    media_link_entry: Option<bool>,
    projection: Option<bool>,
}

impl ServiceContextBuilder {
    pub fn new(response: HttpResponse, destination: impl Into<String>) -> Self {
        Self {
            response,
            destination: destination.into(),
            metadata: None,
            request_headers: Vec::new(),
            offline: None,
            media_link_entry: None,
            projection: None,
        }
    }

    pub fn metadata(mut self, document: impl Into<String>) -> Self {
        self.metadata = Some(document.into());
        self
    }

    pub fn request_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = Some(offline);
        self
    }

    pub fn media_link_entry(mut self, is_mle: bool) -> Self {
        self.media_link_entry = Some(is_mle);
        self
    }

    pub fn projection(mut self, projection: bool) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn build(self) -> Result<ServiceContext> {
        let destination = Url::parse(self.destination.trim()).map_err(|e| {
            Error::validation_with_context(
                "destination is not an absolute URI",
                ErrorContext::new()
                    .with_field_path("destination")
                    .with_details(format!("{:?}: {}", self.destination, e))
                    .with_source("context_builder"),
            )
        })?;

        let metadata_raw = self.metadata.filter(|m| !m.trim().is_empty());
        let metadata = match metadata_raw.as_deref() {
            Some(raw) => match MetadataDocument::parse(raw) {
                Ok(doc) => Some(Arc::new(doc)),
                Err(e) => {
                    debug!(error = %e, "metadata document did not parse; lookups disabled");
                    None
                }
            },
            None => None,
        };

        let HttpResponse {
            status_code,
            headers: response_headers,
            payload: response_payload,
        } = self.response;

        let classification =
            payload::classify_payload(&response_payload, &response_headers, metadata.as_deref());

        let entity_type = metadata
            .as_deref()
            .and_then(|md| entity_type_of_destination(&destination, md));

        let is_media_link_entry = self.media_link_entry.unwrap_or_else(|| {
            derive_media_link_entry(
                &response_payload,
                classification.format,
                classification.payload_type,
                metadata.as_deref().zip(entity_type),
            )
        });

        let projection = self.projection.or_else(|| {
            derive_projection(
                &destination,
                &response_payload,
                classification.format,
                classification.payload_type,
                metadata.as_deref().zip(entity_type),
            )
        });

        Ok(ServiceContext {
            odata_metadata_type: OdataMetadataType::from_headers(
                &response_headers,
                classification.format,
            ),
            response_payload,
            response_headers,
            status_code,
            metadata_raw,
            metadata,
            destination,
            format: classification.format,
            payload_type: classification.payload_type,
            version: classification.version,
            is_offline_context: self.offline.unwrap_or(false),
            is_media_link_entry,
            projection,
            request_headers: self.request_headers,
            media_link_entry_override: self.media_link_entry,
            projection_override: self.projection,
        })
    }
}

/// Assemble a context in one call.
pub fn build_context(
    response: HttpResponse,
    metadata: Option<&str>,
    destination: &str,
    request_headers: Vec<(String, String)>,
    offline: Option<bool>,
    media_link_entry: Option<bool>,
    projection: Option<bool>,
) -> Result<ServiceContext> {
    let mut builder = ServiceContextBuilder::new(response, destination).request_headers(request_headers);
    if let Some(md) = metadata {
        builder = builder.metadata(md);
    }
    if let Some(offline) = offline {
        builder = builder.offline(offline);
    }
    if let Some(mle) = media_link_entry {
        builder = builder.media_link_entry(mle);
    }
    if let Some(projection) = projection {
        builder = builder.projection(projection);
    }
    builder.build()
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Entity type addressed by the first destination path segment naming a set or singleton.
fn entity_type_of_destination<'a>(url: &Url, md: &'a MetadataDocument) -> Option<&'a EntityType> {
    path_segments(url).iter().find_map(|segment| {
        let (name, _) = json_light::split_key_predicate(segment);
        md.entity_type_of(name)
    })
}

/// Service root for a destination. A JSON Light context URL names it directly; otherwise
/// it is the destination path cut before the first segment that is a `$` system resource
/// or a known entity set or singleton. Without metadata the last segment is dropped.
pub fn service_root(destination: &Url, payload: &str, md: Option<&MetadataDocument>) -> Url {
    let from_context = serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|v| match v {
            Value::Object(body) => json_light::context_url(&body, ODataVersion::Unknown),
            _ => None,
        })
        .and_then(|url| Url::parse(&url.service_root).ok());
    from_context.unwrap_or_else(|| service_root_of(destination, md))
}

fn service_root_of(url: &Url, md: Option<&MetadataDocument>) -> Url {
    let segments = path_segments(url);
    let cut = segments.iter().position(|segment| {
        let (name, _) = json_light::split_key_predicate(segment);
        name.starts_with('$')
            || md.map(|m| m.is_entity_set_or_singleton(name)).unwrap_or(false)
    });
    let kept = match cut {
        Some(i) => &segments[..i],
        None if md.is_none() && segments.len() > 1 => &segments[..segments.len() - 1],
        None => &segments[..],
    };
    let mut root = url.clone();
    root.set_query(None);
    root.set_fragment(None);
    let path = if kept.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", kept.join("/"))
    };
    root.set_path(&path);
    root
}

fn derive_media_link_entry(
    payload: &str,
    format: PayloadFormat,
    payload_type: PayloadType,
    typed: Option<(&MetadataDocument, &EntityType)>,
) -> bool {
    if payload_type != PayloadType::Entry {
        return false;
    }
    let marked = match format {
        PayloadFormat::Atom | PayloadFormat::Xml => xml::is_media_link_entry(payload),
        PayloadFormat::JsonLight => json_light::is_media_link_entry(payload),
        PayloadFormat::Json => json_verbose::is_media_link_entry(payload),
        _ => false,
    };
    marked || typed.map(|(md, et)| md.has_stream(et)).unwrap_or(false)
}

fn derive_projection(
    destination: &Url,
    payload: &str,
    format: PayloadFormat,
    payload_type: PayloadType,
    typed: Option<(&MetadataDocument, &EntityType)>,
) -> Option<bool> {
    if destination
        .query_pairs()
        .any(|(k, _)| k.eq_ignore_ascii_case("$select"))
    {
        return Some(true);
    }
    if payload_type != PayloadType::Entry {
        return None;
    }
    let (md, et) = typed?;
    let body = match (format, serde_json::from_str::<Value>(payload).ok()?) {
        (PayloadFormat::JsonLight, Value::Object(map)) => map,
        (PayloadFormat::Json, Value::Object(mut top)) => match top.remove("d") {
            Some(Value::Object(inner)) => inner,
            _ => return None,
        },
        _ => return None,
    };
    Some(projected_properties(&body, et, md).is_projected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::V4_METADATA;

    const V4_JSON: &str = "Content-Type: application/json;odata.metadata=full\r\nOData-Version: 4.0\r\n";

    fn response(payload: &str) -> HttpResponse {
        HttpResponse::new(200, V4_JSON, payload)
    }

    #[test]
    fn test_bad_destination_fails_fast() {
        let err = ServiceContext::builder(response("{}"), "not a uri").build().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("destination")
        );
    }

    #[test]
    fn test_context_carries_classification() {
        let ctx = ServiceContext::builder(
            response(r#"{"@odata.context":"http://svc/$metadata#Products","value":[{"ID":1}]}"#),
            "http://svc/Products",
        )
        .metadata(V4_METADATA)
        .request_header("Accept", "application/json")
        .build()
        .unwrap();
        assert_eq!(ctx.payload_format(), PayloadFormat::JsonLight);
        assert_eq!(ctx.payload_type(), PayloadType::Feed);
        assert_eq!(ctx.version(), ODataVersion::V4);
        assert_eq!(ctx.odata_metadata_type(), Some(OdataMetadataType::Full));
        assert!(ctx.has_metadata());
        assert!(ctx.metadata().is_some());
        assert!(!ctx.is_offline_context());
        assert_eq!(ctx.request_headers().len(), 1);
        assert_eq!(ctx.service_root().as_str(), "http://svc/");
    }

    #[test]
    fn test_metadata_type_defaults_and_absence() {
        let minimal = HttpResponse::new(200, "Content-Type: application/json\r\nOData-Version: 4.0\r\n", "{}");
        let ctx = ServiceContext::builder(minimal, "http://svc/").build().unwrap();
        assert_eq!(ctx.odata_metadata_type(), Some(OdataMetadataType::Minimal));

        let v3 = "Content-Type: application/json;odata=nometadata\r\nDataServiceVersion: 3.0\r\n";
        assert_eq!(
            OdataMetadataType::from_headers(v3, PayloadFormat::JsonLight),
            Some(OdataMetadataType::None)
        );
        assert_eq!(OdataMetadataType::from_headers(v3, PayloadFormat::Atom), None);
    }

    #[test]
    fn test_unparseable_metadata_keeps_raw_text() {
        let ctx = ServiceContext::builder(response("{}"), "http://svc/")
            .metadata("<not-edmx/>")
            .build()
            .unwrap();
        assert!(ctx.has_metadata());
        assert!(ctx.metadata().is_none());

        let blank = ServiceContext::builder(response("{}"), "http://svc/")
            .metadata("   ")
            .build()
            .unwrap();
        assert!(!blank.has_metadata());
    }

    #[test]
    fn test_media_link_entry_from_has_stream() {
        let ctx = ServiceContext::builder(
            response(r#"{"@odata.context":"http://svc/$metadata#Photos/$entity","ID":1}"#),
            "http://svc/Photos(1)",
        )
        .metadata(V4_METADATA)
        .build()
        .unwrap();
        assert_eq!(ctx.payload_type(), PayloadType::Entry);
        assert!(ctx.is_media_link_entry());

        let forced = ServiceContext::builder(
            response(r#"{"@odata.context":"http://svc/$metadata#Photos/$entity","ID":1}"#),
            "http://svc/Photos(1)",
        )
        .metadata(V4_METADATA)
        .media_link_entry(false)
        .build()
        .unwrap();
        assert!(!forced.is_media_link_entry());
    }

    #[test]
    fn test_projection_derivation() {
        let select = ServiceContext::builder(
            response(r#"{"@odata.context":"http://svc/$metadata#Products","value":[]}"#),
            "http://svc/Products?$select=Name",
        )
        .build()
        .unwrap();
        assert_eq!(select.projection(), Some(true));

        let partial = ServiceContext::builder(
            response(r#"{"@odata.context":"http://svc/$metadata#Products/$entity","ID":1}"#),
            "http://svc/Products(1)",
        )
        .metadata(V4_METADATA)
        .build()
        .unwrap();
        assert_eq!(partial.projection(), Some(true));

        let untyped = ServiceContext::builder(
            response(r#"{"@odata.context":"http://svc/$metadata#Products/$entity","ID":1}"#),
            "http://svc/Products(1)",
        )
        .build()
        .unwrap();
        assert_eq!(untyped.projection(), None);
    }

    #[test]
    fn test_revised_metadata_rederives() {
        let payload = r#"{"@odata.context":"http://svc/$metadata#Products(1)/Name","value":"Widget"}"#;
        let ctx = build_context(
            response(payload),
            None,
            "http://svc/Products(1)/Name",
            vec![],
            Some(true),
            None,
            None,
        )
        .unwrap();
        assert!(!ctx.has_metadata());
        assert!(ctx.is_offline_context());

        let revised = ctx.with_revised_metadata(Some(V4_METADATA)).unwrap();
        assert!(revised.has_metadata());
        assert!(revised.is_offline_context());
        assert_eq!(revised.payload_type(), PayloadType::IndividualProperty);
        assert_eq!(ctx.payload_type(), PayloadType::IndividualProperty);
    }

    #[test]
    fn test_revised_metadata_keeps_explicit_flags() {
        let payload = r#"{"@odata.context":"http://svc/$metadata#Products","value":[{"Name":"W"}]}"#;
        let ctx = ServiceContext::builder(response(payload), "http://svc/Products?$select=Name")
            .projection(false)
            .media_link_entry(true)
            .build()
            .unwrap();
        assert_eq!(ctx.projection(), Some(false));
        assert!(ctx.is_media_link_entry());

        let revised = ctx.with_revised_metadata(Some(V4_METADATA)).unwrap();
        assert!(revised.has_metadata());
        assert_eq!(revised.projection(), Some(false));
        assert!(revised.is_media_link_entry());

        // Flags left unset are still derived from the new metadata.
        let derived = ServiceContext::builder(response(payload), "http://svc/Products?$select=Name")
            .build()
            .unwrap()
            .with_revised_metadata(Some(V4_METADATA))
            .unwrap();
        assert_eq!(derived.projection(), Some(true));
        assert!(!derived.is_media_link_entry());
    }

    #[test]
    fn test_service_root_without_metadata() {
        let ctx = ServiceContext::builder(response("{}"), "http://host/odata/Products?$top=1")
            .build()
            .unwrap();
        assert_eq!(ctx.service_root().as_str(), "http://host/odata/");
    }
}
