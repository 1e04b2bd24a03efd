//! HTTP fetch seam used by the [`Validator`](crate::Validator).
//!
//! The classifier never performs I/O. Fetching a response, bounding its size and retrying
//! transient failures happens behind [`HttpFetcher`], so tests and offline harnesses can supply
//! their own implementation.

pub mod http;

pub use http::ReqwestFetcher;

use crate::config::ValidatorConfig;
use crate::context::HttpResponse;
use crate::Result;
use async_trait::async_trait;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The body exceeded the configured ceiling. Nothing is returned; a truncated body would
    /// classify wrongly.
    #[error("payload exceeds {limit} bytes (received at least {received})")]
    OversizedPayload { limit: usize, received: usize },

    #[error("invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// One GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub uri: Url,
    pub accept: String,
    pub max_payload_size: usize,
    pub extra_headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(uri: Url, accept: impl Into<String>, max_payload_size: usize) -> Self {
        Self {
            uri,
            accept: accept.into(),
            max_payload_size,
            extra_headers: Vec::new(),
        }
    }

    /// Accept header and payload ceiling taken from the run configuration.
    pub fn from_config(uri: Url, config: &ValidatorConfig) -> Self {
        Self::new(uri, config.accept.clone(), config.max_payload_size)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }

    /// Headers as sent: `Accept` first, then the extra headers in order.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        std::iter::once(("Accept".to_string(), self.accept.clone()))
            .chain(self.extra_headers.iter().cloned())
            .collect()
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, request: FetchRequest) -> Result<HttpResponse>;
}
