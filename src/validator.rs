//! Validation facade: fetch, classify, build the context, dispatch.

use crate::config::ValidatorConfig;
use crate::context::{self, HttpResponse, ServiceContext};
use crate::dispatch::{RuleDispatcher, ValidationReport};
use crate::rules::RuleRegistry;
use crate::transport::{FetchRequest, HttpFetcher, ReqwestFetcher};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const METADATA_ACCEPT: &str = "application/xml";

pub struct Validator {
    config: Arc<ValidatorConfig>,
    fetcher: Arc<dyn HttpFetcher>,
    dispatcher: RuleDispatcher,
}

impl Validator {
    /// A validator fetching over HTTP with [`ReqwestFetcher`].
    pub fn new(config: ValidatorConfig, registry: RuleRegistry) -> Result<Self> {
        let fetcher = Arc::new(ReqwestFetcher::new(&config)?);
        Ok(Self::with_fetcher(config, registry, fetcher))
    }

    /// A validator over the built-in rule set.
    pub fn builtin(config: ValidatorConfig) -> Result<Self> {
        Self::new(config, RuleRegistry::builtin()?)
    }

    pub fn with_fetcher(
        config: ValidatorConfig,
        registry: RuleRegistry,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Self {
        let dispatcher = RuleDispatcher::from_config(Arc::new(registry), &config);
        Self {
            config: Arc::new(config),
            fetcher,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &RuleDispatcher {
        &self.dispatcher
    }

    /// Fetch `url` (and, when configured, the service's `$metadata`) and validate it.
    ///
    /// Fetch failures of the payload itself, including an oversized body, are returned as
    /// errors. A metadata document that cannot be fetched only disables metadata-bound rules.
    pub async fn validate_url(
        &self,
        url: &str,
        request_headers: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> Result<ValidationReport> {
        let destination = parse_destination(url)?;
        let request =
            FetchRequest::from_config(destination.clone(), &self.config).with_headers(request_headers);
        let sent_headers = request.header_pairs();
        let response = self.fetcher.get(request).await?;

        let metadata = if is_metadata_url(&destination) {
            Some(response.payload.clone())
        } else if self.config.fetch_metadata {
            let root = context::service_root(&destination, &response.payload, None);
            self.fetch_metadata(&root).await
        } else {
            None
        };

        self.validate_exchange(response, destination.as_str(), metadata.as_deref(), sent_headers, cancel)
            .await
    }

    /// Validate a response that was fetched elsewhere.
    pub async fn validate_response(
        &self,
        response: HttpResponse,
        destination: &str,
        metadata: Option<&str>,
        request_headers: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> Result<ValidationReport> {
        self.validate_exchange(response, destination, metadata, request_headers, cancel)
            .await
    }

    /// GET `<root>/$metadata`. `None` when it fails or is not a success response.
    pub async fn fetch_metadata(&self, service_root: &Url) -> Option<String> {
        let uri = match service_root.join("$metadata") {
            Ok(uri) => uri,
            Err(e) => {
                warn!(root = %service_root, error = %e, "cannot derive metadata URL");
                return None;
            }
        };
        let request = FetchRequest::new(uri.clone(), METADATA_ACCEPT, self.config.max_payload_size);
        match self.fetcher.get(request).await {
            Ok(response) if response.is_success() => {
                debug!(uri = %uri, bytes = response.payload.len(), "metadata fetched");
                Some(response.payload)
            }
            Ok(response) => {
                warn!(uri = %uri, status = response.status_code, "metadata not available");
                None
            }
            Err(e) => {
                warn!(uri = %uri, error = %e, "metadata fetch failed");
                None
            }
        }
    }

    async fn validate_exchange(
        &self,
        response: HttpResponse,
        destination: &str,
        metadata: Option<&str>,
        request_headers: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> Result<ValidationReport> {
        let mut builder =
            ServiceContext::builder(response, destination).request_headers(request_headers);
        if let Some(md) = metadata {
            builder = builder.metadata(md);
        }
        let ctx = Arc::new(builder.build()?);
        Ok(self.dispatcher.dispatch(ctx, cancel).await)
    }
}

fn parse_destination(url: &str) -> Result<Url> {
    Url::parse(url.trim()).map_err(|e| {
        Error::validation_with_context(
            "destination is not an absolute URI",
            ErrorContext::new()
                .with_field_path("destination")
                .with_details(format!("{:?}: {}", url, e))
                .with_source("validator"),
        )
    })
}

fn is_metadata_url(url: &Url) -> bool {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|last| last == "$metadata")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves canned responses by URI and records what was asked for.
    struct CannedFetcher {
        responses: Vec<(String, HttpResponse)>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpFetcher for CannedFetcher {
        async fn get(&self, request: FetchRequest) -> Result<HttpResponse> {
            self.requested.lock().unwrap().push(request.uri.to_string());
            self.responses
                .iter()
                .find(|(uri, _)| *uri == request.uri.as_str())
                .map(|(_, r)| r.clone())
                .ok_or_else(|| Error::Transport(crate::transport::TransportError::Other("no route".into())))
        }
    }

    #[tokio::test]
    async fn test_validate_url_fetches_metadata_from_context_root() {
        let fetcher = Arc::new(CannedFetcher {
            responses: vec![
                (
                    "http://svc/Products(1)/Name".to_string(),
                    HttpResponse::new(
                        200,
                        "Content-Type: application/json\r\nOData-Version: 4.0\r\n",
                        r#"{"@odata.context":"http://svc/$metadata#Products(1)/Name","value":"Widget"}"#,
                    ),
                ),
                (
                    "http://svc/$metadata".to_string(),
                    HttpResponse::new(200, "Content-Type: application/xml\r\n", crate::metadata::tests::V4_METADATA),
                ),
            ],
            requested: Mutex::new(Vec::new()),
        });
        let validator = Validator::with_fetcher(
            ValidatorConfig::default(),
            RuleRegistry::builtin().unwrap(),
            fetcher.clone(),
        );
        let report = validator
            .validate_url("http://svc/Products(1)/Name", vec![], CancellationToken::new())
            .await
            .unwrap();
        let rule = report.outcome("IndividualProperty.Core.4201").unwrap();
        assert_eq!(rule.result, crate::dispatch::RuleResult::Pass);
        assert_eq!(
            *fetcher.requested.lock().unwrap(),
            vec!["http://svc/Products(1)/Name", "http://svc/$metadata"]
        );
    }

    #[tokio::test]
    async fn test_bad_destination_is_a_validation_error() {
        let fetcher = Arc::new(CannedFetcher {
            responses: vec![],
            requested: Mutex::new(Vec::new()),
        });
        let validator =
            Validator::with_fetcher(ValidatorConfig::default(), RuleRegistry::new(), fetcher);
        let err = validator
            .validate_url("relative/path", vec![], CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_is_metadata_url() {
        assert!(is_metadata_url(&Url::parse("http://svc/odata/$metadata").unwrap()));
        assert!(!is_metadata_url(&Url::parse("http://svc/odata/Products").unwrap()));
    }
}
