use super::{FetchRequest, HttpFetcher, TransportError};
use crate::config::ValidatorConfig;
use crate::context::{headers, HttpResponse};
use crate::Result;
use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const MIN_RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// reqwest-backed fetcher with a hard payload ceiling and bounded retries.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_retries: u32,
    min_delay: Duration,
    max_delay: Duration,
}

impl ReqwestFetcher {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("ODATA_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            min_delay: MIN_RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
        })
    }

    /// Override the backoff bounds (mainly for tests).
    pub fn with_retry_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay.max(min_delay);
        self
    }

    /// Exponential backoff: `min_delay * 2^attempt`, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.min_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let delay = base.saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(delay.min(cap))
    }

    async fn fetch_once(&self, request: &FetchRequest) -> Result<HttpResponse> {
        let limit = request.max_payload_size;
        let accept = HeaderValue::from_str(&request.accept)
            .map_err(|_| TransportError::InvalidHeader(format!("Accept: {}", request.accept)))?;
        let mut req = self.client.get(request.uri.clone()).header(ACCEPT, accept);
        for (name, value) in &request.extra_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader(format!("{}: {}", name, value)))?;
            req = req.header(header_name, header_value);
        }

        let mut response = req.send().await.map_err(TransportError::from)?;
        let status_code = response.status().as_u16();

        if let Some(declared) = response.content_length() {
            if declared > limit as u64 {
                return Err(TransportError::OversizedPayload {
                    limit,
                    received: declared as usize,
                }
                .into());
            }
        }

        let header_block = headers::to_block(response.headers().iter().filter_map(|(k, v)| {
            v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string()))
        }));

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(TransportError::from)? {
            if body.len() + chunk.len() > limit {
                return Err(TransportError::OversizedPayload {
                    limit,
                    received: body.len() + chunk.len(),
                }
                .into());
            }
            body.extend_from_slice(&chunk);
        }

        debug!(uri = %request.uri, status = status_code, bytes = body.len(), "fetched");
        Ok(HttpResponse::new(
            status_code,
            header_block,
            String::from_utf8_lossy(&body).into_owned(),
        ))
    }
}

fn is_retryable(error: &crate::Error) -> bool {
    match error {
        crate::Error::Transport(TransportError::Http(e)) => {
            e.is_timeout() || e.is_connect() || e.is_request()
        }
        _ => false,
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, request: FetchRequest) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        uri = %request.uri,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
