//! Run configuration.
//!
//! One [`ValidatorConfig`] is built at process start and shared for the whole run. It is never
//! changed while rules are dispatched.

use crate::dispatch::DispatchStrategy;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1_048_576;
pub const DEFAULT_ACCEPT: &str =
    "application/json;odata.metadata=full, application/atom+xml;q=0.9, */*;q=0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Ceiling on a fetched body, in bytes.
    pub max_payload_size: usize,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Retries after the first attempt for transient fetch failures.
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub rule_timeout: Duration,
    pub strategy: DispatchStrategy,
    pub accept: String,
    /// Also fetch `$metadata` from the service root when validating a URL.
    pub fetch_metadata: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            rule_timeout: Duration::from_secs(10),
            strategy: DispatchStrategy::default(),
            accept: DEFAULT_ACCEPT.to_string(),
            fetch_metadata: true,
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `ODATA_*` environment variables. Unparseable values are errors.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parse::<usize>("ODATA_MAX_PAYLOAD_SIZE")? {
            config.max_payload_size = v;
        }
        if let Some(v) = env_parse::<u64>("ODATA_HTTP_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("ODATA_HTTP_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("ODATA_RULE_TIMEOUT_SECS")? {
            config.rule_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("ODATA_MAX_CONCURRENCY")? {
            config.strategy = strategy_for(v);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn with_max_payload_size(mut self, bytes: usize) -> Self {
        self.max_payload_size = bytes;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = timeout;
        self
    }

    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn with_fetch_metadata(mut self, fetch: bool) -> Self {
        self.fetch_metadata = fetch;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 {
            return Err(Error::configuration_with_context(
                "max_payload_size must be greater than zero",
                ErrorContext::new()
                    .with_field_path("max_payload_size")
                    .with_source("config_loader"),
            ));
        }
        if self.rule_timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "rule_timeout must be greater than zero",
                ErrorContext::new()
                    .with_field_path("rule_timeout")
                    .with_source("config_loader"),
            ));
        }
        if let DispatchStrategy::Concurrent { max_concurrency: 0 } = self.strategy {
            return Err(Error::configuration_with_context(
                "max_concurrency must be greater than zero",
                ErrorContext::new()
                    .with_field_path("strategy.max_concurrency")
                    .with_source("config_loader"),
            ));
        }
        if self.accept.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "accept must not be empty",
                ErrorContext::new()
                    .with_field_path("accept")
                    .with_source("config_loader"),
            ));
        }
        Ok(())
    }
}

/// `1` means sequential dispatch.
fn strategy_for(max_concurrency: usize) -> DispatchStrategy {
    match max_concurrency {
        1 => DispatchStrategy::Sequential,
        n => DispatchStrategy::Concurrent { max_concurrency: n },
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                format!("invalid value for {}", key),
                ErrorContext::new()
                    .with_field_path(key)
                    .with_details(format!("got {:?}", raw))
                    .with_source("config_loader"),
            )
        }),
        Err(_) => Ok(None),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
