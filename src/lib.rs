//! # odata-conformance
//!
//! OData 协议一致性验证器的核心：负载分类、版本解析与规则调度。
//!
//! Core of an OData protocol conformance validator: given one HTTP response from an OData
//! service, decide what it is and which conformance rules apply to it, then run them.
//!
//! ## Overview
//!
//! A validation run is a strict pipeline per response:
//!
//! 1. **Format** – serialization family from `Content-Type`, falling back to payload shape
//!    ([`payload::format`]).
//! 2. **Version** – `DataServiceVersion` / `OData-Version` ([`version`]).
//! 3. **Type** – semantic payload type from a per-format ladder of ordered predicates
//!    ([`payload`]).
//! 4. **Context** – an immutable [`ServiceContext`] holding the response, the metadata document
//!    and the derived flags ([`context`]).
//! 5. **Dispatch** – each registered rule's descriptor is matched against the context and the
//!    applicable ones are verified ([`rules`], [`dispatch`]).
//!
//! Classification and applicability are total: unexpected input degrades to `Other`, `None` or
//! "not applicable", never to an error. Only resource boundaries (fetching, configuration,
//! context construction) return [`Error`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use odata_conformance::{CancellationToken, Validator, ValidatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> odata_conformance::Result<()> {
//!     let validator = Validator::builtin(ValidatorConfig::from_env()?)?;
//!     let report = validator
//!         .validate_url("https://services.odata.org/V4/OData/OData.svc/Products", vec![], CancellationToken::new())
//!         .await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`payload`] | Format sniffing and the Atom/XML, JSON verbose and JSON Light ladders |
//! | [`version`] | Protocol version resolution |
//! | [`metadata`] | CSDL metadata accessor |
//! | [`context`] | Responses, header blocks and the service context |
//! | [`rules`] | Rule descriptors, applicability, registry and built-in rules |
//! | [`dispatch`] | Sequential and concurrent rule dispatch, reports |
//! | [`transport`] | HTTP fetch with a payload ceiling |
//! | [`config`] | Run configuration |

pub mod config;
pub mod context;
pub mod dispatch;
pub mod metadata;
pub mod payload;
pub mod rules;
pub mod transport;
pub mod validator;
pub mod version;

pub use config::ValidatorConfig;
pub use context::{build_context, HttpResponse, OdataMetadataType, ServiceContext, ServiceContextBuilder};
pub use dispatch::{DispatchStrategy, RuleDispatcher, RuleOutcome, RuleResult, ValidationReport};
pub use metadata::MetadataDocument;
pub use payload::{classify_payload, Classification, PayloadFormat, PayloadType};
pub use rules::{
    is_rule_applicable, FnRule, RequirementLevel, Rule, RuleDescriptor, RuleError, RuleRegistry,
    RuleVerdict, VerificationResult,
};
pub use tokio_util::sync::CancellationToken;
pub use transport::{FetchRequest, HttpFetcher, ReqwestFetcher, TransportError};
pub use validator::Validator;
pub use version::ODataVersion;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
