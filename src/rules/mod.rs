//! 规则层：规则描述符、判定结果、适用性匹配与注册表。
//!
//! # Rules
//!
//! A rule is a [`RuleDescriptor`] (name, category, requirement level and the constraints
//! that decide where it applies) plus a pure [`Rule::verify`] body over a
//! [`ServiceContext`].
//!
//! Every constraint on a descriptor is optional. `None` is a wildcard: the rule applies
//! whatever the context holds on that dimension. See [`is_rule_applicable`].

pub mod builtin;
mod matcher;
mod registry;

pub use matcher::{is_rule_applicable, mismatch};
pub use registry::RuleRegistry;

use crate::context::ServiceContext;
use crate::payload::{PayloadFormat, PayloadType};
use crate::version::ODataVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normative strength of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementLevel {
    Must,
    Should,
    May,
    ShouldNot,
    MustNot,
    Recommended,
    Extended,
}

impl std::fmt::Display for RequirementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequirementLevel::Must => "MUST",
            RequirementLevel::Should => "SHOULD",
            RequirementLevel::May => "MAY",
            RequirementLevel::ShouldNot => "SHOULD NOT",
            RequirementLevel::MustNot => "MUST NOT",
            RequirementLevel::Recommended => "RECOMMENDED",
            RequirementLevel::Extended => "EXTENDED",
        };
        f.write_str(s)
    }
}

/// Static description of a rule and the contexts it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    /// Unique dotted name, e.g. `IndividualProperty.Core.4201`.
    pub name: String,
    pub category: String,
    pub requirement_level: RequirementLevel,
    pub description: String,
    pub payload_type: Option<PayloadType>,
    pub payload_format: Option<PayloadFormat>,
    pub version: Option<ODataVersion>,
    /// `Some(true)` requires a non-empty metadata document; `Some(false)` and `None` do not
    /// constrain.
    pub require_metadata: Option<bool>,
    pub is_offline_context: Option<bool>,
    pub projection: Option<bool>,
    pub is_media_link_entry: Option<bool>,
}

impl RuleDescriptor {
    /// A descriptor with every constraint left as a wildcard.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        requirement_level: RequirementLevel,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            requirement_level,
            description: String::new(),
            payload_type: None,
            payload_format: None,
            version: None,
            require_metadata: None,
            is_offline_context: None,
            projection: None,
            is_media_link_entry: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_payload_type(mut self, payload_type: PayloadType) -> Self {
        self.payload_type = Some(payload_type);
        self
    }

    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = Some(format);
        self
    }

    pub fn with_version(mut self, version: ODataVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_require_metadata(mut self, required: bool) -> Self {
        self.require_metadata = Some(required);
        self
    }

    pub fn with_offline_context(mut self, offline: bool) -> Self {
        self.is_offline_context = Some(offline);
        self
    }

    pub fn with_projection(mut self, projection: bool) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_media_link_entry(mut self, is_mle: bool) -> Self {
        self.is_media_link_entry = Some(is_mle);
        self
    }
}

/// Outcome of a rule body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationResult {
    Pass,
    Fail,
    /// Preconditions the descriptor cannot express were not met.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub result: VerificationResult,
    pub message: Option<String>,
}

impl RuleVerdict {
    pub fn pass() -> Self {
        Self {
            result: VerificationResult::Pass,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            result: VerificationResult::Fail,
            message: Some(message.into()),
        }
    }

    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self {
            result: VerificationResult::NotApplicable,
            message: Some(reason.into()),
        }
    }

    /// `Pass` when `ok`, otherwise `Fail` with the message.
    pub fn check(ok: bool, message: impl Into<String>) -> Self {
        if ok {
            Self::pass()
        } else {
            Self::fail(message)
        }
    }
}

/// Why a rule body could not evaluate. Recorded as an infrastructure error, never as `Fail`.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("payload could not be read: {0}")]
    Payload(String),

    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

/// A conformance rule: descriptor plus a pure verification body.
pub trait Rule: Send + Sync {
    fn descriptor(&self) -> &RuleDescriptor;

    fn verify(&self, ctx: &ServiceContext) -> Result<RuleVerdict, RuleError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// A rule backed by a plain function or closure.
pub struct FnRule<F> {
    descriptor: RuleDescriptor,
    func: F,
}

impl<F> FnRule<F>
where
    F: Fn(&ServiceContext) -> Result<RuleVerdict, RuleError> + Send + Sync,
{
    pub fn new(descriptor: RuleDescriptor, func: F) -> Self {
        Self { descriptor, func }
    }
}

impl<F> Rule for FnRule<F>
where
    F: Fn(&ServiceContext) -> Result<RuleVerdict, RuleError> + Send + Sync,
{
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    fn verify(&self, ctx: &ServiceContext) -> Result<RuleVerdict, RuleError> {
        (self.func)(ctx)
    }
}
