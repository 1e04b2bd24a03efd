//! Rule outcomes and the per-run validation report.

use crate::payload::Classification;
use crate::rules::{RequirementLevel, RuleDescriptor, RuleVerdict, VerificationResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one rule in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleResult {
    Pass,
    Fail,
    NotApplicable,
    /// The rule faulted (error, panic, timeout or cancellation). Not a protocol failure.
    InfrastructureError,
}

impl From<VerificationResult> for RuleResult {
    fn from(result: VerificationResult) -> Self {
        match result {
            VerificationResult::Pass => RuleResult::Pass,
            VerificationResult::Fail => RuleResult::Fail,
            VerificationResult::NotApplicable => RuleResult::NotApplicable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_name: String,
    pub category: String,
    pub requirement_level: RequirementLevel,
    pub result: RuleResult,
    pub message: Option<String>,
    /// True when the rule was excluded by its descriptor and never invoked. A
    /// `NotApplicable` with `skipped == false` came from the rule body.
    pub skipped: bool,
}

impl RuleOutcome {
    fn base(descriptor: &RuleDescriptor, result: RuleResult, message: Option<String>) -> Self {
        Self {
            rule_name: descriptor.name.clone(),
            category: descriptor.category.clone(),
            requirement_level: descriptor.requirement_level,
            result,
            message,
            skipped: false,
        }
    }

    pub fn from_verdict(descriptor: &RuleDescriptor, verdict: RuleVerdict) -> Self {
        Self::base(descriptor, verdict.result.into(), verdict.message)
    }

    /// Statically inapplicable; `dimension` names the constraint that excluded it.
    pub fn skipped(descriptor: &RuleDescriptor, dimension: &str) -> Self {
        Self {
            skipped: true,
            ..Self::base(
                descriptor,
                RuleResult::NotApplicable,
                Some(format!("{} constraint not met", dimension)),
            )
        }
    }

    pub fn infrastructure(descriptor: &RuleDescriptor, message: impl Into<String>) -> Self {
        Self::base(
            descriptor,
            RuleResult::InfrastructureError,
            Some(message.into()),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCounts {
    pub pass: usize,
    pub fail: usize,
    pub not_applicable: usize,
    pub infrastructure_error: usize,
    /// Subset of `not_applicable` excluded before invocation.
    pub skipped: usize,
}

impl ResultCounts {
    pub fn tally(outcomes: &[RuleOutcome]) -> Self {
        let mut counts = Self::default();
        for o in outcomes {
            match o.result {
                RuleResult::Pass => counts.pass += 1,
                RuleResult::Fail => counts.fail += 1,
                RuleResult::NotApplicable => counts.not_applicable += 1,
                RuleResult::InfrastructureError => counts.infrastructure_error += 1,
            }
            if o.skipped {
                counts.skipped += 1;
            }
        }
        counts
    }

    /// Rules that were invoked.
    pub fn applicable(&self) -> usize {
        self.pass + self.fail + self.infrastructure_error + self.not_applicable - self.skipped
    }
}

/// Every outcome of one dispatch over one context, in registry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub destination: String,
    pub classification: Classification,
    pub outcomes: Vec<RuleOutcome>,
    pub counts: ResultCounts,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl ValidationReport {
    pub fn new(destination: impl Into<String>, classification: Classification) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            destination: destination.into(),
            classification,
            outcomes: Vec::new(),
            counts: ResultCounts::default(),
            duration_ms: 0,
            cancelled: false,
        }
    }

    pub fn with_outcomes(mut self, outcomes: Vec<RuleOutcome>) -> Self {
        self.counts = ResultCounts::tally(&outcomes);
        self.outcomes = outcomes;
        self
    }

    pub fn outcome(&self, rule_name: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.rule_name == rule_name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.result == RuleResult::Fail)
    }

    pub fn has_failures(&self) -> bool {
        self.counts.fail > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rules: {} passed, {} failed, {} not applicable ({} skipped), {} errors{}",
            self.outcomes.len(),
            self.counts.pass,
            self.counts.fail,
            self.counts.not_applicable,
            self.counts.skipped,
            self.counts.infrastructure_error,
            if self.cancelled { " [cancelled]" } else { "" }
        )
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PayloadFormat, PayloadType};
    use crate::version::ODataVersion;

    fn descriptor(name: &str) -> RuleDescriptor {
        RuleDescriptor::new(name, "Core", RequirementLevel::Must)
    }

    #[test]
    fn test_counts_and_summary() {
        let outcomes = vec![
            RuleOutcome::from_verdict(&descriptor("A"), RuleVerdict::pass()),
            RuleOutcome::from_verdict(&descriptor("B"), RuleVerdict::fail("bad")),
            RuleOutcome::from_verdict(&descriptor("C"), RuleVerdict::not_applicable("n/a")),
            RuleOutcome::skipped(&descriptor("D"), "payload_type"),
            RuleOutcome::infrastructure(&descriptor("E"), "panicked"),
        ];
        let report = ValidationReport::new(
            "http://svc/",
            Classification {
                format: PayloadFormat::JsonLight,
                payload_type: PayloadType::Entry,
                version: ODataVersion::V4,
            },
        )
        .with_outcomes(outcomes);

        assert_eq!(report.counts.pass, 1);
        assert_eq!(report.counts.not_applicable, 2);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.counts.applicable(), 4);
        assert!(report.has_failures());
        assert_eq!(report.failures().count(), 1);
        assert!(report.summary().starts_with("5 rules: 1 passed, 1 failed"));
        assert_eq!(
            report.outcome("D").map(|o| o.message.as_deref()),
            Some(Some("payload_type constraint not met"))
        );
    }

    #[test]
    fn test_report_serializes() {
        let report = ValidationReport::new(
            "http://svc/",
            Classification {
                format: PayloadFormat::Atom,
                payload_type: PayloadType::Feed,
                version: ODataVersion::V3,
            },
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["classification"]["payload_type"], "Feed");
        assert_eq!(json["cancelled"], false);
    }
}
