//! 规则调度：对每条注册规则计算适用性并执行，汇总结果。
//!
//! # Rule Dispatch
//!
//! [`RuleDispatcher`] walks a [`RuleRegistry`] against one [`ServiceContext`]: statically
//! inapplicable rules are recorded as skipped without being invoked, and applicable ones run
//! through [`Rule::verify`]. A rule that errors or panics yields
//! [`RuleResult::InfrastructureError`] and never stops the remaining rules.
//!
//! The async path ([`RuleDispatcher::dispatch`]) runs rule bodies on the blocking pool, bounded
//! by [`DispatchStrategy`], each under the configured per-rule timeout, and honours a
//! [`CancellationToken`]. A timed-out body keeps its blocking thread until it returns; the
//! dispatcher only stops waiting for it.

mod report;

pub use report::{ResultCounts, RuleOutcome, RuleResult, ValidationReport};

use crate::config::ValidatorConfig;
use crate::context::ServiceContext;
use crate::payload::Classification;
use crate::rules::{mismatch, Rule, RuleDescriptor, RuleError, RuleRegistry, RuleVerdict};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How applicable rules are scheduled by [`RuleDispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchStrategy {
    Sequential,
    Concurrent { max_concurrency: usize },
}

impl Default for DispatchStrategy {
    fn default() -> Self {
        DispatchStrategy::Concurrent { max_concurrency: 8 }
    }
}

impl DispatchStrategy {
    fn limit(self) -> usize {
        match self {
            DispatchStrategy::Sequential => 1,
            DispatchStrategy::Concurrent { max_concurrency } => max_concurrency.max(1),
        }
    }
}

#[derive(Clone)]
pub struct RuleDispatcher {
    registry: Arc<RuleRegistry>,
    strategy: DispatchStrategy,
    rule_timeout: Option<Duration>,
}

impl RuleDispatcher {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self {
            registry,
            strategy: DispatchStrategy::default(),
            rule_timeout: Some(Duration::from_secs(10)),
        }
    }

    pub fn from_config(registry: Arc<RuleRegistry>, config: &ValidatorConfig) -> Self {
        Self {
            registry,
            strategy: config.strategy,
            rule_timeout: Some(config.rule_timeout),
        }
    }

    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// `None` disables the per-rule timeout.
    pub fn with_rule_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rule_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// Evaluate every registered rule in order on the calling thread. One outcome per rule.
    pub fn run_all(&self, ctx: &ServiceContext) -> Vec<RuleOutcome> {
        self.registry
            .iter()
            .map(|rule| {
                let descriptor = rule.descriptor();
                if let Some(dimension) = mismatch(descriptor, ctx) {
                    return RuleOutcome::skipped(descriptor, dimension);
                }
                let result = panic::catch_unwind(AssertUnwindSafe(|| rule.verify(ctx)));
                match result {
                    Ok(verified) => settle(descriptor, verified),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(rule = %descriptor.name, %message, "rule panicked");
                        RuleOutcome::infrastructure(descriptor, format!("rule panicked: {}", message))
                    }
                }
            })
            .collect()
    }

    /// Evaluate every registered rule, concurrently per the configured strategy.
    ///
    /// Outcomes keep registry order whatever the completion order. Rules not finished when
    /// `cancel` fires are recorded as infrastructure errors and the report is marked
    /// cancelled.
    pub async fn dispatch(
        &self,
        ctx: Arc<ServiceContext>,
        cancel: CancellationToken,
    ) -> ValidationReport {
        let start = Instant::now();
        let limit = self.strategy.limit();
        let rule_timeout = self.rule_timeout;

        let mut indexed: Vec<(usize, RuleOutcome)> =
            futures::stream::iter(self.registry.rules().iter().cloned().enumerate())
                .map(|(idx, rule)| {
                    let ctx = ctx.clone();
                    let cancel = cancel.clone();
                    async move { (idx, evaluate(rule, ctx, cancel, rule_timeout).await) }
                })
                .buffer_unordered(limit)
                .collect()
                .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        let classification = Classification {
            format: ctx.payload_format(),
            payload_type: ctx.payload_type(),
            version: ctx.version(),
        };
        let mut report = ValidationReport::new(ctx.destination().as_str(), classification)
            .with_outcomes(indexed.into_iter().map(|(_, o)| o).collect());
        report.duration_ms = start.elapsed().as_millis() as u64;
        report.cancelled = cancel.is_cancelled();

        if report.cancelled {
            warn!(destination = %report.destination, "dispatch cancelled");
        }
        info!(
            destination = %report.destination,
            payload_type = %classification.payload_type,
            applicable = report.counts.applicable(),
            passed = report.counts.pass,
            failed = report.counts.fail,
            errors = report.counts.infrastructure_error,
            duration_ms = report.duration_ms,
            "dispatch finished"
        );
        report
    }
}

impl std::fmt::Debug for RuleDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDispatcher")
            .field("rules", &self.registry.len())
            .field("strategy", &self.strategy)
            .field("rule_timeout", &self.rule_timeout)
            .finish()
    }
}

async fn evaluate(
    rule: Arc<dyn Rule>,
    ctx: Arc<ServiceContext>,
    cancel: CancellationToken,
    rule_timeout: Option<Duration>,
) -> RuleOutcome {
    let descriptor = rule.descriptor().clone();
    if let Some(dimension) = mismatch(&descriptor, &ctx) {
        return RuleOutcome::skipped(&descriptor, dimension);
    }
    if cancel.is_cancelled() {
        return RuleOutcome::infrastructure(&descriptor, "dispatch cancelled");
    }

    let task = tokio::task::spawn_blocking(move || rule.verify(&ctx));
    let bounded = async move {
        match rule_timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.ok(),
            None => Some(task.await),
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(rule = %descriptor.name, "rule abandoned: dispatch cancelled");
            RuleOutcome::infrastructure(&descriptor, "dispatch cancelled")
        }
        joined = bounded => match joined {
            Some(Ok(verified)) => settle(&descriptor, verified),
            Some(Err(e)) => join_failure(&descriptor, e),
            None => {
                let limit = rule_timeout.unwrap_or_default();
                warn!(rule = %descriptor.name, timeout_ms = limit.as_millis() as u64, "rule timed out");
                RuleOutcome::infrastructure(
                    &descriptor,
                    format!("rule timed out after {} ms", limit.as_millis()),
                )
            }
        }
    }
}

fn settle(descriptor: &RuleDescriptor, verified: Result<RuleVerdict, RuleError>) -> RuleOutcome {
    match verified {
        Ok(verdict) => RuleOutcome::from_verdict(descriptor, verdict),
        Err(e) => {
            warn!(rule = %descriptor.name, error = %e, "rule failed to evaluate");
            RuleOutcome::infrastructure(descriptor, e.to_string())
        }
    }
}

fn join_failure(descriptor: &RuleDescriptor, e: JoinError) -> RuleOutcome {
    if e.is_panic() {
        let message = panic_message(e.into_panic().as_ref());
        warn!(rule = %descriptor.name, %message, "rule panicked");
        RuleOutcome::infrastructure(descriptor, format!("rule panicked: {}", message))
    } else {
        RuleOutcome::infrastructure(descriptor, e.to_string())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
