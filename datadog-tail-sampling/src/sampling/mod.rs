// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampling decisions and policy evaluators.
//!
//! A policy examines a fully buffered trace and votes Sampled, NotSampled or
//! SecondChance; the processor combines the votes with the global span
//! budget. Evaluators take `&self` and keep any rate state behind their own
//! lock so the late-arrival hooks can be called from ingest threads while
//! the decision loop evaluates.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

use parking_lot::{Mutex, MutexGuard};

use crate::config::{CascadingRuleConfig, Config, PolicyConfig, PolicyKind};
use crate::error::ConfigError;
use crate::span::{Span, SpanBatch, TraceId};

mod always_sample;
mod cascading;
mod numeric_attribute;
mod probabilistic;
mod properties;
mod rate_limiter;
mod rate_limiting;
mod string_attribute;

pub use always_sample::AlwaysSample;
pub use cascading::CascadingFilter;
pub use numeric_attribute::NumericAttributeFilter;
pub use probabilistic::ProbabilisticFilter;
pub use properties::SpanPropertiesFilter;
pub use rate_limiter::{unix_seconds, SpansPerSecondLimiter};
pub use rate_limiting::RateLimitingFilter;
pub use string_attribute::StringAttributeFilter;

/// Name used to attribute traces admitted by the probabilistic pre-filter.
pub const PROBABILISTIC_FILTER_POLICY_NAME: &str = "probabilistic_filter";

/// Sampling decision for a trace, per policy or final.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Decision {
    /// No decision has been rendered yet.
    #[default]
    Unspecified,
    /// The policies have not evaluated the trace yet.
    Pending,
    /// The trace is forwarded downstream.
    Sampled,
    /// The trace is dropped.
    NotSampled,
    /// Transient within a tick: the trace is admitted only if global budget
    /// remains after the first-pass winners.
    SecondChance,
}

/// Mutable part of a trace record, guarded by the record's own lock. The
/// decision read and the batch append happen under the same guard so a
/// decision cannot transition away from Pending in between.
#[derive(Debug, Default)]
pub struct TraceState {
    /// Span groups received while the decision was still pending; drained by
    /// the decision loop and never repopulated.
    pub received_batches: Vec<SpanBatch>,
    /// Per-policy decisions, indexed by policy position.
    pub decisions: Vec<Decision>,
    pub final_decision: Decision,
    /// True when the probabilistic pre-filter was the reason for selection.
    pub selected_by_probabilistic_filter: bool,
    /// Set when the decision loop picks the trace up.
    pub decision_time: Option<SystemTime>,
}

/// Record for one in-flight trace.
#[derive(Debug)]
pub struct TraceData {
    /// When the first span of the trace was observed.
    pub arrival_time: SystemTime,
    span_count: AtomicI64,
    state: Mutex<TraceState>,
}

impl TraceData {
    pub fn new(num_policies: usize, span_count: i64, arrival_time: SystemTime) -> Self {
        TraceData {
            arrival_time,
            span_count: AtomicI64::new(span_count),
            state: Mutex::new(TraceState {
                decisions: vec![Decision::Pending; num_policies],
                ..Default::default()
            }),
        }
    }

    /// Running total of spans observed for this trace.
    pub fn span_count(&self) -> i64 {
        self.span_count.load(Ordering::Relaxed)
    }

    pub fn add_spans(&self, count: i64) {
        self.span_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Lock the mutable state of the record.
    pub fn state(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock()
    }
}

/// Contract implemented by every policy variant.
pub trait PolicyEvaluator: Send + Sync {
    /// Examine a buffered trace, once per trace during the first decision
    /// pass.
    fn evaluate(&self, id: TraceId, trace: &TraceData) -> anyhow::Result<Decision>;

    /// Notification for spans of a trace whose decision is already fixed.
    fn on_late_arriving_spans(&self, _decision: Decision, _spans: &[Span]) {}

    /// Notification for a trace evicted while this policy was still Pending.
    fn on_dropped_spans(&self, _id: TraceId, _trace: &TraceData) -> anyhow::Result<Decision> {
        Ok(Decision::NotSampled)
    }
}

/// A named policy: the evaluator plus the tag used for metric attribution.
pub struct Policy {
    pub name: String,
    pub evaluator: Box<dyn PolicyEvaluator>,
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy").field("name", &self.name).finish()
    }
}

fn build_policy_evaluator(cfg: &PolicyConfig) -> Result<Box<dyn PolicyEvaluator>, ConfigError> {
    match &cfg.kind {
        PolicyKind::AlwaysSample {} => Ok(Box::new(AlwaysSample::new())),
        PolicyKind::NumericAttribute(numeric) => Ok(Box::new(NumericAttributeFilter::new(
            &numeric.key,
            numeric.min_value,
            numeric.max_value,
        ))),
        PolicyKind::StringAttribute(string) => Ok(Box::new(StringAttributeFilter::new(
            &string.key,
            &string.values,
        ))),
        PolicyKind::RateLimiting(rate) => {
            if rate.spans_per_second < 0 {
                return Err(ConfigError::NegativeRateLimit(
                    cfg.name.clone(),
                    rate.spans_per_second,
                ));
            }
            Ok(Box::new(RateLimitingFilter::new(rate.spans_per_second)))
        }
        PolicyKind::Cascading(cascading) => Ok(Box::new(CascadingFilter::new(
            &cfg.name,
            cascading.spans_per_second,
            &cascading.rules,
        )?)),
        PolicyKind::Properties(properties) => Ok(Box::new(SpanPropertiesFilter::new(
            &cfg.name,
            properties,
        )?)),
    }
}

/// Build the ordered policy list from the configuration. The probabilistic
/// pre-filter, when enabled, is prepended separately (see
/// [`build_probabilistic_policy`]).
pub fn build_policies(config: &Config) -> Result<Vec<Policy>, ConfigError> {
    if config.policies.is_empty() {
        return Err(ConfigError::NoPolicies);
    }
    let mut policies = Vec::with_capacity(config.policies.len() + 1);
    for policy_cfg in &config.policies {
        policies.push(Policy {
            name: policy_cfg.name.clone(),
            evaluator: build_policy_evaluator(policy_cfg)?,
        });
    }
    Ok(policies)
}

/// Build the optional probabilistic pre-filter policy from the configured
/// ratio; its budget is `floor(spans_per_second * ratio)`.
pub fn build_probabilistic_policy(
    ratio: f64,
    spans_per_second: i64,
) -> Result<Policy, ConfigError> {
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(ConfigError::InvalidFilteringRatio(ratio));
    }
    Ok(Policy {
        name: PROBABILISTIC_FILTER_POLICY_NAME.to_string(),
        evaluator: Box::new(ProbabilisticFilter::new(ratio, spans_per_second)),
    })
}

pub(crate) fn build_cascading_rule_filters(
    policy_name: &str,
    rule: &CascadingRuleConfig,
) -> Result<Vec<Box<dyn PolicyEvaluator>>, ConfigError> {
    let mut filters: Vec<Box<dyn PolicyEvaluator>> = Vec::new();
    if let Some(numeric) = &rule.numeric_attribute {
        filters.push(Box::new(NumericAttributeFilter::new(
            &numeric.key,
            numeric.min_value,
            numeric.max_value,
        )));
    }
    if let Some(string) = &rule.string_attribute {
        filters.push(Box::new(StringAttributeFilter::new(
            &string.key,
            &string.values,
        )));
    }
    if let Some(properties) = &rule.properties {
        filters.push(Box::new(SpanPropertiesFilter::new(policy_name, properties)?));
    }
    Ok(filters)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;

    fn config_with(policies: Vec<PolicyConfig>) -> Config {
        Config {
            decision_wait: 1,
            num_traces: 100,
            expected_new_traces_per_sec: 0,
            spans_per_second: 100,
            probabilistic_filtering_ratio: None,
            policies,
        }
    }

    #[test]
    fn test_build_policies_preserves_order() {
        let config = config_with(vec![
            PolicyConfig {
                name: "first".to_string(),
                kind: PolicyKind::AlwaysSample {},
            },
            PolicyConfig {
                name: "second".to_string(),
                kind: PolicyKind::RateLimiting(RateLimitingConfig {
                    spans_per_second: 10,
                }),
            },
        ]);
        let policies = build_policies(&config).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].name, "first");
        assert_eq!(policies[1].name, "second");
    }

    #[test]
    fn test_build_policies_rejects_empty_list() {
        let config = config_with(vec![]);
        assert_eq!(build_policies(&config).unwrap_err(), ConfigError::NoPolicies);
    }

    #[test]
    fn test_build_policies_rejects_negative_rate_limit() {
        let config = config_with(vec![PolicyConfig {
            name: "limited".to_string(),
            kind: PolicyKind::RateLimiting(RateLimitingConfig {
                spans_per_second: -5,
            }),
        }]);
        assert_eq!(
            build_policies(&config).unwrap_err(),
            ConfigError::NegativeRateLimit("limited".to_string(), -5)
        );
    }

    #[test]
    fn test_build_probabilistic_policy_validates_ratio() {
        assert!(build_probabilistic_policy(0.2, 100).is_ok());
        assert_eq!(
            build_probabilistic_policy(0.0, 100).unwrap_err(),
            ConfigError::InvalidFilteringRatio(0.0)
        );
        assert_eq!(
            build_probabilistic_policy(1.5, 100).unwrap_err(),
            ConfigError::InvalidFilteringRatio(1.5)
        );
    }
}
