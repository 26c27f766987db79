// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;

use parking_lot::Mutex;

use super::rate_limiter::{unix_seconds, SpansPerSecondLimiter};
use super::{build_cascading_rule_filters, Decision, PolicyEvaluator, TraceData};
use crate::config::CascadingRuleConfig;
use crate::error::ConfigError;
use crate::span::TraceId;

struct CascadingRule {
    name: String,
    /// None when the configured cap is negative: the rule always defers to
    /// the global pool via SecondChance.
    limiter: Option<Mutex<SpansPerSecondLimiter>>,
    filters: Vec<Box<dyn PolicyEvaluator>>,
}

impl CascadingRule {
    fn matches(&self, id: TraceId, trace: &TraceData) -> anyhow::Result<bool> {
        for filter in &self.filters {
            if filter.evaluate(id, trace)? != Decision::Sampled {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Composite policy holding an ordered list of sub-rules, each with its own
/// per-second span cap. The first matching rule decides: Sampled while its
/// budget lasts, SecondChance once exhausted so the trace can still compete
/// for leftover global budget.
pub struct CascadingFilter {
    rules: Vec<CascadingRule>,
    /// Optional cap across all sub-rules of this policy.
    overall_limiter: Option<Mutex<SpansPerSecondLimiter>>,
}

impl CascadingFilter {
    pub fn new(
        policy_name: &str,
        spans_per_second: i64,
        rule_configs: &[CascadingRuleConfig],
    ) -> Result<Self, ConfigError> {
        if rule_configs.is_empty() {
            return Err(ConfigError::NoCascadingRules(policy_name.to_string()));
        }
        let mut rules = Vec::with_capacity(rule_configs.len());
        for rule_cfg in rule_configs {
            rules.push(CascadingRule {
                name: rule_cfg.name.clone(),
                limiter: (rule_cfg.spans_per_second >= 0)
                    .then(|| Mutex::new(SpansPerSecondLimiter::new(rule_cfg.spans_per_second))),
                filters: build_cascading_rule_filters(policy_name, rule_cfg)?,
            });
        }
        Ok(CascadingFilter {
            rules,
            overall_limiter: (spans_per_second >= 0)
                .then(|| Mutex::new(SpansPerSecondLimiter::new(spans_per_second))),
        })
    }
}

impl PolicyEvaluator for CascadingFilter {
    fn evaluate(&self, id: TraceId, trace: &TraceData) -> anyhow::Result<Decision> {
        let now_second = unix_seconds(SystemTime::now());
        let span_count = trace.span_count();

        for rule in &self.rules {
            if !rule.matches(id, trace)? {
                continue;
            }
            let Some(rule_limiter) = &rule.limiter else {
                return Ok(Decision::SecondChance);
            };
            let fits_overall = match &self.overall_limiter {
                Some(limiter) => limiter.lock().would_admit(now_second, span_count),
                None => true,
            };
            if fits_overall
                && rule_limiter.lock().admit(now_second, span_count) == Decision::Sampled
            {
                if let Some(limiter) = &self.overall_limiter {
                    limiter.lock().admit(now_second, span_count);
                }
                log::debug!(
                    "cascading rule {} admitted {span_count} span(s) for trace {id}",
                    rule.name
                );
                return Ok(Decision::Sampled);
            }
            return Ok(Decision::SecondChance);
        }
        Ok(Decision::NotSampled)
    }
}

impl std::fmt::Debug for CascadingFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadingFilter")
            .field("rules", &self.rules.iter().map(|r| &r.name).collect::<Vec<_>>())
            .finish()
    }
}
