// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampler configuration.
//!
//! The structures here only describe the configuration; validation happens
//! when the policies are built, so an invalid regex or a negative duration
//! is reported before the sampler starts.

use serde::Deserialize;

fn default_decision_wait() -> u64 {
    30
}

fn default_num_traces() -> u64 {
    50_000
}

fn default_unlimited() -> i64 {
    -1
}

/// Top-level sampler configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Seconds to hold a trace before evaluation; determines the batcher
    /// depth. Every trace is evaluated roughly this many seconds after its
    /// first span arrives.
    #[serde(default = "default_decision_wait")]
    pub decision_wait: u64,
    /// Ceiling on live trace records. The oldest record is evicted when a
    /// new trace would exceed it.
    #[serde(default = "default_num_traces")]
    pub num_traces: u64,
    /// Pre-sizing hint for the per-second id batches.
    #[serde(default)]
    pub expected_new_traces_per_sec: u64,
    /// Global admission budget in spans per second, shared across all
    /// policies and the second-chance pass.
    pub spans_per_second: i64,
    /// Fraction of `spans_per_second` reserved for the probabilistic
    /// pre-filter. Disabled when absent or zero.
    #[serde(default)]
    pub probabilistic_filtering_ratio: Option<f64>,
    /// Ordered policy list; the first Sampled result wins attribution.
    pub policies: Vec<PolicyConfig>,
}

/// One policy entry: a name for metric attribution plus exactly one variant.
#[derive(Clone, Debug, Deserialize)]
pub struct PolicyConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: PolicyKind,
}

/// The supported policy variants.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    AlwaysSample {},
    NumericAttribute(NumericAttributeConfig),
    StringAttribute(StringAttributeConfig),
    RateLimiting(RateLimitingConfig),
    Cascading(CascadingConfig),
    Properties(PropertiesConfig),
}

/// Matches traces with a numeric attribute under `key` in
/// `[min_value, max_value]`.
#[derive(Clone, Debug, Deserialize)]
pub struct NumericAttributeConfig {
    pub key: String,
    pub min_value: i64,
    pub max_value: i64,
}

/// Matches traces with a string attribute under `key` whose value is one of
/// `values`. Empty strings in the set are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct StringAttributeConfig {
    pub key: String,
    pub values: Vec<String>,
}

/// Admits spans up to `spans_per_second` across all traces the policy sees.
#[derive(Clone, Debug, Deserialize)]
pub struct RateLimitingConfig {
    pub spans_per_second: i64,
}

/// Composite policy: ordered sub-rules, each with its own per-second cap.
#[derive(Clone, Debug, Deserialize)]
pub struct CascadingConfig {
    /// Optional cap across all sub-rules of this policy; negative means
    /// uncapped.
    #[serde(default = "default_unlimited")]
    pub spans_per_second: i64,
    pub rules: Vec<CascadingRuleConfig>,
}

/// One sub-rule of a cascading policy. The optional filters are combined
/// with AND semantics; a rule with no filter matches every trace.
/// `spans_per_second = -1` means "take whatever global budget is left",
/// i.e. the rule always defers to the second-chance pass.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CascadingRuleConfig {
    #[serde(default)]
    pub name: String,
    pub spans_per_second: i64,
    #[serde(default)]
    pub numeric_attribute: Option<NumericAttributeConfig>,
    #[serde(default)]
    pub string_attribute: Option<StringAttributeConfig>,
    #[serde(default)]
    pub properties: Option<PropertiesConfig>,
}

/// Matches traces by root-span operation name, minimum wall-clock duration
/// and minimum span count; all configured sub-conditions must hold.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PropertiesConfig {
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub min_duration_micros: Option<i64>,
    #[serde(default)]
    pub min_number_of_spans: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "spans_per_second": 1000,
                "policies": [{"name": "keep-all", "always_sample": {}}]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.decision_wait, 30);
        assert_eq!(cfg.num_traces, 50_000);
        assert_eq!(cfg.expected_new_traces_per_sec, 0);
        assert_eq!(cfg.probabilistic_filtering_ratio, None);
        assert_eq!(cfg.policies.len(), 1);
        assert!(matches!(cfg.policies[0].kind, PolicyKind::AlwaysSample {}));
    }

    #[test]
    fn test_full_config() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "decision_wait": 10,
                "num_traces": 100,
                "expected_new_traces_per_sec": 10,
                "spans_per_second": 1000,
                "probabilistic_filtering_ratio": 0.2,
                "policies": [
                    {"name": "test-policy-1", "always_sample": {}},
                    {"name": "test-policy-2", "numeric_attribute":
                        {"key": "key1", "min_value": 50, "max_value": 100}},
                    {"name": "test-policy-3", "string_attribute":
                        {"key": "key2", "values": ["value1", "value2"]}},
                    {"name": "test-policy-4", "rate_limiting":
                        {"spans_per_second": 35}},
                    {"name": "test-policy-5", "properties": {
                        "name_pattern": "foo.*",
                        "min_duration_micros": 9000000,
                        "min_number_of_spans": 10}},
                    {"name": "everything-else", "cascading": {
                        "rules": [
                            {"name": "slow", "spans_per_second": 50,
                             "properties": {"min_duration_micros": 9000000}},
                            {"name": "rest", "spans_per_second": -1}
                        ]}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.decision_wait, 10);
        assert_eq!(cfg.num_traces, 100);
        assert_eq!(cfg.probabilistic_filtering_ratio, Some(0.2));
        assert_eq!(cfg.policies.len(), 6);

        match &cfg.policies[1].kind {
            PolicyKind::NumericAttribute(numeric) => {
                assert_eq!(numeric.key, "key1");
                assert_eq!(numeric.min_value, 50);
                assert_eq!(numeric.max_value, 100);
            }
            other => panic!("unexpected policy kind: {other:?}"),
        }

        match &cfg.policies[5].kind {
            PolicyKind::Cascading(cascading) => {
                assert_eq!(cascading.spans_per_second, -1);
                assert_eq!(cascading.rules.len(), 2);
                assert_eq!(cascading.rules[0].spans_per_second, 50);
                assert!(cascading.rules[0].properties.is_some());
                assert!(cascading.rules[1].properties.is_none());
            }
            other => panic!("unexpected policy kind: {other:?}"),
        }
    }
}
