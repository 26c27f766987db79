// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::fmt::{self, Display};

/// Errors raised while validating a sampler configuration. These are the only
/// fatal errors: the sampler refuses to start on any of them. Runtime errors
/// are absorbed and counted instead.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// `decision_wait` must be at least one second.
    InvalidDecisionWait(u64),
    /// `num_traces` must be positive.
    InvalidNumTraces(u64),
    /// The global `spans_per_second` budget must be positive.
    InvalidGlobalBudget(i64),
    /// `probabilistic_filtering_ratio` must lie in (0, 1].
    InvalidFilteringRatio(f64),
    /// The policy list may not be empty.
    NoPolicies,
    /// A properties filter carried an invalid operation-name pattern. The
    /// fields are the policy name and the regex error.
    InvalidNamePattern(String, String),
    /// A properties filter carried a negative `min_duration_micros`.
    NegativeMinDuration(String, i64),
    /// A properties filter carried a non-positive `min_number_of_spans`.
    NonPositiveMinSpans(String, i64),
    /// A rate-limiting policy carried a negative `spans_per_second`.
    NegativeRateLimit(String, i64),
    /// A cascading policy has no sub-rules.
    NoCascadingRules(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidDecisionWait(secs) => {
                write!(f, "decision_wait must be at least 1 second, got {secs}")
            }
            ConfigError::InvalidNumTraces(n) => {
                write!(f, "num_traces must be positive, got {n}")
            }
            ConfigError::InvalidGlobalBudget(n) => {
                write!(f, "spans_per_second must be positive, got {n}")
            }
            ConfigError::InvalidFilteringRatio(r) => {
                write!(
                    f,
                    "probabilistic_filtering_ratio must be in (0, 1], got {r}"
                )
            }
            ConfigError::NoPolicies => write!(f, "at least one policy must be configured"),
            ConfigError::InvalidNamePattern(policy, detail) => {
                write!(f, "policy {policy}: invalid name_pattern: {detail}")
            }
            ConfigError::NegativeMinDuration(policy, value) => {
                write!(
                    f,
                    "policy {policy}: minimum span duration must be a non-negative number, got {value}"
                )
            }
            ConfigError::NonPositiveMinSpans(policy, value) => {
                write!(
                    f,
                    "policy {policy}: minimum number of spans must be a positive number, got {value}"
                )
            }
            ConfigError::NegativeRateLimit(policy, value) => {
                write!(
                    f,
                    "policy {policy}: spans_per_second must be non-negative, got {value}"
                )
            }
            ConfigError::NoCascadingRules(policy) => {
                write!(f, "policy {policy}: cascading policy needs at least one rule")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_policy_name() {
        let err = ConfigError::NonPositiveMinSpans("slow-traces".to_string(), 0);
        assert_eq!(
            err.to_string(),
            "policy slow-traces: minimum number of spans must be a positive number, got 0"
        );
    }

    #[test]
    fn test_display_global_options() {
        assert_eq!(
            ConfigError::InvalidDecisionWait(0).to_string(),
            "decision_wait must be at least 1 second, got 0"
        );
        assert_eq!(
            ConfigError::InvalidFilteringRatio(1.5).to_string(),
            "probabilistic_filtering_ratio must be in (0, 1], got 1.5"
        );
    }
}
