// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;

use super::{Decision, PolicyEvaluator, TraceData};
use crate::config::PropertiesConfig;
use crate::error::ConfigError;
use crate::span::TraceId;

/// Samples a trace when all configured sub-conditions hold: root-span
/// operation name matching `name_pattern`, wall-clock trace duration of at
/// least `min_duration_micros` (max end-time minus min start-time across
/// spans) and at least `min_number_of_spans` spans.
#[derive(Debug)]
pub struct SpanPropertiesFilter {
    operation_re: Option<Regex>,
    min_duration_micros: Option<i64>,
    min_number_of_spans: Option<i64>,
}

impl SpanPropertiesFilter {
    pub fn new(policy_name: &str, config: &PropertiesConfig) -> Result<Self, ConfigError> {
        let operation_re = match &config.name_pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|err| {
                ConfigError::InvalidNamePattern(policy_name.to_string(), err.to_string())
            })?),
            None => None,
        };
        if let Some(min_duration) = config.min_duration_micros {
            if min_duration < 0 {
                return Err(ConfigError::NegativeMinDuration(
                    policy_name.to_string(),
                    min_duration,
                ));
            }
        }
        if let Some(min_spans) = config.min_number_of_spans {
            if min_spans < 1 {
                return Err(ConfigError::NonPositiveMinSpans(
                    policy_name.to_string(),
                    min_spans,
                ));
            }
        }
        Ok(SpanPropertiesFilter {
            operation_re,
            min_duration_micros: config.min_duration_micros,
            min_number_of_spans: config.min_number_of_spans,
        })
    }
}

impl PolicyEvaluator for SpanPropertiesFilter {
    fn evaluate(&self, _id: TraceId, trace: &TraceData) -> anyhow::Result<Decision> {
        let state = trace.state();

        let mut span_count: i64 = 0;
        let mut min_start = i64::MAX;
        let mut max_end = i64::MIN;
        // The root span is the earliest-starting span of the buffered trace.
        let mut root_name: Option<&str> = None;

        for batch in &state.received_batches {
            for span in &batch.spans {
                span_count += 1;
                if span.start < min_start {
                    min_start = span.start;
                    root_name = Some(span.name.as_str());
                }
                if span.end > max_end {
                    max_end = span.end;
                }
            }
        }

        if let Some(operation_re) = &self.operation_re {
            match root_name {
                Some(name) if operation_re.is_match(name) => {}
                _ => return Ok(Decision::NotSampled),
            }
        }
        if let Some(min_duration) = self.min_duration_micros {
            if span_count == 0 || max_end.saturating_sub(min_start) / 1_000 < min_duration {
                return Ok(Decision::NotSampled);
            }
        }
        if let Some(min_spans) = self.min_number_of_spans {
            if span_count < min_spans {
                return Ok(Decision::NotSampled);
            }
        }
        Ok(Decision::Sampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::test_util::trace_with_spans;

    fn filter(config: PropertiesConfig) -> SpanPropertiesFilter {
        SpanPropertiesFilter::new("test-policy", &config).unwrap()
    }

    #[test]
    fn test_invalid_regex_is_a_config_error() {
        let err = SpanPropertiesFilter::new(
            "broken",
            &PropertiesConfig {
                name_pattern: Some("(".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNamePattern(name, _) if name == "broken"));
    }

    #[test]
    fn test_negative_duration_is_a_config_error() {
        let err = SpanPropertiesFilter::new(
            "broken",
            &PropertiesConfig {
                min_duration_micros: Some(-1),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::NegativeMinDuration("broken".to_string(), -1));
    }

    #[test]
    fn test_non_positive_span_count_is_a_config_error() {
        let err = SpanPropertiesFilter::new(
            "broken",
            &PropertiesConfig {
                min_number_of_spans: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveMinSpans("broken".to_string(), 0));
    }

    #[test]
    fn test_name_pattern_applies_to_root_span() {
        let properties = filter(PropertiesConfig {
            name_pattern: Some("^operation-0$".to_string()),
            ..Default::default()
        });
        // trace_with_spans names spans operation-0..n in start order, so the
        // root span is operation-0.
        let trace = trace_with_spans(3, &[], &[]);
        let decision = properties.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::Sampled);

        let properties = filter(PropertiesConfig {
            name_pattern: Some("^operation-2$".to_string()),
            ..Default::default()
        });
        let trace = trace_with_spans(3, &[], &[]);
        let decision = properties.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::NotSampled);
    }

    #[test]
    fn test_min_duration() {
        // Three spans laid out back to back span 3ms of wall-clock time.
        let properties = filter(PropertiesConfig {
            min_duration_micros: Some(3_000),
            ..Default::default()
        });
        let trace = trace_with_spans(3, &[], &[]);
        let decision = properties.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::Sampled);

        let properties = filter(PropertiesConfig {
            min_duration_micros: Some(3_001),
            ..Default::default()
        });
        let trace = trace_with_spans(3, &[], &[]);
        let decision = properties.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::NotSampled);
    }

    #[test]
    fn test_min_number_of_spans() {
        let properties = filter(PropertiesConfig {
            min_number_of_spans: Some(3),
            ..Default::default()
        });
        let trace = trace_with_spans(3, &[], &[]);
        assert_eq!(
            properties.evaluate(TraceId::from(1u128), &trace).unwrap(),
            Decision::Sampled
        );
        let trace = trace_with_spans(2, &[], &[]);
        assert_eq!(
            properties.evaluate(TraceId::from(1u128), &trace).unwrap(),
            Decision::NotSampled
        );
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let properties = filter(PropertiesConfig {
            name_pattern: Some("^operation-0$".to_string()),
            min_duration_micros: Some(1_000),
            min_number_of_spans: Some(5),
        });
        // Name and duration match but the span count does not.
        let trace = trace_with_spans(3, &[], &[]);
        assert_eq!(
            properties.evaluate(TraceId::from(1u128), &trace).unwrap(),
            Decision::NotSampled
        );
    }
}
