// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{Decision, PolicyEvaluator, TraceData};
use crate::span::TraceId;

/// Samples a trace when any of its spans carries a numeric attribute under
/// `key` whose value lies in `[min_value, max_value]`.
#[derive(Debug)]
pub struct NumericAttributeFilter {
    key: String,
    min_value: i64,
    max_value: i64,
}

impl NumericAttributeFilter {
    pub fn new(key: &str, min_value: i64, max_value: i64) -> Self {
        NumericAttributeFilter {
            key: key.to_string(),
            min_value,
            max_value,
        }
    }
}

impl PolicyEvaluator for NumericAttributeFilter {
    fn evaluate(&self, _id: TraceId, trace: &TraceData) -> anyhow::Result<Decision> {
        let state = trace.state();
        for batch in &state.received_batches {
            for span in &batch.spans {
                if let Some(value) = span.metrics.get(self.key.as_str()) {
                    if *value >= self.min_value as f64 && *value <= self.max_value as f64 {
                        return Ok(Decision::Sampled);
                    }
                }
            }
        }
        Ok(Decision::NotSampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::test_util::trace_with_spans;

    #[test]
    fn test_value_in_range_is_sampled() {
        let filter = NumericAttributeFilter::new("http.status", 400, 599);
        let trace = trace_with_spans(2, &[], &[("http.status", 500.0)]);
        let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::Sampled);
    }

    #[test]
    fn test_value_out_of_range_is_not_sampled() {
        let filter = NumericAttributeFilter::new("http.status", 400, 599);
        let trace = trace_with_spans(2, &[], &[("http.status", 200.0)]);
        let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::NotSampled);
    }

    #[test]
    fn test_missing_attribute_is_not_sampled() {
        let filter = NumericAttributeFilter::new("http.status", 400, 599);
        let trace = trace_with_spans(2, &[], &[("retries", 450.0)]);
        let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::NotSampled);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let filter = NumericAttributeFilter::new("http.status", 400, 599);
        for status in [400.0, 599.0] {
            let trace = trace_with_spans(1, &[], &[("http.status", status)]);
            let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
            assert_eq!(decision, Decision::Sampled);
        }
    }
}
