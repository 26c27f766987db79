// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use super::{Decision, PolicyEvaluator, TraceData};
use crate::span::TraceId;

/// Samples a trace when any of its spans carries a string attribute under
/// `key` whose value is a member of the configured set. Empty strings in the
/// configured set are ignored.
#[derive(Debug)]
pub struct StringAttributeFilter {
    key: String,
    values: HashSet<String>,
}

impl StringAttributeFilter {
    pub fn new(key: &str, values: &[String]) -> Self {
        StringAttributeFilter {
            key: key.to_string(),
            values: values
                .iter()
                .filter(|value| !value.is_empty())
                .cloned()
                .collect(),
        }
    }
}

impl PolicyEvaluator for StringAttributeFilter {
    fn evaluate(&self, _id: TraceId, trace: &TraceData) -> anyhow::Result<Decision> {
        let state = trace.state();
        for batch in &state.received_batches {
            for span in &batch.spans {
                if let Some(value) = span.meta.get(self.key.as_str()) {
                    if self.values.contains(value) {
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

    fn values(list: &[&str]) -> Vec<String> {
        list.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_member_value_is_sampled() {
        let filter = StringAttributeFilter::new("env", &values(&["prod", "staging"]));
        let trace = trace_with_spans(2, &[("env", "prod")], &[]);
        let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::Sampled);
    }

    #[test]
    fn test_non_member_value_is_not_sampled() {
        let filter = StringAttributeFilter::new("env", &values(&["prod"]));
        let trace = trace_with_spans(2, &[("env", "dev")], &[]);
        let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::NotSampled);
    }

    #[test]
    fn test_empty_configured_values_are_ignored() {
        let filter = StringAttributeFilter::new("env", &values(&["", "prod"]));
        assert_eq!(filter.values.len(), 1);

        // A span carrying an empty value must not match the ignored entry.
        let trace = trace_with_spans(1, &[("env", "")], &[]);
        let decision = filter.evaluate(TraceId::from(1u128), &trace).unwrap();
        assert_eq!(decision, Decision::NotSampled);
    }
}
