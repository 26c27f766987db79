// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort sampler observability.
//!
//! Counters accumulate on atomics so neither ingest nor the decision loop
//! ever blocks on them; `snapshot` drains nothing and can be polled from any
//! thread.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::health_metrics;
use crate::sampling::Decision;

#[derive(Debug, Default)]
struct PolicyCounters {
    name: String,
    sampled: AtomicU64,
    not_sampled: AtomicU64,
    second_chance: AtomicU64,
    /// First-pass Sampled votes demoted because the global budget was spent.
    rate_exceeded: AtomicU64,
    decision_latency_micros: AtomicU64,
}

/// Counters kept by a running sampler.
#[derive(Debug, Default)]
pub(crate) struct SamplerMetrics {
    policies: Vec<PolicyCounters>,
    traces_sampled: AtomicU64,
    traces_not_sampled: AtomicU64,
    dropped_too_early: AtomicU64,
    evaluation_errors: AtomicU64,
    new_trace_ids: AtomicU64,
    late_span_arrivals: AtomicU64,
    late_span_age_seconds: AtomicU64,
    traces_removed: AtomicU64,
    trace_removal_age_seconds: AtomicU64,
    ticks: AtomicU64,
    decision_loop_latency_micros: AtomicU64,
}

impl SamplerMetrics {
    pub fn new(policy_names: impl IntoIterator<Item = String>) -> Self {
        SamplerMetrics {
            policies: policy_names
                .into_iter()
                .map(|name| PolicyCounters {
                    name,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn record_policy_decision(&self, policy: usize, decision: Decision, latency_micros: u64) {
        let Some(counters) = self.policies.get(policy) else {
            return;
        };
        counters
            .decision_latency_micros
            .fetch_add(latency_micros, Ordering::Relaxed);
        let counter = match decision {
            Decision::Sampled => &counters.sampled,
            Decision::NotSampled => &counters.not_sampled,
            Decision::SecondChance => &counters.second_chance,
            Decision::Pending | Decision::Unspecified => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_exceeded(&self, policy: usize) {
        if let Some(counters) = self.policies.get(policy) {
            counters.rate_exceeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_final_decision(&self, sampled: bool) {
        if sampled {
            self.traces_sampled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.traces_not_sampled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_evaluation_error(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_too_early(&self) {
        self.dropped_too_early.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_new_trace_ids(&self, count: u64) {
        self.new_trace_ids.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_late_span_arrival(&self, age_seconds: u64) {
        self.late_span_arrivals.fetch_add(1, Ordering::Relaxed);
        self.late_span_age_seconds
            .fetch_add(age_seconds, Ordering::Relaxed);
    }

    pub fn record_trace_removal(&self, age_seconds: u64) {
        self.traces_removed.fetch_add(1, Ordering::Relaxed);
        self.trace_removal_age_seconds
            .fetch_add(age_seconds, Ordering::Relaxed);
    }

    pub fn record_tick(&self, latency_micros: u64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.decision_loop_latency_micros
            .fetch_add(latency_micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self, live_traces: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            policies: self
                .policies
                .iter()
                .map(|counters| PolicyMetricsSnapshot {
                    name: counters.name.clone(),
                    sampled: counters.sampled.load(Ordering::Relaxed),
                    not_sampled: counters.not_sampled.load(Ordering::Relaxed),
                    second_chance: counters.second_chance.load(Ordering::Relaxed),
                    rate_exceeded: counters.rate_exceeded.load(Ordering::Relaxed),
                    decision_latency_micros: counters
                        .decision_latency_micros
                        .load(Ordering::Relaxed),
                })
                .collect(),
            traces_sampled: self.traces_sampled.load(Ordering::Relaxed),
            traces_not_sampled: self.traces_not_sampled.load(Ordering::Relaxed),
            dropped_too_early: self.dropped_too_early.load(Ordering::Relaxed),
            evaluation_errors: self.evaluation_errors.load(Ordering::Relaxed),
            new_trace_ids: self.new_trace_ids.load(Ordering::Relaxed),
            late_span_arrivals: self.late_span_arrivals.load(Ordering::Relaxed),
            late_span_age_seconds: self.late_span_age_seconds.load(Ordering::Relaxed),
            traces_removed: self.traces_removed.load(Ordering::Relaxed),
            trace_removal_age_seconds: self.trace_removal_age_seconds.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            decision_loop_latency_micros: self
                .decision_loop_latency_micros
                .load(Ordering::Relaxed),
            live_traces,
        }
    }
}

/// Point-in-time view of one policy's counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyMetricsSnapshot {
    pub name: String,
    pub sampled: u64,
    pub not_sampled: u64,
    pub second_chance: u64,
    pub rate_exceeded: u64,
    pub decision_latency_micros: u64,
}

/// Point-in-time view of the sampler counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub policies: Vec<PolicyMetricsSnapshot>,
    pub traces_sampled: u64,
    pub traces_not_sampled: u64,
    pub dropped_too_early: u64,
    pub evaluation_errors: u64,
    pub new_trace_ids: u64,
    pub late_span_arrivals: u64,
    /// Cumulative seconds between decision and late arrival.
    pub late_span_age_seconds: u64,
    pub traces_removed: u64,
    /// Cumulative seconds between arrival and eviction.
    pub trace_removal_age_seconds: u64,
    pub ticks: u64,
    /// Cumulative decision-loop latency.
    pub decision_loop_latency_micros: u64,
    pub live_traces: u64,
}

impl MetricsSnapshot {
    /// The global counters as (stat name, value) pairs, ready to hand to a
    /// statsd-style sink.
    pub fn counters(&self) -> Vec<(&'static str, u64)> {
        vec![
            (health_metrics::STAT_TRACES_SAMPLED, self.traces_sampled),
            (
                health_metrics::STAT_TRACES_NOT_SAMPLED,
                self.traces_not_sampled,
            ),
            (
                health_metrics::STAT_DROPPED_TOO_EARLY,
                self.dropped_too_early,
            ),
            (
                health_metrics::STAT_EVALUATION_ERRORS,
                self.evaluation_errors,
            ),
            (health_metrics::STAT_NEW_TRACE_IDS, self.new_trace_ids),
            (
                health_metrics::STAT_LATE_SPAN_ARRIVALS,
                self.late_span_arrivals,
            ),
            (health_metrics::STAT_TRACES_REMOVED, self.traces_removed),
            (health_metrics::STAT_LIVE_TRACES, self.live_traces),
        ]
    }
}
