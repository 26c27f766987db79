// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! health_metrics holds the stat names emitted for sampler observability.

pub(crate) const STAT_TRACES_SAMPLED: &str = "datadog.tailsampling.decision.traces_sampled";
pub(crate) const STAT_TRACES_NOT_SAMPLED: &str =
    "datadog.tailsampling.decision.traces_not_sampled";
pub(crate) const STAT_DROPPED_TOO_EARLY: &str = "datadog.tailsampling.dropped_too_early";
pub(crate) const STAT_EVALUATION_ERRORS: &str = "datadog.tailsampling.evaluation_errors";
pub(crate) const STAT_NEW_TRACE_IDS: &str = "datadog.tailsampling.new_trace_ids";
pub(crate) const STAT_LATE_SPAN_ARRIVALS: &str = "datadog.tailsampling.late_span_arrivals";
pub(crate) const STAT_TRACES_REMOVED: &str = "datadog.tailsampling.traces_removed";
pub(crate) const STAT_LIVE_TRACES: &str = "datadog.tailsampling.live_traces";
