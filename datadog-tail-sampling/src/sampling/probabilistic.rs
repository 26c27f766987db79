// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;

use parking_lot::Mutex;
use rand::Rng;

use super::rate_limiter::{unix_seconds, SpansPerSecondLimiter};
use super::{Decision, PolicyEvaluator, TraceData};
use crate::span::TraceId;

/// Pre-filter that admits a configurable fraction of overall span volume
/// independently of the other policies. A uniform draw against the ratio
/// gates each trace; admitted spans are then capped by the slice of the
/// global budget reserved for the filter.
#[derive(Debug)]
pub struct ProbabilisticFilter {
    ratio: f64,
    limiter: Mutex<SpansPerSecondLimiter>,
}

impl ProbabilisticFilter {
    pub fn new(ratio: f64, global_spans_per_second: i64) -> Self {
        let budget = (global_spans_per_second as f64 * ratio).floor() as i64;
        ProbabilisticFilter {
            ratio,
            limiter: Mutex::new(SpansPerSecondLimiter::new(budget)),
        }
    }

    pub fn spans_per_second(&self) -> i64 {
        self.limiter.lock().max_spans_per_second()
    }
}

impl PolicyEvaluator for ProbabilisticFilter {
    fn evaluate(&self, _id: TraceId, trace: &TraceData) -> anyhow::Result<Decision> {
        if self.ratio < 1.0 && rand::thread_rng().gen::<f64>() >= self.ratio {
            return Ok(Decision::NotSampled);
        }
        let now_second = unix_seconds(SystemTime::now());
        Ok(self
            .limiter
            .lock()
            .admit(now_second, trace.span_count()))
    }
}
