// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;

use parking_lot::Mutex;

use super::rate_limiter::{unix_seconds, SpansPerSecondLimiter};
use super::{Decision, PolicyEvaluator, TraceData};
use crate::span::TraceId;

/// Admits spans up to a fixed budget per second across all traces this
/// policy sees, independently of the global budget.
#[derive(Debug)]
pub struct RateLimitingFilter {
    limiter: Mutex<SpansPerSecondLimiter>,
}

impl RateLimitingFilter {
    pub fn new(spans_per_second: i64) -> Self {
        RateLimitingFilter {
            limiter: Mutex::new(SpansPerSecondLimiter::new(spans_per_second)),
        }
    }
}

impl PolicyEvaluator for RateLimitingFilter {
    fn evaluate(&self, _id: TraceId, trace: &TraceData) -> anyhow::Result<Decision> {
        let now_second = unix_seconds(SystemTime::now());
        Ok(self
            .limiter
            .lock()
            .admit(now_second, trace.span_count()))
    }
}
