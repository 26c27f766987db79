// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

use super::Decision;

/// Seconds since the unix epoch for a given instant; the key of an admission
/// window.
pub fn unix_seconds(now: SystemTime) -> i64 {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Counter of spans admitted within the current wall-clock second. The
/// caller provides the window key, so admissions driven from one tick are
/// deterministic given the same order.
#[derive(Clone, Debug)]
pub struct SpansPerSecondLimiter {
    current_second: i64,
    spans_in_current_second: i64,
    max_spans_per_second: i64,
}

impl SpansPerSecondLimiter {
    pub fn new(max_spans_per_second: i64) -> Self {
        SpansPerSecondLimiter {
            current_second: 0,
            spans_in_current_second: 0,
            max_spans_per_second,
        }
    }

    pub fn max_spans_per_second(&self) -> i64 {
        self.max_spans_per_second
    }

    fn roll(&mut self, now_second: i64) {
        if now_second != self.current_second {
            self.current_second = now_second;
            self.spans_in_current_second = 0;
        }
    }

    /// True if `n_spans` would fit in the current window, without consuming
    /// any budget.
    pub fn would_admit(&mut self, now_second: i64, n_spans: i64) -> bool {
        self.roll(now_second);
        self.spans_in_current_second + n_spans <= self.max_spans_per_second
    }

    /// Admit `n_spans` into the window if they fit, consuming budget.
    pub fn admit(&mut self, now_second: i64, n_spans: i64) -> Decision {
        if self.would_admit(now_second, n_spans) {
            self.spans_in_current_second += n_spans;
            Decision::Sampled
        } else {
            Decision::NotSampled
        }
    }
}
