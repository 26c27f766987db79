// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span and trace data types used by the sampler.

use std::collections::HashMap;
use std::fmt;

/// Numeric span attribute holding the effective sampling probability of an
/// emitted span. Written as a double; multiplied if already present.
pub const SAMPLING_PROBABILITY_KEY: &str = "sampling.probability";

/// Opaque 128-bit trace identifier. Equality and hashing are structural.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId([u8; 16]);

impl TraceId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// An all-zero id is tolerated on ingest but flagged as invalid.
    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 16]
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value.to_be_bytes())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A timestamped unit of work. String attributes live in `meta`, numeric
/// attributes in `metrics`; `start` and `end` are nanoseconds since the unix
/// epoch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Span {
    pub trace_id: TraceId,
    pub name: String,
    pub start: i64,
    pub end: i64,
    pub meta: HashMap<String, String>,
    pub metrics: HashMap<String, f64>,
}

impl Span {
    /// Duration of the span in microseconds, zero if the timestamps are
    /// inverted.
    pub fn duration_micros(&self) -> i64 {
        self.end.saturating_sub(self.start).max(0) / 1_000
    }

    /// Set the sampling-probability attribute, multiplying any value that is
    /// already there.
    pub fn scale_sampling_probability(&mut self, ratio: f64) {
        self.metrics
            .entry(SAMPLING_PROBABILITY_KEY.to_string())
            .and_modify(|v| *v *= ratio)
            .or_insert(ratio);
    }
}

/// The resource-attributed set of spans accompanying one ingest event. Spans
/// in a batch may belong to several traces; the sampler regroups them by
/// trace id.
#[derive(Clone, Debug, Default)]
pub struct SpanBatch {
    pub resource: HashMap<String, String>,
    pub spans: Vec<Span>,
}

impl SpanBatch {
    pub fn new(resource: HashMap<String, String>, spans: Vec<Span>) -> Self {
        SpanBatch { resource, spans }
    }

    pub fn span_count(&self) -> i64 {
        self.spans.len() as i64
    }
}

/// A decided trace handed to the downstream consumer: the ordered list of
/// span groups received for one trace id.
#[derive(Clone, Debug, Default)]
pub struct SampledTrace {
    pub batches: Vec<SpanBatch>,
}

impl SampledTrace {
    pub fn new(batches: Vec<SpanBatch>) -> Self {
        SampledTrace { batches }
    }

    pub fn span_count(&self) -> i64 {
        self.batches.iter().map(SpanBatch::span_count).sum()
    }

    /// Iterate over every span of the trace in batch order.
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.batches.iter().flat_map(|batch| batch.spans.iter())
    }
}
