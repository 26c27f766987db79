// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use datadog_tail_sampling::config::{Config, PolicyConfig, PolicyKind};
use datadog_tail_sampling::span::{SampledTrace, Span, SpanBatch, TraceId};
use datadog_tail_sampling::{CascadingSampler, TraceConsumer};

struct NullConsumer;

impl TraceConsumer for NullConsumer {
    fn consume(&self, _policy: &str, _trace: SampledTrace) -> anyhow::Result<()> {
        Ok(())
    }
}

fn get_span(trace_id: u128, span_id: i64) -> Span {
    let mut meta = HashMap::from([("env".to_string(), "bench".to_string())]);
    if span_id % 3 == 0 {
        meta.insert("db_name".to_string(), "postgres".to_string());
    }
    Span {
        trace_id: TraceId::from(trace_id),
        name: format!("operation-{span_id}"),
        start: span_id * 1_000_000,
        end: (span_id + 1) * 1_000_000,
        meta,
        metrics: HashMap::from([("http.status".to_string(), (200 + span_id % 400) as f64)]),
    }
}

fn get_batches() -> Vec<SpanBatch> {
    (1..100u128)
        .map(|trace_id| {
            SpanBatch::new(
                HashMap::from([("service".to_string(), "bench-service".to_string())]),
                (0..20).map(|span_id| get_span(trace_id, span_id)).collect(),
            )
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampler");
    let config = Config {
        decision_wait: 30,
        num_traces: 50_000,
        expected_new_traces_per_sec: 100,
        spans_per_second: 10_000,
        probabilistic_filtering_ratio: None,
        policies: vec![PolicyConfig {
            name: "keep-all".to_string(),
            kind: PolicyKind::AlwaysSample {},
        }],
    };
    let sampler = CascadingSampler::new(config, Arc::new(NullConsumer)).unwrap();

    group.bench_function("ingest_spans", |b| {
        b.iter_batched(
            get_batches,
            |batches| {
                for batch in batches {
                    sampler.consume(batch);
                }
            },
            criterion::BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
