// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The cascading tail sampler.
//!
//! Ingest threads group arriving spans by trace id and buffer them in the
//! trace store; a ticker thread runs the decision loop once per second,
//! evaluating the ordered policy list against every trace whose wait has
//! elapsed and arbitrating the global span budget in two passes: certain
//! winners first, second-chance traces against whatever budget is left.

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::ConfigError;
use crate::id_batcher::IdBatcher;
use crate::metrics::{MetricsSnapshot, SamplerMetrics};
use crate::sampling::{
    build_policies, build_probabilistic_policy, unix_seconds, Decision, Policy,
    SpansPerSecondLimiter, TraceData,
};
use crate::span::{SampledTrace, Span, SpanBatch, TraceId};
use crate::trace_store::TraceStore;

/// Downstream consumer of decided traces. Invoked for batch emissions from
/// the decision loop and for late-arriving spans of already-sampled traces;
/// `policy` names the policy the emission is attributed to. A failure is
/// logged and never retried.
pub trait TraceConsumer: Send + Sync {
    fn consume(&self, policy: &str, trace: SampledTrace) -> anyhow::Result<()>;
}

/// Tail-based trace sampler with cascading policies and a global
/// spans-per-second budget.
pub struct CascadingSampler {
    inner: Arc<SamplerInner>,
    ticker: Mutex<Option<TickerHandle>>,
    start: Once,
    ticker_enabled: bool,
}

struct TickerHandle {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

struct SamplerInner {
    policies: Vec<Policy>,
    has_probabilistic_filter: bool,
    store: TraceStore,
    batcher: IdBatcher,
    evict_tx: Sender<TraceId>,
    evict_rx: Receiver<TraceId>,
    consumer: Arc<dyn TraceConsumer>,
    metrics: SamplerMetrics,
    /// Global span budget; consulted only from the decision loop.
    global_limiter: Mutex<SpansPerSecondLimiter>,
}

/// Outcome of pass two for one trace of the batch, buffered so emission can
/// happen after the probabilistic ratio for the tick is known.
struct TickEmission {
    sampled: bool,
    attributed_policy: Option<usize>,
    probabilistic: bool,
    batches: Vec<SpanBatch>,
}

impl CascadingSampler {
    /// Build a sampler from its configuration. Fails on any invalid
    /// configuration; runtime errors are absorbed and counted instead.
    pub fn new(
        config: Config,
        consumer: Arc<dyn TraceConsumer>,
    ) -> Result<CascadingSampler, ConfigError> {
        Self::build(config, consumer, true)
    }

    #[cfg(test)]
    pub(crate) fn new_without_ticker(
        config: Config,
        consumer: Arc<dyn TraceConsumer>,
    ) -> Result<CascadingSampler, ConfigError> {
        Self::build(config, consumer, false)
    }

    #[cfg(test)]
    pub(crate) fn new_with_policies(
        config: Config,
        consumer: Arc<dyn TraceConsumer>,
        policies: Vec<Policy>,
    ) -> CascadingSampler {
        let (evict_tx, evict_rx) = crossbeam_channel::bounded(config.num_traces as usize);
        let metrics = SamplerMetrics::new(policies.iter().map(|policy| policy.name.clone()));
        CascadingSampler {
            inner: Arc::new(SamplerInner {
                policies,
                has_probabilistic_filter: false,
                store: TraceStore::new(),
                batcher: IdBatcher::new(
                    config.decision_wait as usize,
                    config.expected_new_traces_per_sec as usize,
                ),
                evict_tx,
                evict_rx,
                consumer,
                metrics,
                global_limiter: Mutex::new(SpansPerSecondLimiter::new(config.spans_per_second)),
            }),
            ticker: Mutex::new(None),
            start: Once::new(),
            ticker_enabled: false,
        }
    }

    fn build(
        config: Config,
        consumer: Arc<dyn TraceConsumer>,
        ticker_enabled: bool,
    ) -> Result<CascadingSampler, ConfigError> {
        if config.decision_wait < 1 {
            return Err(ConfigError::InvalidDecisionWait(config.decision_wait));
        }
        if config.num_traces < 1 {
            return Err(ConfigError::InvalidNumTraces(config.num_traces));
        }
        if config.spans_per_second < 1 {
            return Err(ConfigError::InvalidGlobalBudget(config.spans_per_second));
        }

        let mut policies = build_policies(&config)?;
        let mut has_probabilistic_filter = false;
        match config.probabilistic_filtering_ratio {
            Some(ratio) if ratio != 0.0 => {
                policies.insert(
                    0,
                    build_probabilistic_policy(ratio, config.spans_per_second)?,
                );
                has_probabilistic_filter = true;
            }
            _ => {}
        }

        let (evict_tx, evict_rx) = crossbeam_channel::bounded(config.num_traces as usize);
        let metrics = SamplerMetrics::new(policies.iter().map(|policy| policy.name.clone()));

        Ok(CascadingSampler {
            inner: Arc::new(SamplerInner {
                policies,
                has_probabilistic_filter,
                store: TraceStore::new(),
                batcher: IdBatcher::new(
                    config.decision_wait as usize,
                    config.expected_new_traces_per_sec as usize,
                ),
                evict_tx,
                evict_rx,
                consumer,
                metrics,
                global_limiter: Mutex::new(SpansPerSecondLimiter::new(config.spans_per_second)),
            }),
            ticker: Mutex::new(None),
            start: Once::new(),
            ticker_enabled,
        })
    }

    /// Ingest a batch of spans grouped by resource. The first call starts
    /// the decision-loop ticker.
    pub fn consume(&self, batch: SpanBatch) {
        self.start.call_once(|| {
            info!("first trace data arrived, starting tail sampling timers");
            if self.ticker_enabled {
                self.start_ticker();
            }
        });
        self.inner.process_batch(batch);
    }

    /// Point-in-time view of the sampler counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner
            .metrics
            .snapshot(self.inner.store.live_traces())
    }

    /// Stop the decision-loop ticker. In-flight trace records are abandoned;
    /// ingest calls already in progress return normally.
    pub fn shutdown(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            let _ = ticker.stop_tx.send(());
            if ticker.handle.join().is_err() {
                error!("tail sampling ticker thread panicked");
            }
        }
    }

    fn start_ticker(&self) {
        let inner = Arc::clone(&self.inner);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(Duration::from_secs(1));
        let handle = std::thread::spawn(move || loop {
            select! {
                recv(ticker) -> _ => inner.on_tick(SystemTime::now()),
                recv(stop_rx) -> _ => return,
            }
        });
        *self.ticker.lock() = Some(TickerHandle { stop_tx, handle });
    }

    #[cfg(test)]
    pub(crate) fn tick(&self, now: SystemTime) {
        self.inner.on_tick(now);
    }
}

impl Drop for CascadingSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SamplerInner {
    fn process_batch(&self, batch: SpanBatch) {
        let SpanBatch { resource, spans } = batch;

        // Group spans by trace id to minimize contention on the store.
        let mut spans_by_id: HashMap<TraceId, Vec<Span>> = HashMap::new();
        let mut invalid_ids = 0usize;
        for span in spans {
            if !span.trace_id.is_valid() {
                invalid_ids += 1;
            }
            spans_by_id.entry(span.trace_id).or_default().push(span);
        }
        if invalid_ids > 0 {
            warn!("received {invalid_ids} span(s) without a valid trace id");
        }

        let now = SystemTime::now();
        let mut new_trace_ids = 0u64;
        for (id, spans) in spans_by_id {
            let span_count = spans.len() as i64;
            let (trace, is_new) = self
                .store
                .load_or_create(id, || TraceData::new(self.policies.len(), span_count, now));
            if is_new {
                new_trace_ids += 1;
                self.batcher.add_to_current_batch(id);
                self.enqueue_for_eviction(id, now);
            } else {
                trace.add_spans(span_count);
            }
            self.route_spans(&trace, &resource, spans);
        }
        if new_trace_ids > 0 {
            self.metrics.add_new_trace_ids(new_trace_ids);
        }
    }

    /// Push a new id onto the eviction FIFO; when the FIFO is full the store
    /// is at its ceiling, so drain the oldest id and drop its record until
    /// the new id fits.
    fn enqueue_for_eviction(&self, id: TraceId, now: SystemTime) {
        let mut pending = id;
        loop {
            match self.evict_tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    pending = returned;
                    if let Ok(oldest) = self.evict_rx.try_recv() {
                        self.drop_trace(oldest, now);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Deliver one ingest call's spans for one trace: buffered while the
    /// decision is pending, forwarded or dropped once it is fixed.
    fn route_spans(&self, trace: &TraceData, resource: &HashMap<String, String>, spans: Vec<Span>) {
        let mut spans = Some(spans);
        for (index, policy) in self.policies.iter().enumerate() {
            let decision = {
                let mut state = trace.state();
                let decision = state.decisions[index];
                // While pending, the append must happen under the same lock
                // as the decision read so the decision cannot flip in
                // between. The batch is appended once for the whole policy
                // loop.
                if decision == Decision::Pending {
                    if let Some(spans) = spans.take() {
                        state
                            .received_batches
                            .push(SpanBatch::new(resource.clone(), spans));
                    }
                    return;
                }
                decision
            };

            match decision {
                Decision::Sampled => {
                    let late_batch =
                        SpanBatch::new(resource.clone(), spans.take().unwrap_or_default());
                    if let Err(err) = self
                        .consumer
                        .consume(&policy.name, SampledTrace::new(vec![late_batch.clone()]))
                    {
                        warn!(
                            "error sending late arrived spans to destination: policy={} error={err}",
                            policy.name
                        );
                    }
                    policy
                        .evaluator
                        .on_late_arriving_spans(Decision::Sampled, &late_batch.spans);
                    self.record_late_arrival(trace);
                    // Already handed to the consumer once; stop before
                    // another sampled policy emits a duplicate.
                    return;
                }
                Decision::NotSampled => {
                    if let Some(spans) = spans.as_deref() {
                        policy
                            .evaluator
                            .on_late_arriving_spans(Decision::NotSampled, spans);
                    }
                    self.record_late_arrival(trace);
                }
                // SecondChance resolves within a tick and Unspecified never
                // reaches the per-policy array.
                Decision::Pending | Decision::SecondChance | Decision::Unspecified => {}
            }
        }
    }

    fn record_late_arrival(&self, trace: &TraceData) {
        let decision_time = trace.state().decision_time;
        if let Some(decision_time) = decision_time {
            let age = SystemTime::now()
                .duration_since(decision_time)
                .unwrap_or_default()
                .as_secs();
            self.metrics.record_late_span_arrival(age);
        }
    }

    fn drop_trace(&self, id: TraceId, deletion_time: SystemTime) {
        let Some(trace) = self.store.delete(&id) else {
            error!("attempt to delete trace {id} not on the map");
            return;
        };
        let age = deletion_time
            .duration_since(trace.arrival_time)
            .unwrap_or_default()
            .as_secs();
        self.metrics.record_trace_removal(age);

        let pending: Vec<usize> = {
            let state = trace.state();
            state
                .decisions
                .iter()
                .enumerate()
                .filter(|(_, decision)| **decision == Decision::Pending)
                .map(|(index, _)| index)
                .collect()
        };
        for index in pending {
            let policy = &self.policies[index];
            if let Err(err) = policy.evaluator.on_dropped_spans(id, &trace) {
                warn!(
                    "on_dropped_spans failed: policy={} error={err}",
                    policy.name
                );
            }
        }
    }

    /// One turn of the decision loop.
    fn on_tick(&self, now: SystemTime) {
        let tick_start = Instant::now();
        let batch = self.batcher.close_current_and_take_first_batch();
        let batch_len = batch.len();
        let now_second = unix_seconds(now);
        debug!("sampling policy evaluation ticked");

        let mut global_limiter = self.global_limiter.lock();
        let mut dropped_too_early = 0u64;
        let mut evaluation_errors = 0u64;
        let mut total_spans = 0i64;

        // First pass: provisional decisions, with certain winners charged
        // against the global budget immediately.
        for id in &batch {
            let Some(trace) = self.store.load(id) else {
                dropped_too_early += 1;
                self.metrics.record_dropped_too_early();
                continue;
            };
            trace.state().decision_time = Some(now);
            let span_count = trace.span_count();
            total_spans += span_count;

            let mut provisional = Decision::NotSampled;
            let mut first_sampled_policy: Option<usize> = None;
            for (index, policy) in self.policies.iter().enumerate() {
                let eval_start = Instant::now();
                match policy.evaluator.evaluate(*id, &trace) {
                    Ok(decision) => {
                        self.metrics.record_policy_decision(
                            index,
                            decision,
                            eval_start.elapsed().as_micros() as u64,
                        );
                        trace.state().decisions[index] = decision;
                        match decision {
                            Decision::Sampled if first_sampled_policy.is_none() => {
                                first_sampled_policy = Some(index);
                                provisional = Decision::Sampled;
                            }
                            Decision::SecondChance
                                if provisional == Decision::NotSampled =>
                            {
                                provisional = Decision::SecondChance;
                            }
                            _ => {}
                        }
                    }
                    Err(err) => {
                        evaluation_errors += 1;
                        self.metrics.record_evaluation_error();
                        trace.state().decisions[index] = Decision::NotSampled;
                        debug!("sampling policy error: policy={} error={err}", policy.name);
                    }
                }
            }

            let final_decision = match provisional {
                Decision::Sampled => {
                    if global_limiter.admit(now_second, span_count) == Decision::Sampled {
                        if self.has_probabilistic_filter && first_sampled_policy == Some(0) {
                            trace.state().selected_by_probabilistic_filter = true;
                        }
                        Decision::Sampled
                    } else {
                        // Demoted: compete again once the certain winners
                        // have been charged.
                        if let Some(index) = first_sampled_policy {
                            self.metrics.record_rate_exceeded(index);
                        }
                        Decision::SecondChance
                    }
                }
                other => other,
            };
            trace.state().final_decision = final_decision;
        }

        // Second pass: second-chance arbitration over the leftover budget,
        // in batch order, and detachment of the buffered span groups.
        let mut emissions: Vec<TickEmission> = Vec::with_capacity(batch_len);
        let mut probabilistic_spans = 0i64;
        let mut sampled_traces = 0u64;
        let mut not_sampled_traces = 0u64;
        for id in &batch {
            let Some(trace) = self.store.load(id) else {
                continue;
            };
            let span_count = trace.span_count();
            let mut state = trace.state();

            if state.final_decision == Decision::SecondChance {
                let resolved = global_limiter.admit(now_second, span_count);
                for decision in state.decisions.iter_mut() {
                    // SecondChance votes resolve either way; a Sampled vote
                    // that lost the first-pass arbitration must not keep
                    // attracting late arrivals when the trace is dropped.
                    if *decision == Decision::SecondChance
                        || (resolved == Decision::NotSampled && *decision == Decision::Sampled)
                    {
                        *decision = resolved;
                    }
                }
                state.final_decision = resolved;
            }

            let batches = std::mem::take(&mut state.received_batches);
            let sampled = state.final_decision == Decision::Sampled;
            let probabilistic = state.selected_by_probabilistic_filter;
            let attributed_policy = state
                .decisions
                .iter()
                .position(|decision| *decision == Decision::Sampled);
            drop(state);

            if sampled {
                sampled_traces += 1;
                if probabilistic {
                    probabilistic_spans += span_count;
                }
            } else {
                not_sampled_traces += 1;
            }
            self.metrics.record_final_decision(sampled);
            emissions.push(TickEmission {
                sampled,
                attributed_policy,
                probabilistic,
                batches,
            });
        }
        drop(global_limiter);

        // Emission, still in batch order. The probabilistic ratio needs the
        // tick totals, which is why it waits for the pass above.
        let probabilistic_ratio = if total_spans > 0 {
            probabilistic_spans as f64 / total_spans as f64
        } else {
            0.0
        };
        for emission in emissions {
            let Some(policy_index) = emission.attributed_policy else {
                continue;
            };
            if !emission.sampled {
                continue;
            }
            let mut sampled_trace = SampledTrace::new(emission.batches);
            if emission.probabilistic {
                for batch in &mut sampled_trace.batches {
                    for span in &mut batch.spans {
                        span.scale_sampling_probability(probabilistic_ratio);
                    }
                }
            }
            let policy = &self.policies[policy_index];
            if let Err(err) = self.consumer.consume(&policy.name, sampled_trace) {
                error!(
                    "error sending sampled trace to destination: policy={} error={err}",
                    policy.name
                );
            }
        }

        self.metrics
            .record_tick(tick_start.elapsed().as_micros() as u64);
        debug!(
            "sampling policy evaluation completed: batch_len={batch_len} sampled={sampled_traces} \
             not_sampled={not_sampled_traces} dropped_prior_to_evaluation={dropped_too_early} \
             policy_evaluation_errors={evaluation_errors}"
        );
    }
}
