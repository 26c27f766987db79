// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rolling queue of per-second batches of trace ids awaiting a decision.
//!
//! A ring of `decision_wait + 1` buckets: one in-progress bucket taking
//! appends from ingest threads and `decision_wait` closed buckets aging
//! towards their decision tick. Rotating the ring once per second yields the
//! batch whose wait has elapsed.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::span::TraceId;

#[derive(Debug)]
pub(crate) struct IdBatcher {
    buckets: Vec<Mutex<Vec<TraceId>>>,
    current: AtomicUsize,
    /// Pre-sizing hint for fresh buckets, from
    /// `expected_new_traces_per_sec`.
    batch_capacity_hint: usize,
}

impl IdBatcher {
    /// `num_batches` is the decision wait in seconds; an id appended between
    /// two rotations is returned `num_batches + 1` rotations later, i.e.
    /// roughly `num_batches` seconds after it arrived.
    pub fn new(num_batches: usize, batch_capacity_hint: usize) -> Self {
        let slots = num_batches.max(1) + 1;
        IdBatcher {
            buckets: (0..slots)
                .map(|_| Mutex::new(Vec::with_capacity(batch_capacity_hint)))
                .collect(),
            current: AtomicUsize::new(0),
            batch_capacity_hint,
        }
    }

    /// Append a trace id to the in-progress bucket. Safe to call from many
    /// ingest threads; an append racing with a rotation lands in the batch
    /// that just closed, which only shortens its wait by the in-flight call.
    pub fn add_to_current_batch(&self, id: TraceId) {
        let index = self.current.load(Ordering::Acquire);
        self.buckets[index].lock().push(id);
    }

    /// Close the in-progress bucket and return the oldest closed one. Must
    /// be called by a single rotator, once per tick.
    pub fn close_current_and_take_first_batch(&self) -> Vec<TraceId> {
        let current = self.current.load(Ordering::Relaxed);
        let oldest = (current + 1) % self.buckets.len();
        // Drain the oldest slot before pointing writers at it.
        let batch = {
            let mut bucket = self.buckets[oldest].lock();
            std::mem::replace(&mut *bucket, Vec::with_capacity(self.batch_capacity_hint))
        };
        self.current.store(oldest, Ordering::Release);
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> TraceId {
        TraceId::from(n)
    }

    #[test]
    fn test_batch_surfaces_after_decision_wait_rotations() {
        let batcher = IdBatcher::new(3, 0);
        batcher.add_to_current_batch(id(1));
        batcher.add_to_current_batch(id(2));

        assert!(batcher.close_current_and_take_first_batch().is_empty());
        assert!(batcher.close_current_and_take_first_batch().is_empty());
        assert!(batcher.close_current_and_take_first_batch().is_empty());
        assert_eq!(
            batcher.close_current_and_take_first_batch(),
            vec![id(1), id(2)]
        );
    }

    #[test]
    fn test_batches_keep_arrival_order() {
        let batcher = IdBatcher::new(1, 0);
        batcher.add_to_current_batch(id(1));
        batcher.add_to_current_batch(id(2));
        batcher.close_current_and_take_first_batch();

        batcher.add_to_current_batch(id(3));
        assert_eq!(
            batcher.close_current_and_take_first_batch(),
            vec![id(1), id(2)]
        );
        assert_eq!(batcher.close_current_and_take_first_batch(), vec![id(3)]);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let batcher = std::sync::Arc::new(IdBatcher::new(1, 128));
        let handles: Vec<_> = (0..4)
            .map(|thread| {
                let batcher = std::sync::Arc::clone(&batcher);
                std::thread::spawn(move || {
                    for n in 0..250u128 {
                        batcher.add_to_current_batch(id(thread as u128 * 1_000 + n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut collected = batcher.close_current_and_take_first_batch();
        collected.extend(batcher.close_current_and_take_first_batch());
        assert_eq!(collected.len(), 1_000);
    }
}
