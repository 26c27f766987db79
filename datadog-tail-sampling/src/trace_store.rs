// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Concurrent mapping from trace id to in-flight trace record.
//!
//! Striped-lock table: ids are spread over a fixed power-of-two number of
//! shards by hash, so many ingest threads can insert while the decision loop
//! reads. Eviction order is not kept here; the processor owns the FIFO of
//! ids driving eviction.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::sampling::TraceData;
use crate::span::TraceId;

const SHARD_COUNT: usize = 16;

#[derive(Debug)]
pub(crate) struct TraceStore {
    shards: Vec<RwLock<HashMap<TraceId, Arc<TraceData>>>>,
    live_traces: AtomicU64,
}

impl TraceStore {
    pub fn new() -> Self {
        TraceStore {
            shards: (0..SHARD_COUNT).map(|_| RwLock::default()).collect(),
            live_traces: AtomicU64::new(0),
        }
    }

    fn shard(&self, id: &TraceId) -> &RwLock<HashMap<TraceId, Arc<TraceData>>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize & (SHARD_COUNT - 1)]
    }

    /// Fetch the record for `id`, creating it from `init` when absent.
    /// Returns the record and whether it was newly created.
    pub fn load_or_create(
        &self,
        id: TraceId,
        init: impl FnOnce() -> TraceData,
    ) -> (Arc<TraceData>, bool) {
        let shard = self.shard(&id);
        if let Some(existing) = shard.read().get(&id) {
            return (Arc::clone(existing), false);
        }
        let mut guard = shard.write();
        // Another writer may have inserted between the read and the write
        // lock.
        if let Some(existing) = guard.get(&id) {
            return (Arc::clone(existing), false);
        }
        let record = Arc::new(init());
        guard.insert(id, Arc::clone(&record));
        self.live_traces.fetch_add(1, Ordering::Relaxed);
        (record, true)
    }

    pub fn load(&self, id: &TraceId) -> Option<Arc<TraceData>> {
        self.shard(id).read().get(id).map(Arc::clone)
    }

    /// Remove the record for `id`, returning it if it was present.
    pub fn delete(&self, id: &TraceId) -> Option<Arc<TraceData>> {
        let removed = self.shard(id).write().remove(id);
        if removed.is_some() {
            self.live_traces.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Number of live trace records.
    pub fn live_traces(&self) -> u64 {
        self.live_traces.load(Ordering::Relaxed)
    }
}
