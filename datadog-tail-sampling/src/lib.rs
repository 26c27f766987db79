// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Cascading tail-based trace sampler.
//!
//! The sampler buffers incoming spans by trace id, waits a configurable
//! interval so each trace can accumulate its spans, then evaluates an
//! ordered policy list against the complete trace and forwards the sampled
//! ones downstream. A global spans-per-second budget is shared across all
//! policies; traces judged marginal get a "second chance" at whatever budget
//! the certain winners leave behind.

pub mod config;
pub mod error;
mod health_metrics;
mod id_batcher;
pub mod metrics;
pub mod processor;
pub mod sampling;
pub mod span;
mod trace_store;

pub use processor::{CascadingSampler, TraceConsumer};
