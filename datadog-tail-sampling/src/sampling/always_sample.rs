// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{Decision, PolicyEvaluator, TraceData};
use crate::span::TraceId;

/// Policy that samples every trace it sees.
#[derive(Debug, Default)]
pub struct AlwaysSample;

impl AlwaysSample {
    pub fn new() -> Self {
        AlwaysSample
    }
}

impl PolicyEvaluator for AlwaysSample {
    fn evaluate(&self, _id: TraceId, _trace: &TraceData) -> anyhow::Result<Decision> {
        Ok(Decision::Sampled)
    }
}
