//! Per-(checkpoint, context) timing baselines
//!
//! Baselines are recomputed from the context observations on every detection
//! run and never persisted. Statistics use the population standard deviation
//! in `f64`; tick counts routinely exceed the range `f32` represents exactly.

use crate::config::TimingConfig;
use crate::correlate::ContextObservation;
use crate::ir::NodeKey;
use serde::Serialize;
use std::collections::HashMap;

/// Page-fault calibration applied when deriving the upper bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundParams {
    pub page_fault_mean: f64,
    pub page_fault_stdev: f64,
    pub scale_factor: f64,
}

impl BoundParams {
    pub fn from_config(config: &TimingConfig) -> Self {
        Self {
            page_fault_mean: config.page_fault_mean,
            page_fault_stdev: config.page_fault_stdev,
            scale_factor: config.scale_factor,
        }
    }
}

/// Timing statistics of one checkpoint reached from one context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBaseline {
    /// Global index of the context-setter, `-1` for the start of a run
    pub context_index: i64,
    pub samples: usize,
    pub mean: f64,
    pub stdev: f64,
}

impl ContextBaseline {
    fn from_samples(context_index: i64, samples: &[u64]) -> Self {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        Self {
            context_index,
            samples: samples.len(),
            mean,
            stdev: variance.sqrt(),
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.mean - self.stdev
    }

    pub fn upper_bound(&self, params: &BoundParams) -> f64 {
        (self.mean + params.page_fault_mean - self.stdev - params.page_fault_stdev)
            * params.scale_factor
    }
}

/// Baseline groups for every observed checkpoint
#[derive(Debug, Default, Clone)]
pub struct Baselines {
    groups: HashMap<NodeKey, Vec<ContextBaseline>>,
}

impl Baselines {
    /// Groups of `checkpoint` in the order their contexts were first seen
    pub fn contexts(&self, checkpoint: &NodeKey) -> &[ContextBaseline] {
        self.groups
            .get(checkpoint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, checkpoint: &NodeKey, context_index: i64) -> Option<&ContextBaseline> {
        self.contexts(checkpoint)
            .iter()
            .find(|b| b.context_index == context_index)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Group observations by checkpoint and context index
///
/// Observations whose context is missing from the classification table are
/// left out. Every repeated sample counts.
pub fn aggregate(observations: &[ContextObservation]) -> Baselines {
    let mut grouped: HashMap<&NodeKey, Vec<(i64, Vec<u64>)>> = HashMap::new();
    let mut excluded = 0usize;

    for o in observations {
        if !o.context.contributes_to_baseline() {
            excluded += 1;
            continue;
        }
        let index = o.context.index();
        let contexts = grouped.entry(&o.checkpoint).or_default();
        match contexts.iter_mut().find(|(ctx, _)| *ctx == index) {
            Some((_, samples)) => samples.push(o.elapsed),
            None => contexts.push((index, vec![o.elapsed])),
        }
    }

    if excluded > 0 {
        tracing::debug!(excluded, "observations with unresolved contexts left out of baselines");
    }

    let groups = grouped
        .into_iter()
        .map(|(checkpoint, contexts)| {
            let baselines = contexts
                .iter()
                .map(|(index, samples)| ContextBaseline::from_samples(*index, samples))
                .collect();
            (checkpoint.clone(), baselines)
        })
        .collect();

    Baselines { groups }
}

/// Debug-log every group of `checkpoint` with its derived bounds
pub fn log_groups(checkpoint: &NodeKey, groups: &[ContextBaseline], params: &BoundParams) {
    for g in groups {
        tracing::debug!(
            context = g.context_index,
            samples = g.samples,
            mean = g.mean,
            stdev = g.stdev,
            lower = g.lower_bound(),
            upper = g.upper_bound(params),
            "baseline for {}",
            checkpoint
        );
    }
}
