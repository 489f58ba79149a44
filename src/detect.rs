//! Detection probes
//!
//! Each node's role is decided by trace-relation membership alone:
//!
//! ```text
//!                 checkpoint of some observation?
//!                      no              yes
//! context of    no   Neither        CheckpointOnly
//! some obs.?    yes  ContextOnly    Both
//! ```
//!
//! A checkpoint gets a call to the arity-matching runtime decision routine
//! with one `(context, lower, upper)` triple per baseline group. A context
//! node stores its global index into `pre_bb_num`. For `Both` the decision
//! call comes first so it sees the previous context.

use crate::baseline::{log_groups, Baselines, BoundParams, ContextBaseline};
use crate::config::TimingConfig;
use crate::correlate::{Context, ContextObservation};
use crate::instrument::{
    commit_checkpoint_time, elapsed_since_checkpoint, instrument_entry_exit,
    ElapsedSinceCheckpoint, ExitOutcome,
};
use crate::ir::{InsertPoint, NodeKey, Operand, ProbeBuilder, Program, RuntimeFn, SharedCell};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Neither,
    CheckpointOnly,
    ContextOnly,
    Both,
}

impl NodeRole {
    fn new(is_checkpoint: bool, is_context: bool) -> Self {
        match (is_checkpoint, is_context) {
            (false, false) => NodeRole::Neither,
            (true, false) => NodeRole::CheckpointOnly,
            (false, true) => NodeRole::ContextOnly,
            (true, true) => NodeRole::Both,
        }
    }

    pub fn is_checkpoint(self) -> bool {
        matches!(self, NodeRole::CheckpointOnly | NodeRole::Both)
    }

    pub fn is_context(self) -> bool {
        matches!(self, NodeRole::ContextOnly | NodeRole::Both)
    }
}

/// Which nodes appear as checkpoint or as context in the observations
#[derive(Debug, Default)]
pub struct TraceRelations {
    checkpoints: HashSet<NodeKey>,
    contexts: HashMap<NodeKey, u64>,
}

impl TraceRelations {
    /// Only resolved contexts count; a context missing from the
    /// classification table has no index to store
    pub fn from_observations(observations: &[ContextObservation]) -> Self {
        let mut relations = Self::default();
        for o in observations {
            relations.checkpoints.insert(o.checkpoint.clone());
            if let Context::Resolved { key, index } = &o.context {
                relations.contexts.insert(key.clone(), *index);
            }
        }
        relations
    }

    pub fn role(&self, key: &NodeKey) -> NodeRole {
        NodeRole::new(self.checkpoints.contains(key), self.contexts.contains_key(key))
    }

    pub fn context_index(&self, key: &NodeKey) -> Option<u64> {
        self.contexts.get(key).copied()
    }
}

/// A checkpoint left without a decision call because it had too many contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArityOverflow {
    pub checkpoint: NodeKey,
    pub contexts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub nodes: usize,
    pub detection_calls: usize,
    pub context_stores: usize,
    /// Decision calls emitted per arity, index 0 is arity 1
    pub calls_by_arity: [usize; RuntimeFn::MAX_DETECT_ARITY],
    pub arity_overflows: Vec<ArityOverflow>,
    /// Checkpoints whose observations all had unresolved contexts
    pub without_baseline: Vec<NodeKey>,
    pub entry_exit: ExitOutcome,
}

impl DetectionReport {
    fn new() -> Self {
        Self {
            nodes: 0,
            detection_calls: 0,
            context_stores: 0,
            calls_by_arity: [0; RuntimeFn::MAX_DETECT_ARITY],
            arity_overflows: Vec::new(),
            without_baseline: Vec::new(),
            entry_exit: ExitOutcome::NotPresent,
        }
    }
}

/// Inserts detection probes from correlated training data
pub struct DetectionInstrumenter<'a> {
    config: &'a TimingConfig,
    params: BoundParams,
    max_arity: usize,
}

impl<'a> DetectionInstrumenter<'a> {
    pub fn new(config: &'a TimingConfig, max_arity: usize) -> Self {
        Self {
            config,
            params: BoundParams::from_config(config),
            max_arity: max_arity.min(RuntimeFn::MAX_DETECT_ARITY),
        }
    }

    pub fn instrument(
        &self,
        program: &mut Program,
        relations: &TraceRelations,
        baselines: &Baselines,
    ) -> DetectionReport {
        let mut temps = program.temp_allocator();
        let mut report = DetectionReport::new();

        for f in 0..program.functions.len() {
            for b in 0..program.functions[f].blocks.len() {
                report.nodes += 1;
                let key = NodeKey::new(
                    program.functions[f].name.as_str(),
                    program.functions[f].blocks[b].name.as_str(),
                );
                let role = relations.role(&key);
                if role == NodeRole::Neither {
                    continue;
                }
                tracing::trace!(?role, "node {}", key);

                let mut probe = ProbeBuilder::new(&mut temps);

                if role.is_checkpoint() {
                    // the clock advances even where the decision call is skipped
                    let t = elapsed_since_checkpoint(&mut probe);
                    let groups = baselines.contexts(&key);
                    if self.admits(&key, groups, &mut report) {
                        log_groups(&key, groups, &self.params);
                        self.emit_decision(&mut probe, &key, t, groups);
                        report.detection_calls += 1;
                        report.calls_by_arity[groups.len() - 1] += 1;
                    }
                    commit_checkpoint_time(&mut probe);
                }

                if role.is_context() {
                    if let Some(index) = relations.context_index(&key) {
                        probe.store(SharedCell::LastContext, index as i64);
                        report.context_stores += 1;
                    }
                }

                program.insert(f, b, InsertPoint::BeforeTerminator, probe.finish());
            }
        }

        report.entry_exit = instrument_entry_exit(
            program,
            self.config,
            &mut temps,
            RuntimeFn::DumpDetections,
            1,
        );

        tracing::info!(
            detection_calls = report.detection_calls,
            context_stores = report.context_stores,
            arity_overflows = report.arity_overflows.len(),
            "inserted detection probes into {}",
            program.name
        );
        report
    }

    fn admits(&self, key: &NodeKey, groups: &[ContextBaseline], report: &mut DetectionReport) -> bool {
        if groups.is_empty() {
            tracing::warn!("checkpoint {} has no baseline with a known context; skipped", key);
            report.without_baseline.push(key.clone());
            return false;
        }
        if groups.len() > self.max_arity {
            tracing::warn!(
                contexts = groups.len(),
                max_arity = self.max_arity,
                "checkpoint {} has too many contexts; detection skipped",
                key
            );
            report.arity_overflows.push(ArityOverflow {
                checkpoint: key.clone(),
                contexts: groups.len(),
            });
            return false;
        }
        true
    }

    fn emit_decision(
        &self,
        probe: &mut ProbeBuilder<'_>,
        key: &NodeKey,
        t: ElapsedSinceCheckpoint,
        groups: &[ContextBaseline],
    ) {
        let last_context = probe.load(SharedCell::LastContext);

        let mut args: Vec<Operand> = vec![
            last_context.into(),
            t.elapsed.into(),
            t.previous.into(),
            t.current.into(),
        ];
        for g in groups {
            args.push(Operand::Int(g.context_index));
            args.push(Operand::Int(g.lower_bound() as i64));
            args.push(Operand::Int(g.upper_bound(&self.params) as i64));
        }
        args.push(key.function.as_str().into());
        args.push(key.node.as_str().into());

        probe.call(
            RuntimeFn::Detect {
                arity: groups.len() as u8,
            },
            args,
        );
    }
}
