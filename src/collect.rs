//! Raw timing collection probes
//!
//! Every node records one sample per visit: checkpoints record the time
//! elapsed since the previous checkpoint, every other node records the `-1`
//! sentinel. Control-flow edges are left untouched.

use crate::classify::NodeDescriptor;
use crate::config::TimingConfig;
use crate::instrument::{
    commit_checkpoint_time, elapsed_since_checkpoint, instrument_entry_exit, ExitOutcome,
};
use crate::ir::{InsertPoint, Operand, ProbeBuilder, Program, RuntimeFn};
use serde::Serialize;

/// Sample recorded at non-checkpoint visits
pub const NOT_A_CHECKPOINT: i64 = -1;

#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub nodes: usize,
    pub checkpoint_probes: usize,
    pub sentinel_probes: usize,
    pub entry_exit: ExitOutcome,
}

/// Inserts raw timing probes using a classification of the same program
pub struct RawCollector<'a> {
    config: &'a TimingConfig,
}

impl<'a> RawCollector<'a> {
    pub fn new(config: &'a TimingConfig) -> Self {
        Self { config }
    }

    /// Instrument `program`; `descriptors` lists its nodes in traversal order
    pub fn instrument(&self, program: &mut Program, descriptors: &[NodeDescriptor]) -> CollectReport {
        let mut temps = program.temp_allocator();
        let mut report = CollectReport {
            nodes: 0,
            checkpoint_probes: 0,
            sentinel_probes: 0,
            entry_exit: ExitOutcome::NotPresent,
        };

        let mut descriptors = descriptors.iter();
        for f in 0..program.functions.len() {
            for b in 0..program.functions[f].blocks.len() {
                let Some(node) = descriptors.next() else {
                    break;
                };
                let function_name = node.key.function.as_str();
                let node_name = node.key.node.as_str();

                let mut probe = ProbeBuilder::new(&mut temps);
                if node.is_checkpoint {
                    let t = elapsed_since_checkpoint(&mut probe);
                    probe.call(
                        RuntimeFn::Record,
                        vec![function_name.into(), node_name.into(), t.elapsed.into()],
                    );
                    commit_checkpoint_time(&mut probe);
                    report.checkpoint_probes += 1;
                } else {
                    probe.call(
                        RuntimeFn::Record,
                        vec![
                            function_name.into(),
                            node_name.into(),
                            Operand::Int(NOT_A_CHECKPOINT),
                        ],
                    );
                    report.sentinel_probes += 1;
                }
                program.insert(f, b, InsertPoint::BeforeTerminator, probe.finish());
                report.nodes += 1;
            }
        }

        report.entry_exit =
            instrument_entry_exit(program, self.config, &mut temps, RuntimeFn::DumpRaw, 0);

        tracing::info!(
            nodes = report.nodes,
            checkpoints = report.checkpoint_probes,
            "inserted raw timing probes into {}",
            program.name
        );
        report
    }
}
