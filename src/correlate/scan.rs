// Backward scan pairing checkpoint visits with their context

use super::{ClassifiedSample, Context, ContextObservation};
use crate::ir::NodeKey;

/// A checkpoint visit still waiting for its context
#[derive(Debug)]
struct PendingCheckpoint {
    checkpoint: NodeKey,
    elapsed: u64,
}

impl PendingCheckpoint {
    fn close(self, context: Context) -> ContextObservation {
        ContextObservation {
            checkpoint: self.checkpoint,
            context,
            elapsed: self.elapsed,
        }
    }
}

/// Observations produced by one scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// In scan order: latest checkpoint visit first
    pub observations: Vec<ContextObservation>,
    /// Checkpoint visits that carried the `-1` sentinel instead of a time
    pub untimed_checkpoints: usize,
}

fn context_of(visit: &ClassifiedSample) -> Context {
    let key = visit.sample.key.clone();
    match visit.class {
        Some(class) => Context::Resolved {
            key,
            index: class.global_index,
        },
        None => Context::Unresolved { key },
    }
}

/// Walk `samples` from the last visit to the first
///
/// A checkpoint visit opens a pending observation; the next visit the scan
/// reaches (the one that ran immediately before it) closes it as its
/// context. For intra-procedural edges that visit is a CFG predecessor of the
/// checkpoint and hence a context-setter. A checkpoint that is itself the
/// first visit closes with [`Context::Start`]. A visit that is both closes
/// the pending observation before opening its own.
pub fn build_observations(samples: &[ClassifiedSample]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut pending: Option<PendingCheckpoint> = None;

    for (position, visit) in samples.iter().enumerate().rev() {
        if let Some(open) = pending.take() {
            outcome.observations.push(open.close(context_of(visit)));
        }

        if !visit.is_checkpoint() {
            continue;
        }

        let Some(elapsed) = visit.sample.elapsed else {
            outcome.untimed_checkpoints += 1;
            tracing::warn!(
                "checkpoint {} visited without a timing sample",
                visit.sample.key
            );
            continue;
        };

        let open = PendingCheckpoint {
            checkpoint: visit.sample.key.clone(),
            elapsed,
        };
        if position == 0 {
            outcome.observations.push(open.close(Context::Start));
        } else {
            pending = Some(open);
        }
    }

    outcome
}
