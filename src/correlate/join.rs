// Positional zip of the runtime streams and the classification join

use super::{ClassifiedSample, RawSample};
use crate::classify::{NodeClass, NodeDescriptor};
use crate::error::Result;
use crate::ir::NodeKey;
use fnv::FnvHashMap;
use std::collections::BTreeSet;

/// Classification table keyed by node identity
#[derive(Debug, Default)]
pub struct ClassificationIndex {
    classes: FnvHashMap<NodeKey, NodeClass>,
}

impl ClassificationIndex {
    /// Index a classification table; a key listed twice keeps its last record
    pub fn from_descriptors(descriptors: &[NodeDescriptor]) -> Self {
        let mut classes = FnvHashMap::default();
        let mut duplicates = 0usize;
        for d in descriptors {
            if classes.insert(d.key.clone(), d.class()).is_some() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            tracing::warn!(
                duplicates,
                "classification table lists some nodes more than once; later records win"
            );
        }
        Self { classes }
    }

    pub fn get(&self, key: &NodeKey) -> Option<NodeClass> {
        self.classes.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Result of zipping and joining the runtime streams
#[derive(Debug, Default)]
pub struct JoinOutcome {
    /// Visits in chronological order
    pub samples: Vec<ClassifiedSample>,
    pub misses: usize,
    pub missed_keys: BTreeSet<NodeKey>,
    pub length_mismatch: bool,
}

/// Advance both streams together and classify each visit
///
/// Stops at the end of the shorter stream. A visit whose key is not in the
/// table is kept with no classification and counted as a miss.
pub fn join<T, E>(index: &ClassificationIndex, timings: T, trace: E) -> Result<JoinOutcome>
where
    T: IntoIterator<Item = Result<Option<u64>>>,
    E: IntoIterator<Item = Result<NodeKey>>,
{
    let mut timings = timings.into_iter();
    let mut trace = trace.into_iter();
    let mut outcome = JoinOutcome::default();

    loop {
        let (elapsed, key) = match (timings.next(), trace.next()) {
            (Some(elapsed), Some(key)) => (elapsed?, key?),
            (None, None) => break,
            (Some(_), None) | (None, Some(_)) => {
                outcome.length_mismatch = true;
                tracing::warn!(
                    visits = outcome.samples.len(),
                    "raw timing and trace streams differ in length; using the common prefix"
                );
                break;
            }
        };

        let class = index.get(&key);
        if class.is_none() {
            outcome.misses += 1;
            if outcome.missed_keys.insert(key.clone()) {
                tracing::warn!("join miss: {} is not in the classification table", key);
            }
        }

        outcome.samples.push(ClassifiedSample {
            sample: RawSample { key, elapsed },
            class,
        });
    }

    Ok(outcome)
}
