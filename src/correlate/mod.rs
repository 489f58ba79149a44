//! Trace correlation: from raw training runs to context observations
//!
//! Two runtime streams are zipped record by record: the raw timing file (one
//! elapsed time or `-1` per node visit) and the execution trace (function
//! then node name per visit). Each visit is joined against the classification
//! table and the joined stream is scanned backwards to pair every checkpoint
//! visit with the visit that ran immediately before it, its context.
//!
//! ```text
//! tdata.txt ──┐
//!             ├─ zip ─▶ join(tgdata.txt) ─▶ backward scan ─▶ ttracedata.txt
//! ttdata.txt ─┘
//! ```
//!
//! The scan is the expensive part and its result does not depend on the
//! translation unit being compiled, so with caching enabled it runs once per
//! training data set: a present `ttracedata.txt` short-circuits everything
//! above and neither runtime stream is opened.

mod join;
mod scan;

pub use join::{join, ClassificationIndex, JoinOutcome};
pub use scan::{build_observations, ScanOutcome};

use crate::classify::NodeClass;
use crate::error::Result;
use crate::ir::NodeKey;
use crate::store::DataFiles;
use serde::Serialize;

/// One node visit from a raw collection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    pub key: NodeKey,
    /// Elapsed time since the previous checkpoint; `None` for the `-1`
    /// sentinel recorded at non-checkpoint visits
    pub elapsed: Option<u64>,
}

/// A raw sample joined against the classification table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSample {
    pub sample: RawSample,
    /// `None` when the key is absent from the table (a join miss)
    pub class: Option<NodeClass>,
}

impl ClassifiedSample {
    pub fn is_checkpoint(&self) -> bool {
        self.class.is_some_and(|c| c.is_checkpoint)
    }
}

/// The visit that preceded a checkpoint visit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Context {
    /// The checkpoint was the first visit of the run
    Start,
    /// A classified node
    Resolved { key: NodeKey, index: u64 },
    /// A node missing from the classification table
    Unresolved { key: NodeKey },
}

impl Context {
    /// Persisted context index; `-1` when there is none
    pub fn index(&self) -> i64 {
        match self {
            Context::Resolved { index, .. } => *index as i64,
            Context::Start | Context::Unresolved { .. } => -1,
        }
    }

    pub fn key(&self) -> Option<&NodeKey> {
        match self {
            Context::Resolved { key, .. } | Context::Unresolved { key } => Some(key),
            Context::Start => None,
        }
    }

    /// Whether observations with this context feed a baseline group
    pub fn contributes_to_baseline(&self) -> bool {
        !matches!(self, Context::Unresolved { .. })
    }
}

/// A checkpoint visit paired with its preceding context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextObservation {
    pub checkpoint: NodeKey,
    pub context: Context,
    pub elapsed: u64,
}

/// Where a detection run got its observations from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    Cache,
    Correlated,
}

/// Data-quality summary of one correlation
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationReport {
    pub source: ObservationSource,
    pub observations: usize,
    /// Joined node visits; zero when loaded from cache
    pub visits: usize,
    pub join_misses: usize,
    pub missed_keys: Vec<NodeKey>,
    pub untimed_checkpoints: usize,
    /// The raw timing and trace streams had different lengths
    pub stream_length_mismatch: bool,
    pub cache_written: bool,
}

impl CorrelationReport {
    fn from_cache(observations: usize) -> Self {
        Self {
            source: ObservationSource::Cache,
            observations,
            visits: 0,
            join_misses: 0,
            missed_keys: Vec::new(),
            untimed_checkpoints: 0,
            stream_length_mismatch: false,
            cache_written: false,
        }
    }
}

/// Produces the context observations a detection run needs
pub struct Correlator<'a> {
    files: &'a DataFiles,
    use_cache: bool,
}

impl<'a> Correlator<'a> {
    pub fn new(files: &'a DataFiles, use_cache: bool) -> Self {
        Self { files, use_cache }
    }

    /// Load the observation cache, or correlate from scratch
    pub fn observations(&self) -> Result<(Vec<ContextObservation>, CorrelationReport)> {
        if self.use_cache {
            if let Some(cached) = self.files.load_observations()? {
                tracing::info!(
                    observations = cached.len(),
                    "loaded trace observations from {}",
                    self.files.observation_cache().display()
                );
                let report = CorrelationReport::from_cache(cached.len());
                return Ok((cached, report));
            }
        }

        let (observations, mut report) = self.correlate()?;

        if self.use_cache {
            self.files.save_observations(&observations)?;
            report.cache_written = true;
        }

        Ok((observations, report))
    }

    /// Join both runtime streams against the table and scan backwards
    pub fn correlate(&self) -> Result<(Vec<ContextObservation>, CorrelationReport)> {
        let table = self.files.load_classification()?;
        let index = ClassificationIndex::from_descriptors(&table);
        let timings = self.files.open_raw_timings()?;
        let trace = self.files.open_trace()?;

        let joined = join(&index, timings, trace)?;
        let scanned = build_observations(&joined.samples);

        tracing::info!(
            visits = joined.samples.len(),
            join_misses = joined.misses,
            observations = scanned.observations.len(),
            "correlated raw timings with execution trace"
        );

        let report = CorrelationReport {
            source: ObservationSource::Correlated,
            observations: scanned.observations.len(),
            visits: joined.samples.len(),
            join_misses: joined.misses,
            missed_keys: joined.missed_keys.into_iter().collect(),
            untimed_checkpoints: scanned.untimed_checkpoints,
            stream_length_mismatch: joined.length_mismatch,
            cache_written: false,
        };

        Ok((scanned.observations, report))
    }
}

#[cfg(test)]
mod tests;
