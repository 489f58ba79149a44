//! Phase dispatch
//!
//! One engine invocation runs exactly one phase over one translation unit.
//! Enumerate must have run over every unit before the detection phase reads
//! the classification table.

use crate::baseline::aggregate;
use crate::classify::Classifier;
use crate::collect::{CollectReport, RawCollector};
use crate::config::{EngineOptions, Phase, TimingConfig};
use crate::correlate::Correlator;
use crate::detect::{DetectionInstrumenter, TraceRelations};
use crate::error::Result;
use crate::ir::Program;
use crate::report::{DetectReport, EnumerateReport, PhaseReport};
use crate::store::DataFiles;

pub struct Engine {
    config: TimingConfig,
    options: EngineOptions,
    files: DataFiles,
    phase: Phase,
}

impl Engine {
    /// Engine for the phase selected by the configuration's mode
    pub fn new(config: TimingConfig, options: EngineOptions, files: DataFiles) -> Result<Self> {
        options.validate()?;
        let phase = config.phase()?;
        Ok(Self {
            config,
            options,
            files,
            phase,
        })
    }

    /// Run `phase` regardless of the configured mode
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn files(&self) -> &DataFiles {
        &self.files
    }

    pub fn run(&self, program: &mut Program) -> Result<PhaseReport> {
        tracing::info!(
            phase = ?self.phase,
            mode = self.config.mode,
            "running on {} ({} functions)",
            program.name,
            program.functions.len()
        );
        match self.phase {
            Phase::Enumerate => self.enumerate(program).map(PhaseReport::Enumerate),
            Phase::Collect => Ok(PhaseReport::Collect(self.collect(program))),
            Phase::Detect => self.detect(program).map(PhaseReport::Detect),
        }
    }

    /// Classify and append to the table; the program is left unchanged
    fn enumerate(&self, program: &Program) -> Result<EnumerateReport> {
        let first_index = self.files.classification_len()?;
        let descriptors =
            Classifier::new(&self.options.entry_block_name).classify_from(program, first_index);
        self.files.append_classification(&descriptors)?;

        Ok(EnumerateReport {
            nodes: descriptors.len(),
            checkpoints: descriptors.iter().filter(|d| d.is_checkpoint).count(),
            context_setters: descriptors.iter().filter(|d| d.is_context_setter).count(),
            first_index,
            table: self.files.classification_table(),
        })
    }

    fn collect(&self, program: &mut Program) -> CollectReport {
        let descriptors = Classifier::new(&self.options.entry_block_name).classify_from(program, 0);
        RawCollector::new(&self.config).instrument(program, &descriptors)
    }

    fn detect(&self, program: &mut Program) -> Result<DetectReport> {
        let (observations, correlation) =
            Correlator::new(&self.files, self.options.use_cache).observations()?;
        let relations = TraceRelations::from_observations(&observations);
        let baselines = aggregate(&observations);

        let detection = DetectionInstrumenter::new(&self.config, self.options.max_arity)
            .instrument(program, &relations, &baselines);

        Ok(DetectReport {
            correlation,
            checkpoints_with_baseline: baselines.len(),
            baseline_groups: baselines.group_count(),
            detection,
        })
    }
}
