//! Phase reports and their text / JSON rendering

use crate::collect::CollectReport;
use crate::correlate::CorrelationReport;
use crate::detect::DetectionReport;
use crate::instrument::ExitOutcome;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct EnumerateReport {
    pub nodes: usize,
    pub checkpoints: usize,
    pub context_setters: usize,
    /// Global index of this unit's first node in the table
    pub first_index: u64,
    pub table: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectReport {
    pub correlation: CorrelationReport,
    pub checkpoints_with_baseline: usize,
    pub baseline_groups: usize,
    pub detection: DetectionReport,
}

/// Outcome of one engine invocation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseReport {
    Enumerate(EnumerateReport),
    Collect(CollectReport),
    Detect(DetectReport),
}

fn exit_line(outcome: &ExitOutcome) -> String {
    match outcome {
        ExitOutcome::NotPresent => "entry function not in this unit".to_string(),
        ExitOutcome::ReferenceMissing => {
            "skipped (reference function not in this unit)".to_string()
        }
        ExitOutcome::Inserted { anchor } => format!("inserted before {:?}", anchor).to_lowercase(),
    }
}

impl PhaseReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            PhaseReport::Enumerate(r) => {
                writeln!(out, "Enumerate: {} nodes classified", r.nodes)?;
                writeln!(out, "  checkpoints:      {}", r.checkpoints)?;
                writeln!(out, "  context-setters:  {}", r.context_setters)?;
                writeln!(
                    out,
                    "  global indices:   {}..{}",
                    r.first_index,
                    r.first_index + r.nodes as u64
                )?;
                writeln!(out, "  table:            {}", r.table.display())?;
            }
            PhaseReport::Collect(r) => {
                writeln!(out, "Collect: {} nodes instrumented", r.nodes)?;
                writeln!(out, "  timing probes:    {}", r.checkpoint_probes)?;
                writeln!(out, "  sentinel probes:  {}", r.sentinel_probes)?;
                writeln!(out, "  entry exit:       {}", exit_line(&r.entry_exit))?;
            }
            PhaseReport::Detect(r) => {
                let c = &r.correlation;
                let d = &r.detection;
                writeln!(out, "Detect: {} nodes scanned", d.nodes)?;
                writeln!(
                    out,
                    "  observations:     {} ({:?})",
                    c.observations, c.source
                )?;
                if c.join_misses > 0 {
                    writeln!(
                        out,
                        "  join misses:      {} ({} distinct nodes)",
                        c.join_misses,
                        c.missed_keys.len()
                    )?;
                }
                if c.untimed_checkpoints > 0 {
                    writeln!(out, "  untimed visits:   {}", c.untimed_checkpoints)?;
                }
                if c.stream_length_mismatch {
                    writeln!(out, "  warning: raw timing and trace lengths differ")?;
                }
                writeln!(
                    out,
                    "  baselines:        {} groups over {} checkpoints",
                    r.baseline_groups, r.checkpoints_with_baseline
                )?;
                writeln!(
                    out,
                    "  detection calls:  {} (by arity {:?})",
                    d.detection_calls, d.calls_by_arity
                )?;
                writeln!(out, "  context stores:   {}", d.context_stores)?;
                for overflow in &d.arity_overflows {
                    writeln!(
                        out,
                        "  skipped {}: {} contexts",
                        overflow.checkpoint, overflow.contexts
                    )?;
                }
                for key in &d.without_baseline {
                    writeln!(out, "  skipped {}: no known context", key)?;
                }
                writeln!(out, "  entry exit:       {}", exit_line(&d.entry_exit))?;
            }
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        let stderr = io::stderr();
        let mut out = stderr.lock();
        if let Err(e) = self.write_text(&mut out) {
            tracing::warn!("failed to write summary: {}", e);
        }
    }
}
