//! Persisted line-oriented data files
//!
//! The pipeline spans several independent engine invocations (one per
//! translation unit) and several independent program runs, so every phase
//! hands its output to the next through plain text files kept next to the
//! configuration:
//!
//! | File             | Written by                 | Record                                   |
//! |------------------|----------------------------|------------------------------------------|
//! | `tgdata.txt`     | Enumerate (append)         | function, node, context-setter, checkpoint |
//! | `tdata.txt`      | instrumented program       | elapsed time or `-1`                     |
//! | `ttdata.txt`     | instrumented program       | function, node                           |
//! | `ttracedata.txt` | Detect (observation cache) | checkpoint fn/node, context fn/node, context index, elapsed |
//!
//! Flags are written as `1` / `-1`. The position of a classification record
//! in its file is the node's global index.

use crate::classify::NodeDescriptor;
use crate::correlate::{Context, ContextObservation};
use crate::error::{EngineError, Result};
use crate::ir::NodeKey;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

pub const CLASSIFICATION_FILE: &str = "tgdata.txt";
pub const RAW_TIMING_FILE: &str = "tdata.txt";
pub const TRACE_FILE: &str = "ttdata.txt";
pub const OBSERVATION_CACHE_FILE: &str = "ttracedata.txt";

const CLASSIFICATION_RECORD_LINES: usize = 4;
const OBSERVATION_RECORD_LINES: usize = 6;

/// Locations of the persisted files in one data directory
#[derive(Debug, Clone)]
pub struct DataFiles {
    dir: PathBuf,
}

impl DataFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn classification_table(&self) -> PathBuf {
        self.dir.join(CLASSIFICATION_FILE)
    }

    pub fn raw_timings(&self) -> PathBuf {
        self.dir.join(RAW_TIMING_FILE)
    }

    pub fn trace(&self) -> PathBuf {
        self.dir.join(TRACE_FILE)
    }

    pub fn observation_cache(&self) -> PathBuf {
        self.dir.join(OBSERVATION_CACHE_FILE)
    }

    /// Append one record per descriptor to the classification table
    pub fn append_classification(&self, descriptors: &[NodeDescriptor]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.classification_table())?;
        let mut out = BufWriter::new(file);
        write_classification(&mut out, descriptors)?;
        out.flush()?;
        Ok(())
    }

    /// Number of records already in the classification table
    pub fn classification_len(&self) -> Result<u64> {
        let path = self.classification_table();
        if !path.exists() {
            return Ok(0);
        }
        let lines = BufReader::new(File::open(&path)?).lines().count();
        Ok((lines / CLASSIFICATION_RECORD_LINES) as u64)
    }

    /// Read the whole classification table
    pub fn load_classification(&self) -> Result<Vec<NodeDescriptor>> {
        let path = self.classification_table();
        let reader = open_required(&path, "classification table")?;
        read_classification(reader, &path)
    }

    pub fn open_raw_timings(&self) -> Result<RawTimingReader<BufReader<File>>> {
        let path = self.raw_timings();
        let reader = open_required(&path, "raw timing file")?;
        Ok(RawTimingReader::new(reader, path))
    }

    pub fn open_trace(&self) -> Result<TraceReader<BufReader<File>>> {
        let path = self.trace();
        let reader = open_required(&path, "trace file")?;
        Ok(TraceReader::new(reader, path))
    }

    /// Load the observation cache; `None` when it does not exist yet
    pub fn load_observations(&self) -> Result<Option<Vec<ContextObservation>>> {
        let path = self.observation_cache();
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);
        read_observations(reader, &path).map(Some)
    }

    /// Write the observation cache, replacing any previous one
    pub fn save_observations(&self, observations: &[ContextObservation]) -> Result<()> {
        let path = self.observation_cache();
        let mut out = BufWriter::new(File::create(&path)?);
        write_observations(&mut out, observations)?;
        out.flush()?;
        tracing::info!(
            observations = observations.len(),
            "wrote trace observation cache {}",
            path.display()
        );
        Ok(())
    }

    /// Remove the observation cache if present
    pub fn clear_observations(&self) -> Result<()> {
        match fs::remove_file(self.observation_cache()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn open_required(path: &Path, kind: &'static str) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(f) => Ok(BufReader::new(f)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::MissingInput {
            kind,
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn flag(value: bool) -> i8 {
    if value {
        1
    } else {
        -1
    }
}

fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> EngineError {
    EngineError::Malformed {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

fn parse_flag(raw: &str, path: &Path, line: usize) -> Result<bool> {
    match raw.trim() {
        "1" => Ok(true),
        "-1" => Ok(false),
        other => Err(malformed(path, line, format!("expected 1 or -1, got {:?}", other))),
    }
}

pub fn write_classification<W: Write>(out: &mut W, descriptors: &[NodeDescriptor]) -> io::Result<()> {
    for d in descriptors {
        writeln!(out, "{}", d.key.function)?;
        writeln!(out, "{}", d.key.node)?;
        writeln!(out, "{}", flag(d.is_context_setter))?;
        writeln!(out, "{}", flag(d.is_checkpoint))?;
    }
    Ok(())
}

/// Parse a classification table; global indices follow record positions
pub fn read_classification<R: BufRead>(reader: R, path: &Path) -> Result<Vec<NodeDescriptor>> {
    let lines: Vec<String> = reader.lines().collect::<io::Result<_>>()?;
    if lines.len() % CLASSIFICATION_RECORD_LINES != 0 {
        return Err(malformed(
            path,
            lines.len(),
            "truncated record at end of classification table",
        ));
    }

    lines
        .chunks_exact(CLASSIFICATION_RECORD_LINES)
        .enumerate()
        .map(|(i, record)| {
            let first_line = i * CLASSIFICATION_RECORD_LINES + 1;
            Ok(NodeDescriptor {
                key: NodeKey::new(record[0].as_str(), record[1].as_str()),
                global_index: i as u64,
                is_context_setter: parse_flag(&record[2], path, first_line + 2)?,
                is_checkpoint: parse_flag(&record[3], path, first_line + 3)?,
            })
        })
        .collect()
}

/// Streams elapsed times from the raw timing file
pub struct RawTimingReader<R> {
    lines: Lines<R>,
    path: PathBuf,
    line: usize,
}

impl<R: BufRead> RawTimingReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            path: path.into(),
            line: 0,
        }
    }
}

/// Parse one raw timing line; `-1` is the non-checkpoint sentinel
pub fn parse_elapsed(raw: &str) -> Option<Option<u64>> {
    let raw = raw.trim();
    if raw == "-1" {
        return Some(None);
    }
    raw.parse::<u64>().ok().map(Some)
}

impl<R: BufRead> Iterator for RawTimingReader<R> {
    type Item = Result<Option<u64>>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        self.line += 1;
        Some(match line {
            Ok(raw) => parse_elapsed(&raw).ok_or_else(|| {
                malformed(&self.path, self.line, format!("expected an elapsed time, got {:?}", raw))
            }),
            Err(e) => Err(e.into()),
        })
    }
}

/// Streams `(function, node)` visits from the execution trace
pub struct TraceReader<R> {
    lines: Lines<R>,
    path: PathBuf,
    line: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            path: path.into(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<NodeKey>;

    fn next(&mut self) -> Option<Self::Item> {
        let function = match self.lines.next()? {
            Ok(f) => f,
            Err(e) => return Some(Err(e.into())),
        };
        self.line += 1;
        let node = match self.lines.next() {
            Some(Ok(n)) => n,
            Some(Err(e)) => return Some(Err(e.into())),
            None => {
                tracing::warn!(
                    "{}:{}: trace ends with a function name and no node name",
                    self.path.display(),
                    self.line
                );
                return None;
            }
        };
        self.line += 1;
        Some(Ok(NodeKey::new(function, node)))
    }
}

pub fn write_observations<W: Write>(out: &mut W, observations: &[ContextObservation]) -> io::Result<()> {
    for o in observations {
        let (context_function, context_node) = match o.context.key() {
            Some(key) => (key.function.as_str(), key.node.as_str()),
            None => ("", ""),
        };
        writeln!(out, "{}", o.checkpoint.function)?;
        writeln!(out, "{}", o.checkpoint.node)?;
        writeln!(out, "{}", context_function)?;
        writeln!(out, "{}", context_node)?;
        writeln!(out, "{}", o.context.index())?;
        writeln!(out, "{}", o.elapsed)?;
    }
    Ok(())
}

/// Parse an observation cache
///
/// A negative context index with blank context names is the start of a run;
/// with names it is a context that was missing from the classification table.
pub fn read_observations<R: BufRead>(reader: R, path: &Path) -> Result<Vec<ContextObservation>> {
    let lines: Vec<String> = reader.lines().collect::<io::Result<_>>()?;
    if lines.len() % OBSERVATION_RECORD_LINES != 0 {
        return Err(malformed(
            path,
            lines.len(),
            "truncated record at end of observation cache",
        ));
    }

    lines
        .chunks_exact(OBSERVATION_RECORD_LINES)
        .enumerate()
        .map(|(i, record)| {
            let first_line = i * OBSERVATION_RECORD_LINES + 1;
            let index_raw = record[4].trim();
            let index: i64 = index_raw.parse().map_err(|_| {
                malformed(path, first_line + 4, format!("expected a context index, got {:?}", index_raw))
            })?;
            let elapsed_raw = record[5].trim();
            let elapsed: u64 = elapsed_raw.parse().map_err(|_| {
                malformed(path, first_line + 5, format!("expected an elapsed time, got {:?}", elapsed_raw))
            })?;

            let context_function = record[2].trim();
            let context_node = record[3].trim();
            let context = if index >= 0 {
                Context::Resolved {
                    key: NodeKey::new(context_function, context_node),
                    index: index as u64,
                }
            } else if context_function.is_empty() && context_node.is_empty() {
                Context::Start
            } else {
                Context::Unresolved {
                    key: NodeKey::new(context_function, context_node),
                }
            };

            Ok(ContextObservation {
                checkpoint: NodeKey::new(record[0].as_str(), record[1].as_str()),
                context,
                elapsed,
            })
        })
        .collect()
}
