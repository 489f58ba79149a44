//! Configuration loading for the timed execution pass
//!
//! The configuration is a plain line-oriented file, `tconfig.txt`, found by
//! searching the working directory and then each parent in turn. All
//! persisted data files live next to it.

use crate::error::{EngineError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for
pub const CONFIG_FILE_NAME: &str = "tconfig.txt";

/// Default name of the block that counts as a function entry
pub const DEFAULT_ENTRY_BLOCK: &str = "entry";

/// The three canonical pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Classify every node and append to the classification table
    Enumerate,
    /// Insert raw timing collection probes
    Collect,
    /// Correlate training data and insert detection probes
    Detect,
}

/// Scalar parameters read from `tconfig.txt`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingConfig {
    /// Historical mode number selecting a phase combination
    pub mode: i64,
    pub threshold: f64,
    /// Designated enclave entry routine
    pub entry_function: String,
    pub page_fault_mean: f64,
    pub page_fault_stdev: f64,
    /// Source file holding the entry routine
    pub entry_file: String,
    /// Routine whose presence gates dump/teardown insertion
    pub reference_function: String,
    /// Multiplier applied to every upper detection bound
    pub scale_factor: f64,
    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub dir: PathBuf,
}

const FIELDS: [&str; 8] = [
    "mode",
    "threshold",
    "entry function",
    "page fault mean",
    "page fault stdev",
    "entry file",
    "reference function",
    "scale factor",
];

impl TimingConfig {
    /// Search `start` and each of its ancestors for `tconfig.txt`
    pub fn discover(start: &Path) -> Result<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| EngineError::ConfigNotFound {
                file_name: CONFIG_FILE_NAME,
                start: start.to_path_buf(),
            })
    }

    /// Discover and load the nearest configuration above `start`
    pub fn load_nearest(start: &Path) -> Result<Self> {
        let path = Self::discover(start)?;
        Self::from_file(&path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EngineError::MissingInput {
                kind: "configuration file",
                path: path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(path)?;
        let mut config = Self::parse(&contents, path)?;
        config.dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Parse the eight newline-terminated fields
    ///
    /// `origin` only labels errors. The scale factor line may be absent, in
    /// which case it defaults to `1.0`.
    pub fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let lines: Vec<&str> = contents.lines().map(str::trim).collect();

        let field = |i: usize| -> Result<&str> {
            lines.get(i).copied().ok_or_else(|| EngineError::MissingField {
                path: origin.to_path_buf(),
                line: i + 1,
                field: FIELDS[i],
            })
        };
        let invalid = |i: usize, value: &str| EngineError::InvalidField {
            path: origin.to_path_buf(),
            line: i + 1,
            field: FIELDS[i],
            value: value.to_string(),
        };
        let float = |i: usize| -> Result<f64> {
            let raw = field(i)?;
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(i, raw))
        };
        let name = |i: usize| -> Result<String> {
            let raw = field(i)?;
            if raw.is_empty() {
                Err(invalid(i, raw))
            } else {
                Ok(raw.to_string())
            }
        };

        let raw_mode = field(0)?;
        let mode = raw_mode.parse::<i64>().map_err(|_| invalid(0, raw_mode))?;

        let scale_factor = match lines.get(7) {
            Some(raw) if !raw.is_empty() => float(7)?,
            _ => 1.0,
        };

        let config = Self {
            mode,
            threshold: float(1)?,
            entry_function: name(2)?,
            page_fault_mean: float(3)?,
            page_fault_stdev: float(4)?,
            entry_file: field(5)?.to_string(),
            reference_function: name(6)?,
            scale_factor,
            dir: PathBuf::new(),
        };
        config.phase()?;
        Ok(config)
    }

    /// Phase selected by the historical mode number
    pub fn phase(&self) -> Result<Phase> {
        match self.mode {
            -1 => Ok(Phase::Enumerate),
            0 => Ok(Phase::Collect),
            m if m >= 1 => Ok(Phase::Detect),
            m => Err(EngineError::UnsupportedMode(m)),
        }
    }

    /// Mode 1 re-correlates on every invocation; later detection modes cache
    pub fn caches_observations(&self) -> bool {
        self.mode >= 2
    }
}

/// Knobs orthogonal to the phase choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineOptions {
    /// Reuse (and write) the trace-observation cache
    pub use_cache: bool,
    /// Widest checkpoint that still gets a detection call
    pub max_arity: usize,
    /// Block name that always qualifies as a checkpoint
    pub entry_block_name: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_arity: 4,
            entry_block_name: DEFAULT_ENTRY_BLOCK.to_string(),
        }
    }
}

impl EngineOptions {
    /// Defaults for the given configuration's mode
    pub fn for_config(config: &TimingConfig) -> Self {
        Self {
            use_cache: config.caches_observations(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_arity == 0 || self.max_arity > crate::ir::RuntimeFn::MAX_DETECT_ARITY {
            return Err(EngineError::InvalidOption(format!(
                "max arity must be in 1..={}, got {}",
                crate::ir::RuntimeFn::MAX_DETECT_ARITY,
                self.max_arity
            )));
        }
        if self.entry_block_name.is_empty() {
            return Err(EngineError::InvalidOption(
                "entry block name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "9\n2.5\necall_entry\n1200\n35.5\nEnclave.c\necall_reference\n1.1\n";

    #[test]
    fn test_parse_all_fields() {
        let config = TimingConfig::parse(SAMPLE, Path::new("tconfig.txt")).unwrap();
        assert_eq!(config.mode, 9);
        assert_eq!(config.threshold, 2.5);
        assert_eq!(config.entry_function, "ecall_entry");
        assert_eq!(config.page_fault_mean, 1200.0);
        assert_eq!(config.page_fault_stdev, 35.5);
        assert_eq!(config.entry_file, "Enclave.c");
        assert_eq!(config.reference_function, "ecall_reference");
        assert_eq!(config.scale_factor, 1.1);
    }

    #[test]
    fn test_scale_factor_defaults_to_one() {
        let seven = "1\n0\necall_entry\n100\n10\nEnclave.c\necall_reference\n";
        let config = TimingConfig::parse(seven, Path::new("tconfig.txt")).unwrap();
        assert_eq!(config.scale_factor, 1.0);
    }

    #[test]
    fn test_missing_field_reports_line() {
        let err = TimingConfig::parse("0\n1.0\n", Path::new("tconfig.txt")).unwrap_err();
        match err {
            EngineError::MissingField { line, field, .. } => {
                assert_eq!(line, 3);
                assert_eq!(field, "entry function");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_float_rejected() {
        let bad = "0\nabc\necall_entry\n100\n10\nEnclave.c\necall_reference\n";
        let err = TimingConfig::parse(bad, Path::new("tconfig.txt")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidField { line: 2, .. }));
    }

    #[test]
    fn test_mode_to_phase() {
        let mut config = TimingConfig::parse(SAMPLE, Path::new("tconfig.txt")).unwrap();
        config.mode = -1;
        assert_eq!(config.phase().unwrap(), Phase::Enumerate);
        config.mode = 0;
        assert_eq!(config.phase().unwrap(), Phase::Collect);
        config.mode = 1;
        assert_eq!(config.phase().unwrap(), Phase::Detect);
        assert!(!config.caches_observations());
        config.mode = 9;
        assert_eq!(config.phase().unwrap(), Phase::Detect);
        assert!(config.caches_observations());
        config.mode = -2;
        assert!(matches!(config.phase(), Err(EngineError::UnsupportedMode(-2))));
    }

    #[test]
    fn test_unsupported_mode_rejected_at_parse() {
        let bad = "-5\n0\necall_entry\n100\n10\nEnclave.c\necall_reference\n";
        assert!(TimingConfig::parse(bad, Path::new("tconfig.txt")).is_err());
    }

    #[test]
    fn test_discover_walks_up() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), SAMPLE).unwrap();
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = TimingConfig::discover(&nested).unwrap();
        assert_eq!(found, root.path().join(CONFIG_FILE_NAME));

        let config = TimingConfig::load_nearest(&nested).unwrap();
        assert_eq!(config.dir, root.path());
    }

    #[test]
    fn test_discover_prefers_nearest() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), SAMPLE).unwrap();
        let nested = root.path().join("unit");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(CONFIG_FILE_NAME), SAMPLE.replacen('9', "0", 1)).unwrap();

        let config = TimingConfig::load_nearest(&nested).unwrap();
        assert_eq!(config.mode, 0);
        assert_eq!(config.dir, nested);
    }

    #[test]
    fn test_options_follow_mode() {
        let config = TimingConfig::parse(SAMPLE, Path::new("tconfig.txt")).unwrap();
        let options = EngineOptions::for_config(&config);
        assert!(options.use_cache);
        assert_eq!(options.max_arity, 4);
        assert_eq!(options.entry_block_name, "entry");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_reject_wide_arity() {
        let options = EngineOptions {
            max_arity: 5,
            ..EngineOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
