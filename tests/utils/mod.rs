// Integration test utilities
//
// A workspace is a temporary build directory holding tconfig.txt and every
// persisted data file, as a real build tree would.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use timeguard::config::{EngineOptions, TimingConfig, CONFIG_FILE_NAME};
use timeguard::engine::Engine;
use timeguard::ir::Program;
use timeguard::store::DataFiles;

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(mode: i64) -> Self {
        let ws = Self {
            dir: TempDir::new().expect("create temp dir"),
        };
        ws.set_mode(mode);
        ws
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn set_mode(&self, mode: i64) {
        fs::write(
            self.path().join(CONFIG_FILE_NAME),
            format!("{mode}\n2.0\necall_entry\n1000\n50\nEnclave.c\necall_reference\n1.0\n"),
        )
        .expect("write config");
    }

    pub fn files(&self) -> DataFiles {
        DataFiles::new(self.path())
    }

    pub fn engine(&self) -> Engine {
        let config = TimingConfig::load_nearest(self.path()).expect("load config");
        let options = EngineOptions::for_config(&config);
        Engine::new(config, options, self.files()).expect("engine")
    }

    /// Write the runtime streams an instrumented training run would produce
    pub fn record_run(&self, visits: &[(&str, &str, i64)]) {
        let mut timings = String::new();
        let mut trace = String::new();
        for (function, node, elapsed) in visits {
            timings.push_str(&format!("{elapsed}\n"));
            trace.push_str(&format!("{function}\n{node}\n"));
        }
        let files = self.files();
        fs::write(files.raw_timings(), timings).expect("write raw timings");
        fs::write(files.trace(), trace).expect("write trace");
    }

    pub fn copy_fixture(&self, name: &str) -> PathBuf {
        let dest = self.path().join(name);
        fs::copy(fixture(name), &dest).expect("copy fixture");
        dest
    }
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> Program {
    Program::from_file(fixture(name)).expect("load fixture")
}

/// Two passes through entry -> A -> B, B taking 100 then 140 ticks
pub const TWO_PASSES: [(&str, &str, i64); 6] = [
    ("ecall_entry", "entry", 5),
    ("ecall_entry", "A", -1),
    ("ecall_entry", "B", 100),
    ("ecall_entry", "entry", 6),
    ("ecall_entry", "A", -1),
    ("ecall_entry", "B", 140),
];
