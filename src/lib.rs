//! Timeguard - compile-time timing instrumentation against controlled-channel attacks
//!
//! This library classifies every control-flow node of a program, inserts raw
//! timing probes for training runs, correlates the recorded timings with the
//! execution trace into per-context baselines, and finally inserts runtime
//! checks that flag the timing gaps single-stepping leaves behind.

pub mod baseline;
pub mod classify;
pub mod cli;
pub mod collect;
pub mod config;
pub mod correlate;
pub mod detect;
pub mod engine;
pub mod error;
pub mod instrument;
pub mod ir;
pub mod report;
pub mod store;
