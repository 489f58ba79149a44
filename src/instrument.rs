//! Emission helpers shared by the collection and detection phases

use crate::config::TimingConfig;
use crate::ir::{
    Instruction, InsertPoint, Operand, ProbeBuilder, Program, RuntimeFn, SharedCell, Temp,
    TempAllocator,
};
use serde::Serialize;

/// Clock values read at the top of a checkpoint probe
#[derive(Debug, Clone, Copy)]
pub struct ElapsedSinceCheckpoint {
    pub current: Temp,
    pub previous: Temp,
    pub elapsed: Temp,
}

/// Read both clocks, advance the previous-checkpoint cell, subtract
pub fn elapsed_since_checkpoint(b: &mut ProbeBuilder<'_>) -> ElapsedSinceCheckpoint {
    let current = b.load(SharedCell::CurrentTime);
    let previous = b.load(SharedCell::PreviousTime);
    b.store(SharedCell::PreviousTime, current);
    let elapsed = b.sub(current, previous);
    ElapsedSinceCheckpoint {
        current,
        previous,
        elapsed,
    }
}

/// Re-read the clock after the runtime call and make it the checkpoint time
pub fn commit_checkpoint_time(b: &mut ProbeBuilder<'_>) {
    let now = b.load(SharedCell::CurrentTime);
    b.store(SharedCell::PreviousTime, now);
}

/// Instruction the entry-exit code was placed in front of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitAnchor {
    Return,
    Call,
    /// No return or call in the last block; placed before its terminator
    Terminator,
}

/// What happened at the designated entry function's exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// The entry function is not defined in this unit
    NotPresent,
    /// The entry function is here but the reference function is not
    ReferenceMissing,
    Inserted { anchor: ExitAnchor },
}

fn exit_anchor(instructions: &[Instruction]) -> (ExitAnchor, InsertPoint) {
    if let Some(i) = instructions.iter().position(Instruction::is_return) {
        return (ExitAnchor::Return, InsertPoint::Before(i));
    }
    if let Some(i) = instructions.iter().position(Instruction::is_call) {
        return (ExitAnchor::Call, InsertPoint::Before(i));
    }
    (ExitAnchor::Terminator, InsertPoint::BeforeTerminator)
}

/// Insert `dump(dump_flag)` then `stop_timer(0)` at the entry function's exit
///
/// The exit is the first return instruction of the function's last block,
/// else the first call there. Nothing is inserted unless the reference
/// function is defined or declared in the same program.
pub fn instrument_entry_exit(
    program: &mut Program,
    config: &TimingConfig,
    temps: &mut TempAllocator,
    dump: RuntimeFn,
    dump_flag: i64,
) -> ExitOutcome {
    let Some(function) = program
        .functions
        .iter()
        .position(|f| f.name == config.entry_function && !f.blocks.is_empty())
    else {
        return ExitOutcome::NotPresent;
    };

    if !program.has_function(&config.reference_function) {
        tracing::info!(
            "{} present without {}; skipping dump and timer teardown",
            config.entry_function,
            config.reference_function
        );
        return ExitOutcome::ReferenceMissing;
    }

    let block = program.functions[function].blocks.len() - 1;
    let (anchor, point) = exit_anchor(&program.functions[function].blocks[block].instructions);

    let mut b = ProbeBuilder::new(temps);
    b.call(dump, vec![Operand::Int(dump_flag)]);
    b.call(RuntimeFn::StopTimer, vec![Operand::Int(0)]);
    program.insert(function, block, point, b.finish());

    tracing::info!(
        ?anchor,
        "inserted {} and timer teardown at exit of {}:{}",
        dump.symbol(),
        config.entry_function,
        program.functions[function].blocks[block].name
    );

    ExitOutcome::Inserted { anchor }
}
