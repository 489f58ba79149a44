//! Instrumentation code the engine inserts
//!
//! Inserted code is straight-line: loads and stores of the shared runtime
//! cells, one subtraction, and calls into the runtime support library. The
//! runtime library itself is external; the engine only declares the symbols
//! it references.

use super::Instruction;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Shared runtime state mutated only by inserted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedCell {
    /// Advanced continuously by the background timer thread
    CurrentTime,
    /// Clock value at the last checkpoint
    PreviousTime,
    /// Global index of the last context-setter that ran
    LastContext,
}

impl SharedCell {
    pub fn symbol(self) -> &'static str {
        match self {
            SharedCell::CurrentTime => "current_time",
            SharedCell::PreviousTime => "previous_time",
            SharedCell::LastContext => "pre_bb_num",
        }
    }
}

/// Runtime support routines called by inserted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFn {
    /// `record(function_name, node_name, elapsed_or_sentinel)`
    Record,
    /// Dump every recorded raw sample
    DumpRaw,
    /// Dump aggregated detection results
    DumpDetections,
    /// Arity-selected anomaly decision routine (1..=4 contexts)
    Detect { arity: u8 },
    /// Ask the background timer thread to terminate
    StopTimer,
}

impl RuntimeFn {
    /// Largest detection arity the runtime library provides
    pub const MAX_DETECT_ARITY: usize = 4;

    pub fn symbol(self) -> Cow<'static, str> {
        match self {
            RuntimeFn::Record => Cow::Borrowed("instrument_function_insert_record"),
            RuntimeFn::DumpRaw => Cow::Borrowed("instrument_function_dump_result"),
            RuntimeFn::DumpDetections => {
                Cow::Borrowed("instrument_function_dump_detection_result")
            }
            RuntimeFn::Detect { arity } => Cow::Owned(format!("instrument_function_detect{}", arity)),
            RuntimeFn::StopTimer => Cow::Borrowed("set_infinite_loop_flag_false"),
        }
    }
}

/// SSA-style temporary, unique across a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temp(pub u32);

/// Argument or stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Temp(Temp),
    Int(i64),
    Str(String),
}

impl From<Temp> for Operand {
    fn from(t: Temp) -> Self {
        Operand::Temp(t)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Int(v)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Str(s.to_string())
    }
}

/// One inserted operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeOp {
    Load { dst: Temp, cell: SharedCell },
    Store { cell: SharedCell, value: Operand },
    Sub { dst: Temp, lhs: Temp, rhs: Temp },
    Call { callee: RuntimeFn, args: Vec<Operand> },
}

impl ProbeOp {
    /// Temporary this operation defines, if any
    pub fn defined_temp(&self) -> Option<Temp> {
        match self {
            ProbeOp::Load { dst, .. } | ProbeOp::Sub { dst, .. } => Some(*dst),
            ProbeOp::Store { .. } | ProbeOp::Call { .. } => None,
        }
    }

    /// Runtime symbols this operation needs declared
    pub fn referenced_symbols(&self) -> Vec<String> {
        match self {
            ProbeOp::Load { cell, .. } | ProbeOp::Store { cell, .. } => {
                vec![cell.symbol().to_string()]
            }
            ProbeOp::Sub { .. } => Vec::new(),
            ProbeOp::Call { callee, .. } => vec![callee.symbol().into_owned()],
        }
    }
}

/// Hands out program-wide unique temporaries
#[derive(Debug, Default)]
pub struct TempAllocator {
    next: u32,
}

impl TempAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose first temporary is `next`
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub fn fresh(&mut self) -> Temp {
        let t = Temp(self.next);
        self.next += 1;
        t
    }
}

/// Builds an ordered instruction list for one insertion point
pub struct ProbeBuilder<'a> {
    temps: &'a mut TempAllocator,
    code: Vec<Instruction>,
}

impl<'a> ProbeBuilder<'a> {
    pub fn new(temps: &'a mut TempAllocator) -> Self {
        Self {
            temps,
            code: Vec::new(),
        }
    }

    pub fn load(&mut self, cell: SharedCell) -> Temp {
        let dst = self.temps.fresh();
        self.push(ProbeOp::Load { dst, cell });
        dst
    }

    pub fn store(&mut self, cell: SharedCell, value: impl Into<Operand>) {
        self.push(ProbeOp::Store {
            cell,
            value: value.into(),
        });
    }

    pub fn sub(&mut self, lhs: Temp, rhs: Temp) -> Temp {
        let dst = self.temps.fresh();
        self.push(ProbeOp::Sub { dst, lhs, rhs });
        dst
    }

    pub fn call(&mut self, callee: RuntimeFn, args: Vec<Operand>) {
        self.push(ProbeOp::Call { callee, args });
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn finish(self) -> Vec<Instruction> {
        self.code
    }

    fn push(&mut self, op: ProbeOp) {
        self.code.push(Instruction::Probe(op));
    }
}
