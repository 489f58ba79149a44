//! Program model consumed and mutated by the engine
//!
//! The engine only needs three things from an intermediate representation:
//! function and block names in declaration order, per-block successor edges
//! plus the instruction kinds that mark function exits and calls, and a way
//! to insert an ordered list of instructions at a point inside a block. This
//! module provides exactly that as plain serde data so programs can be loaded
//! from and written back to JSON by the driver.

pub mod cfg;
pub mod probe;

pub use cfg::FunctionCfg;
pub use probe::{Operand, ProbeBuilder, ProbeOp, RuntimeFn, SharedCell, Temp, TempAllocator};

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// Identity of a control-flow node: `(function_name, node_name)`
///
/// Used as the join key between the classification table, the execution
/// trace and the observation cache. Comparing the two names as a pair keeps
/// `("ab", "c")` and `("a", "bc")` distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub function: String,
    pub node: String,
}

impl NodeKey {
    pub fn new(function: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            node: node.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function, self.node)
    }
}

/// A single instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Function exit
    Return,
    /// Transfer to the block's successors
    Jump,
    Unreachable,
    Call {
        callee: String,
    },
    /// Any instruction the engine does not need to understand
    Other {
        text: String,
    },
    /// Inserted by the engine
    Probe(ProbeOp),
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return | Instruction::Jump | Instruction::Unreachable
        )
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Return)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Instruction::Call { .. })
    }
}

/// A control-flow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub name: String,
    /// Names of successor blocks within the same function
    #[serde(default)]
    pub successors: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            successors: Vec::new(),
            instructions: Vec::new(),
        }
    }

    pub fn with_successors<I, S>(mut self, successors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.successors = successors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_instructions(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Whether the block contains a function-exit instruction
    pub fn has_exit_instruction(&self) -> bool {
        self.instructions.iter().any(Instruction::is_return)
    }

    /// Index of the block terminator, or the end of the block if it has none
    pub fn terminator_index(&self) -> usize {
        match self.instructions.last() {
            Some(last) if last.is_terminator() => self.instructions.len() - 1,
            _ => self.instructions.len(),
        }
    }

    /// Insert `code` in order at `point`
    pub fn insert(&mut self, point: InsertPoint, code: Vec<Instruction>) {
        let at = match point {
            InsertPoint::BeforeTerminator => self.terminator_index(),
            InsertPoint::Before(index) => index.min(self.instructions.len()),
        };
        self.instructions.splice(at..at, code);
    }
}

/// Where inside a block inserted code lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Immediately before the node's exit (its terminator)
    BeforeTerminator,
    /// Immediately before the instruction at this index
    Before(usize),
}

/// A function with its control-flow nodes in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>, blocks: Vec<BasicBlock>) -> Self {
        Self {
            name: name.into(),
            blocks,
        }
    }

    pub fn cfg(&self) -> FunctionCfg {
        FunctionCfg::build(self)
    }

    pub fn block(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

/// One translation unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    /// Functions declared but not defined in this unit
    #[serde(default)]
    pub declarations: Vec<String>,
    /// Runtime symbols and cells referenced by inserted code
    #[serde(default)]
    pub runtime_imports: BTreeSet<String>,
}

impl Program {
    pub fn new(name: impl Into<String>, functions: Vec<Function>) -> Self {
        Self {
            name: name.into(),
            functions,
            ..Self::default()
        }
    }

    /// Load a program from its JSON form and validate its edges
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::MissingInput {
                kind: "program",
                path: path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(path)?;
        let program: Program = serde_json::from_str(&contents)
            .map_err(|e| EngineError::InvalidProgram(format!("{}: {}", path.display(), e)))?;
        program.validate()?;
        Ok(program)
    }

    /// Write the program as pretty-printed JSON
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::InvalidProgram(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject duplicate names and successor edges that name blocks outside
    /// their function
    pub fn validate(&self) -> Result<()> {
        let mut functions = HashSet::new();
        for function in &self.functions {
            if !functions.insert(function.name.as_str()) {
                return Err(EngineError::InvalidProgram(format!(
                    "function {} is defined twice",
                    function.name
                )));
            }
            let mut names: HashSet<&str> = HashSet::with_capacity(function.blocks.len());
            for block in &function.blocks {
                if !names.insert(block.name.as_str()) {
                    return Err(EngineError::InvalidProgram(format!(
                        "block {}:{} is defined twice",
                        function.name, block.name
                    )));
                }
            }
            for block in &function.blocks {
                if let Some(missing) = block
                    .successors
                    .iter()
                    .find(|s| !names.contains(s.as_str()))
                {
                    return Err(EngineError::InvalidProgram(format!(
                        "block {}:{} has unknown successor {}",
                        function.name, block.name, missing
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Whether `name` is defined or declared in this unit
    pub fn has_function(&self, name: &str) -> bool {
        self.function(name).is_some() || self.declarations.iter().any(|d| d == name)
    }

    /// Record the symbols referenced by inserted code
    pub fn import_runtime(&mut self, code: &[Instruction]) {
        for instruction in code {
            if let Instruction::Probe(op) = instruction {
                self.runtime_imports.extend(op.referenced_symbols());
            }
        }
    }

    /// Insert `code` into `function`/`block` and declare what it references
    pub fn insert(
        &mut self,
        function: usize,
        block: usize,
        point: InsertPoint,
        code: Vec<Instruction>,
    ) {
        if code.is_empty() {
            return;
        }
        self.import_runtime(&code);
        self.functions[function].blocks[block].insert(point, code);
    }

    /// Temporary allocator that cannot collide with probes already present
    pub fn temp_allocator(&self) -> TempAllocator {
        let next = self
            .functions
            .iter()
            .flat_map(|f| &f.blocks)
            .flat_map(|b| &b.instructions)
            .filter_map(|i| match i {
                Instruction::Probe(op) => op.defined_temp(),
                _ => None,
            })
            .map(|t| t.0 + 1)
            .max()
            .unwrap_or(0);
        TempAllocator::starting_at(next)
    }

    /// Total number of control-flow nodes
    pub fn block_count(&self) -> usize {
        self.functions.iter().map(|f| f.blocks.len()).sum()
    }
}
