//! Checkpoint / context-setter classification of control-flow nodes
//!
//! A node is a **checkpoint** when it has more than one predecessor, carries
//! the designated entry block name, or contains a function-exit instruction.
//! A node is a **context-setter** when at least one of its successors is a
//! checkpoint. Every node gets a dense, zero-based global index in traversal
//! order (functions in declaration order, then blocks in order), which is the
//! join key used by every later phase.

use crate::ir::{FunctionCfg, NodeKey, Program};
use serde::Serialize;

/// Classification of one control-flow node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    pub key: NodeKey,
    pub global_index: u64,
    pub is_context_setter: bool,
    pub is_checkpoint: bool,
}

/// Checkpoint/context-setter flags without identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeClass {
    pub global_index: u64,
    pub is_context_setter: bool,
    pub is_checkpoint: bool,
}

impl NodeDescriptor {
    pub fn class(&self) -> NodeClass {
        NodeClass {
            global_index: self.global_index,
            is_context_setter: self.is_context_setter,
            is_checkpoint: self.is_checkpoint,
        }
    }
}

/// Applies the classification rules to one function's CFG
pub struct Classifier<'a> {
    entry_block_name: &'a str,
}

impl<'a> Classifier<'a> {
    pub fn new(entry_block_name: &'a str) -> Self {
        Self { entry_block_name }
    }

    /// Checkpoint flags for every block of a function, in block order
    pub fn checkpoints(&self, names: &[&str], cfg: &FunctionCfg) -> Vec<bool> {
        (0..cfg.len())
            .map(|b| {
                cfg.predecessor_count(b) > 1
                    || names[b] == self.entry_block_name
                    || cfg.has_exit_instruction(b)
            })
            .collect()
    }

    /// Context-setter flags derived from the checkpoint flags
    pub fn context_setters(&self, checkpoints: &[bool], cfg: &FunctionCfg) -> Vec<bool> {
        (0..cfg.len())
            .map(|b| cfg.successors(b).iter().any(|&s| checkpoints[s]))
            .collect()
    }

    /// Classify every node of `program`, numbering from `first_index`
    pub fn classify_from(&self, program: &Program, first_index: u64) -> Vec<NodeDescriptor> {
        let mut descriptors = Vec::with_capacity(program.block_count());
        let mut next_index = first_index;

        for function in &program.functions {
            let cfg = function.cfg();
            let names: Vec<&str> = function.blocks.iter().map(|b| b.name.as_str()).collect();
            let checkpoints = self.checkpoints(&names, &cfg);
            let context_setters = self.context_setters(&checkpoints, &cfg);

            for (b, name) in names.iter().enumerate() {
                descriptors.push(NodeDescriptor {
                    key: NodeKey::new(function.name.as_str(), *name),
                    global_index: next_index,
                    is_context_setter: context_setters[b],
                    is_checkpoint: checkpoints[b],
                });
                next_index += 1;
            }
        }

        tracing::debug!(
            nodes = descriptors.len(),
            checkpoints = descriptors.iter().filter(|d| d.is_checkpoint).count(),
            context_setters = descriptors.iter().filter(|d| d.is_context_setter).count(),
            "classified program {}",
            program.name
        );

        descriptors
    }
}

/// Classify every node of `program` with indices starting at zero
pub fn classify(program: &Program, entry_block_name: &str) -> Vec<NodeDescriptor> {
    Classifier::new(entry_block_name).classify_from(program, 0)
}
