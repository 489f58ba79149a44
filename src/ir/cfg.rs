//! Predecessor/successor view of a function's control-flow graph

use super::Function;
use std::collections::HashMap;

/// Edge counts and exit flags for every block of one function
///
/// Blocks are addressed by their position in `Function::blocks`. Duplicate
/// successor entries (a conditional branch with both arms to the same block)
/// count as distinct edges, as they do in the IR the engine instruments.
#[derive(Debug, Clone)]
pub struct FunctionCfg {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    has_exit: Vec<bool>,
}

impl FunctionCfg {
    /// Build the view; successor names that do not resolve are skipped
    /// (`Program::validate` reports them)
    pub fn build(function: &Function) -> Self {
        let index: HashMap<&str, usize> = function
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect();

        let n = function.blocks.len();
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];

        for (from, block) in function.blocks.iter().enumerate() {
            for name in &block.successors {
                if let Some(&to) = index.get(name.as_str()) {
                    successors[from].push(to);
                    predecessors[to].push(from);
                }
            }
        }

        let has_exit = function
            .blocks
            .iter()
            .map(|b| b.has_exit_instruction())
            .collect();

        Self {
            successors,
            predecessors,
            has_exit,
        }
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, block: usize) -> &[usize] {
        &self.successors[block]
    }

    pub fn predecessors(&self, block: usize) -> &[usize] {
        &self.predecessors[block]
    }

    pub fn predecessor_count(&self, block: usize) -> usize {
        self.predecessors[block].len()
    }

    pub fn has_exit_instruction(&self, block: usize) -> bool {
        self.has_exit[block]
    }
}
