use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::Key;

use crate::inst::ValueId;

slotmap::new_key_type! {
    /// A handle to a basic block.
    pub struct BlockId;
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.data().as_ffi() & 0xffff_ffff)
    }
}

/// A basic block.
///
/// Merge values come first, then ordinary instructions in program
/// order, then an optional terminator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub phis: Vec<ValueId>,
    pub insts: Vec<ValueId>,
    pub term: Option<Terminator>,

    /// Outgoing CFG edges.
    pub succ: Vec<BlockId>,
    /// Incoming CFG edges.
    pub preds: Vec<BlockId>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Self {
            phis: Vec::new(),
            insts: Vec::new(),
            term: None,
            succ: Vec::new(),
            preds: Vec::new(),
        }
    }
}

/// A terminator instruction that ends a [`Block`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Return(Option<ValueId>),
    Jump(BlockId),
    Branch(Branch),
}

/// A conditional jump.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub cond: ValueId,
    pub true_block: BlockId,
    pub false_block: BlockId,
}
