use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::Key;

use crate::block::BlockId;

slotmap::new_key_type! {
    /// A stable, identity-comparable handle to a value defined
    /// somewhere in a [`Func`][crate::Func].
    pub struct ValueId;
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.data().as_ffi() & 0xffff_ffff)
    }
}

/// A binary floating-point operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMul => "fmul",
            Self::FDiv => "fdiv",
        })
    }
}

/// Where a value came from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Origin {
    /// Defined by the function as built.
    #[default]
    Source,
    /// Created by an optimization pass. Synthesized instructions are
    /// never re-matched as members of an original operator chain.
    Synthesized,
}

/// How a value is defined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    /// A function input.
    Param { index: usize },
    /// A floating-point constant.
    Const { value: f64 },
    /// A block-entry merge value: its definition depends on which
    /// predecessor control flow arrived from.
    Phi { incoming: Vec<(BlockId, ValueId)> },
    /// A binary operator instruction.
    Bin {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
}

/// A value in the dataflow graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    pub origin: Origin,
    /// The block this value is defined in. `None` for params and
    /// constants, which belong to the function as a whole.
    pub block: Option<BlockId>,
}

impl Value {
    /// Is this a block-entry merge value?
    pub fn is_merge(&self) -> bool {
        matches!(self.kind, ValueKind::Phi { .. })
    }

    /// Returns the operator and operands if this is a binary
    /// instruction.
    pub fn as_bin(&self) -> Option<(BinOp, ValueId, ValueId)> {
        match self.kind {
            ValueKind::Bin { op, lhs, rhs } => Some((op, lhs, rhs)),
            _ => None,
        }
    }

    /// The values this value reads.
    pub fn operands(&self) -> Vec<ValueId> {
        match &self.kind {
            ValueKind::Param { .. } | ValueKind::Const { .. } => Vec::new(),
            ValueKind::Phi { incoming } => incoming.iter().map(|&(_, v)| v).collect(),
            ValueKind::Bin { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }
}
