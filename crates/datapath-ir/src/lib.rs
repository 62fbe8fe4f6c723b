//! An SSA-style dataflow IR for datapath optimization passes.
//!
//! A [`Func`] owns a set of basic blocks and the values defined inside
//! them. Values are referenced by identity ([`ValueId`]) and never
//! copied; deleting an instruction invalidates its key without
//! disturbing any other value. The mutation surface is deliberately
//! small: passes insert binary instructions, redirect uses, and purge
//! dead instructions, and read everything else through queries.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::arithmetic_side_effects)]

mod block;
mod display;
mod error;
mod func;
mod inst;

pub use self::{
    block::{Block, BlockId, Branch, Terminator},
    display::BlockDisplay,
    error::GraphError,
    func::Func,
    inst::{BinOp, Origin, Value, ValueId, ValueKind},
};
