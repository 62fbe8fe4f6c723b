//! Depth-minimizing reassociation of floating-point addition chains.
//!
//! Overview
//! --------
//! A source expression `a + b + c + d` lowers to a skewed chain of
//! binary `fadd` instructions whose depth equals its length, and that
//! depth becomes the critical-path latency of the datapath synthesized
//! from it. This pass rewrites every such chain, confined to a single
//! block, into a weight-balanced binary tree over the same multiset of
//! summands, cutting depth to `ceil(log2(n))`. The operator is treated
//! as associative and commutative, so only the pairing order changes,
//! never which values are summed or how often.
//!
//! The pass runs in four stages per chain, looped to a per-block
//! fixpoint:
//! - scan a block in reverse program order for a chain root
//!   ([`driver`]);
//! - expand the chain into a weighted multiset of distinct leaf
//!   operands, folding multiplicities across reconvergent paths
//!   ([`extract`]);
//! - synthesize a minimal-depth tree by greedy weight-balanced
//!   partitioning, keeping at most one loop-carried merge value as the
//!   outermost summand ([`balance`]);
//! - rewire consumers, purge the dead original chain, and rescan.
//!
//! Error Policy
//! ------------
//! Chain shapes the algorithm does not support (more than one merge
//! value, or a merge value summed more than once) surface as
//! [`UnsupportedChain`]; the driver skips such chains rather than
//! rewriting them incorrectly. Internal invariant violations are
//! [`buggy::Bug`]s.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::arithmetic_side_effects)]

mod balance;
mod driver;
mod extract;
mod tests;
mod trace;

pub use self::{
    driver::{balance_fadds, balance_fadds_traced},
    extract::UnsupportedChain,
    trace::ChainTrace,
};
