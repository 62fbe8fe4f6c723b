//! Chain expansion: from a chain root to its weighted leaf multiset.

use std::{
    collections::{BinaryHeap, HashMap},
    fmt::Write as _,
    io::Write,
};

use buggy::{Bug, BugExt};
use datapath_ir::{BinOp, BlockId, Func, Origin, ValueId};
use indexmap::IndexMap;

use crate::trace::ChainTrace;

/// Chain shapes the rebalancer refuses to rewrite.
///
/// A loop-carried accumulator must stay the outermost summand of the
/// rewritten chain, which is only well-defined when the chain sums
/// exactly one merge value exactly once.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum UnsupportedChain {
    /// The chain sums two or more distinct block-entry merge values.
    #[error("chain sums more than one block-entry merge value")]
    MultipleMergeLeaves,

    /// A single merge value is summed more than once.
    #[error("block-entry merge value is summed {count} times")]
    MergeLeafShared { count: u64 },
}

/// Is `value` an original same-block member of the chain being
/// expanded? Synthesized nodes are never re-expanded; they count as
/// leaves.
pub(crate) fn is_chain_member(func: &Func, block: BlockId, value: ValueId) -> bool {
    matches!(func.bin_inst(value), Some((BinOp::FAdd, ..)))
        && func.defining_block(value) == Some(block)
        && func.origin(value) == Origin::Source
}

/// Scratch state for expanding one chain.
///
/// Built fresh per chain root and discarded afterward; nothing here
/// survives across chains or blocks.
pub(crate) struct ChainCtx {
    /// Leaf multisets memoized per visited chain node, keyed by node
    /// identity. Multiplicities fold additively, so a shared sub-sum
    /// reached over several paths contributes its leaves once per
    /// path.
    memo: HashMap<ValueId, IndexMap<ValueId, u64>>,
}

impl ChainCtx {
    pub fn new() -> Self {
        Self {
            memo: HashMap::new(),
        }
    }

    /// Expands the chain rooted at `root` into its weighted leaf
    /// multiset.
    pub fn leaf_multiset<W: Write>(
        &mut self,
        func: &Func,
        block: BlockId,
        root: ValueId,
        trace: &mut ChainTrace<W>,
    ) -> Result<IndexMap<ValueId, u64>, Bug> {
        self.expand(func, block, root, trace)?;
        self.memo
            .get(&root)
            .cloned()
            .assume("chain root has been expanded")
    }

    fn expand<W: Write>(
        &mut self,
        func: &Func,
        block: BlockId,
        node: ValueId,
        trace: &mut ChainTrace<W>,
    ) -> Result<(), Bug> {
        if self.memo.contains_key(&node) {
            return Ok(());
        }
        let (_, lhs, rhs) = func
            .bin_inst(node)
            .assume("chain members are binary fadd instructions")?;

        let mut counts: IndexMap<ValueId, u64> = IndexMap::new();
        for operand in [lhs, rhs] {
            if is_chain_member(func, block, operand) {
                self.expand(func, block, operand, trace)?;
                let sub = self
                    .memo
                    .get(&operand)
                    .assume("expanded operand is memoized")?;
                for (&leaf, &n) in sub {
                    let slot = counts.entry(leaf).or_insert(0);
                    *slot = slot.saturating_add(n);
                }
            } else {
                let slot = counts.entry(operand).or_insert(0);
                *slot = slot.saturating_add(1);
            }
        }

        trace.note(format_args!(
            "chain node {node}: {}",
            fmt_leaves(&counts)
        ));
        self.memo.insert(node, counts);
        Ok(())
    }
}

/// The extractor's output, ready for synthesis: non-merge leaves in a
/// maximum-weight-first heap plus at most one merge value.
pub(crate) struct WeightedLeaves {
    pub heap: BinaryHeap<(u64, ValueId)>,
    /// Total weight of the non-merge leaves.
    pub total: u64,
    pub merge: Option<ValueId>,
}

/// Splits a leaf multiset into the heap fed to the balancer and the
/// optional merge-value exception leaf.
pub(crate) fn split_merge(
    func: &Func,
    leaves: IndexMap<ValueId, u64>,
) -> Result<WeightedLeaves, UnsupportedChain> {
    let mut heap = BinaryHeap::new();
    let mut total = 0u64;
    let mut merge = None;
    for (leaf, count) in leaves {
        if func.is_merge(leaf) {
            if count != 1 {
                return Err(UnsupportedChain::MergeLeafShared { count });
            }
            if merge.replace(leaf).is_some() {
                return Err(UnsupportedChain::MultipleMergeLeaves);
            }
        } else {
            heap.push((count, leaf));
            total = total.saturating_add(count);
        }
    }
    Ok(WeightedLeaves { heap, total, merge })
}

fn fmt_leaves(counts: &IndexMap<ValueId, u64>) -> String {
    let mut line = String::new();
    for (i, (leaf, count)) in counts.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{leaf} x{count}");
    }
    line
}
