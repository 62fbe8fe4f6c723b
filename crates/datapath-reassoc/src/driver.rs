//! Block-level scan-and-rewrite loop.

use std::{collections::HashSet, io::Write};

use buggy::{Bug, BugExt};
use datapath_ir::{BinOp, BlockId, Func, Origin, ValueId};
use tracing::{debug, warn};

use crate::{
    balance::build_tree,
    extract::{split_merge, ChainCtx},
    trace::ChainTrace,
};

/// Rewrites every eligible `fadd` chain in `func` into a balanced
/// tree. Returns whether anything changed.
pub fn balance_fadds(func: &mut Func) -> Result<bool, Bug> {
    balance_fadds_traced(func, &mut ChainTrace::disabled())
}

/// Like [`balance_fadds`], recording per-chain diagnostics to `trace`.
pub fn balance_fadds_traced<W: Write>(
    func: &mut Func,
    trace: &mut ChainTrace<W>,
) -> Result<bool, Bug> {
    if func.is_intrinsic() {
        debug!(func = func.name(), "skipping runtime-surface function");
        return Ok(false);
    }

    let mut changed = false;
    let blocks: Vec<BlockId> = func.blocks().collect();
    for block in blocks {
        // Chains the extractor refused; do not rescan them.
        let mut skipped = HashSet::new();
        // Every rewrite invalidates the previous scan, so restart from
        // the top of the block until nothing matches.
        while let Some(root) = find_chain_root(func, block, &skipped) {
            let mut ctx = ChainCtx::new();
            let leaves = ctx.leaf_multiset(func, block, root, trace)?;
            let chain = match split_merge(func, leaves) {
                Ok(chain) => chain,
                Err(err) => {
                    warn!(%root, %err, "skipping unsupported chain");
                    skipped.insert(root);
                    continue;
                }
            };
            debug!(%root, total = chain.total, merge = chain.merge.is_some(), "rebalancing chain");
            trace.note(format_args!(
                "before rewrite:\n{}",
                func.display_block(block)
            ));

            let tree = build_tree(func, block, root, chain.heap, chain.total, trace)?;
            let new_root = match chain.merge {
                // The loop-carried accumulator stays the final
                // combining step so the per-iteration recurrence is
                // one tree evaluation plus one add.
                Some(merge) => func
                    .insert_bin_before(block, root, BinOp::FAdd, tree, merge, Origin::Synthesized)
                    .assume("chain root is still in its block")?,
                None => tree,
            };
            func.replace_all_uses(root, new_root);
            func.purge_dead(root);

            trace.note(format_args!(
                "after rewrite:\n{}",
                func.display_block(block)
            ));
            changed = true;
        }
    }
    trace.flush();
    Ok(changed)
}

/// Finds the next chain root in `block`: the first instruction in
/// reverse program order that is an original `fadd` with at least one
/// `fadd` operand.
fn find_chain_root(func: &Func, block: BlockId, skipped: &HashSet<ValueId>) -> Option<ValueId> {
    for &id in func.block(block).insts.iter().rev() {
        if skipped.contains(&id) || func.origin(id) == Origin::Synthesized {
            continue;
        }
        let Some((BinOp::FAdd, lhs, rhs)) = func.bin_inst(id) else {
            continue;
        };
        if is_fadd(func, lhs) || is_fadd(func, rhs) {
            return Some(id);
        }
    }
    None
}

fn is_fadd(func: &Func, value: ValueId) -> bool {
    matches!(func.bin_inst(value), Some((BinOp::FAdd, ..)))
}
