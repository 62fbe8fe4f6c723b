//! Balanced tree synthesis over a weighted leaf multiset.

use std::{collections::BinaryHeap, io::Write};

use buggy::{bug, Bug, BugExt};
use datapath_ir::{BinOp, BlockId, Func, Origin, ValueId};

use crate::trace::ChainTrace;

/// Builds a minimal-depth `fadd` tree over exactly `total` leaf-units
/// drawn from `heap`, inserting synthesized instructions before
/// `before`. Returns the tree root.
///
/// The partition is weight-balanced, not a structural median split:
/// each recursive call receives leaf-units summing to as close to half
/// of `total` as integer division allows, which bounds tree depth by
/// `ceil(log2(total))` no matter how the multiplicities are spread
/// across distinct values. Draining heaviest values first keeps a
/// shared value's units together whenever they fit on one side.
pub(crate) fn build_tree<W: Write>(
    func: &mut Func,
    block: BlockId,
    before: ValueId,
    mut heap: BinaryHeap<(u64, ValueId)>,
    total: u64,
    trace: &mut ChainTrace<W>,
) -> Result<ValueId, Bug> {
    if total == 1 {
        // A single leaf-unit is the original value itself; no node is
        // created, preserving identity.
        let (_, value) = heap.pop().assume("one pair remains for a unit subtree")?;
        return Ok(value);
    }

    let cap_l = total.div_ceil(2);
    let cap_r = total.saturating_sub(cap_l);
    let mut room_l = cap_l;
    let mut room_r = cap_r;
    let mut left = BinaryHeap::new();
    let mut right = BinaryHeap::new();

    while let Some((mut weight, value)) = heap.pop() {
        trace.note(format_args!("splitting {weight} x {value}"));
        if weight <= room_l {
            left.push((weight, value));
            room_l = room_l.saturating_sub(weight);
            trace.note(format_args!("  {weight} to left (room {room_l})"));
        } else {
            if room_l > 0 {
                left.push((room_l, value));
                weight = weight.saturating_sub(room_l);
                trace.note(format_args!("  {room_l} to left (room 0)"));
                room_l = 0;
            }
            right.push((weight, value));
            room_r = room_r
                .checked_sub(weight)
                .assume("right bucket never overflows its capacity")?;
            trace.note(format_args!("  {weight} to right (room {room_r})"));
        }
    }
    if room_l != 0 || room_r != 0 {
        bug!("partition did not exhaust both bucket capacities");
    }

    let lhs = build_tree(func, block, before, left, cap_l, trace)?;
    let rhs = build_tree(func, block, before, right, cap_r, trace)?;
    func.insert_bin_before(block, before, BinOp::FAdd, lhs, rhs, Origin::Synthesized)
        .assume("chain root is still in its block")
}
