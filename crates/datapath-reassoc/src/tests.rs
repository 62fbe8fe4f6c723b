#![cfg(test)]

use std::collections::{BinaryHeap, HashMap};

use datapath_ir::{BinOp, BlockId, Func, Origin, Terminator, ValueId};
use pretty_assertions::assert_eq;
use test_log::test;

use crate::{balance::build_tree, balance_fadds, balance_fadds_traced, ChainTrace};

// --- Test harness ---

/// Builds `p0 + p1 + ... + p(n-1)` as a left-skewed chain returned
/// from a single block.
fn chain_func(n: usize) -> (Func, BlockId) {
    let mut func = Func::new("dot");
    let params: Vec<_> = (0..n).map(|_| func.add_param()).collect();
    let block = func.new_block();
    let mut acc = func
        .append_bin(block, BinOp::FAdd, params[0], params[1])
        .unwrap();
    for &p in &params[2..] {
        acc = func.append_bin(block, BinOp::FAdd, acc, p).unwrap();
    }
    func.terminate(block, Terminator::Return(Some(acc))).unwrap();
    (func, block)
}

fn returned(func: &Func, block: BlockId) -> ValueId {
    match func.block(block).term {
        Some(Terminator::Return(Some(v))) => v,
        _ => panic!("block has no return value"),
    }
}

/// Depth of the same-block `fadd` tree rooted at `v`; leaves have
/// depth 0.
fn depth(func: &Func, block: BlockId, v: ValueId) -> u32 {
    match func.bin_inst(v) {
        Some((BinOp::FAdd, lhs, rhs)) if func.defining_block(v) == Some(block) => {
            1 + depth(func, block, lhs).max(depth(func, block, rhs))
        }
        _ => 0,
    }
}

/// The leaf multiset of the same-block `fadd` tree rooted at `v`,
/// counting a leaf once per path that reaches it.
fn leaf_counts(func: &Func, block: BlockId, v: ValueId) -> HashMap<ValueId, u64> {
    fn walk(func: &Func, block: BlockId, v: ValueId, out: &mut HashMap<ValueId, u64>) {
        match func.bin_inst(v) {
            Some((BinOp::FAdd, lhs, rhs)) if func.defining_block(v) == Some(block) => {
                walk(func, block, lhs, out);
                walk(func, block, rhs, out);
            }
            _ => *out.entry(v).or_insert(0) += 1,
        }
    }
    let mut out = HashMap::new();
    walk(func, block, v, &mut out);
    out
}

fn fadd_count(func: &Func, block: BlockId) -> usize {
    func.block(block)
        .insts
        .iter()
        .filter(|&&v| matches!(func.bin_inst(v), Some((BinOp::FAdd, ..))))
        .count()
}

fn ceil_log2(n: u64) -> u32 {
    assert!(n >= 2);
    u64::BITS - (n - 1).leading_zeros()
}

// --- Tests ---

#[test]
fn balances_five_term_chain() {
    let (mut func, block) = chain_func(5);
    let params: Vec<_> = func.params().to_vec();

    assert!(balance_fadds(&mut func).unwrap());

    let root = returned(&func, block);
    assert_eq!(depth(&func, block, root), 3);
    // Same multiset of summands, new pairing only.
    let expected: HashMap<_, _> = params.iter().map(|&p| (p, 1)).collect();
    assert_eq!(leaf_counts(&func, block, root), expected);
    // Four adds for five leaves; the original chain is gone.
    assert_eq!(fadd_count(&func, block), 4);
    assert!(func
        .block(block)
        .insts
        .iter()
        .all(|&v| func.origin(v) == Origin::Synthesized));
}

#[test]
fn shared_subsum_counts_once_per_path() {
    let mut func = Func::new("f");
    let x = func.add_param();
    let y = func.add_param();
    let block = func.new_block();
    let t1 = func.append_bin(block, BinOp::FAdd, x, x).unwrap();
    let t2 = func.append_bin(block, BinOp::FAdd, t1, x).unwrap();
    let root = func.append_bin(block, BinOp::FAdd, t2, y).unwrap();
    func.terminate(block, Terminator::Return(Some(root))).unwrap();

    assert!(balance_fadds(&mut func).unwrap());

    let root = returned(&func, block);
    // {x:3, y:1}: x splits 2/1 across the halves, so one subtree is
    // x+x and the other sums the remaining x with y.
    assert_eq!(
        leaf_counts(&func, block, root),
        HashMap::from([(x, 3), (y, 1)])
    );
    assert_eq!(depth(&func, block, root), 2);
    assert_eq!(fadd_count(&func, block), 4);
}

#[test]
fn merge_value_stays_outermost() {
    let mut func = Func::new("acc");
    let a = func.add_param();
    let b = func.add_param();
    let zero = func.add_const(0.0);
    let b0 = func.new_block();
    let b1 = func.new_block();
    func.terminate(b0, Terminator::Jump(b1)).unwrap();
    let phi = func.add_phi(b1, vec![(b0, zero)]).unwrap();
    let t = func.append_bin(b1, BinOp::FAdd, phi, a).unwrap();
    let root = func.append_bin(b1, BinOp::FAdd, t, b).unwrap();
    func.set_phi_incoming(phi, b1, root).unwrap();
    func.terminate(b1, Terminator::Jump(b1)).unwrap();

    assert!(balance_fadds(&mut func).unwrap());

    // The loop-carried value is the final combining step, never inside
    // the balanced subtree.
    let new_root = match &func.value(phi).kind {
        datapath_ir::ValueKind::Phi { incoming } => incoming
            .iter()
            .find(|(pred, _)| *pred == b1)
            .map(|&(_, v)| v)
            .unwrap(),
        _ => unreachable!(),
    };
    let (op, tree, outer) = func.bin_inst(new_root).unwrap();
    assert_eq!(op, BinOp::FAdd);
    assert_eq!(outer, phi);
    assert!(!leaf_counts(&func, b1, tree).contains_key(&phi));
    assert_eq!(
        leaf_counts(&func, b1, tree),
        HashMap::from([(a, 1), (b, 1)])
    );
}

#[test]
fn unit_subtree_returns_original_value() {
    let mut func = Func::new("f");
    let a = func.add_param();
    let block = func.new_block();
    let anchor = func.append_bin(block, BinOp::FAdd, a, a).unwrap();

    let mut heap = BinaryHeap::new();
    heap.push((1, a));
    let out = build_tree(
        &mut func,
        block,
        anchor,
        heap,
        1,
        &mut ChainTrace::disabled(),
    )
    .unwrap();

    assert_eq!(out, a);
    assert_eq!(func.block(block).insts, vec![anchor]);
}

#[test]
fn depth_bound_holds_across_chain_lengths() {
    for n in 3..=33 {
        let (mut func, block) = chain_func(n);
        let params: Vec<_> = func.params().to_vec();

        assert!(balance_fadds(&mut func).unwrap(), "n = {n}");

        let root = returned(&func, block);
        assert_eq!(depth(&func, block, root), ceil_log2(n as u64), "n = {n}");
        let expected: HashMap<_, _> = params.iter().map(|&p| (p, 1)).collect();
        assert_eq!(leaf_counts(&func, block, root), expected, "n = {n}");
        assert_eq!(fadd_count(&func, block), n - 1, "n = {n}");
    }
}

#[test]
fn two_term_chain_is_left_alone() {
    let (mut func, block) = chain_func(2);
    assert!(!balance_fadds(&mut func).unwrap());
    assert_eq!(depth(&func, block, returned(&func, block)), 1);
}

#[test]
fn rebalancing_is_idempotent() {
    let (mut func, block) = chain_func(7);

    assert!(balance_fadds(&mut func).unwrap());
    let after_first = func.block(block).insts.clone();

    assert!(!balance_fadds(&mut func).unwrap());
    assert_eq!(func.block(block).insts, after_first);
}

#[test]
fn chain_with_two_merge_values_is_skipped() {
    let mut func = Func::new("f");
    let a = func.add_param();
    let zero = func.add_const(0.0);
    let b0 = func.new_block();
    let b1 = func.new_block();
    func.terminate(b0, Terminator::Jump(b1)).unwrap();
    let p1 = func.add_phi(b1, vec![(b0, zero)]).unwrap();
    let p2 = func.add_phi(b1, vec![(b0, zero)]).unwrap();
    let t = func.append_bin(b1, BinOp::FAdd, p1, a).unwrap();
    let root = func.append_bin(b1, BinOp::FAdd, t, p2).unwrap();
    func.terminate(b1, Terminator::Return(Some(root))).unwrap();

    assert!(!balance_fadds(&mut func).unwrap());
    assert_eq!(fadd_count(&func, b1), 2);
    assert_eq!(returned(&func, b1), root);
}

#[test]
fn chain_with_shared_merge_value_is_skipped() {
    let mut func = Func::new("f");
    let a = func.add_param();
    let zero = func.add_const(0.0);
    let b0 = func.new_block();
    let b1 = func.new_block();
    func.terminate(b0, Terminator::Jump(b1)).unwrap();
    let phi = func.add_phi(b1, vec![(b0, zero)]).unwrap();
    let t = func.append_bin(b1, BinOp::FAdd, phi, a).unwrap();
    let root = func.append_bin(b1, BinOp::FAdd, t, phi).unwrap();
    func.terminate(b1, Terminator::Return(Some(root))).unwrap();

    assert!(!balance_fadds(&mut func).unwrap());
    assert_eq!(fadd_count(&func, b1), 2);
}

#[test]
fn intrinsic_function_is_untouched() {
    let mut func = Func::new("builtin.dot");
    let a = func.add_param();
    let b = func.add_param();
    let c = func.add_param();
    let block = func.new_block();
    let t = func.append_bin(block, BinOp::FAdd, a, b).unwrap();
    let root = func.append_bin(block, BinOp::FAdd, t, c).unwrap();
    func.terminate(block, Terminator::Return(Some(root))).unwrap();

    assert!(!balance_fadds(&mut func).unwrap());
    assert_eq!(returned(&func, block), root);
}

#[test]
fn block_reaches_fixpoint_over_multiple_chains() {
    let mut func = Func::new("f");
    let params: Vec<_> = (0..6).map(|_| func.add_param()).collect();
    let block = func.new_block();
    let s1a = func
        .append_bin(block, BinOp::FAdd, params[0], params[1])
        .unwrap();
    let s1 = func.append_bin(block, BinOp::FAdd, s1a, params[2]).unwrap();
    let s2a = func
        .append_bin(block, BinOp::FAdd, params[3], params[4])
        .unwrap();
    let s2 = func.append_bin(block, BinOp::FAdd, s2a, params[5]).unwrap();
    let prod = func.append_bin(block, BinOp::FMul, s1, s2).unwrap();
    func.terminate(block, Terminator::Return(Some(prod))).unwrap();

    assert!(balance_fadds(&mut func).unwrap());

    let (_, lhs, rhs) = func.bin_inst(prod).unwrap();
    assert_eq!(func.origin(lhs), Origin::Synthesized);
    assert_eq!(func.origin(rhs), Origin::Synthesized);
    assert_eq!(depth(&func, block, lhs), 2);
    assert_eq!(depth(&func, block, rhs), 2);
    assert_eq!(fadd_count(&func, block), 4);
    assert_eq!(
        leaf_counts(&func, block, lhs),
        params[..3].iter().map(|&p| (p, 1)).collect::<HashMap<_, _>>()
    );
    assert_eq!(
        leaf_counts(&func, block, rhs),
        params[3..].iter().map(|&p| (p, 1)).collect::<HashMap<_, _>>()
    );
}

#[test]
fn cross_block_operand_is_a_leaf() {
    let mut func = Func::new("f");
    let a = func.add_param();
    let b = func.add_param();
    let c = func.add_param();
    let b0 = func.new_block();
    let b1 = func.new_block();
    let t = func.append_bin(b0, BinOp::FAdd, a, b).unwrap();
    func.terminate(b0, Terminator::Jump(b1)).unwrap();
    let root = func.append_bin(b1, BinOp::FAdd, t, c).unwrap();
    func.terminate(b1, Terminator::Return(Some(root))).unwrap();

    assert!(balance_fadds(&mut func).unwrap());

    // The cross-block sub-sum is not expanded.
    let new_root = returned(&func, b1);
    assert_eq!(
        leaf_counts(&func, b1, new_root),
        HashMap::from([(t, 1), (c, 1)])
    );
    assert_eq!(func.bin_inst(t), Some((BinOp::FAdd, a, b)));
}

#[test]
fn trace_records_decomposition_and_rewrite() {
    let (mut func, _) = chain_func(4);
    let mut trace = ChainTrace::new(Vec::new());

    assert!(balance_fadds_traced(&mut func, &mut trace).unwrap());

    let out = String::from_utf8(trace.into_inner()).unwrap();
    assert!(out.contains("chain node"));
    assert!(out.contains("splitting"));
    assert!(out.contains("before rewrite:"));
    assert!(out.contains("after rewrite:"));
}

#[test]
fn unsupported_chain_messages() {
    use crate::UnsupportedChain;
    assert_eq!(
        UnsupportedChain::MultipleMergeLeaves.to_string(),
        "chain sums more than one block-entry merge value"
    );
    assert_eq!(
        UnsupportedChain::MergeLeafShared { count: 3 }.to_string(),
        "block-entry merge value is summed 3 times"
    );
}
