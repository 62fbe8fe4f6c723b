use std::mem;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::{
    block::{Block, BlockId, Terminator},
    error::GraphError,
    inst::{BinOp, Origin, Value, ValueId, ValueKind},
};

/// Functions whose name starts with this prefix belong to the
/// compiler's runtime surface and are left alone by passes.
const RUNTIME_PREFIX: &str = "builtin.";

/// A function: a set of basic blocks plus the values defined in them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Func {
    name: String,
    params: Vec<ValueId>,
    values: SlotMap<ValueId, Value>,
    blocks: SlotMap<BlockId, Block>,
    /// Blocks in creation order, for deterministic enumeration.
    order: Vec<BlockId>,
    entry: Option<BlockId>,
}

impl Func {
    /// Creates an empty function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            values: SlotMap::with_key(),
            blocks: SlotMap::with_key(),
            order: Vec::new(),
            entry: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this function is part of the compiler's intrinsic or
    /// runtime surface.
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with(RUNTIME_PREFIX)
    }

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    /// Enumerates blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.order.iter().copied()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Looks up a value by identity.
    ///
    /// Panics if `id` has been removed from the graph.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    pub fn get(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id)
    }

    /// Returns the operator and operands if `id` is a live binary
    /// instruction.
    pub fn bin_inst(&self, id: ValueId) -> Option<(BinOp, ValueId, ValueId)> {
        self.values.get(id).and_then(Value::as_bin)
    }

    /// Whether `id` is a block-entry merge value.
    pub fn is_merge(&self, id: ValueId) -> bool {
        self.values.get(id).is_some_and(Value::is_merge)
    }

    /// The block `id` is defined in, if any.
    pub fn defining_block(&self, id: ValueId) -> Option<BlockId> {
        self.values.get(id).and_then(|v| v.block)
    }

    pub fn origin(&self, id: ValueId) -> Origin {
        self.values[id].origin
    }

    /// Enumerates all live values.
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values.iter()
    }
}

// Builder surface.
impl Func {
    /// Adds a function input.
    pub fn add_param(&mut self) -> ValueId {
        let index = self.params.len();
        let id = self.values.insert(Value {
            kind: ValueKind::Param { index },
            origin: Origin::Source,
            block: None,
        });
        self.params.push(id);
        id
    }

    /// Adds a floating-point constant.
    pub fn add_const(&mut self, value: f64) -> ValueId {
        self.values.insert(Value {
            kind: ValueKind::Const { value },
            origin: Origin::Source,
            block: None,
        })
    }

    /// Creates a new basic block. The first block created becomes the
    /// entry block.
    pub fn new_block(&mut self) -> BlockId {
        let id = self.blocks.insert(Block::new());
        self.order.push(id);
        self.entry.get_or_insert(id);
        id
    }

    /// Adds a merge value at the entry of `block`.
    pub fn add_phi(
        &mut self,
        block: BlockId,
        incoming: Vec<(BlockId, ValueId)>,
    ) -> Result<ValueId, GraphError> {
        if !self.blocks.contains_key(block) {
            return Err(GraphError::UnknownBlock(block));
        }
        let id = self.values.insert(Value {
            kind: ValueKind::Phi { incoming },
            origin: Origin::Source,
            block: Some(block),
        });
        self.blocks[block].phis.push(id);
        Ok(id)
    }

    /// Rewrites one incoming edge of a merge value. Used to close
    /// loop-carried definitions after the loop body is built.
    pub fn set_phi_incoming(
        &mut self,
        phi: ValueId,
        pred: BlockId,
        value: ValueId,
    ) -> Result<(), GraphError> {
        match self.values.get_mut(phi).map(|v| &mut v.kind) {
            Some(ValueKind::Phi { incoming }) => {
                if let Some(slot) = incoming.iter_mut().find(|(b, _)| *b == pred) {
                    slot.1 = value;
                } else {
                    incoming.push((pred, value));
                }
                Ok(())
            }
            _ => Err(GraphError::UnknownValue(phi)),
        }
    }

    /// Appends a binary instruction to the end of `block`.
    pub fn append_bin(
        &mut self,
        block: BlockId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId, GraphError> {
        let id = self.new_bin(block, op, lhs, rhs, Origin::Source)?;
        self.blocks[block].insts.push(id);
        Ok(id)
    }

    /// Inserts a binary instruction immediately before an existing
    /// instruction in `block`.
    pub fn insert_bin_before(
        &mut self,
        block: BlockId,
        before: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        origin: Origin,
    ) -> Result<ValueId, GraphError> {
        let pos = self
            .blocks
            .get(block)
            .ok_or(GraphError::UnknownBlock(block))?
            .insts
            .iter()
            .position(|&v| v == before)
            .ok_or(GraphError::NotInBlock {
                value: before,
                block,
            })?;
        let id = self.new_bin(block, op, lhs, rhs, origin)?;
        self.blocks[block].insts.insert(pos, id);
        Ok(id)
    }

    fn new_bin(
        &mut self,
        block: BlockId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        origin: Origin,
    ) -> Result<ValueId, GraphError> {
        if !self.blocks.contains_key(block) {
            return Err(GraphError::UnknownBlock(block));
        }
        for operand in [lhs, rhs] {
            if !self.values.contains_key(operand) {
                return Err(GraphError::UnknownValue(operand));
            }
        }
        Ok(self.values.insert(Value {
            kind: ValueKind::Bin { op, lhs, rhs },
            origin,
            block: Some(block),
        }))
    }

    /// Sets the terminator of `block`, keeping CFG edges consistent.
    pub fn terminate(&mut self, block: BlockId, term: Terminator) -> Result<(), GraphError> {
        if !self.blocks.contains_key(block) {
            return Err(GraphError::UnknownBlock(block));
        }
        let new_next = match &term {
            Terminator::Return(_) => Vec::new(),
            Terminator::Jump(id) => vec![*id],
            Terminator::Branch(v) => vec![v.true_block, v.false_block],
        };
        for &next in &new_next {
            if !self.blocks.contains_key(next) {
                return Err(GraphError::UnknownBlock(next));
            }
        }
        let old_next = mem::take(&mut self.blocks[block].succ);
        for old in old_next {
            let preds = &mut self.blocks[old].preds;
            if let Some(pos) = preds.iter().position(|&b| b == block) {
                preds.remove(pos);
            }
        }
        for &next in &new_next {
            self.blocks[next].preds.push(block);
        }
        let blk = &mut self.blocks[block];
        blk.succ = new_next;
        blk.term = Some(term);
        Ok(())
    }
}

// Mutation primitives for passes.
impl Func {
    /// Counts the uses of `id` across instructions, merge values, and
    /// terminators.
    pub fn use_count(&self, id: ValueId) -> usize {
        let mut count = 0usize;
        for (_, value) in self.values.iter() {
            count = count.saturating_add(
                value.operands().iter().filter(|&&op| op == id).count(),
            );
        }
        for (_, block) in self.blocks.iter() {
            match &block.term {
                Some(Terminator::Return(Some(v))) if *v == id => count = count.saturating_add(1),
                Some(Terminator::Branch(b)) if b.cond == id => count = count.saturating_add(1),
                _ => {}
            }
        }
        count
    }

    /// Redirects every consumer of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for (_, value) in self.values.iter_mut() {
            match &mut value.kind {
                ValueKind::Bin { lhs, rhs, .. } => {
                    if *lhs == old {
                        *lhs = new;
                    }
                    if *rhs == old {
                        *rhs = new;
                    }
                }
                ValueKind::Phi { incoming } => {
                    for (_, v) in incoming.iter_mut() {
                        if *v == old {
                            *v = new;
                        }
                    }
                }
                ValueKind::Param { .. } | ValueKind::Const { .. } => {}
            }
        }
        for (_, block) in self.blocks.iter_mut() {
            match &mut block.term {
                Some(Terminator::Return(Some(v))) if *v == old => *v = new,
                Some(Terminator::Branch(b)) if b.cond == old => b.cond = new,
                _ => {}
            }
        }
    }

    /// Removes `root` if it is an unused instruction, then transitively
    /// removes operand instructions that become unused. Params,
    /// constants, and merge values are never removed.
    pub fn purge_dead(&mut self, root: ValueId) {
        let mut work = vec![root];
        while let Some(id) = work.pop() {
            let Some(value) = self.values.get(id) else {
                continue;
            };
            let Some((_, lhs, rhs)) = value.as_bin() else {
                continue;
            };
            let defined_in = value.block;
            if self.use_count(id) != 0 {
                continue;
            }
            if let Some(block) = defined_in {
                let insts = &mut self.blocks[block].insts;
                if let Some(pos) = insts.iter().position(|&v| v == id) {
                    insts.remove(pos);
                }
            }
            self.values.remove(id);
            work.push(lhs);
            work.push(rhs);
        }
    }
}
