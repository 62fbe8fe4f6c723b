//! Textual rendering of functions and blocks.
//!
//! The format is deterministic so tests and pass logs can compare
//! block text before and after a rewrite.

use std::fmt;

use crate::{
    block::{BlockId, Terminator},
    func::Func,
    inst::ValueKind,
};

/// Displays a single block of a function.
pub struct BlockDisplay<'a> {
    func: &'a Func,
    id: BlockId,
}

impl Func {
    /// Renders one block as text.
    pub fn display_block(&self, id: BlockId) -> BlockDisplay<'_> {
        BlockDisplay { func: self, id }
    }
}

impl fmt::Display for BlockDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block = self.func.block(self.id);
        writeln!(f, "{}:", self.id)?;
        for &phi in &block.phis {
            if let ValueKind::Phi { incoming } = &self.func.value(phi).kind {
                write!(f, "  {phi} = phi [")?;
                for (i, (pred, value)) in incoming.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{pred}: {value}")?;
                }
                writeln!(f, "]")?;
            }
        }
        for &inst in &block.insts {
            if let Some((op, lhs, rhs)) = self.func.value(inst).as_bin() {
                writeln!(f, "  {inst} = {op} {lhs}, {rhs}")?;
            }
        }
        match &block.term {
            Some(Terminator::Return(Some(v))) => writeln!(f, "  return {v}")?,
            Some(Terminator::Return(None)) => writeln!(f, "  return")?,
            Some(Terminator::Jump(b)) => writeln!(f, "  jump {b}")?,
            Some(Terminator::Branch(b)) => writeln!(
                f,
                "  br {}, {}, {}",
                b.cond, b.true_block, b.false_block
            )?,
            None => {}
        }
        Ok(())
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}(", self.name())?;
        for (i, &param) in self.params().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        writeln!(f, ") {{")?;
        for (id, value) in self.values() {
            if let ValueKind::Const { value } = value.kind {
                writeln!(f, "  {id} = const {value}")?;
            }
        }
        for id in self.blocks() {
            write!(f, "{}", self.display_block(id))?;
        }
        writeln!(f, "}}")
    }
}
