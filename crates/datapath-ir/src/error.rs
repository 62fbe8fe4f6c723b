use crate::{block::BlockId, inst::ValueId};

/// Errors from graph mutation primitives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// The value key does not name a live value.
    #[error("unknown value {0}")]
    UnknownValue(ValueId),

    /// The block key does not name a live block.
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    /// The named instruction is not in the named block's instruction
    /// list.
    #[error("{value} is not an instruction in {block}")]
    NotInBlock { value: ValueId, block: BlockId },
}
