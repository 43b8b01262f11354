//! Representation of Egret IR functions.

mod block;
pub mod condcodes;
mod entities;
mod extfunc;
pub mod instructions;
pub mod types;

pub use self::block::{BlockData, BlockParam, BlockPredecessor};
pub use self::entities::{Block, Inst, SigRef, Value, Variable};
pub use self::extfunc::Signature;
pub use self::instructions::{Condition, InstGroup, InstructionData, Opcode};
pub use self::types::Type;
