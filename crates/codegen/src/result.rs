//! Result and error types representing the outcome of compiling a function.

use crate::ir::{Block, Inst, Opcode};

/// An error produced while compiling a function.
///
/// Errors of this kind abort the current function's compilation only; the
/// builder instance remains safe to `reset` and reuse afterwards.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodegenError {
    /// The machine backend has no lowering for an opcode yet.
    #[error("unsupported opcode for this target: {0}")]
    UnsupportedOpcode(Opcode),

    /// A precondition of SSA construction was violated by the front-end.
    ///
    /// Typical causes: reading a variable through a sealed block whose
    /// predecessor has not been sealed, adding a predecessor to a sealed
    /// block, or a conditional branch still carrying arguments after
    /// critical-edge splitting.
    #[error("malformed SSA in {block}: {reason}")]
    MalformedSsa {
        /// The block on which the violation was detected.
        block: Block,
        /// Human-readable description of the violated precondition.
        reason: &'static str,
    },

    /// A pass encountered a graph shape it cannot analyse.
    #[error("unsupported control flow in {block}: {reason}")]
    UnsupportedCfg {
        /// The offending block.
        block: Block,
        /// Human-readable description of the unsupported shape.
        reason: &'static str,
    },

    /// A branch instruction is not in a lowerable form.
    #[error("invalid branch {inst}: {reason}")]
    InvalidBranch {
        /// The offending instruction.
        inst: Inst,
        /// Human-readable description of the problem.
        reason: &'static str,
    },
}

/// A convenient alias for a `Result` that uses [`CodegenError`].
pub type CodegenResult<T> = Result<T, CodegenError>;

/// A compilation failure as reported to the engine embedding this backend,
/// carrying the index of the function that failed.
#[derive(Debug, thiserror::Error)]
#[error("compilation of function {func_index} failed")]
pub struct CompileError {
    /// Index of the function within its module.
    pub func_index: u32,
    /// What went wrong.
    #[source]
    pub inner: CodegenError,
}

impl CompileError {
    /// Attach a function index to a codegen error.
    pub fn new(func_index: u32, inner: CodegenError) -> Self {
        Self { func_index, inner }
    }
}
