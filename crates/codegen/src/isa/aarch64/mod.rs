//! AArch64 (ARM64) target backend.

pub mod inst;
mod lower;

use crate::ir::{Block, Inst as IRInst};
use crate::machinst::{CompiledCode, Lower, MachBackend, MachLabel, RegClass};
use crate::result::CodegenResult;
use core::fmt::Write;
use cranelift_entity::EntityRef;
use smallvec::SmallVec;
use target_lexicon::Triple;

use inst::Inst;

/// The AArch64 backend.
///
/// Lowered instructions for one source instruction collect in a pending
/// buffer and are flushed as a unit; because source instructions arrive
/// bottom-up, the per-block buffer is reversed once more when the block
/// ends, which restores execution order. That per-unit flushing is what
/// makes it safe for a later source instruction (earlier in the block) to
/// emit code after its consumer was already lowered.
#[derive(Debug)]
pub struct AArch64Backend {
    triple: Triple,
    /// Label allocated for each SSA block id; 0 means none yet.
    labels: Vec<u32>,
    next_label: u32,
    cur_block: Option<Block>,
    /// Machine instructions for the source instruction being lowered, in
    /// execution order.
    pending_inst: SmallVec<[Inst; 4]>,
    /// Machine instructions for the current block, in reverse execution
    /// order.
    pending_block: Vec<Inst>,
    /// Finished blocks in layout order.
    blocks: Vec<(MachLabel, Block, Vec<Inst>)>,
}

impl AArch64Backend {
    /// Create a backend for `triple` (which must be an AArch64 triple).
    pub fn new(triple: Triple) -> Self {
        Self {
            triple,
            labels: Vec::new(),
            next_label: 1,
            cur_block: None,
            pending_inst: SmallVec::new(),
            pending_block: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Append one machine instruction for the current source instruction.
    pub(crate) fn emit(&mut self, inst: Inst) {
        self.pending_inst.push(inst);
    }

    /// Flush the instructions of the current source instruction into the
    /// block buffer.
    pub(crate) fn flush_inst(&mut self) {
        while let Some(inst) = self.pending_inst.pop() {
            self.pending_block.push(inst);
        }
    }

    /// The label of `block`, allocating one on first reference (branches
    /// can refer to blocks that are laid out later).
    pub(crate) fn block_label(&mut self, block: Block) -> MachLabel {
        if self.labels.len() <= block.index() {
            self.labels.resize(block.index() + 1, 0);
        }
        if self.labels[block.index()] == 0 {
            self.labels[block.index()] = self.next_label;
            self.next_label += 1;
        }
        MachLabel(self.labels[block.index()])
    }
}

impl MachBackend for AArch64Backend {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> Triple {
        self.triple.clone()
    }

    fn reserved_vreg_classes(&self) -> Vec<RegClass> {
        inst::reserved_classes()
    }

    fn start_function(&mut self, num_blocks: usize) {
        debug_assert!(self.blocks.is_empty(), "start_function without reset");
        self.labels.resize(num_blocks, 0);
    }

    fn start_block(&mut self, block: Block) {
        debug_assert!(self.pending_block.is_empty());
        self.cur_block = Some(block);
        self.block_label(block);
    }

    fn lower_branches(
        &mut self,
        ctx: &mut Lower,
        br0: IRInst,
        br1: Option<IRInst>,
        next: Option<Block>,
    ) -> CodegenResult<()> {
        let result = self.lower_branch_group(ctx, br0, br1, next);
        if result.is_ok() {
            self.flush_inst();
        }
        result
    }

    fn lower_inst(&mut self, ctx: &mut Lower, inst: IRInst) -> CodegenResult<()> {
        let result = self.lower_one_inst(ctx, inst);
        if result.is_ok() {
            self.flush_inst();
        }
        result
    }

    fn end_block(&mut self) {
        let block = self.cur_block.take().expect("end_block without start_block");
        let label = self.block_label(block);
        let mut insts = core::mem::take(&mut self.pending_block);
        insts.reverse();
        self.blocks.push((label, block, insts));
    }

    fn end_function(&mut self) {
        debug_assert!(self.cur_block.is_none());
        debug_assert!(self.pending_inst.is_empty() && self.pending_block.is_empty());
    }

    fn finish(&mut self) -> CompiledCode {
        let mut text = String::new();
        for (label, block, insts) in &self.blocks {
            writeln!(text, "{label} (SSA Block: {block}):").unwrap();
            for inst in insts {
                writeln!(text, "\t{}", inst.print()).unwrap();
            }
        }
        CompiledCode::new(text)
    }

    fn reset(&mut self) {
        self.labels.clear();
        self.next_label = 1;
        self.cur_block = None;
        self.pending_inst.clear();
        self.pending_block.clear();
        self.blocks.clear();
    }
}
