//! Machine-instruction layer: virtual registers, the lowering context, and
//! the target-backend interface.
//!
//! The [`compile`] driver walks the laid-out function block by block and
//! instruction by instruction (in reverse within each block, so a backend
//! can greedily fold producer instructions into their single consumer) and
//! drives a [`MachBackend`] through its state callbacks. Everything the
//! backend needs from the compiler (virtual registers, value definitions,
//! fold bookkeeping) is reachable through the [`Lower`] context passed into
//! each lowering call.

use crate::ir::{Block, Inst, Opcode, Type, Value};
use crate::result::CodegenResult;
use crate::ssa::SsaBuilder;
use core::fmt;
use cranelift_entity::EntityRef;

/// A label referring to the start of a laid-out block in the emitted code.
///
/// Labels stringify as `Lnnn`; numbering starts at 1, so 0 never appears and
/// can serve as "not yet allocated" in backend tables.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct MachLabel(pub u32);

impl fmt::Display for MachLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The register class of a virtual register.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RegClass {
    /// General-purpose integer registers.
    Int,
    /// Floating-point/vector registers.
    Float,
}

impl RegClass {
    /// The class that holds values of `ty`.
    pub fn of_type(ty: Type) -> RegClass {
        if ty.is_int() {
            RegClass::Int
        } else {
            RegClass::Float
        }
    }
}

/// A virtual register.
///
/// The lower 32 bits are the dense register number; the upper 32 bits can
/// later carry the physical register chosen by register allocation. Numbers
/// `0..U` are reserved to name the target's physical registers one-for-one
/// (`U` is [`MachBackend::reserved_vreg_classes`]`.len()`); numbers from `U`
/// up are allocated to SSA values and function-return slots. More than one
/// SSA value can share a virtual register: redundant-phi elimination
/// collapses values onto their surviving alias target.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VReg(u64);

impl VReg {
    /// Marker for "no register assigned yet" in dense tables.
    pub const INVALID: VReg = VReg(u64::MAX);

    /// A virtual register with the given number and no physical assignment.
    pub fn new(id: u32) -> VReg {
        VReg(u64::from(id))
    }

    /// The dense register number.
    pub fn id(self) -> u32 {
        self.0 as u32
    }

    /// The physical register assigned by a later allocation pass, if any.
    pub fn real_reg(self) -> Option<u32> {
        let upper = (self.0 >> 32) as u32;
        upper.checked_sub(1)
    }

    /// This register with a physical assignment attached.
    pub fn with_real_reg(self, real: u32) -> VReg {
        VReg((u64::from(real) + 1) << 32 | u64::from(self.id()))
    }

    /// Is this a usable register reference?
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for VReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "vreg-invalid");
        }
        write!(f, "vreg{}", self.id())?;
        if let Some(real) = self.real_reg() {
            write!(f, "(r{real})")?;
        }
        Ok(())
    }
}

/// Where an SSA value comes from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueDef {
    /// The value is the `num`'th parameter of `block`.
    Param {
        /// The block defining the parameter.
        block: Block,
        /// Parameter position.
        num: u16,
    },
    /// The value is the `num`'th result of `inst`.
    Result {
        /// The defining instruction.
        inst: Inst,
        /// Result position.
        num: u16,
        /// Number of uses among surviving instructions. A producer can only
        /// be folded into its consumer when this is 1.
        refcount: u32,
    },
}

impl ValueDef {
    /// The defining instruction, if the value is an instruction result.
    pub fn inst(self) -> Option<Inst> {
        match self {
            Self::Result { inst, .. } => Some(inst),
            Self::Param { .. } => None,
        }
    }
}

/// Compilation context handed to every backend lowering callback.
///
/// This is the backend's window into the compiler: virtual-register tables,
/// the SSA-value-definition index, and the already-lowered set that makes
/// reverse-order folding work.
pub struct Lower<'a> {
    f: &'a SsaBuilder,
    vregs: Vec<VReg>,
    vreg_classes: Vec<RegClass>,
    defs: Vec<Option<ValueDef>>,
    lowered: Vec<bool>,
    ret_vregs: Vec<VReg>,
}

impl<'a> Lower<'a> {
    fn new(f: &'a SsaBuilder, reserved: Vec<RegClass>) -> Self {
        Self {
            f,
            vregs: vec![VReg::INVALID; f.num_values()],
            vreg_classes: reserved,
            defs: vec![None; f.num_values()],
            lowered: vec![false; f.num_insts()],
            ret_vregs: Vec::new(),
        }
    }

    /// The function being compiled.
    pub fn f(&self) -> &'a SsaBuilder {
        self.f
    }

    /// Mint a fresh virtual register of the given class.
    pub fn alloc_vreg(&mut self, class: RegClass) -> VReg {
        let id = u32::try_from(self.vreg_classes.len()).unwrap();
        self.vreg_classes.push(class);
        VReg::new(id)
    }

    /// The register class of `vreg`.
    pub fn vreg_class(&self, vreg: VReg) -> RegClass {
        self.vreg_classes[vreg.id() as usize]
    }

    /// Skip `inst` on the remaining reverse traversal of its block: the
    /// backend already folded it into a consumer.
    pub fn mark_lowered(&mut self, inst: Inst) {
        self.lowered[inst.index()] = true;
    }

    /// Has `inst` been folded into a consumer already?
    pub fn is_lowered(&self, inst: Inst) -> bool {
        self.lowered[inst.index()]
    }

    /// How `value` is produced. Aliases are resolved first.
    pub fn value_def(&self, value: Value) -> ValueDef {
        let value = self.f.resolve_alias(value);
        self.defs[value.index()]
            .unwrap_or_else(|| panic!("{value} has no definition index"))
    }

    /// The virtual register assigned to `value`. Aliases are resolved first.
    pub fn vreg_of(&self, value: Value) -> VReg {
        let value = self.f.resolve_alias(value);
        let vreg = self.vregs[value.index()];
        assert!(vreg.is_valid(), "{value} has no virtual register");
        vreg
    }

    /// The type of `value`.
    pub fn value_type(&self, value: Value) -> Type {
        self.f.value_type(self.f.resolve_alias(value))
    }

    /// The virtual registers holding the function results at `return`.
    pub fn ret_vregs(&self) -> &[VReg] {
        &self.ret_vregs
    }

    /// The producer of `value`, if the backend may fold it into `consumer`.
    ///
    /// A producer is matchable iff it sits in the same instruction group as
    /// the consumer (no side effect between them) and its result has exactly
    /// one use. Constants are pure and may be folded regardless of group.
    pub fn matchable_producer(&self, value: Value, consumer: Inst) -> Option<Inst> {
        let def = self.value_def(value);
        let ValueDef::Result { inst, refcount, .. } = def else {
            return None;
        };
        if self.is_lowered(inst) {
            return None;
        }
        let data = self.f.inst(inst);
        let is_const = matches!(
            data.opcode,
            Opcode::Iconst | Opcode::F32const | Opcode::F64const
        );
        if is_const {
            return Some(inst);
        }
        if refcount == 1 && data.group == self.f.inst(consumer).group {
            Some(inst)
        } else {
            None
        }
    }

    fn assign_vregs(&mut self) {
        let f = self.f;
        for &block in f.rpo() {
            for (num, param) in f.block_params(block).iter().enumerate() {
                let vreg = self.alloc_vreg(RegClass::of_type(param.ty));
                self.vregs[param.value.index()] = vreg;
                self.defs[param.value.index()] = Some(ValueDef::Param {
                    block,
                    num: num as u16,
                });
            }
            for inst in f.block_insts(block) {
                for (num, value) in f.inst(inst).result_values().enumerate() {
                    let ty = f.value_type(value);
                    let vreg = self.alloc_vreg(RegClass::of_type(ty));
                    self.vregs[value.index()] = vreg;
                    self.defs[value.index()] = Some(ValueDef::Result {
                        inst,
                        num: num as u16,
                        refcount: f.value_refcount(value),
                    });
                }
            }
        }
        for &ty in f.return_types() {
            let vreg = self.alloc_vreg(RegClass::of_type(ty));
            self.ret_vregs.push(vreg);
        }
        log::debug!(
            "assigned {} virtual registers over {} values",
            self.vreg_classes.len(),
            f.num_values()
        );
    }
}

/// The interface a target ISA implements to receive lowering work.
///
/// The compiler drives one function through the backend as a fixed state
/// sequence: `start_function`, then per laid-out block `start_block`,
/// `lower_branches` (when the block ends in branches), `lower_inst` for the
/// remaining instructions from the bottom up, `end_block`, and finally
/// `end_function` and `finish`. Every lowering callback receives the
/// [`Lower`] context in lieu of a stored back-pointer to the compiler.
pub trait MachBackend: fmt::Debug {
    /// Short name of the target, e.g. `"aarch64"`.
    fn name(&self) -> &'static str;

    /// The target triple this backend compiles for.
    fn triple(&self) -> target_lexicon::Triple;

    /// Register classes of the reserved physical-register range, index ==
    /// virtual-register number.
    fn reserved_vreg_classes(&self) -> Vec<RegClass>;

    /// Begin a function with `num_blocks` allocated SSA blocks.
    fn start_function(&mut self, num_blocks: usize);

    /// Begin the next block in layout order.
    fn start_block(&mut self, block: Block);

    /// Emit the terminating branch group of the current block. `br0` is the
    /// terminal branch (`jump` or `br_table`), `br1` the optional
    /// conditional branch (`brz`/`brnz`) immediately before it. `next` is
    /// the block laid out after this one, for fallthrough elision.
    fn lower_branches(
        &mut self,
        ctx: &mut Lower,
        br0: Inst,
        br1: Option<Inst>,
        next: Option<Block>,
    ) -> CodegenResult<()>;

    /// Emit code for one non-branching instruction, possibly consuming its
    /// operand producers via [`Lower::mark_lowered`].
    fn lower_inst(&mut self, ctx: &mut Lower, inst: Inst) -> CodegenResult<()>;

    /// Flush the instructions lowered for the current block.
    fn end_block(&mut self);

    /// Finalize the function.
    fn end_function(&mut self);

    /// Produce the compiled artifact. Valid after `end_function`.
    fn finish(&mut self) -> CompiledCode;

    /// Return all pools and buffers to empty.
    fn reset(&mut self);
}

/// The output of compiling one function.
#[derive(Debug)]
pub struct CompiledCode {
    /// Encoded machine code. Empty until an encoder is attached; the
    /// instruction stream behind [`format`](Self::format) is the
    /// semantically complete artifact.
    pub buffer: Vec<u8>,
    text: String,
}

impl CompiledCode {
    /// Construct from the backend's rendered instruction stream.
    pub fn new(text: String) -> Self {
        Self {
            buffer: Vec::new(),
            text,
        }
    }

    /// Human-readable listing: per laid-out block a `Lk (SSA Block: blkn):`
    /// line followed by one indented mnemonic per machine instruction.
    pub fn format(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CompiledCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Compile `f` through `backend`. The builder must have run its passes.
///
/// On failure the backend is left in a state that is safe to `reset` and
/// reuse; partial output must not be used.
pub fn compile<B: MachBackend + ?Sized>(
    f: &SsaBuilder,
    backend: &mut B,
) -> CodegenResult<CompiledCode> {
    assert!(
        !f.layout_order().is_empty(),
        "compile() requires the passes to have run"
    );
    let mut ctx = Lower::new(f, backend.reserved_vreg_classes());
    ctx.assign_vregs();

    backend.reset();
    backend.start_function(f.num_blocks());
    let layout = f.layout_order();
    for (i, &block) in layout.iter().enumerate() {
        backend.start_block(block);
        let next = layout.get(i + 1).copied();

        // Identify the terminating branch group: the last instruction when
        // it branches, plus a conditional branch immediately before it.
        let tail = f.block(block).tail.expand();
        let mut resume = tail;
        if let Some(br0) = tail.filter(|&t| f.inst(t).opcode.is_branch()) {
            let br1 = f.inst(br0).prev.expand().filter(|&p| {
                matches!(f.inst(p).opcode, Opcode::Brz | Opcode::Brnz)
            });
            backend.lower_branches(&mut ctx, br0, br1, next)?;
            resume = f.inst(br1.unwrap_or(br0)).prev.expand();
        }

        // Walk the remaining instructions bottom-up so producers can be
        // folded into consumers the backend has already seen.
        let mut cur = resume;
        while let Some(inst) = cur {
            cur = f.inst(inst).prev.expand();
            if ctx.is_lowered(inst) {
                continue;
            }
            backend.lower_inst(&mut ctx, inst)?;
        }
        backend.end_block();
    }
    backend.end_function();
    Ok(backend.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, Opcode, types};
    use crate::settings::Flags;

    #[test]
    fn every_value_gets_a_vreg_of_its_class() {
        let mut f = SsaBuilder::new(Flags::default());
        f.declare_returns(vec![types::F32]);
        let blk0 = f.create_block();
        f.switch_to_block(blk0);
        f.seal_block(blk0).unwrap();
        let i = f.append_block_param(blk0, types::I64);
        let x = f.append_block_param(blk0, types::F32);
        let sum = f
            .ins(InstructionData::binary(Opcode::Iadd, types::I64, i, i))
            .unwrap();
        let neg = f
            .ins(InstructionData::unary(Opcode::Fneg, types::F32, x))
            .unwrap();
        let _keep = f
            .ins(InstructionData::store(
                Opcode::Store,
                f.first_result(sum),
                i,
                0,
            ))
            .unwrap();
        f.ins(InstructionData::ret(&[f.first_result(neg)]))
            .unwrap();
        f.run_passes().unwrap();

        let mut ctx = Lower::new(&f, vec![RegClass::Int; 4]);
        ctx.assign_vregs();
        for value in [i, x, f.first_result(sum), f.first_result(neg)] {
            let vreg = ctx.vreg_of(value);
            assert!(vreg.is_valid());
            assert_eq!(
                ctx.vreg_class(vreg),
                RegClass::of_type(f.value_type(value)),
                "{value} has a register of the wrong class"
            );
        }
        // One return slot, of float class.
        assert_eq!(ctx.ret_vregs().len(), 1);
        assert_eq!(ctx.vreg_class(ctx.ret_vregs()[0]), RegClass::Float);
        // Every value definition is indexed.
        assert!(matches!(
            ctx.value_def(f.first_result(sum)),
            ValueDef::Result { .. }
        ));
        assert!(matches!(ctx.value_def(i), ValueDef::Param { .. }));
    }

    #[test]
    fn vreg_packing() {
        let v = VReg::new(17);
        assert_eq!(v.id(), 17);
        assert_eq!(v.real_reg(), None);
        let bound = v.with_real_reg(3);
        assert_eq!(bound.id(), 17);
        assert_eq!(bound.real_reg(), Some(3));
        assert!(!VReg::INVALID.is_valid());
    }

    #[test]
    fn labels_display() {
        assert_eq!(MachLabel(1).to_string(), "L1");
        assert_eq!(MachLabel(42).to_string(), "L42");
    }
}
