//! Lowering rules for AArch64.
//!
//! Instructions are lowered bottom-up within each block, so a producer can
//! be folded into the machine form of its single consumer: comparisons into
//! conditional branches, small constants into immediates, shifts and extends
//! into operand modifiers. A producer is matchable when it shares the
//! consumer's instruction group (no side effect in between) and its result
//! has exactly one use; constants are pure and fold regardless of group.
//! Folded producers are marked lowered so the block walk skips them.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::{Inst as IRInst, Opcode, Type, Value, types};
use crate::machinst::{Lower, RegClass, ValueDef, VReg};
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;

use super::AArch64Backend;
use super::inst::*;

/// Map an integer condition code to a flag condition for use after `subs`.
pub(crate) fn lower_condcode(cc: IntCC) -> Cond {
    match cc {
        IntCC::Equal => Cond::Eq,
        IntCC::NotEqual => Cond::Ne,
        IntCC::SignedGreaterThanOrEqual => Cond::Ge,
        IntCC::SignedGreaterThan => Cond::Gt,
        IntCC::SignedLessThanOrEqual => Cond::Le,
        IntCC::SignedLessThan => Cond::Lt,
        IntCC::UnsignedGreaterThanOrEqual => Cond::Hs,
        IntCC::UnsignedGreaterThan => Cond::Hi,
        IntCC::UnsignedLessThanOrEqual => Cond::Ls,
        IntCC::UnsignedLessThan => Cond::Lo,
    }
}

/// Map a float condition code to a flag condition for use after `fcmp`.
///
/// `fcmp` sets NZCV to 0011 on unordered, 0110 on equal, 1000 on less-than
/// and 0010 on greater-than; the conditions below read those flags.
/// `OrderedNotEqual` and `UnorderedOrEqual` have no single-flag encoding.
pub(crate) fn lower_fp_condcode(cc: FloatCC) -> Option<Cond> {
    Some(match cc {
        FloatCC::Ordered => Cond::Vc,
        FloatCC::Unordered => Cond::Vs,
        FloatCC::Equal => Cond::Eq,
        FloatCC::NotEqual => Cond::Ne,
        FloatCC::LessThan => Cond::Mi,
        FloatCC::LessThanOrEqual => Cond::Ls,
        FloatCC::GreaterThan => Cond::Gt,
        FloatCC::GreaterThanOrEqual => Cond::Ge,
        FloatCC::UnorderedOrLessThan => Cond::Lt,
        FloatCC::UnorderedOrLessThanOrEqual => Cond::Le,
        FloatCC::UnorderedOrGreaterThan => Cond::Hi,
        FloatCC::UnorderedOrGreaterThanOrEqual => Cond::Pl,
        FloatCC::OrderedNotEqual | FloatCC::UnorderedOrEqual => return None,
    })
}

/// A second operand in register, shifted-register, extended-register, or
/// 12-bit-immediate form, selected by progressive relaxation.
pub(crate) enum ResultRSEImm12 {
    Reg(VReg),
    RegShift(VReg, ShiftOpAndAmt),
    RegExtend(VReg, ExtendOp),
    Imm12(Imm12),
}

/// A second operand in register, shifted-register, or logical-immediate
/// form, for the bitwise instructions.
pub(crate) enum ResultRSImmLogic {
    Reg(VReg),
    RegShift(VReg, ShiftOpAndAmt),
    ImmLogic(ImmLogic),
}

/// Build the ALU instruction matching the shape of the second operand.
pub(crate) fn alu_inst_imm12(
    op: ALUOp,
    size: OperandSize,
    rd: VReg,
    rn: VReg,
    rm: ResultRSEImm12,
) -> Inst {
    match rm {
        ResultRSEImm12::Reg(rm) => Inst::AluRRR { op, size, rd, rn, rm },
        ResultRSEImm12::RegShift(rm, shiftop) => Inst::AluRRRShift {
            op,
            size,
            rd,
            rn,
            rm,
            shiftop,
        },
        ResultRSEImm12::RegExtend(rm, extendop) => Inst::AluRRRExtend {
            op,
            size,
            rd,
            rn,
            rm,
            extendop,
        },
        ResultRSEImm12::Imm12(imm12) => Inst::AluRRImm12 {
            op,
            size,
            rd,
            rn,
            imm12,
        },
    }
}

/// Build the bitwise ALU instruction matching the shape of the second
/// operand.
pub(crate) fn alu_inst_immlogic(
    op: ALUOp,
    size: OperandSize,
    rd: VReg,
    rn: VReg,
    rm: ResultRSImmLogic,
) -> Inst {
    match rm {
        ResultRSImmLogic::Reg(rm) => Inst::AluRRR { op, size, rd, rn, rm },
        ResultRSImmLogic::RegShift(rm, shiftop) => Inst::AluRRRShift {
            op,
            size,
            rd,
            rn,
            rm,
            shiftop,
        },
        ResultRSImmLogic::ImmLogic(imml) => Inst::AluRRImmLogic {
            op,
            size,
            rd,
            rn,
            imml,
        },
    }
}

/// The `Iconst` producer of `value` and its bits, if it has one that may be
/// consumed (constants fold regardless of group). The third element is the
/// use count: a folded constant may only be marked lowered when this is 1,
/// otherwise its remaining uses still need the materialized register.
fn input_constant(ctx: &Lower, value: Value, consumer: IRInst) -> Option<(IRInst, u64, u32)> {
    let producer = ctx.matchable_producer(value, consumer)?;
    let data = ctx.f().inst(producer);
    if data.opcode == Opcode::Iconst {
        let ValueDef::Result { refcount, .. } = ctx.value_def(value) else {
            unreachable!();
        };
        Some((producer, constant_bits(data.imm, data.ty), refcount))
    } else {
        None
    }
}

/// Mark a folded constant producer lowered when nothing else uses it.
fn consume_constant(ctx: &mut Lower, producer: IRInst, refcount: u32) {
    if refcount <= 1 {
        ctx.mark_lowered(producer);
    }
}

/// Truncate constant bits to the width of `ty`.
fn constant_bits(imm: u64, ty: Type) -> u64 {
    if ty == types::I32 { imm & 0xffff_ffff } else { imm }
}

impl AArch64Backend {
    // ------------------------------------------------------------------
    // Operand selection.

    /// Materialize `value` in a register.
    ///
    /// A single-use constant is emitted inline here rather than at its
    /// definition site, which keeps multi-instruction constant sequences
    /// next to their one consumer.
    pub(crate) fn put_input_in_reg(&mut self, ctx: &mut Lower, value: Value) -> VReg {
        if let ValueDef::Result { inst, refcount, .. } = ctx.value_def(value) {
            let data = ctx.f().inst(inst);
            if refcount == 1 && !ctx.is_lowered(inst) {
                match data.opcode {
                    Opcode::Iconst => {
                        let rd = ctx.vreg_of(value);
                        let size = OperandSize::from_ty(data.ty);
                        for inst_out in
                            Inst::load_constant(rd, constant_bits(data.imm, data.ty), size)
                        {
                            self.emit(inst_out);
                        }
                        ctx.mark_lowered(inst);
                        return rd;
                    }
                    Opcode::F32const | Opcode::F64const => {
                        let rd = ctx.vreg_of(value);
                        let size = OperandSize::from_ty(data.ty);
                        self.emit(Inst::LoadFpuConst {
                            size,
                            rd,
                            bits: data.imm,
                        });
                        ctx.mark_lowered(inst);
                        return rd;
                    }
                    _ => {}
                }
            }
        }
        ctx.vreg_of(value)
    }

    /// Second-operand selection, most permissive form: 12-bit immediate,
    /// then extended register, then shifted register, then plain register.
    pub(crate) fn put_input_in_rse_imm12(
        &mut self,
        ctx: &mut Lower,
        value: Value,
        consumer: IRInst,
    ) -> ResultRSEImm12 {
        if let Some((producer, bits, refcount)) = input_constant(ctx, value, consumer) {
            if let Some(imm12) = Imm12::maybe_from_u64(bits) {
                consume_constant(ctx, producer, refcount);
                return ResultRSEImm12::Imm12(imm12);
            }
        }
        self.put_input_in_rse(ctx, value, consumer)
    }

    /// Second-operand selection without the immediate form: extended
    /// register, then shifted register, then plain register.
    pub(crate) fn put_input_in_rse(
        &mut self,
        ctx: &mut Lower,
        value: Value,
        consumer: IRInst,
    ) -> ResultRSEImm12 {
        if let Some(producer) = ctx.matchable_producer(value, consumer) {
            let data = ctx.f().inst(producer);
            match data.opcode {
                Opcode::Uextend | Opcode::Sextend => {
                    let extendop = if data.opcode == Opcode::Sextend {
                        ExtendOp::Sxtw
                    } else {
                        ExtendOp::Uxtw
                    };
                    let inner = data.arg.expand().unwrap();
                    ctx.mark_lowered(producer);
                    let rn = self.put_input_in_reg(ctx, inner);
                    return ResultRSEImm12::RegExtend(rn, extendop);
                }
                Opcode::Ishl => {
                    let amt_value = data.arg2.expand().unwrap();
                    if let Some((amt_producer, amt, amt_refcount)) =
                        input_constant(ctx, amt_value, producer)
                    {
                        if let Some(shiftop) = ShiftOpAndAmt::maybe_new(ShiftOp::Lsl, amt) {
                            let shiftee = data.arg.expand().unwrap();
                            ctx.mark_lowered(producer);
                            consume_constant(ctx, amt_producer, amt_refcount);
                            let rn = self.put_input_in_reg(ctx, shiftee);
                            return ResultRSEImm12::RegShift(rn, shiftop);
                        }
                    }
                }
                _ => {}
            }
        }
        ResultRSEImm12::Reg(self.put_input_in_reg(ctx, value))
    }

    /// Second-operand selection for the bitwise instructions: logical
    /// immediate, then shifted register, then plain register.
    pub(crate) fn put_input_in_rs_immlogic(
        &mut self,
        ctx: &mut Lower,
        value: Value,
        consumer: IRInst,
        ty: Type,
    ) -> ResultRSImmLogic {
        if let Some((producer, bits, refcount)) = input_constant(ctx, value, consumer) {
            if let Some(imml) = ImmLogic::maybe_from_u64(bits, ty) {
                consume_constant(ctx, producer, refcount);
                return ResultRSImmLogic::ImmLogic(imml);
            }
        }
        if let Some(producer) = ctx.matchable_producer(value, consumer) {
            let data = ctx.f().inst(producer);
            if data.opcode == Opcode::Ishl {
                let amt_value = data.arg2.expand().unwrap();
                if let Some((amt_producer, amt, amt_refcount)) =
                    input_constant(ctx, amt_value, producer)
                {
                    if let Some(shiftop) = ShiftOpAndAmt::maybe_new(ShiftOp::Lsl, amt) {
                        let shiftee = data.arg.expand().unwrap();
                        ctx.mark_lowered(producer);
                        consume_constant(ctx, amt_producer, amt_refcount);
                        let rn = self.put_input_in_reg(ctx, shiftee);
                        return ResultRSImmLogic::RegShift(rn, shiftop);
                    }
                }
            }
        }
        ResultRSImmLogic::Reg(self.put_input_in_reg(ctx, value))
    }

    // ------------------------------------------------------------------
    // Branches.

    pub(super) fn lower_branch_group(
        &mut self,
        ctx: &mut Lower,
        br0: IRInst,
        br1: Option<IRInst>,
        next: Option<crate::ir::Block>,
    ) -> CodegenResult<()> {
        if let Some(br1) = br1 {
            self.lower_cond_branch(ctx, br1)?;
        }
        match ctx.f().inst(br0).opcode {
            Opcode::Jump => {
                self.emit_branch_arg_moves(ctx, br0)?;
                let target = ctx.f().inst(br0).target.expand().unwrap();
                if Some(target) != next {
                    let label = self.block_label(target);
                    self.emit(Inst::Jump {
                        dest: BranchTarget::Label(label),
                    });
                }
                Ok(())
            }
            Opcode::BrTable => self.lower_br_table(ctx, br0),
            _ => Err(CodegenError::InvalidBranch {
                inst: br0,
                reason: "block terminator is not a branch",
            }),
        }
    }

    /// Lower a `brz`/`brnz`, folding a matchable comparison producer into
    /// the flags-setting form.
    fn lower_cond_branch(&mut self, ctx: &mut Lower, br1: IRInst) -> CodegenResult<()> {
        let f = ctx.f();
        let data = f.inst(br1);
        if !data.args.is_empty() {
            return Err(CodegenError::InvalidBranch {
                inst: br1,
                reason: "conditional branch still carries block arguments",
            });
        }
        let is_brz = data.opcode == Opcode::Brz;
        let target = self.block_label(data.target.expand().unwrap());
        let target = BranchTarget::Label(target);
        let cond_value = data.arg.expand().unwrap();

        if let Some(cmp) = ctx.matchable_producer(cond_value, br1) {
            match f.inst(cmp).opcode {
                Opcode::Icmp => {
                    let cc = f.inst(cmp).cond.unwrap_int();
                    let x = f.inst(cmp).arg.expand().unwrap();
                    let y = f.inst(cmp).arg2.expand().unwrap();
                    let size = OperandSize::from_ty(ctx.value_type(x));
                    ctx.mark_lowered(cmp);
                    let rn = self.put_input_in_reg(ctx, x);
                    let rm = self.put_input_in_rse_imm12(ctx, y, cmp);
                    self.emit(alu_inst_imm12(ALUOp::SubS, size, zero_reg(), rn, rm));
                    let mut cond = lower_condcode(cc);
                    if is_brz {
                        cond = cond.invert();
                    }
                    self.emit(Inst::CondBr {
                        target,
                        kind: CondBrKind::Cond(cond),
                        size,
                    });
                    return Ok(());
                }
                Opcode::Fcmp => {
                    let cc = f.inst(cmp).cond.unwrap_float();
                    let Some(mut cond) = lower_fp_condcode(cc) else {
                        return Err(CodegenError::UnsupportedOpcode(Opcode::Fcmp));
                    };
                    let x = f.inst(cmp).arg.expand().unwrap();
                    let y = f.inst(cmp).arg2.expand().unwrap();
                    let size = OperandSize::from_ty(ctx.value_type(x));
                    ctx.mark_lowered(cmp);
                    let rn = self.put_input_in_reg(ctx, x);
                    let rm = self.put_input_in_reg(ctx, y);
                    self.emit(Inst::FpuCmp { size, rn, rm });
                    if is_brz {
                        cond = cond.invert();
                    }
                    self.emit(Inst::CondBr {
                        target,
                        kind: CondBrKind::Cond(cond),
                        size,
                    });
                    return Ok(());
                }
                _ => {}
            }
        }

        // Generic form: compare-and-branch against zero.
        let size = OperandSize::from_ty(ctx.value_type(cond_value));
        let rn = self.put_input_in_reg(ctx, cond_value);
        let kind = if is_brz {
            CondBrKind::Zero(rn)
        } else {
            CondBrKind::NotZero(rn)
        };
        self.emit(Inst::CondBr { target, kind, size });
        Ok(())
    }

    /// Move the branch arguments of `br0` into the parameter registers of
    /// its target block.
    fn emit_branch_arg_moves(&mut self, ctx: &mut Lower, br0: IRInst) -> CodegenResult<()> {
        let f = ctx.f();
        let target = f.inst(br0).target.expand().unwrap();
        let params = f.block_params(target);
        let args: SmallVec<[Value; 4]> = f.inst(br0).args.iter().copied().collect();
        assert_eq!(
            args.len(),
            params.len(),
            "{br0}: branch argument count does not match {target} parameters"
        );
        if args.is_empty() {
            return Ok(());
        }

        let mut moves: SmallVec<[(VReg, VReg, RegClass, OperandSize); 4]> = SmallVec::new();
        for (arg, param) in args.iter().zip(params.iter()) {
            let dst = ctx.vreg_of(param.value);
            let src = self.put_input_in_reg(ctx, *arg);
            if src != dst {
                moves.push((
                    src,
                    dst,
                    RegClass::of_type(param.ty),
                    OperandSize::from_ty(param.ty),
                ));
            }
        }

        // When a destination register also feeds another move, the naive
        // sequence would clobber it; route every source through a fresh
        // register first.
        let overlaps = moves
            .iter()
            .any(|&(src, ..)| moves.iter().any(|&(_, dst, ..)| src == dst));
        if overlaps {
            let mut staged: SmallVec<[VReg; 4]> = SmallVec::new();
            for &(src, _, class, size) in &moves {
                let tmp = ctx.alloc_vreg(class);
                self.emit(Inst::mov(tmp, src, class, size));
                staged.push(tmp);
            }
            for (&(_, dst, class, size), &tmp) in moves.iter().zip(staged.iter()) {
                self.emit(Inst::mov(dst, tmp, class, size));
            }
        } else {
            for &(src, dst, class, size) in &moves {
                self.emit(Inst::mov(dst, src, class, size));
            }
        }
        Ok(())
    }

    /// Lower `br_table`: a bounds check branching to the default target,
    /// then the jump-table dispatch sequence.
    fn lower_br_table(&mut self, ctx: &mut Lower, br0: IRInst) -> CodegenResult<()> {
        let f = ctx.f();
        let index = f.inst(br0).arg.expand().unwrap();
        let default = f.inst(br0).target.expand().unwrap();
        let table: SmallVec<[crate::ir::Block; 8]> =
            f.inst(br0).table.iter().copied().collect();
        let size = OperandSize::from_ty(ctx.value_type(index));
        let ridx = self.put_input_in_reg(ctx, index);

        let count = table.len() as u64;
        match Imm12::maybe_from_u64(count) {
            Some(imm12) => self.emit(Inst::AluRRImm12 {
                op: ALUOp::SubS,
                size,
                rd: zero_reg(),
                rn: ridx,
                imm12,
            }),
            None => {
                let tmp = ctx.alloc_vreg(RegClass::Int);
                for inst_out in Inst::load_constant(tmp, count, size) {
                    self.emit(inst_out);
                }
                self.emit(Inst::AluRRR {
                    op: ALUOp::SubS,
                    size,
                    rd: zero_reg(),
                    rn: ridx,
                    rm: tmp,
                });
            }
        }
        let default_label = self.block_label(default);
        self.emit(Inst::CondBr {
            target: BranchTarget::Label(default_label),
            kind: CondBrKind::Cond(Cond::Hs),
            size,
        });
        let targets: Vec<BranchTarget> = table
            .iter()
            .map(|&b| BranchTarget::Label(self.block_label(b)))
            .collect();
        self.emit(Inst::JTSequence { ridx, targets });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Straight-line instructions.

    pub(super) fn lower_one_inst(&mut self, ctx: &mut Lower, inst: IRInst) -> CodegenResult<()> {
        let f = ctx.f();
        let data = f.inst(inst);
        let op = data.opcode;
        let ty = data.ty;
        match op {
            Opcode::Nop => {}

            Opcode::Iconst => {
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let size = OperandSize::from_ty(ty);
                for inst_out in Inst::load_constant(rd, constant_bits(data.imm, ty), size) {
                    self.emit(inst_out);
                }
            }
            Opcode::F32const | Opcode::F64const => {
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                self.emit(Inst::LoadFpuConst {
                    size: OperandSize::from_ty(ty),
                    rd,
                    bits: data.imm,
                });
            }

            Opcode::Iadd | Opcode::Isub => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let x = data.arg.expand().unwrap();
                let y = data.arg2.expand().unwrap();
                // Fold a multiply on either side of an add into `madd`.
                if op == Opcode::Iadd {
                    let mul = ctx
                        .matchable_producer(y, inst)
                        .filter(|&p| f.inst(p).opcode == Opcode::Imul)
                        .map(|p| (p, x))
                        .or_else(|| {
                            ctx.matchable_producer(x, inst)
                                .filter(|&p| f.inst(p).opcode == Opcode::Imul)
                                .map(|p| (p, y))
                        });
                    if let Some((mul_inst, addend)) = mul {
                        ctx.mark_lowered(mul_inst);
                        let rn = self.put_input_in_reg(ctx, f.inst(mul_inst).arg.expand().unwrap());
                        let rm =
                            self.put_input_in_reg(ctx, f.inst(mul_inst).arg2.expand().unwrap());
                        let ra = self.put_input_in_reg(ctx, addend);
                        self.emit(Inst::AluRRRR {
                            op: ALUOp3::MAdd,
                            size,
                            rd,
                            rn,
                            rm,
                            ra,
                        });
                        return Ok(());
                    }
                }
                let alu_op = if op == Opcode::Iadd {
                    ALUOp::Add
                } else {
                    ALUOp::Sub
                };
                let rn = self.put_input_in_reg(ctx, x);
                let rm = self.put_input_in_rse_imm12(ctx, y, inst);
                self.emit(alu_inst_imm12(alu_op, size, rd, rn, rm));
            }

            Opcode::Imul => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg2.expand().unwrap());
                self.emit(Inst::AluRRRR {
                    op: ALUOp3::MAdd,
                    size,
                    rd,
                    rn,
                    rm,
                    ra: zero_reg(),
                });
            }

            Opcode::Umulhi | Opcode::Smulhi => {
                if ty != types::I64 {
                    return Err(CodegenError::UnsupportedOpcode(op));
                }
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg2.expand().unwrap());
                let alu_op = if op == Opcode::Umulhi {
                    ALUOp::UMulH
                } else {
                    ALUOp::SMulH
                };
                self.emit(Inst::AluRRR {
                    op: alu_op,
                    size: OperandSize::Size64,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Udiv | Opcode::Sdiv => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg2.expand().unwrap());
                let alu_op = if op == Opcode::Udiv {
                    ALUOp::UDiv
                } else {
                    ALUOp::SDiv
                };
                self.emit(Inst::AluRRR {
                    op: alu_op,
                    size,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Urem | Opcode::Srem => {
                // quotient = div(x, y); rd = x - quotient * y
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg2.expand().unwrap());
                let quotient = ctx.alloc_vreg(RegClass::Int);
                let alu_op = if op == Opcode::Urem {
                    ALUOp::UDiv
                } else {
                    ALUOp::SDiv
                };
                self.emit(Inst::AluRRR {
                    op: alu_op,
                    size,
                    rd: quotient,
                    rn,
                    rm,
                });
                self.emit(Inst::AluRRRR {
                    op: ALUOp3::MSub,
                    size,
                    rd,
                    rn: quotient,
                    rm,
                    ra: rn,
                });
            }

            Opcode::Ineg => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::AluRRR {
                    op: ALUOp::Sub,
                    size,
                    rd,
                    rn: zero_reg(),
                    rm,
                });
            }

            Opcode::Iabs => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::AluRRImm12 {
                    op: ALUOp::SubS,
                    size,
                    rd: zero_reg(),
                    rn,
                    imm12: Imm12::maybe_from_u64(0).unwrap(),
                });
                self.emit(Inst::CNeg {
                    size,
                    cond: Cond::Lt,
                    rd,
                    rn,
                });
            }

            Opcode::Band | Opcode::Bor | Opcode::Bxor => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let alu_op = match op {
                    Opcode::Band => ALUOp::And,
                    Opcode::Bor => ALUOp::Orr,
                    _ => ALUOp::Eor,
                };
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let rm = self.put_input_in_rs_immlogic(ctx, data.arg2.expand().unwrap(), inst, ty);
                self.emit(alu_inst_immlogic(alu_op, size, rd, rn, rm));
            }

            Opcode::Bnot => {
                // orn rd, zr, rm
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::AluRRR {
                    op: ALUOp::OrrNot,
                    size,
                    rd,
                    rn: zero_reg(),
                    rm,
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let alu_op = match op {
                    Opcode::Ishl => ALUOp::Lsl,
                    Opcode::Ushr => ALUOp::Lsr,
                    _ => ALUOp::Asr,
                };
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let amt_value = data.arg2.expand().unwrap();
                match input_constant(ctx, amt_value, inst) {
                    Some((amt_producer, amt, amt_refcount)) => {
                        let amt = amt & u64::from(size.bits() - 1);
                        consume_constant(ctx, amt_producer, amt_refcount);
                        self.emit(Inst::AluRRImmShift {
                            op: alu_op,
                            size,
                            rd,
                            rn,
                            immshift: ImmShift::maybe_from_u64(amt).unwrap(),
                        });
                    }
                    None => {
                        let rm = self.put_input_in_reg(ctx, amt_value);
                        self.emit(Inst::AluRRR {
                            op: alu_op,
                            size,
                            rd,
                            rn,
                            rm,
                        });
                    }
                }
            }

            Opcode::Rotr | Opcode::Rotl => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let amt_value = data.arg2.expand().unwrap();
                match input_constant(ctx, amt_value, inst) {
                    Some((amt_producer, amt, amt_refcount)) => {
                        let bits = u64::from(size.bits());
                        let mut amt = amt & (bits - 1);
                        if op == Opcode::Rotl {
                            // rotl(x, n) == rotr(x, width - n)
                            amt = (bits - amt) & (bits - 1);
                        }
                        consume_constant(ctx, amt_producer, amt_refcount);
                        self.emit(Inst::AluRRImmShift {
                            op: ALUOp::Ror,
                            size,
                            rd,
                            rn,
                            immshift: ImmShift::maybe_from_u64(amt).unwrap(),
                        });
                    }
                    None => {
                        let mut rm = self.put_input_in_reg(ctx, amt_value);
                        if op == Opcode::Rotl {
                            let neg = ctx.alloc_vreg(RegClass::Int);
                            self.emit(Inst::AluRRR {
                                op: ALUOp::Sub,
                                size,
                                rd: neg,
                                rn: zero_reg(),
                                rm,
                            });
                            rm = neg;
                        }
                        self.emit(Inst::AluRRR {
                            op: ALUOp::Ror,
                            size,
                            rd,
                            rn,
                            rm,
                        });
                    }
                }
            }

            Opcode::Clz | Opcode::Ctz | Opcode::Bswap => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                match op {
                    Opcode::Clz => self.emit(Inst::BitRR {
                        op: BitOp::Clz,
                        size,
                        rd,
                        rn,
                    }),
                    Opcode::Bswap => self.emit(Inst::BitRR {
                        op: BitOp::Rev,
                        size,
                        rd,
                        rn,
                    }),
                    _ => {
                        // ctz = clz(rbit(x))
                        let reversed = ctx.alloc_vreg(RegClass::Int);
                        self.emit(Inst::BitRR {
                            op: BitOp::Rbit,
                            size,
                            rd: reversed,
                            rn,
                        });
                        self.emit(Inst::BitRR {
                            op: BitOp::Clz,
                            size,
                            rd,
                            rn: reversed,
                        });
                    }
                }
            }

            Opcode::Icmp => {
                let x = data.arg.expand().unwrap();
                let y = data.arg2.expand().unwrap();
                let size = OperandSize::from_ty(ctx.value_type(x));
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let cond = lower_condcode(data.cond.unwrap_int());
                let rn = self.put_input_in_reg(ctx, x);
                let rm = self.put_input_in_rse_imm12(ctx, y, inst);
                self.emit(alu_inst_imm12(ALUOp::SubS, size, zero_reg(), rn, rm));
                self.emit(Inst::CSet { rd, cond });
            }

            Opcode::Fcmp => {
                let x = data.arg.expand().unwrap();
                let y = data.arg2.expand().unwrap();
                let size = OperandSize::from_ty(ctx.value_type(x));
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let Some(cond) = lower_fp_condcode(data.cond.unwrap_float()) else {
                    return Err(CodegenError::UnsupportedOpcode(op));
                };
                let rn = self.put_input_in_reg(ctx, x);
                let rm = self.put_input_in_reg(ctx, y);
                self.emit(Inst::FpuCmp { size, rn, rm });
                self.emit(Inst::CSet { rd, cond });
            }

            Opcode::Uextend | Opcode::Sextend => {
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::Extend {
                    rd,
                    rn,
                    signed: op == Opcode::Sextend,
                    from_bits: 32,
                    to_bits: 64,
                });
            }

            Opcode::Ireduce => {
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::Mov {
                    size: OperandSize::Size32,
                    rd,
                    rm,
                });
            }

            Opcode::Select => {
                let x = data.arg.expand().unwrap();
                let y = data.arg2.expand().unwrap();
                let cond_value = data.args[0];
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let cond_size = OperandSize::from_ty(ctx.value_type(cond_value));
                let rcond = self.put_input_in_reg(ctx, cond_value);
                self.emit(Inst::AluRRImm12 {
                    op: ALUOp::SubS,
                    size: cond_size,
                    rd: zero_reg(),
                    rn: rcond,
                    imm12: Imm12::maybe_from_u64(0).unwrap(),
                });
                let size = OperandSize::from_ty(ty);
                let rn = self.put_input_in_reg(ctx, x);
                let rm = self.put_input_in_reg(ctx, y);
                if ty.is_float() {
                    self.emit(Inst::FpuCSel {
                        size,
                        cond: Cond::Ne,
                        rd,
                        rn,
                        rm,
                    });
                } else {
                    self.emit(Inst::CSel {
                        size,
                        cond: Cond::Ne,
                        rd,
                        rn,
                        rm,
                    });
                }
            }

            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv | Opcode::Fmin
            | Opcode::Fmax => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let fpu_op = match op {
                    Opcode::Fadd => FPUOp2::Add,
                    Opcode::Fsub => FPUOp2::Sub,
                    Opcode::Fmul => FPUOp2::Mul,
                    Opcode::Fdiv => FPUOp2::Div,
                    Opcode::Fmin => FPUOp2::Min,
                    _ => FPUOp2::Max,
                };
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let rm = self.put_input_in_reg(ctx, data.arg2.expand().unwrap());
                self.emit(Inst::FpuRRR {
                    op: fpu_op,
                    size,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Fabs | Opcode::Fneg | Opcode::Sqrt | Opcode::Ceil | Opcode::Floor
            | Opcode::Trunc | Opcode::Nearest => {
                let size = OperandSize::from_ty(ty);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let fpu_op = match op {
                    Opcode::Fabs => FPUOp1::Abs,
                    Opcode::Fneg => FPUOp1::Neg,
                    Opcode::Sqrt => FPUOp1::Sqrt,
                    Opcode::Ceil => FPUOp1::RintP,
                    Opcode::Floor => FPUOp1::RintM,
                    Opcode::Trunc => FPUOp1::RintZ,
                    _ => FPUOp1::RintN,
                };
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::FpuRR {
                    op: fpu_op,
                    size,
                    rd,
                    rn,
                });
            }

            Opcode::Fpromote | Opcode::Fdemote => {
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let (from_size, to_size) = if op == Opcode::Fpromote {
                    (OperandSize::Size32, OperandSize::Size64)
                } else {
                    (OperandSize::Size64, OperandSize::Size32)
                };
                self.emit(Inst::FpuCvt {
                    rd,
                    rn,
                    from_size,
                    to_size,
                });
            }

            Opcode::FcvtToSint | Opcode::FcvtToUint | Opcode::FcvtToSintSat
            | Opcode::FcvtToUintSat => {
                let input = data.arg.expand().unwrap();
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, input);
                self.emit(Inst::FpuToInt {
                    signed: matches!(op, Opcode::FcvtToSint | Opcode::FcvtToSintSat),
                    rd,
                    rn,
                    in_size: OperandSize::from_ty(ctx.value_type(input)),
                    out_size: OperandSize::from_ty(ty),
                });
            }

            Opcode::FcvtFromSint | Opcode::FcvtFromUint => {
                let input = data.arg.expand().unwrap();
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, input);
                self.emit(Inst::IntToFpu {
                    signed: op == Opcode::FcvtFromSint,
                    rd,
                    rn,
                    in_size: OperandSize::from_ty(ctx.value_type(input)),
                    out_size: OperandSize::from_ty(ty),
                });
            }

            Opcode::Bitcast => {
                let input = data.arg.expand().unwrap();
                let from_ty = ctx.value_type(input);
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let rn = self.put_input_in_reg(ctx, input);
                let size = OperandSize::from_ty(ty);
                match (from_ty.is_float(), ty.is_float()) {
                    (false, true) => self.emit(Inst::MovToFpu { size, rd, rn }),
                    (true, false) => self.emit(Inst::MovFromFpu { size, rd, rn }),
                    (true, true) => self.emit(Inst::FpuMov { size, rd, rn }),
                    (false, false) => self.emit(Inst::Mov { size, rd, rm: rn }),
                }
            }

            Opcode::Load
            | Opcode::Uload8
            | Opcode::Sload8
            | Opcode::Uload16
            | Opcode::Sload16
            | Opcode::Uload32
            | Opcode::Sload32 => {
                let rd = ctx.vreg_of(data.result.expand().unwrap());
                let addr = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                let mem = MemArg::reg_maybe_offset(addr, data.imm as i32);
                let load_op = match op {
                    Opcode::Uload8 => LoadOp::U8,
                    Opcode::Sload8 => LoadOp::S8,
                    Opcode::Uload16 => LoadOp::U16,
                    Opcode::Sload16 => LoadOp::S16,
                    Opcode::Uload32 => LoadOp::U32,
                    Opcode::Sload32 => LoadOp::S32,
                    _ => match ty {
                        types::I32 => LoadOp::U32,
                        types::I64 => LoadOp::U64,
                        types::F32 => LoadOp::F32,
                        types::F64 => LoadOp::F64,
                        _ => return Err(CodegenError::UnsupportedOpcode(op)),
                    },
                };
                self.emit(Inst::Load {
                    op: load_op,
                    rd,
                    mem,
                });
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let value = data.arg.expand().unwrap();
                let value_ty = ctx.value_type(value);
                let rs = self.put_input_in_reg(ctx, value);
                let addr = self.put_input_in_reg(ctx, data.arg2.expand().unwrap());
                let mem = MemArg::reg_maybe_offset(addr, data.imm as i32);
                let store_op = match op {
                    Opcode::Istore8 => StoreOp::I8,
                    Opcode::Istore16 => StoreOp::I16,
                    Opcode::Istore32 => StoreOp::I32,
                    _ => match value_ty {
                        types::I32 => StoreOp::I32,
                        types::I64 => StoreOp::I64,
                        types::F32 => StoreOp::F32,
                        types::F64 => StoreOp::F64,
                        _ => return Err(CodegenError::UnsupportedOpcode(op)),
                    },
                };
                self.emit(Inst::Store {
                    op: store_op,
                    rs,
                    mem,
                });
            }

            Opcode::Call => {
                for arg in data.args.iter() {
                    self.put_input_in_reg(ctx, *arg);
                }
                self.emit(Inst::Call {
                    callee_index: data.imm as u32,
                });
            }
            Opcode::CallIndirect => {
                for arg in data.args.iter() {
                    self.put_input_in_reg(ctx, *arg);
                }
                let rn = self.put_input_in_reg(ctx, data.arg.expand().unwrap());
                self.emit(Inst::CallInd { rn });
            }

            Opcode::Return => {
                let rets: SmallVec<[VReg; 4]> = ctx.ret_vregs().iter().copied().collect();
                let args: SmallVec<[Value; 4]> = data.args.iter().copied().collect();
                assert_eq!(
                    args.len(),
                    rets.len(),
                    "{inst}: return value count does not match the function signature"
                );
                for (arg, dst) in args.iter().zip(rets.iter()) {
                    let ty = ctx.value_type(*arg);
                    let src = self.put_input_in_reg(ctx, *arg);
                    if src != *dst {
                        self.emit(Inst::mov(
                            *dst,
                            src,
                            RegClass::of_type(ty),
                            OperandSize::from_ty(ty),
                        ));
                    }
                }
                self.emit(Inst::Ret);
            }

            Opcode::Trap => {
                self.emit(Inst::Udf);
            }
            Opcode::Trapz | Opcode::Trapnz => {
                let cond_value = data.arg.expand().unwrap();
                let size = OperandSize::from_ty(ctx.value_type(cond_value));
                let rn = self.put_input_in_reg(ctx, cond_value);
                let kind = if op == Opcode::Trapz {
                    CondBrKind::Zero(rn)
                } else {
                    CondBrKind::NotZero(rn)
                };
                self.emit(Inst::TrapIf { kind, size });
            }

            Opcode::Jump | Opcode::Brz | Opcode::Brnz | Opcode::BrTable => {
                return Err(CodegenError::InvalidBranch {
                    inst,
                    reason: "branch outside the terminating branch group",
                });
            }

            _ => return Err(CodegenError::UnsupportedOpcode(op)),
        }
        Ok(())
    }
}
