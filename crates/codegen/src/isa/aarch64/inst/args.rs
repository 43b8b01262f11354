//! AArch64 instruction arguments: conditions, branch targets, shifts,
//! extensions, and memory addresses.

use crate::ir::Type;
use crate::ir::types;
use crate::machinst::{MachLabel, VReg};
use core::fmt;

use super::regs::show_ireg;

/// Operand width of an integer machine instruction; AArch64 has 32- and
/// 64-bit variants of most of them.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OperandSize {
    /// 32-bit operation (`w` registers).
    Size32,
    /// 64-bit operation (`x` registers).
    Size64,
}

impl OperandSize {
    /// The operand size holding a value of `ty`.
    pub fn from_ty(ty: Type) -> OperandSize {
        if ty == types::I64 || ty == types::F64 {
            OperandSize::Size64
        } else {
            OperandSize::Size32
        }
    }

    /// Number of bits in this operand size.
    pub fn bits(self) -> u32 {
        match self {
            OperandSize::Size32 => 32,
            OperandSize::Size64 => 64,
        }
    }
}

/// A shift operator for a shifted-register operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Arithmetic shift right.
    Asr,
    /// Rotate right.
    Ror,
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ShiftOp::Lsl => "LSL",
            ShiftOp::Lsr => "LSR",
            ShiftOp::Asr => "ASR",
            ShiftOp::Ror => "ROR",
        })
    }
}

/// A shift operator with its amount, guaranteed in range for the width.
#[derive(Copy, Clone, Debug)]
pub struct ShiftOpAndAmt {
    op: ShiftOp,
    amt: u8,
}

impl ShiftOpAndAmt {
    /// Largest permitted shift amount.
    pub const MAX_SHIFT: u64 = 63;

    /// Build a shift operand when `amt` is within range.
    pub fn maybe_new(op: ShiftOp, amt: u64) -> Option<ShiftOpAndAmt> {
        if amt <= Self::MAX_SHIFT {
            Some(ShiftOpAndAmt { op, amt: amt as u8 })
        } else {
            None
        }
    }

    /// The shift operator.
    pub fn op(&self) -> ShiftOp {
        self.op
    }

    /// The shift amount.
    pub fn amt(&self) -> u8 {
        self.amt
    }
}

impl fmt::Display for ShiftOpAndAmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.op, self.amt)
    }
}

/// An extend operator for an extended-register operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ExtendOp {
    Uxtb,
    Uxth,
    Uxtw,
    Uxtx,
    Sxtb,
    Sxth,
    Sxtw,
    Sxtx,
}

impl fmt::Display for ExtendOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ExtendOp::Uxtb => "UXTB",
            ExtendOp::Uxth => "UXTH",
            ExtendOp::Uxtw => "UXTW",
            ExtendOp::Uxtx => "UXTX",
            ExtendOp::Sxtb => "SXTB",
            ExtendOp::Sxth => "SXTH",
            ExtendOp::Sxtw => "SXTW",
            ExtendOp::Sxtx => "SXTX",
        })
    }
}

/// Condition for conditional branches and conditional selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Cond {
    Eq,
    Ne,
    Hs,
    Lo,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
}

impl Cond {
    /// The inverted condition: true exactly when `self` is false.
    /// Involutive.
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
        }
    }

    /// All conditions, for tests.
    pub fn all() -> &'static [Cond] {
        &[
            Cond::Eq,
            Cond::Ne,
            Cond::Hs,
            Cond::Lo,
            Cond::Mi,
            Cond::Pl,
            Cond::Vs,
            Cond::Vc,
            Cond::Hi,
            Cond::Ls,
            Cond::Ge,
            Cond::Lt,
            Cond::Gt,
            Cond::Le,
        ]
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = format!("{self:?}");
        s.make_ascii_lowercase();
        f.write_str(&s)
    }
}

/// The kind of a conditional branch: the common-case-optimized
/// "register-is-zero" / "register-is-nonzero" variants, or the generic test
/// of the machine condition flags.
#[derive(Copy, Clone, Debug)]
pub enum CondBrKind {
    /// Condition: the given register is zero.
    Zero(VReg),
    /// Condition: the given register is non-zero.
    NotZero(VReg),
    /// Condition: the given condition-flag test is true.
    Cond(Cond),
}

impl CondBrKind {
    /// The inverted branch condition. Flips the whole variant:
    /// `Zero ↔ NotZero`, and flag conditions invert pairwise. Involutive.
    pub fn invert(self) -> CondBrKind {
        match self {
            CondBrKind::Zero(reg) => CondBrKind::NotZero(reg),
            CondBrKind::NotZero(reg) => CondBrKind::Zero(reg),
            CondBrKind::Cond(c) => CondBrKind::Cond(c.invert()),
        }
    }
}

/// A branch target: a label until the encoder resolves it to a signed
/// offset from the branch.
#[derive(Copy, Clone, Debug)]
pub enum BranchTarget {
    /// An unresolved reference to a block label.
    Label(MachLabel),
    /// A resolved byte offset relative to the end of this instruction.
    ResolvedOffset(i32),
}

impl BranchTarget {
    /// The label, if unresolved.
    pub fn as_label(self) -> Option<MachLabel> {
        match self {
            BranchTarget::Label(label) => Some(label),
            BranchTarget::ResolvedOffset(..) => None,
        }
    }
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BranchTarget::Label(label) => write!(f, "{label}"),
            BranchTarget::ResolvedOffset(off) => write!(f, "{off}"),
        }
    }
}

/// A memory address for loads and stores.
#[derive(Copy, Clone, Debug)]
pub enum MemArg {
    /// `[base]`.
    Base(VReg),
    /// `[base, #offset]`.
    BaseOffset(VReg, i32),
    /// `[base, index]`.
    RegReg(VReg, VReg),
}

impl MemArg {
    /// A plain or offset base-register address.
    pub fn reg_maybe_offset(base: VReg, offset: i32) -> MemArg {
        if offset == 0 {
            MemArg::Base(base)
        } else {
            MemArg::BaseOffset(base, offset)
        }
    }
}

impl fmt::Display for MemArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MemArg::Base(base) => {
                write!(f, "[{}]", show_ireg(base, OperandSize::Size64))
            }
            MemArg::BaseOffset(base, offset) => {
                write!(f, "[{}, #{offset}]", show_ireg(base, OperandSize::Size64))
            }
            MemArg::RegReg(base, index) => write!(
                f,
                "[{}, {}]",
                show_ireg(base, OperandSize::Size64),
                show_ireg(index, OperandSize::Size64)
            ),
        }
    }
}
