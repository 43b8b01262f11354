//! AArch64 register conventions and printing.
//!
//! The first [`RESERVED_VREGS`] virtual-register numbers name the physical
//! registers one-for-one: 0..=31 are the integer registers x0..x30 plus the
//! zero register, 32..=63 are the vector registers v0..v31. Virtual
//! registers from [`RESERVED_VREGS`] up belong to SSA values and print with
//! their dense user number, which is what pre-allocation listings show.

use super::args::OperandSize;
use crate::machinst::{RegClass, VReg};

/// Number of reserved virtual-register ids naming physical registers.
pub const RESERVED_VREGS: u32 = 64;

/// Reserved id of the integer zero register.
const ZERO: u32 = 31;

/// The integer zero register (`wzr`/`xzr`).
pub fn zero_reg() -> VReg {
    VReg::new(ZERO)
}

/// Register classes of the reserved range, index == register number.
pub fn reserved_classes() -> Vec<RegClass> {
    let mut classes = vec![RegClass::Int; 32];
    classes.extend(vec![RegClass::Float; 32]);
    classes
}

/// Show an integer register with the width implied by `size`.
pub fn show_ireg(reg: VReg, size: OperandSize) -> String {
    let prefix = match size {
        OperandSize::Size32 => 'w',
        OperandSize::Size64 => 'x',
    };
    let id = reg.id();
    if id == ZERO {
        return format!("{prefix}zr");
    }
    if id < RESERVED_VREGS {
        format!("{prefix}{id}")
    } else {
        format!("{prefix}{}", id - RESERVED_VREGS)
    }
}

/// Show a floating-point register with the width implied by `size`.
pub fn show_freg(reg: VReg, size: OperandSize) -> String {
    let prefix = match size {
        OperandSize::Size32 => 's',
        OperandSize::Size64 => 'd',
    };
    let id = reg.id();
    if id < RESERVED_VREGS {
        format!("{prefix}{}", id - 32)
    } else {
        format!("{prefix}{}", id - RESERVED_VREGS)
    }
}

/// Show a register of either class.
pub fn show_reg(reg: VReg, class: RegClass, size: OperandSize) -> String {
    match class {
        RegClass::Int => show_ireg(reg, size),
        RegClass::Float => show_freg(reg, size),
    }
}
