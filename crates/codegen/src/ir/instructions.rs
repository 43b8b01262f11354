//! Instruction opcodes and the instruction record.
//!
//! Every SSA instruction is one flat [`InstructionData`] record living in the
//! builder's instruction pool: an opcode, up to two fixed value operands plus
//! a variadic operand list, a primary result plus a variadic result list, a
//! controlling type, a 64-bit immediate payload, sibling links within its
//! block, and the liveness/grouping state written by dead-code elimination.
//!
//! The opcode enumeration is closed; a large match over it beats dynamic
//! dispatch in the hot compiler loops.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{Block, Inst, SigRef, Value};
use crate::ir::types::{self, Type};
use core::fmt;
use cranelift_entity::packed_option::PackedOption;
use smallvec::SmallVec;

/// An instruction opcode.
///
/// All instructions from all supported ISAs are present.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    /// Not a valid opcode; the state of a freshly allocated record.
    Invalid,

    // Control flow.
    /// Unconditionally jump to a block, passing the listed arguments.
    Jump,
    /// Branch to a block when the condition value is zero.
    Brz,
    /// Branch to a block when the condition value is non-zero.
    Brnz,
    /// Indirect branch through a jump table, with a default target.
    BrTable,
    /// Return from the function, passing the listed values.
    Return,
    /// Direct call to a function in the same module.
    Call,
    /// Indirect call through a callee address.
    CallIndirect,
    /// Terminate execution unconditionally.
    Trap,
    /// Trap when the condition value is zero.
    Trapz,
    /// Trap when the condition value is non-zero.
    Trapnz,
    /// Do nothing.
    Nop,
    /// Choose between two values based on a condition value.
    Select,

    // Integer operations.
    /// Integer constant (payload in the immediate field).
    Iconst,
    /// Wrapping integer addition.
    Iadd,
    /// Wrapping integer subtraction.
    Isub,
    /// Wrapping integer multiplication.
    Imul,
    /// High half of an unsigned integer multiplication.
    Umulhi,
    /// High half of a signed integer multiplication.
    Smulhi,
    /// Unsigned integer division; traps on zero divisor.
    Udiv,
    /// Signed integer division; traps on zero divisor and overflow.
    Sdiv,
    /// Unsigned integer remainder.
    Urem,
    /// Signed integer remainder.
    Srem,
    /// Integer negation.
    Ineg,
    /// Integer absolute value.
    Iabs,
    /// Shift left by a dynamic amount.
    Ishl,
    /// Logical shift right.
    Ushr,
    /// Arithmetic shift right.
    Sshr,
    /// Rotate left.
    Rotl,
    /// Rotate right.
    Rotr,
    /// Count leading zero bits.
    Clz,
    /// Count trailing zero bits.
    Ctz,
    /// Count one bits.
    Popcnt,
    /// Reverse the bytes of a value.
    Bswap,
    /// Bitwise and.
    Band,
    /// Bitwise or.
    Bor,
    /// Bitwise exclusive or.
    Bxor,
    /// Bitwise not.
    Bnot,
    /// Integer comparison producing 1 or 0 as an i32.
    Icmp,
    /// Zero-extend a narrow integer to a wider type.
    Uextend,
    /// Sign-extend a narrow integer to a wider type.
    Sextend,
    /// Truncate an integer to a narrower type.
    Ireduce,

    // Floating point operations.
    /// 32-bit float constant (bit pattern in the immediate field).
    F32const,
    /// 64-bit float constant (bit pattern in the immediate field).
    F64const,
    /// Floating point addition.
    Fadd,
    /// Floating point subtraction.
    Fsub,
    /// Floating point multiplication.
    Fmul,
    /// Floating point division.
    Fdiv,
    /// Square root.
    Sqrt,
    /// Floating point negation.
    Fneg,
    /// Floating point absolute value.
    Fabs,
    /// Minimum of two floats, propagating NaN.
    Fmin,
    /// Maximum of two floats, propagating NaN.
    Fmax,
    /// Magnitude of the first operand with the sign of the second.
    Fcopysign,
    /// Round toward positive infinity.
    Ceil,
    /// Round toward negative infinity.
    Floor,
    /// Round toward zero.
    Trunc,
    /// Round to nearest, ties to even.
    Nearest,
    /// Floating point comparison producing 1 or 0 as an i32.
    Fcmp,
    /// Convert f32 to f64.
    Fpromote,
    /// Convert f64 to f32.
    Fdemote,
    /// Convert a float to a signed integer; traps out of range.
    FcvtToSint,
    /// Convert a float to an unsigned integer; traps out of range.
    FcvtToUint,
    /// Convert a float to a signed integer, saturating out of range.
    FcvtToSintSat,
    /// Convert a float to an unsigned integer, saturating out of range.
    FcvtToUintSat,
    /// Convert a signed integer to a float.
    FcvtFromSint,
    /// Convert an unsigned integer to a float.
    FcvtFromUint,
    /// Reinterpret the bits of a value as another type of the same width.
    Bitcast,

    // Memory operations. The immediate field holds the byte offset.
    /// Load a value of the controlling type.
    Load,
    /// Store a value of the controlling type.
    Store,
    /// Load 8 bits, zero-extended.
    Uload8,
    /// Load 8 bits, sign-extended.
    Sload8,
    /// Store the low 8 bits.
    Istore8,
    /// Load 16 bits, zero-extended.
    Uload16,
    /// Load 16 bits, sign-extended.
    Sload16,
    /// Store the low 16 bits.
    Istore16,
    /// Load 32 bits, zero-extended.
    Uload32,
    /// Load 32 bits, sign-extended.
    Sload32,
    /// Store the low 32 bits.
    Istore32,
    /// Sequentially consistent load.
    AtomicLoad,
    /// Sequentially consistent store.
    AtomicStore,
    /// Atomic read-modify-write (operation selected by the immediate field).
    AtomicRmw,
    /// Atomic compare-and-swap.
    AtomicCas,
    /// Memory fence.
    Fence,

    // Vector operations.
    /// 128-bit vector constant.
    Vconst,
    /// Broadcast a scalar into every lane.
    Splat,
    /// Select bytes of one vector by the indices in another.
    Swizzle,
    /// Select bytes from a pair of vectors by an immediate pattern.
    Shuffle,
    /// Replace one lane of a vector (lane index in the immediate field).
    Insertlane,
    /// Extract one lane of a vector (lane index in the immediate field).
    Extractlane,
    /// Reduce a vector to 1 iff any lane is non-zero.
    VanyTrue,
    /// Reduce a vector to 1 iff all lanes are non-zero.
    VallTrue,
    /// Sign-extend the low half of the lanes to double width.
    SwidenLow,
    /// Sign-extend the high half of the lanes to double width.
    SwidenHigh,
    /// Zero-extend the low half of the lanes to double width.
    UwidenLow,
    /// Zero-extend the high half of the lanes to double width.
    UwidenHigh,
    /// Saturating signed narrowing of two vectors into one.
    Snarrow,
    /// Saturating unsigned narrowing of two vectors into one.
    Unarrow,
}

impl Opcode {
    /// True for all branch instructions: `jump`, `brz`, `brnz`, `br_table`.
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Jump | Self::Brz | Self::Brnz | Self::BrTable)
    }

    /// True for instructions that end a block: the unconditional branches,
    /// `return`, and `trap`. Conditional branches are not terminators; they
    /// are always followed by a terminating jump in a well-formed block.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::BrTable | Self::Return | Self::Trap
        )
    }

    /// True for direct and indirect calls.
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallIndirect)
    }

    /// Does this instruction have an observable effect beyond its results?
    ///
    /// These are the seeds of dead-code elimination: stores, calls, branches,
    /// traps, returns, and the atomic operations. Plain loads are treated as
    /// pure and may be removed when unused.
    pub fn has_side_effects(self) -> bool {
        self.is_branch()
            || self.is_call()
            || matches!(
                self,
                Self::Return
                    | Self::Trap
                    | Self::Trapz
                    | Self::Trapnz
                    | Self::Store
                    | Self::Istore8
                    | Self::Istore16
                    | Self::Istore32
                    | Self::AtomicLoad
                    | Self::AtomicStore
                    | Self::AtomicRmw
                    | Self::AtomicCas
                    | Self::Fence
            )
    }

    /// Does this instruction produce at least one result value?
    ///
    /// Calls count as producers; their actual result count (possibly zero)
    /// comes from their signature.
    pub fn produces_result(self) -> bool {
        !matches!(
            self,
            Self::Invalid
                | Self::Jump
                | Self::Brz
                | Self::Brnz
                | Self::BrTable
                | Self::Return
                | Self::Trap
                | Self::Trapz
                | Self::Trapnz
                | Self::Nop
                | Self::Store
                | Self::Istore8
                | Self::Istore16
                | Self::Istore32
                | Self::AtomicStore
                | Self::Fence
        )
    }

    /// Can this instruction produce more than one result?
    ///
    /// Only calls, whose result count comes from their signature.
    pub fn is_multi_result(self) -> bool {
        self.is_call()
    }

    fn to_static_str(self) -> &'static str {
        use Opcode::*;
        match self {
            Invalid => "INVALID",
            Jump => "jump",
            Brz => "brz",
            Brnz => "brnz",
            BrTable => "br_table",
            Return => "return",
            Call => "call",
            CallIndirect => "call_indirect",
            Trap => "trap",
            Trapz => "trapz",
            Trapnz => "trapnz",
            Nop => "nop",
            Select => "select",
            Iconst => "iconst",
            Iadd => "iadd",
            Isub => "isub",
            Imul => "imul",
            Umulhi => "umulhi",
            Smulhi => "smulhi",
            Udiv => "udiv",
            Sdiv => "sdiv",
            Urem => "urem",
            Srem => "srem",
            Ineg => "ineg",
            Iabs => "iabs",
            Ishl => "ishl",
            Ushr => "ushr",
            Sshr => "sshr",
            Rotl => "rotl",
            Rotr => "rotr",
            Clz => "clz",
            Ctz => "ctz",
            Popcnt => "popcnt",
            Bswap => "bswap",
            Band => "band",
            Bor => "bor",
            Bxor => "bxor",
            Bnot => "bnot",
            Icmp => "icmp",
            Uextend => "uextend",
            Sextend => "sextend",
            Ireduce => "ireduce",
            F32const => "f32const",
            F64const => "f64const",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Sqrt => "sqrt",
            Fneg => "fneg",
            Fabs => "fabs",
            Fmin => "fmin",
            Fmax => "fmax",
            Fcopysign => "fcopysign",
            Ceil => "ceil",
            Floor => "floor",
            Trunc => "trunc",
            Nearest => "nearest",
            Fcmp => "fcmp",
            Fpromote => "fpromote",
            Fdemote => "fdemote",
            FcvtToSint => "fcvt_to_sint",
            FcvtToUint => "fcvt_to_uint",
            FcvtToSintSat => "fcvt_to_sint_sat",
            FcvtToUintSat => "fcvt_to_uint_sat",
            FcvtFromSint => "fcvt_from_sint",
            FcvtFromUint => "fcvt_from_uint",
            Bitcast => "bitcast",
            Load => "load",
            Store => "store",
            Uload8 => "uload8",
            Sload8 => "sload8",
            Istore8 => "istore8",
            Uload16 => "uload16",
            Sload16 => "sload16",
            Istore16 => "istore16",
            Uload32 => "uload32",
            Sload32 => "sload32",
            Istore32 => "istore32",
            AtomicLoad => "atomic_load",
            AtomicStore => "atomic_store",
            AtomicRmw => "atomic_rmw",
            AtomicCas => "atomic_cas",
            Fence => "fence",
            Vconst => "vconst",
            Splat => "splat",
            Swizzle => "swizzle",
            Shuffle => "shuffle",
            Insertlane => "insertlane",
            Extractlane => "extractlane",
            VanyTrue => "vany_true",
            VallTrue => "vall_true",
            SwidenLow => "swiden_low",
            SwidenHigh => "swiden_high",
            UwidenLow => "uwiden_low",
            UwidenHigh => "uwiden_high",
            Snarrow => "snarrow",
            Unarrow => "unarrow",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// The comparison condition carried by an `icmp` or `fcmp` instruction.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Condition {
    /// No condition; the state of every non-comparison instruction.
    #[default]
    None,
    /// An integer condition code.
    Int(IntCC),
    /// A floating point condition code.
    Float(FloatCC),
}

impl Condition {
    /// The integer condition code, or panic with context.
    pub fn unwrap_int(self) -> IntCC {
        match self {
            Self::Int(cc) => cc,
            other => panic!("expected an integer condition, got {other:?}"),
        }
    }

    /// The float condition code, or panic with context.
    pub fn unwrap_float(self) -> FloatCC {
        match self {
            Self::Float(cc) => cc,
            other => panic!("expected a float condition, got {other:?}"),
        }
    }
}

/// Instruction-group number assigned by dead-code elimination.
///
/// Instructions in the same group have no observable side effect between
/// them, so the instruction selector may merge a producer in a group into a
/// consumer in the same group.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct InstGroup(pub u32);

impl InstGroup {
    /// The group of instructions that have not been visited by DCE yet.
    pub const UNASSIGNED: InstGroup = InstGroup(u32::MAX);
}

/// A single IR instruction.
///
/// Which fields are meaningful depends on the opcode; the constructors below
/// are the only supported ways to build a record, and each one fills every
/// field its opcode needs.
#[derive(Clone, Debug)]
pub struct InstructionData {
    /// The operation performed.
    pub opcode: Opcode,
    /// Controlling type: the type of the primary result for producers, the
    /// type of the accessed memory for loads/stores.
    pub ty: Type,
    /// First fixed operand.
    pub arg: PackedOption<Value>,
    /// Second fixed operand.
    pub arg2: PackedOption<Value>,
    /// Variadic operands: branch arguments, call arguments, return values.
    pub args: SmallVec<[Value; 4]>,
    /// Primary result, valid iff the opcode produces at least one result.
    pub result: PackedOption<Value>,
    /// Additional results, non-empty only for multi-result calls.
    pub results: SmallVec<[Value; 2]>,
    /// Immediate payload: constant bits, memory offset, callee index, trap
    /// code, or lane index, depending on the opcode.
    pub imm: u64,
    /// Comparison condition for `icmp`/`fcmp`.
    pub cond: Condition,
    /// Branch destination (`jump`/`brz`/`brnz`), or the default target of a
    /// `br_table`.
    pub target: PackedOption<Block>,
    /// Jump-table targets of a `br_table`.
    pub table: Vec<Block>,
    /// Signature of the callee for `call`/`call_indirect`.
    pub sig: PackedOption<SigRef>,
    /// Previous instruction in the containing block.
    pub prev: PackedOption<Inst>,
    /// Next instruction in the containing block.
    pub next: PackedOption<Inst>,
    /// Liveness flag written by dead-code elimination.
    pub live: bool,
    /// Instruction group assigned by dead-code elimination.
    pub group: InstGroup,
}

impl Default for InstructionData {
    fn default() -> Self {
        Self {
            opcode: Opcode::Invalid,
            ty: types::INVALID,
            arg: None.into(),
            arg2: None.into(),
            args: SmallVec::new(),
            result: None.into(),
            results: SmallVec::new(),
            imm: 0,
            cond: Condition::None,
            target: None.into(),
            table: Vec::new(),
            sig: None.into(),
            prev: None.into(),
            next: None.into(),
            live: false,
            group: InstGroup::UNASSIGNED,
        }
    }
}

impl InstructionData {
    /// An instruction with no operands: `nop`, `trap`, `fence`.
    pub fn nullary(opcode: Opcode) -> Self {
        Self {
            opcode,
            ..Self::default()
        }
    }

    /// A single-operand instruction producing a value of type `ty`.
    pub fn unary(opcode: Opcode, ty: Type, arg: Value) -> Self {
        Self {
            opcode,
            ty,
            arg: arg.into(),
            ..Self::default()
        }
    }

    /// A two-operand instruction producing a value of type `ty`.
    pub fn binary(opcode: Opcode, ty: Type, x: Value, y: Value) -> Self {
        Self {
            opcode,
            ty,
            arg: x.into(),
            arg2: y.into(),
            ..Self::default()
        }
    }

    /// An integer constant of type `ty` with the given bits.
    pub fn iconst(ty: Type, bits: u64) -> Self {
        Self {
            opcode: Opcode::Iconst,
            ty,
            imm: bits,
            ..Self::default()
        }
    }

    /// A 32-bit float constant.
    pub fn f32const(value: f32) -> Self {
        Self {
            opcode: Opcode::F32const,
            ty: types::F32,
            imm: u64::from(value.to_bits()),
            ..Self::default()
        }
    }

    /// A 64-bit float constant.
    pub fn f64const(value: f64) -> Self {
        Self {
            opcode: Opcode::F64const,
            ty: types::F64,
            imm: value.to_bits(),
            ..Self::default()
        }
    }

    /// An integer comparison.
    pub fn icmp(cc: IntCC, x: Value, y: Value) -> Self {
        Self {
            opcode: Opcode::Icmp,
            arg: x.into(),
            arg2: y.into(),
            cond: Condition::Int(cc),
            ..Self::default()
        }
    }

    /// A floating point comparison.
    pub fn fcmp(cc: FloatCC, x: Value, y: Value) -> Self {
        Self {
            opcode: Opcode::Fcmp,
            arg: x.into(),
            arg2: y.into(),
            cond: Condition::Float(cc),
            ..Self::default()
        }
    }

    /// An unconditional jump to `target`, passing `args` for its block
    /// parameters.
    pub fn jump(target: Block, args: &[Value]) -> Self {
        Self {
            opcode: Opcode::Jump,
            target: target.into(),
            args: SmallVec::from_slice(args),
            ..Self::default()
        }
    }

    /// A conditional branch (`brz` or `brnz`) on `cond_value`.
    pub fn branch(opcode: Opcode, cond_value: Value, target: Block, args: &[Value]) -> Self {
        debug_assert!(matches!(opcode, Opcode::Brz | Opcode::Brnz));
        Self {
            opcode,
            arg: cond_value.into(),
            target: target.into(),
            args: SmallVec::from_slice(args),
            ..Self::default()
        }
    }

    /// An indirect branch on `index` through `table`, falling back to
    /// `default` when the index is out of range.
    pub fn br_table(index: Value, default: Block, table: Vec<Block>) -> Self {
        Self {
            opcode: Opcode::BrTable,
            arg: index.into(),
            target: default.into(),
            table,
            ..Self::default()
        }
    }

    /// A return, passing `args` as the function results.
    pub fn ret(args: &[Value]) -> Self {
        Self {
            opcode: Opcode::Return,
            args: SmallVec::from_slice(args),
            ..Self::default()
        }
    }

    /// A direct call to the function at `callee_index`, with signature `sig`.
    pub fn call(sig: SigRef, callee_index: u32, args: &[Value]) -> Self {
        Self {
            opcode: Opcode::Call,
            sig: sig.into(),
            imm: u64::from(callee_index),
            args: SmallVec::from_slice(args),
            ..Self::default()
        }
    }

    /// An indirect call through the address `callee`, with signature `sig`.
    pub fn call_indirect(sig: SigRef, callee: Value, args: &[Value]) -> Self {
        Self {
            opcode: Opcode::CallIndirect,
            sig: sig.into(),
            arg: callee.into(),
            args: SmallVec::from_slice(args),
            ..Self::default()
        }
    }

    /// An unconditional trap with the given code.
    pub fn trap(code: u16) -> Self {
        Self {
            opcode: Opcode::Trap,
            imm: u64::from(code),
            ..Self::default()
        }
    }

    /// A conditional trap (`trapz` or `trapnz`) on `cond_value`.
    pub fn trap_if(opcode: Opcode, cond_value: Value, code: u16) -> Self {
        debug_assert!(matches!(opcode, Opcode::Trapz | Opcode::Trapnz));
        Self {
            opcode,
            arg: cond_value.into(),
            imm: u64::from(code),
            ..Self::default()
        }
    }

    /// A load of a `ty` value from `addr + offset`.
    pub fn load(opcode: Opcode, ty: Type, addr: Value, offset: u32) -> Self {
        Self {
            opcode,
            ty,
            arg: addr.into(),
            imm: u64::from(offset),
            ..Self::default()
        }
    }

    /// A store of `value` to `addr + offset`.
    pub fn store(opcode: Opcode, value: Value, addr: Value, offset: u32) -> Self {
        Self {
            opcode,
            ty: types::INVALID,
            arg: value.into(),
            arg2: addr.into(),
            imm: u64::from(offset),
            ..Self::default()
        }
    }

    /// A select of `x` (condition non-zero) or `y` (condition zero).
    pub fn select(ty: Type, cond_value: Value, x: Value, y: Value) -> Self {
        let mut data = Self::binary(Opcode::Select, ty, x, y);
        data.args.push(cond_value);
        data
    }

    /// Iterate over every value this instruction uses: fixed operands first,
    /// then the variadic list.
    pub fn arguments(&self) -> impl Iterator<Item = Value> + '_ {
        self.arg
            .expand()
            .into_iter()
            .chain(self.arg2.expand())
            .chain(self.args.iter().copied())
    }

    /// Apply `map` to every value this instruction uses, in place.
    pub fn map_arguments(&mut self, mut map: impl FnMut(Value) -> Value) {
        if let Some(v) = self.arg.expand() {
            self.arg = map(v).into();
        }
        if let Some(v) = self.arg2.expand() {
            self.arg2 = map(v).into();
        }
        for v in self.args.iter_mut() {
            *v = map(*v);
        }
    }

    /// Iterate over every result value of this instruction.
    pub fn result_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.result
            .expand()
            .into_iter()
            .chain(self.results.iter().copied())
    }

    /// Every block this instruction can branch to: the direct/default target
    /// followed by jump-table entries.
    pub fn branch_destinations(&self) -> impl Iterator<Item = Block> + '_ {
        self.target
            .expand()
            .into_iter()
            .chain(self.table.iter().copied())
    }

    /// Swap `brz` for `brnz` and vice versa, leaving everything else alone.
    ///
    /// This is the only supported way to change the opcode of a branch. It is
    /// involutive.
    pub fn invert_conditional_branch(&mut self) {
        self.opcode = match self.opcode {
            Opcode::Brz => Opcode::Brnz,
            Opcode::Brnz => Opcode::Brz,
            other => panic!("cannot invert non-conditional branch {other}"),
        };
    }
}

impl fmt::Display for InstructionData {
    /// Formats in the textual IR notation, e.g. `v3 = iadd.i32 v1, v2` or
    /// `brz v3, blk1(v4)`. The output is stable: formatting the same record
    /// twice yields identical strings.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(result) = self.result.expand() {
            write!(f, "{result}")?;
            for r in &self.results {
                write!(f, ", {r}")?;
            }
            write!(f, " = ")?;
        }
        write!(f, "{}", self.opcode)?;
        match self.cond {
            Condition::None => {}
            Condition::Int(cc) => write!(f, " {cc}")?,
            Condition::Float(cc) => write!(f, " {cc}")?,
        }
        if self.ty.is_valid() && self.cond == Condition::None {
            write!(f, ".{}", self.ty)?;
        }
        let mut sep = " ";
        if matches!(self.opcode, Opcode::Iconst) {
            write!(f, " {:#x}", self.imm)?;
            sep = ", ";
        } else if matches!(self.opcode, Opcode::F32const) {
            write!(f, " {}", f32::from_bits(self.imm as u32))?;
            sep = ", ";
        } else if matches!(self.opcode, Opcode::F64const) {
            write!(f, " {}", f64::from_bits(self.imm))?;
            sep = ", ";
        }
        for v in self.arg.expand().into_iter().chain(self.arg2.expand()) {
            write!(f, "{sep}{v}")?;
            sep = ", ";
        }
        if let Some(target) = self.target.expand() {
            write!(f, "{sep}{target}")?;
            if !self.args.is_empty() {
                write!(f, "(")?;
                for (i, v) in self.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")?;
            }
            if !self.table.is_empty() {
                write!(f, ", [")?;
                for (i, b) in self.table.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{b}")?;
                }
                write!(f, "]")?;
            }
        } else if !self.args.is_empty() {
            for v in &self.args {
                write!(f, "{sep}{v}")?;
                sep = ", ";
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::I32;
    use cranelift_entity::EntityRef;

    fn v(n: usize) -> Value {
        Value::new(n)
    }

    #[test]
    fn opcode_classification() {
        assert!(Opcode::Brz.is_branch());
        assert!(!Opcode::Brz.is_terminator());
        assert!(Opcode::Jump.is_terminator());
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::Store.has_side_effects());
        assert!(!Opcode::Iadd.has_side_effects());
        assert!(!Opcode::Load.has_side_effects());
        assert!(Opcode::Iadd.produces_result());
        assert!(!Opcode::Store.produces_result());
        assert!(Opcode::Call.produces_result());
    }

    #[test]
    fn inversion_is_involutive() {
        let mut data = InstructionData::branch(Opcode::Brz, v(1), Block::new(2), &[]);
        data.invert_conditional_branch();
        assert_eq!(data.opcode, Opcode::Brnz);
        data.invert_conditional_branch();
        assert_eq!(data.opcode, Opcode::Brz);
    }

    #[test]
    fn display_is_stable() {
        let mut data = InstructionData::binary(Opcode::Iadd, I32, v(1), v(2));
        data.result = v(3).into();
        let first = data.to_string();
        assert_eq!(first, "v3 = iadd.i32 v1, v2");
        assert_eq!(first, data.to_string());

        let br = InstructionData::branch(Opcode::Brz, v(3), Block::new(1), &[v(4), v(5)]);
        assert_eq!(br.to_string(), "brz v3, blk1(v4, v5)");

        let k = InstructionData::iconst(I32, 0x4d2);
        assert_eq!(k.to_string(), "iconst.i32 0x4d2");
    }

    #[test]
    fn arguments_cover_fixed_and_variadic() {
        let data = InstructionData::select(I32, v(9), v(1), v(2));
        let args: Vec<Value> = data.arguments().collect();
        assert_eq!(args, vec![v(1), v(2), v(9)]);
    }

    #[test]
    fn map_arguments_rewrites_all_positions() {
        let mut data = InstructionData::branch(Opcode::Brnz, v(1), Block::new(0), &[v(2), v(1)]);
        data.map_arguments(|val| if val == v(1) { v(7) } else { val });
        let args: Vec<Value> = data.arguments().collect();
        assert_eq!(args, vec![v(7), v(2), v(7)]);
    }
}
