//! Egret IR entity references.
//!
//! Instructions in the IR need to reference other entities in the function:
//! SSA values, basic blocks, signatures. These references are not Rust
//! references, both because the ownership rules make that impractical and
//! because 64-bit pointers take up a lot of space. Instead every entity is a
//! struct wrapping a `u32` number into a pool or table owned by the builder.
//! There is a separate index type for each entity, so we don't lose type
//! safety.
//!
//! The entity references all implement `Display` in a way that matches the
//! textual IR format.

use cranelift_entity::entity_impl;

/// An opaque reference to a basic block in a function.
///
/// The entry block is always block 0. While the numbering is stable, it is
/// assigned in creation order and does not necessarily resemble the final
/// layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "blk");

/// An opaque reference to an SSA value.
///
/// Two values compare equal iff their numbers match. The type of a value is
/// set when it is allocated and never changes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction in a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a front-end variable.
///
/// Variables never appear in SSA instructions; they exist only during SSA
/// construction so the front-end can say "the current value of variable `v`"
/// without knowing which block parameter supplies it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(u32);
entity_impl!(Variable, "var");

/// An opaque reference to a declared function signature.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn display_matches_ir_notation() {
        assert_eq!(Block::new(0).to_string(), "blk0");
        assert_eq!(Value::new(3).to_string(), "v3");
        assert_eq!(Inst::new(17).to_string(), "inst17");
        assert_eq!(SigRef::new(1).to_string(), "sig1");
    }
}
