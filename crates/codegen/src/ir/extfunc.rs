//! Function signatures.
//!
//! Call instructions reference a declared [`Signature`] through a `SigRef`.
//! Signatures are immutable after declaration, so they can be cloned into
//! other compiler instances freely.

use crate::ir::types::Type;
use core::fmt;

/// The parameter and result types of a callable function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    /// Parameter types, in order.
    pub params: Vec<Type>,
    /// Result types, in order.
    pub returns: Vec<Type>,
    /// Whether any instruction kept after dead-code elimination references
    /// this signature. Consumed by the code-generation metadata emitter.
    pub used: bool,
}

impl Signature {
    /// A signature with the given parameter and result types.
    pub fn new(params: Vec<Type>, returns: Vec<Type>) -> Self {
        Self {
            params,
            returns,
            used: false,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ")")?;
        if !self.returns.is_empty() {
            write!(f, " -> ")?;
            for (i, ty) in self.returns.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{ty}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{F64, I32, I64};

    #[test]
    fn display() {
        assert_eq!(Signature::new(vec![], vec![]).to_string(), "()");
        assert_eq!(
            Signature::new(vec![I32, I64], vec![F64]).to_string(),
            "(i32, i64) -> f64"
        );
        assert_eq!(
            Signature::new(vec![], vec![I32, I32]).to_string(),
            "() -> i32, i32"
        );
    }
}
