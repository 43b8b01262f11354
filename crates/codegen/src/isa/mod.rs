//! Target ISA backends.
//!
//! Every target implements [`MachBackend`](crate::machinst::MachBackend);
//! the compiler is target-independent above that seam. Use [`lookup`] to
//! obtain the backend for a triple.

pub mod aarch64;

use crate::machinst::MachBackend;
use core::fmt;
use target_lexicon::{Architecture, Triple};

/// Describes a failure to look up a backend for a triple.
#[derive(Debug, PartialEq, Eq)]
pub enum LookupError {
    /// There is no backend for this architecture.
    Unsupported(Architecture),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::Unsupported(arch) => {
                write!(f, "no supported backend for architecture '{arch}'")
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Look up the backend for `triple`.
pub fn lookup(triple: Triple) -> Result<Box<dyn MachBackend>, LookupError> {
    match triple.architecture {
        Architecture::Aarch64(_) => Ok(Box::new(aarch64::AArch64Backend::new(triple))),
        arch => Err(LookupError::Unsupported(arch)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aarch64_resolves() {
        let backend = lookup("aarch64".parse().unwrap()).unwrap();
        assert_eq!(backend.name(), "aarch64");
    }

    #[test]
    fn other_architectures_do_not() {
        let err = lookup("x86_64".parse().unwrap()).unwrap_err();
        assert!(matches!(err, LookupError::Unsupported(_)));
    }
}
