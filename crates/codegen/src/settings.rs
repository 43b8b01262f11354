//! Shared compilation settings.
//!
//! The settings surface is intentionally small: everything a front-end can
//! configure about this backend today fits in [`Flags`]. Keeping the flags in
//! one plain struct (rather than threading individual booleans through every
//! pass) matches how the passes and the machine backend consume them.

use core::fmt;
use core::str::FromStr;

/// Optimization level for generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    /// Straight-line compilation: blocks laid out in reverse postorder,
    /// fallthrough elision only.
    None,
    /// Frequency-driven block layout and conditional-branch inversion.
    Speed,
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Speed => "speed",
        })
    }
}

impl FromStr for OptLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "speed" => Ok(Self::Speed),
            _ => Err(()),
        }
    }
}

/// Flags controlling compilation, shared by all passes and backends.
#[derive(Clone, Copy, Debug)]
pub struct Flags {
    opt_level: OptLevel,
}

impl Flags {
    /// Create flags with the given optimization level.
    pub fn new(opt_level: OptLevel) -> Self {
        Self { opt_level }
    }

    /// The selected optimization level.
    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new(OptLevel::Speed)
    }
}
