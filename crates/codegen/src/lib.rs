//! Egret code generator.
//!
//! This crate is the compiler tier of the Egret WebAssembly engine. The
//! engine's translator builds a function in block-argument SSA form through
//! [`ssa::SsaBuilder`], runs the transformation passes, and hands the result
//! to a target backend obtained from [`isa::lookup`]:
//!
//! ```
//! use egret_codegen::ir::InstructionData;
//! use egret_codegen::settings::Flags;
//! use egret_codegen::ssa::SsaBuilder;
//! use egret_codegen::{isa, machinst};
//!
//! let mut f = SsaBuilder::new(Flags::default());
//! let blk0 = f.create_block();
//! f.switch_to_block(blk0);
//! f.seal_block(blk0).unwrap();
//! f.ins(InstructionData::ret(&[])).unwrap();
//! f.run_passes().unwrap();
//!
//! let mut backend = isa::lookup("aarch64".parse().unwrap()).unwrap();
//! let code = machinst::compile(&f, backend.as_mut()).unwrap();
//! assert_eq!(code.format(), "L1 (SSA Block: blk0):\n\tret\n");
//! ```
//!
//! Compilation is single-threaded per builder instance; create one builder
//! (and one backend) per thread to compile functions in parallel. `reset`
//! recycles both without reallocating.

#![warn(missing_docs)]

pub mod ir;
pub mod isa;
pub mod machinst;
mod passes;
pub mod pool;
mod result;
pub mod settings;
pub mod ssa;

pub use crate::result::{CodegenError, CodegenResult, CompileError};
