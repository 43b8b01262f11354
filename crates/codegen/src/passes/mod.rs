//! The transformation-pass pipeline.
//!
//! The order is fixed because each pass depends on its predecessors:
//! dead-block elimination first so later passes see only reachable blocks;
//! redundant-phi elimination before dominators so collapsed parameters don't
//! distort the CFG walk; dominators (with loop detection) before DCE so the
//! traversal order is available; DCE before frequency/layout so edge
//! heuristics and virtual-register assignment see only surviving code.

mod dce;
mod dead_blocks;
mod domtree;
mod frequency;
mod layout;
mod redundant_phi;

use crate::result::CodegenResult;
use crate::ssa::SsaBuilder;

/// Run all passes over `f`, in order.
pub fn run(f: &mut SsaBuilder) -> CodegenResult<()> {
    dead_blocks::run(f);
    redundant_phi::run(f);
    domtree::run(f)?;
    dce::run(f);
    frequency::run(f);
    layout::run(f)?;
    log::debug!(
        "passes complete: {} blocks laid out\n{}",
        f.layout_order().len(),
        f.display()
    );
    Ok(())
}
