//! Redundant block-parameter elimination.
//!
//! Incremental SSA construction inserts a block parameter wherever a read
//! crosses a join, even when every predecessor ends up supplying the same
//! value (or the parameter itself, through a loop back-edge). Such a
//! parameter is redundant: it is removed, the argument is dropped from every
//! predecessor branch, and an alias from the parameter value to its single
//! real source is registered with the builder. The alias map is applied to
//! live instructions exactly once, during dead-code elimination.
//!
//! Removing one parameter can make another redundant (chains of loop
//! parameters), so the pass iterates to a fixed point; a second invocation
//! is a no-op.

use crate::ir::{Block, Value};
use crate::ssa::SsaBuilder;
use smallvec::SmallVec;

pub(super) fn run(f: &mut SsaBuilder) {
    let mut rounds = 0;
    loop {
        let mut changed = false;
        let blocks: SmallVec<[Block; 16]> = f.blocks().collect();
        for &block in &blocks {
            if block == f.entry_block() {
                continue;
            }
            changed |= eliminate_in_block(f, block);
        }
        rounds += 1;
        if !changed {
            break;
        }
    }
    log::trace!("redundant-phi elimination converged after {rounds} rounds");
}

/// Remove every redundant parameter of `block`. Returns whether anything
/// changed.
fn eliminate_in_block(f: &mut SsaBuilder, block: Block) -> bool {
    // Find redundant parameter positions first, then rewrite, so argument
    // indices stay aligned while scanning.
    let mut redundant: SmallVec<[(usize, Value, Value); 4]> = SmallVec::new();
    for (i, param) in f.blocks[block].params.iter().enumerate() {
        let param_value = param.value;
        let mut source: Option<Value> = None;
        let mut distinct = 0;
        for pred in &f.blocks[block].preds {
            let arg = f.resolve_alias(f.insts[pred.branch].args[i]);
            if arg == param_value {
                // Self-reference through an unconditional back edge.
                continue;
            }
            if source != Some(arg) {
                distinct += 1;
                source = Some(arg);
            }
            if distinct > 1 {
                break;
            }
        }
        if distinct > 1 {
            continue;
        }
        let source = source.unwrap_or_else(|| {
            panic!("{param_value} in {block} has only self-referential sources")
        });
        redundant.push((i, param_value, source));
    }

    if redundant.is_empty() {
        return false;
    }

    // Highest index first, so earlier removals don't shift later ones.
    for &(i, param_value, source) in redundant.iter().rev() {
        log::trace!("{block}: parameter {param_value} is redundant, aliasing to {source}");
        let preds: SmallVec<[crate::ir::Inst; 4]> =
            f.blocks[block].preds.iter().map(|p| p.branch).collect();
        for branch in preds {
            f.insts[branch].args.remove(i);
        }
        f.blocks[block].params.remove(i);
        f.aliases.insert(param_value, source);
    }
    true
}
