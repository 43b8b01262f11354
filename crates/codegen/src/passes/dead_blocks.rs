//! Dead-block elimination.
//!
//! Depth-first traversal from the entry marking reachable blocks; everything
//! unreached is flagged invalid, which removes it from all subsequent
//! iterators. Records stay in the pool so block numbers remain stable until
//! the next reset. Predecessor edges coming *from* dead blocks are pruned so
//! later passes never see definitions flowing out of unreachable code.
//!
//! Running this pass twice is a no-op the second time.

use crate::ir::Block;
use crate::ssa::SsaBuilder;
use cranelift_entity::EntityRef;

pub(super) fn run(f: &mut SsaBuilder) {
    if f.num_blocks() == 0 {
        return;
    }
    let mut reachable = vec![false; f.num_blocks()];
    let mut stack = vec![f.entry_block()];
    reachable[f.entry_block().index()] = true;
    while let Some(block) = stack.pop() {
        for i in 0..f.blocks[block].succs.len() {
            let succ = f.blocks[block].succs[i];
            if !reachable[succ.index()] {
                reachable[succ.index()] = true;
                stack.push(succ);
            }
        }
    }

    let mut removed = 0;
    for index in 0..f.num_blocks() {
        let block = Block::new(index);
        if reachable[index] {
            // Drop edges that originate in unreachable code.
            f.blocks[block]
                .preds
                .retain(|p| reachable[p.block.index()]);
        } else if !f.blocks[block].invalid {
            f.blocks[block].invalid = true;
            removed += 1;
        }
    }
    if removed > 0 {
        log::trace!("dead-block elimination removed {removed} blocks");
    }
}
