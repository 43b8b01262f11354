//! Block layout.
//!
//! Three duties. First, critical-edge splitting: any conditional
//! (non-terminal) branch into a block with more than one predecessor is
//! routed through a fresh trampoline block that carries the argument-passing
//! jump, so that after this pass every branch into a multi-predecessor block
//! is the terminal branch of its source block. Second, the emission order:
//! chains are grown from the reverse postorder by following each block's
//! terminal jump, so the jump target becomes the next block laid out and can
//! be elided as a fallthrough. Third, at `OptLevel::Speed`, conditional
//! branches are inverted (`brz` ↔ `brnz`, targets swapped) when that keeps
//! the hotter edge as the fallthrough.

use crate::ir::{Block, BlockPredecessor, Inst, InstructionData, Opcode};
use crate::result::CodegenResult;
use crate::settings::OptLevel;
use crate::ssa::SsaBuilder;
use cranelift_entity::EntityRef;
use smallvec::SmallVec;

pub(super) fn run(f: &mut SsaBuilder) -> CodegenResult<()> {
    split_critical_edges(f)?;
    order_blocks(f);
    Ok(())
}

fn split_critical_edges(f: &mut SsaBuilder) -> CodegenResult<()> {
    let blocks: Vec<Block> = f.blocks().collect();
    for &block in &blocks {
        if f.blocks[block].preds.len() <= 1 {
            continue;
        }
        for pi in 0..f.blocks[block].preds.len() {
            let pred = f.blocks[block].preds[pi];
            let pred_tail = f.blocks[pred.block]
                .tail
                .expand()
                .expect("predecessor block with no terminator");
            if pred.branch == pred_tail {
                continue;
            }
            split_edge(f, block, pi, pred);
        }
    }
    Ok(())
}

/// Insert a trampoline block on the edge `pred.branch -> block`.
fn split_edge(f: &mut SsaBuilder, block: Block, pred_index: usize, pred: BlockPredecessor) {
    let tramp = f.create_block();
    log::trace!(
        "splitting critical edge {} -> {block} through {tramp}",
        pred.block
    );

    // The trampoline holds the argument-passing jump.
    let args: SmallVec<[crate::ir::Value; 4]> =
        core::mem::take(&mut f.insts[pred.branch].args);
    let jump = f.make_inst(InstructionData::jump(block, &args));
    f.insts[jump].live = true;
    {
        let data = &mut f.blocks[tramp];
        data.root = jump.into();
        data.tail = jump.into();
        data.sealed = true;
        data.single_pred = pred.block.into();
        data.preds.push(pred);
        data.succs.push(block);
    }
    f.blocks[tramp].frequency = f.blocks[block].frequency;

    // Retarget the conditional branch and rewire the edges.
    f.insts[pred.branch].target = tramp.into();
    f.blocks[block].preds[pred_index] = BlockPredecessor::new(tramp, jump);
    let succs = &mut f.blocks[pred.block].succs;
    let slot = succs
        .iter()
        .position(|&s| s == block)
        .expect("successor list out of sync with branch targets");
    succs[slot] = tramp;
}

fn order_blocks(f: &mut SsaBuilder) {
    let speed = f.flags().opt_level() == OptLevel::Speed;
    let num = f.num_blocks();
    let mut placed = vec![false; num];
    let mut order: Vec<Block> = Vec::with_capacity(num);

    let mut chain = |f: &mut SsaBuilder, seed: Block, placed: &mut [bool], order: &mut Vec<Block>| {
        let mut b = seed;
        while !placed[b.index()] {
            placed[b.index()] = true;
            order.push(b);
            match next_fallthrough(f, b, placed, speed) {
                Some(next) => b = next,
                None => break,
            }
        }
    };

    let rpo = f.rpo.clone();
    for &seed in &rpo {
        chain(f, seed, &mut placed, &mut order);
    }
    // Trampolines were created after the dominator pass and are not in the
    // reverse postorder; pick them up here.
    for index in 0..num {
        let block = Block::new(index);
        if !placed[index] && !f.blocks[block].invalid && f.blocks[block].root.is_some() {
            chain(f, block, &mut placed, &mut order);
        }
    }
    f.layout = order;
}

/// The block to lay out directly after `block`, following (and possibly
/// inverting) its terminal jump.
fn next_fallthrough(
    f: &mut SsaBuilder,
    block: Block,
    placed: &[bool],
    speed: bool,
) -> Option<Block> {
    let tail = f.blocks[block].tail.expand()?;
    if f.insts[tail].opcode != Opcode::Jump {
        return None;
    }
    if speed {
        let br1 = f.insts[tail]
            .prev
            .expand()
            .filter(|&p| matches!(f.insts[p].opcode, Opcode::Brz | Opcode::Brnz));
        if let Some(br1) = br1 {
            let jump_target = f.insts[tail].target.expand().unwrap();
            let cond_target = f.insts[br1].target.expand().unwrap();
            let profitable = placed[jump_target.index()]
                || f.blocks[cond_target].frequency > f.blocks[jump_target].frequency;
            // Inverting would point the conditional branch at the old jump
            // target; that is only legal toward a single-predecessor block
            // (conditional branches into joins were just split away).
            let legal = cond_target != jump_target
                && !placed[cond_target.index()]
                && f.blocks[jump_target].preds.len() == 1
                && f.insts[tail].args.is_empty();
            if profitable && legal {
                invert_branches(f, block, br1, tail);
            }
        }
    }
    let target = f.insts[tail].target.expand().unwrap();
    (!placed[target.index()]).then_some(target)
}

/// Swap the roles of the conditional branch `br1` and the terminal jump
/// `br0` of `block`: the condition is inverted and the two targets (and
/// argument lists) trade places.
fn invert_branches(f: &mut SsaBuilder, block: Block, br1: Inst, br0: Inst) {
    let t1 = f.insts[br1].target.expand().unwrap();
    let t0 = f.insts[br0].target.expand().unwrap();
    debug_assert_ne!(t1, t0);
    log::trace!("{block}: inverting conditional branch, fallthrough becomes {t1}");

    f.insts[br1].invert_conditional_branch();
    f.insts[br1].target = t0.into();
    f.insts[br0].target = t1.into();
    let args1 = core::mem::take(&mut f.insts[br1].args);
    let args0 = core::mem::take(&mut f.insts[br0].args);
    f.insts[br1].args = args0;
    f.insts[br0].args = args1;

    for p in f.blocks[t1].preds.iter_mut() {
        if p.branch == br1 {
            p.branch = br0;
        }
    }
    for p in f.blocks[t0].preds.iter_mut() {
        if p.branch == br0 {
            p.branch = br1;
        }
    }
}
