//! Block-frequency estimation.
//!
//! Heuristic edge weights: a unique successor gets weight 10; a conditional
//! pair puts 10 on the fallthrough edge (the terminal jump's target) and 1
//! on the conditional side, except that a back edge into a detected loop
//! header wins over fallthrough. Jump-table edges all weigh 1. Frequencies
//! then iterate from `entry = 1` toward a fixed point of
//! `freq(b) = Σ freq(p) · weight(p→b)`.
//!
//! On cyclic graphs that recurrence has no finite fixed point, so the
//! iteration saturates and stops after a bounded number of rounds; acyclic
//! graphs converge and short-circuit earlier.

use crate::ir::{Block, Inst, Opcode};
use crate::ssa::SsaBuilder;
use rustc_hash::FxHashMap;

/// Weight of a preferred (fallthrough or back-edge) edge.
const HOT: u64 = 10;
/// Weight of the unpreferred side of a conditional.
const COLD: u64 = 1;
/// Bound on the fixed-point iteration; see the module comment. Sixteen
/// rounds keep the weights of a divergent loop nest within `u64`, so
/// relative ordering between blocks stays meaningful for layout.
const MAX_ROUNDS: usize = 16;

pub(super) fn run(f: &mut SsaBuilder) {
    // Weight every branch edge. Each branch instruction has one direct
    // target, so (branch, weight) pairs cover everything except jump
    // tables, which uniformly weigh 1.
    let mut weights: FxHashMap<Inst, u64> = FxHashMap::default();
    let blocks: Vec<Block> = f.blocks().collect();
    for &block in &blocks {
        let Some(tail) = f.blocks[block].tail.expand() else {
            continue;
        };
        if !f.insts[tail].opcode.is_branch() {
            continue;
        }
        let cond = f.insts[tail]
            .prev
            .expand()
            .filter(|&p| matches!(f.insts[p].opcode, Opcode::Brz | Opcode::Brnz));
        match cond {
            None => {
                // A unique successor (or a jump table, where every entry
                // stays at weight 1).
                if f.insts[tail].opcode == Opcode::Jump {
                    weights.insert(tail, HOT);
                }
            }
            Some(br1) => {
                let jump_target = f.insts[tail].target.expand();
                let cond_target = f.insts[br1].target.expand();
                let is_back_edge = |target: Option<Block>| match target {
                    Some(t) => f.blocks[t].loop_header && f.is_dominated_by(block, t),
                    None => false,
                };
                if is_back_edge(cond_target) && !is_back_edge(jump_target) {
                    weights.insert(br1, HOT);
                    weights.insert(tail, COLD);
                } else {
                    weights.insert(tail, HOT);
                    weights.insert(br1, COLD);
                }
            }
        }
    }

    // Iterate to a (saturating) fixed point.
    let entry = f.entry_block();
    for &block in &blocks {
        f.blocks[block].frequency = u64::from(block == entry);
    }
    for round in 0..MAX_ROUNDS {
        let mut changed = false;
        for &block in &blocks {
            if block == entry {
                continue;
            }
            let mut freq = 0u64;
            for i in 0..f.blocks[block].preds.len() {
                let pred = f.blocks[block].preds[i];
                let weight = weights.get(&pred.branch).copied().unwrap_or(COLD);
                freq = freq
                    .saturating_add(f.blocks[pred.block].frequency.saturating_mul(weight));
            }
            if f.blocks[block].frequency != freq {
                f.blocks[block].frequency = freq;
                changed = true;
            }
        }
        if !changed {
            log::trace!("block frequencies converged after {} rounds", round + 1);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, types::I32};
    use crate::settings::Flags;

    #[test]
    fn fallthrough_side_of_a_conditional_is_hot() {
        let mut f = SsaBuilder::new(Flags::default());
        let blk0 = f.create_block();
        let cold = f.create_block();
        let hot = f.create_block();

        f.switch_to_block(blk0);
        f.seal_block(blk0).unwrap();
        let k = f.ins(InstructionData::iconst(I32, 1)).unwrap();
        let kv = f.first_result(k);
        f.ins(InstructionData::branch(Opcode::Brz, kv, cold, &[]))
            .unwrap();
        f.ins(InstructionData::jump(hot, &[])).unwrap();

        for b in [cold, hot] {
            f.switch_to_block(b);
            f.seal_block(b).unwrap();
            f.ins(InstructionData::ret(&[])).unwrap();
        }

        run(&mut f);

        assert_eq!(f.block(blk0).frequency, 1);
        assert_eq!(f.block(hot).frequency, 10);
        assert_eq!(f.block(cold).frequency, 1);
    }

    #[test]
    fn back_edge_to_loop_header_beats_fallthrough() {
        // blk0 -> header; header: brnz latch / jump done1;
        // latch: brnz header (back edge) / jump done2.
        let mut f = SsaBuilder::new(Flags::default());
        let blk0 = f.create_block();
        let header = f.create_block();
        let latch = f.create_block();
        let done1 = f.create_block();
        let done2 = f.create_block();

        f.switch_to_block(blk0);
        f.seal_block(blk0).unwrap();
        f.ins(InstructionData::jump(header, &[])).unwrap();

        f.switch_to_block(header);
        let k = f.ins(InstructionData::iconst(I32, 1)).unwrap();
        let kv = f.first_result(k);
        f.ins(InstructionData::branch(Opcode::Brnz, kv, latch, &[]))
            .unwrap();
        f.ins(InstructionData::jump(done1, &[])).unwrap();

        f.switch_to_block(latch);
        f.seal_block(latch).unwrap();
        let k2 = f.ins(InstructionData::iconst(I32, 0)).unwrap();
        let kv2 = f.first_result(k2);
        f.ins(InstructionData::branch(Opcode::Brnz, kv2, header, &[]))
            .unwrap();
        f.seal_block(header).unwrap();
        f.ins(InstructionData::jump(done2, &[])).unwrap();

        for b in [done1, done2] {
            f.switch_to_block(b);
            f.seal_block(b).unwrap();
            f.ins(InstructionData::ret(&[])).unwrap();
        }

        // Loop detection feeds the back-edge preference.
        super::super::domtree::run(&mut f).unwrap();
        run(&mut f);

        // The latch's conditional branch is the back edge, so it takes the
        // hot weight and the latch's jump to done2 takes the cold one. The
        // header's own fallthrough (done1) keeps the hot side.
        assert!(f.block(done1).frequency > f.block(done2).frequency);
        assert!(f.block(header).frequency > f.block(blk0).frequency);
    }
}
