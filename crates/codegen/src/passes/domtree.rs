//! Immediate-dominator computation and loop detection.
//!
//! First a reverse postorder of the reachable CFG is computed with an
//! iterative two-state depth-first walk (a block is pushed once to expand
//! its successors and revisited once they are done). Then immediate
//! dominators are computed with the Cooper-Harvey-Kennedy iterative
//! algorithm: in reverse postorder, each block's dominator estimate is the
//! intersection of its already-processed predecessors, where `intersect`
//! walks the deeper finger upward by RPO number; iterate until nothing
//! changes. Reducible graphs converge after one round.
//!
//! The loop-detection sub-pass then marks a block as a loop header whenever
//! one of its predecessors is dominated by it (a back edge).

use crate::ir::Block;
use crate::result::{CodegenError, CodegenResult};
use crate::ssa::SsaBuilder;
use cranelift_entity::EntityRef;
use cranelift_entity::packed_option::PackedOption;

/// DFS states used while computing the postorder.
const SEEN: u32 = 1;
const DONE: u32 = 2;

pub(super) fn run(f: &mut SsaBuilder) -> CodegenResult<()> {
    compute_postorder(f)?;
    compute_idoms(f);
    detect_loops(f);
    Ok(())
}

fn compute_postorder(f: &mut SsaBuilder) -> CodegenResult<()> {
    let num = f.num_blocks();
    let mut state = vec![0u32; num];
    let mut postorder: Vec<Block> = Vec::with_capacity(num);
    let mut stack = vec![f.entry_block()];
    state[f.entry_block().index()] = SEEN;

    while let Some(block) = stack.pop() {
        match state[block.index()] {
            SEEN => {
                // First visit: revisit after the successors are done.
                state[block.index()] = DONE;
                stack.push(block);
                // Push in reverse so the first successor is processed first,
                // keeping the resulting order deterministic.
                for i in (0..f.blocks[block].succs.len()).rev() {
                    let succ = f.blocks[block].succs[i];
                    if state[succ.index()] == 0 {
                        state[succ.index()] = SEEN;
                        stack.push(succ);
                    }
                }
            }
            DONE => postorder.push(block),
            _ => unreachable!("block on stack without a DFS state"),
        }
    }

    f.rpo.clear();
    f.rpo.extend(postorder.iter().rev());
    for (i, &block) in f.rpo.iter().enumerate() {
        f.blocks[block].rpo_number = u32::try_from(i).map_err(|_| {
            CodegenError::UnsupportedCfg {
                block,
                reason: "too many blocks",
            }
        })?;
    }
    Ok(())
}

fn compute_idoms(f: &mut SsaBuilder) {
    let num = f.num_blocks();
    f.idom.clear();
    f.idom.resize(num, PackedOption::default());

    let entry = f.entry_block();
    f.idom[entry.index()] = entry.into();

    let rpo: Vec<Block> = f.rpo.clone();
    let mut changed = true;
    while changed {
        changed = false;
        for &block in rpo.iter().skip(1) {
            // The RPO guarantees at least one predecessor is processed
            // before this block.
            let mut new_idom: Option<Block> = None;
            for i in 0..f.blocks[block].preds.len() {
                let pred = f.blocks[block].preds[i].block;
                if f.idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(cur) => intersect(f, cur, pred),
                });
            }
            let new_idom =
                new_idom.expect("reachable non-entry block with no processed predecessor");
            if f.idom[block.index()].expand() != Some(new_idom) {
                f.idom[block.index()] = new_idom.into();
                changed = true;
            }
        }
    }
}

/// Walk both fingers upward until they meet; the deeper one (higher RPO
/// number) moves first.
fn intersect(f: &SsaBuilder, mut a: Block, mut b: Block) -> Block {
    while a != b {
        while f.blocks[a].rpo_number > f.blocks[b].rpo_number {
            a = f.idom[a.index()].expand().expect("unreachable finger");
        }
        while f.blocks[b].rpo_number > f.blocks[a].rpo_number {
            b = f.idom[b.index()].expand().expect("unreachable finger");
        }
    }
    a
}

fn detect_loops(f: &mut SsaBuilder) {
    let rpo: Vec<Block> = f.rpo.clone();
    for &block in &rpo {
        for i in 0..f.blocks[block].preds.len() {
            let pred = f.blocks[block].preds[i].block;
            if f.is_dominated_by(pred, block) {
                log::trace!("{block} is a loop header (back edge from {pred})");
                f.blocks[block].loop_header = true;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, Opcode, types::I32};
    use crate::settings::Flags;

    fn cond_value(f: &mut SsaBuilder) -> crate::ir::Value {
        let k = f.ins(InstructionData::iconst(I32, 1)).unwrap();
        f.first_result(k)
    }

    /// The diamond: 0 -> {1, 2} -> 3. Every block is dominated only by the
    /// entry; no loop headers.
    #[test]
    fn diamond() {
        let mut f = SsaBuilder::new(Flags::default());
        let blk0 = f.create_block();
        let blk1 = f.create_block();
        let blk2 = f.create_block();
        let blk3 = f.create_block();

        f.switch_to_block(blk0);
        f.seal_block(blk0).unwrap();
        let c = cond_value(&mut f);
        f.ins(InstructionData::branch(Opcode::Brz, c, blk1, &[]))
            .unwrap();
        f.ins(InstructionData::jump(blk2, &[])).unwrap();

        f.switch_to_block(blk1);
        f.seal_block(blk1).unwrap();
        f.ins(InstructionData::jump(blk3, &[])).unwrap();

        f.switch_to_block(blk2);
        f.seal_block(blk2).unwrap();
        f.ins(InstructionData::jump(blk3, &[])).unwrap();

        f.switch_to_block(blk3);
        f.seal_block(blk3).unwrap();
        f.ins(InstructionData::ret(&[])).unwrap();

        run(&mut f).unwrap();

        assert_eq!(f.idom(blk0), Some(blk0));
        assert_eq!(f.idom(blk1), Some(blk0));
        assert_eq!(f.idom(blk2), Some(blk0));
        assert_eq!(f.idom(blk3), Some(blk0));

        for b in [blk0, blk1, blk2, blk3] {
            assert!(f.is_dominated_by(b, b));
            assert!(f.is_dominated_by(b, blk0));
            assert!(!f.block(b).loop_header);
        }
        assert!(!f.is_dominated_by(blk3, blk1));
        assert_eq!(f.rpo()[0], blk0);
        assert_eq!(*f.rpo().last().unwrap(), blk3);
    }

    #[test]
    fn loop_header_is_detected() {
        let mut f = SsaBuilder::new(Flags::default());
        let blk0 = f.create_block();
        let blk1 = f.create_block();
        let blk2 = f.create_block();
        let blk3 = f.create_block();

        f.switch_to_block(blk0);
        f.seal_block(blk0).unwrap();
        f.ins(InstructionData::jump(blk1, &[])).unwrap();

        // blk1 is the header: blk2 branches back to it.
        f.switch_to_block(blk1);
        let c = cond_value(&mut f);
        f.ins(InstructionData::branch(Opcode::Brnz, c, blk2, &[]))
            .unwrap();
        f.ins(InstructionData::jump(blk3, &[])).unwrap();

        f.switch_to_block(blk2);
        f.seal_block(blk2).unwrap();
        f.ins(InstructionData::jump(blk1, &[])).unwrap();
        f.seal_block(blk1).unwrap();

        f.switch_to_block(blk3);
        f.seal_block(blk3).unwrap();
        f.ins(InstructionData::ret(&[])).unwrap();

        run(&mut f).unwrap();

        assert!(f.block(blk1).loop_header);
        assert!(!f.block(blk0).loop_header);
        assert!(!f.block(blk2).loop_header);
        assert!(!f.block(blk3).loop_header);
        assert_eq!(f.idom(blk2), Some(blk1));
        assert_eq!(f.idom(blk3), Some(blk1));
        assert!(f.is_dominated_by(blk2, blk1));
        assert!(!f.is_dominated_by(blk1, blk2));
    }
}
