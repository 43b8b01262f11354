//! SSA-construction and pass-pipeline invariants, checked over a function
//! with joins, a loop, and dead code.

use egret_codegen::ir::condcodes::IntCC;
use egret_codegen::ir::types::I32;
use egret_codegen::ir::{Block, InstructionData, Opcode, Variable};
use egret_codegen::settings::Flags;
use egret_codegen::ssa::SsaBuilder;

/// Build: entry with a parameter; a diamond whose arms define a variable
/// differently; a loop that accumulates it; some dead instructions; return.
fn build_sample() -> (SsaBuilder, Vec<Block>, Variable) {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    let then_block = f.create_block();
    let else_block = f.create_block();
    let join = f.create_block();
    let header = f.create_block();
    let exit = f.create_block();
    let dead = f.create_block();
    let x = f.declare_var(I32);

    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let p = f.append_block_param(blk0, I32);
    // Dead: never used by anything live.
    f.ins(InstructionData::binary(Opcode::Imul, I32, p, p))
        .unwrap();
    f.ins(InstructionData::branch(Opcode::Brz, p, then_block, &[]))
        .unwrap();
    f.ins(InstructionData::jump(else_block, &[])).unwrap();

    f.switch_to_block(then_block);
    f.seal_block(then_block).unwrap();
    let k1 = f.ins(InstructionData::iconst(I32, 1)).unwrap();
    f.def_var(x, f.first_result(k1));
    f.ins(InstructionData::jump(join, &[])).unwrap();

    f.switch_to_block(else_block);
    f.seal_block(else_block).unwrap();
    let k2 = f.ins(InstructionData::iconst(I32, 2)).unwrap();
    f.def_var(x, f.first_result(k2));
    f.ins(InstructionData::jump(join, &[])).unwrap();

    f.switch_to_block(join);
    f.seal_block(join).unwrap();
    f.ins(InstructionData::jump(header, &[])).unwrap();

    f.switch_to_block(header);
    let cur = f.use_var(x).unwrap();
    let bump = f
        .ins(InstructionData::binary(Opcode::Iadd, I32, cur, p))
        .unwrap();
    f.def_var(x, f.first_result(bump));
    let limit = f.ins(InstructionData::iconst(I32, 100)).unwrap();
    let cmp = f
        .ins(InstructionData::icmp(
            IntCC::SignedLessThan,
            f.first_result(bump),
            f.first_result(limit),
        ))
        .unwrap();
    f.ins(InstructionData::branch(
        Opcode::Brnz,
        f.first_result(cmp),
        header,
        &[],
    ))
    .unwrap();
    f.ins(InstructionData::jump(exit, &[])).unwrap();
    f.seal_block(header).unwrap();

    f.switch_to_block(exit);
    f.seal_block(exit).unwrap();
    let out = f.use_var(x).unwrap();
    f.ins(InstructionData::ret(&[out])).unwrap();

    // Unreachable block with content.
    f.switch_to_block(dead);
    f.seal_block(dead).unwrap();
    f.ins(InstructionData::trap(0)).unwrap();

    f.run_passes().unwrap();
    (
        f,
        vec![blk0, then_block, else_block, join, header, exit, dead],
        x,
    )
}

#[test]
fn branch_argument_counts_match_parameters() {
    let (f, _, _) = build_sample();
    for block in f.blocks() {
        let params = f.block_params(block).len();
        for pred in &f.block(block).preds {
            assert_eq!(
                f.inst(pred.branch).args.len(),
                params,
                "{block}: argument count of {} does not match",
                pred.branch
            );
        }
    }
}

#[test]
fn dead_blocks_are_removed_and_live_blocks_stay() {
    let (f, blocks, _) = build_sample();
    let dead = blocks[6];
    assert!(f.block(dead).invalid);
    assert!(f.blocks().all(|b| b != dead));
    assert!(!f.layout_order().contains(&dead));
}

#[test]
fn dominator_laws() {
    let (f, blocks, _) = build_sample();
    let entry = blocks[0];
    for block in f.blocks() {
        assert!(f.is_dominated_by(block, block), "{block} must dominate itself");
        assert!(
            f.is_dominated_by(block, entry),
            "the entry must dominate {block}"
        );
    }
    // The diamond arms dominate nothing beyond themselves.
    assert!(!f.is_dominated_by(blocks[3], blocks[1]));
    assert!(!f.is_dominated_by(blocks[3], blocks[2]));
    // The loop header is the only loop header.
    for block in f.blocks() {
        assert_eq!(f.block(block).loop_header, block == blocks[4]);
    }
}

#[test]
fn live_flags_match_side_effect_reachability() {
    let (f, blocks, _) = build_sample();
    // The multiply in the entry feeds nothing live.
    let mut entry_insts = f.block_insts(blocks[0]);
    let side_effecting_count = f
        .blocks()
        .flat_map(|b| f.block_insts(b).collect::<Vec<_>>())
        .filter(|&i| f.inst(i).opcode.has_side_effects())
        .count();
    assert!(side_effecting_count > 0);
    assert!(entry_insts.all(|i| f.inst(i).live));
    for block in f.blocks() {
        for inst in f.block_insts(block) {
            assert!(f.inst(inst).live, "{inst} survived the sweep but is dead");
        }
    }
}

#[test]
fn groups_contain_no_internal_side_effects() {
    let (f, _, _) = build_sample();
    for block in f.blocks() {
        let insts: Vec<_> = f.block_insts(block).collect();
        for window in insts.windows(2) {
            let (a, b) = (window[0], window[1]);
            if f.inst(a).group == f.inst(b).group {
                // Two consecutive members of one group: the earlier one
                // must be pure.
                assert!(
                    !f.inst(a).opcode.has_side_effects(),
                    "{a} has side effects inside group {:?}",
                    f.inst(a).group
                );
            }
        }
    }
}

#[test]
fn critical_edge_property_after_layout() {
    let (f, _, _) = build_sample();
    for block in f.blocks() {
        if f.block(block).preds.len() <= 1 {
            continue;
        }
        for pred in &f.block(block).preds {
            assert_eq!(
                f.block(pred.block).tail.expand(),
                Some(pred.branch),
                "branch into multi-predecessor {block} is not terminal"
            );
        }
    }
}

#[test]
fn layout_covers_every_live_block_once() {
    let (f, _, _) = build_sample();
    let layout = f.layout_order();
    let mut seen = std::collections::HashSet::new();
    for &b in layout {
        assert!(seen.insert(b), "{b} laid out twice");
        assert!(!f.block(b).invalid);
    }
    for b in f.blocks() {
        assert!(seen.contains(&b), "{b} missing from the layout");
    }
}

#[test]
fn refcounts_count_live_uses() {
    let (f, blocks, _) = build_sample();
    let entry_param = f.block_params(blocks[0])[0].value;
    // p is used by the brz and by the loop add; the dead multiply's two
    // uses are gone.
    assert_eq!(f.value_refcount(entry_param), 2);
}

#[test]
fn display_is_stable_and_shows_annotations() {
    let (mut f, blocks, _) = build_sample();
    let entry_param = f.block_params(blocks[0])[0].value;
    f.annotate_value(entry_param, "n");
    let first = f.display();
    assert_eq!(first, f.display());
    assert!(first.contains("[n]"), "annotation missing:\n{first}");
    assert!(first.contains("blk0("));
}
