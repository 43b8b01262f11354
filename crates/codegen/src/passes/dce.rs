//! Dead-code elimination.
//!
//! Two-phase mark and sweep. The marking seeds are the instructions with
//! observable side effects; the initial walk also assigns every instruction
//! its group number (incremented after each side-effecting instruction, so a
//! group is a run of pure instructions the selector may merge) and records
//! which instruction defines each value. Draining the worklist resolves the
//! alias map on each live instruction's arguments, exactly once per live
//! instruction, and marks the defining instructions of those arguments
//! live. The sweep unlinks everything still dead, counts the uses of every
//! value among the survivors, and marks the signatures of surviving calls.

use crate::ir::{Inst, InstGroup, Value};
use crate::ssa::SsaBuilder;
use cranelift_entity::EntityRef;
use cranelift_entity::packed_option::PackedOption;

pub(super) fn run(f: &mut SsaBuilder) {
    let num_values = f.num_values();
    let mut def_inst: Vec<PackedOption<Inst>> = vec![PackedOption::default(); num_values];
    let mut worklist: Vec<Inst> = Vec::new();

    // Phase a: group numbering, seed collection, and the value-to-definition
    // inverse map. Creation order over valid blocks keeps group numbers
    // deterministic.
    let mut group = 0u32;
    let blocks: Vec<_> = f.blocks().collect();
    for &block in &blocks {
        let mut cur = f.blocks[block].root.expand();
        while let Some(inst) = cur {
            cur = f.insts[inst].next.expand();
            f.insts[inst].group = InstGroup(group);
            f.insts[inst].live = false;
            for value in f.insts[inst].result_values() {
                def_inst[value.index()] = inst.into();
            }
            if f.insts[inst].opcode.has_side_effects() {
                f.insts[inst].live = true;
                worklist.push(inst);
                group += 1;
            }
        }
    }

    // Phase b: drain. Popping an instruction is the one point where its
    // arguments have their aliases resolved.
    while let Some(inst) = worklist.pop() {
        let aliases = &f.aliases;
        f.insts[inst].map_arguments(|v| {
            let mut v = v;
            while let Some(&next) = aliases.get(&v) {
                v = next;
            }
            v
        });
        let args: smallvec::SmallVec<[Value; 8]> = f.insts[inst].arguments().collect();
        for arg in args {
            if let Some(def) = def_inst[arg.index()].expand() {
                if !f.insts[def].live {
                    f.insts[def].live = true;
                    worklist.push(def);
                }
            }
        }
    }

    // Phase c: sweep and refcount.
    f.refcounts.clear();
    f.refcounts.resize(num_values, 0);
    let mut removed = 0;
    for &block in &blocks {
        let mut cur = f.blocks[block].root.expand();
        while let Some(inst) = cur {
            cur = f.insts[inst].next.expand();
            if !f.insts[inst].live {
                f.unlink_inst(block, inst);
                removed += 1;
                continue;
            }
            let args: smallvec::SmallVec<[Value; 8]> = f.insts[inst].arguments().collect();
            for arg in args {
                f.refcounts[arg.index()] += 1;
            }
            if let Some(sig) = f.insts[inst].sig.expand() {
                f.sigs[sig].used = true;
            }
        }
    }
    if removed > 0 {
        log::trace!("dead-code elimination removed {removed} instructions");
    }
}
