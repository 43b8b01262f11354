//! End-to-end compilation tests: build a function through the SSA builder,
//! run the passes, lower through the AArch64 backend, and check the
//! formatted listing.

use egret_codegen::ir::condcodes::{FloatCC, IntCC};
use egret_codegen::ir::types::{F32, F64, I32, I64};
use egret_codegen::ir::{InstructionData, Opcode, Signature};
use egret_codegen::machinst::{self, MachBackend};
use egret_codegen::settings::Flags;
use egret_codegen::ssa::SsaBuilder;
use egret_codegen::isa;

fn backend() -> Box<dyn MachBackend> {
    isa::lookup("aarch64".parse().unwrap()).unwrap()
}

fn compile(f: &mut SsaBuilder) -> String {
    f.run_passes().unwrap();
    let mut backend = backend();
    let code = machinst::compile(f, backend.as_mut()).unwrap();
    code.format().to_string()
}

#[test]
fn empty_function() {
    let mut f = SsaBuilder::new(Flags::default());
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    f.ins(InstructionData::ret(&[])).unwrap();

    assert_eq!(compile(&mut f), "L1 (SSA Block: blk0):\n\tret\n");
}

#[test]
fn conditional_branch_on_icmp_with_immediate() {
    let mut f = SsaBuilder::new(Flags::default());
    let blk0 = f.create_block();
    let blk1 = f.create_block();
    let blk2 = f.create_block();

    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let param = f.append_block_param(blk0, I32);
    let k = f.ins(InstructionData::iconst(I32, 0x4d2)).unwrap();
    let cmp = f
        .ins(InstructionData::icmp(IntCC::Equal, param, f.first_result(k)))
        .unwrap();
    f.ins(InstructionData::branch(
        Opcode::Brz,
        f.first_result(cmp),
        blk1,
        &[],
    ))
    .unwrap();
    f.ins(InstructionData::jump(blk2, &[])).unwrap();

    for b in [blk1, blk2] {
        f.switch_to_block(b);
        f.seal_block(b).unwrap();
        f.ins(InstructionData::ret(&[])).unwrap();
    }

    // The icmp folds into a flags-setting subtract with an immediate
    // operand; brz inverts eq into b.ne; the jump to blk2 is the
    // fallthrough and disappears.
    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tsubs wzr, w0, #0x4d2\n\
         \tb.ne L2\n\
         L3 (SSA Block: blk2):\n\
         \tret\n\
         L2 (SSA Block: blk1):\n\
         \tret\n"
    );
}

#[test]
fn conditional_branch_on_fcmp() {
    let mut f = SsaBuilder::new(Flags::default());
    let blk0 = f.create_block();
    let blk1 = f.create_block();
    let blk2 = f.create_block();

    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, F32);
    let y = f.append_block_param(blk0, F32);
    let cmp = f
        .ins(InstructionData::fcmp(FloatCC::GreaterThan, x, y))
        .unwrap();
    f.ins(InstructionData::branch(
        Opcode::Brnz,
        f.first_result(cmp),
        blk1,
        &[],
    ))
    .unwrap();
    f.ins(InstructionData::jump(blk2, &[])).unwrap();

    for b in [blk1, blk2] {
        f.switch_to_block(b);
        f.seal_block(b).unwrap();
        f.ins(InstructionData::ret(&[])).unwrap();
    }

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tfcmp s0, s1\n\
         \tb.gt L2\n\
         L3 (SSA Block: blk2):\n\
         \tret\n\
         L2 (SSA Block: blk1):\n\
         \tret\n"
    );
}

#[test]
fn returned_constant_requiring_two_moves() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let k = f.ins(InstructionData::iconst(I32, 0x0f00_000f)).unwrap();
    f.ins(InstructionData::ret(&[f.first_result(k)])).unwrap();

    let text = compile(&mut f);
    // The constant is single-use and materializes inline at the return:
    // low chunk via movz, high chunk via movk, then the move into the
    // return register.
    assert_eq!(
        text,
        "L1 (SSA Block: blk0):\n\
         \tmovz w0, #0xf, LSL 0\n\
         \tmovk w0, #0xf00, LSL 16\n\
         \tmov w1, w0\n\
         \tret\n"
    );
}

#[test]
fn unfused_icmp_materializes_with_cset() {
    // The comparison result is returned, so it cannot fold into a branch.
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, I32);
    let y = f.append_block_param(blk0, I32);
    let cmp = f
        .ins(InstructionData::icmp(IntCC::UnsignedLessThan, x, y))
        .unwrap();
    f.ins(InstructionData::ret(&[f.first_result(cmp)])).unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tsubs wzr, w0, w1\n\
         \tcset w2, lo\n\
         \tmov w3, w2\n\
         \tret\n"
    );
}

#[test]
fn shifted_register_operand_folds_into_add() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, I32);
    let y = f.append_block_param(blk0, I32);
    let amt = f.ins(InstructionData::iconst(I32, 3)).unwrap();
    let shl = f
        .ins(InstructionData::binary(
            Opcode::Ishl,
            I32,
            y,
            f.first_result(amt),
        ))
        .unwrap();
    let add = f
        .ins(InstructionData::binary(
            Opcode::Iadd,
            I32,
            x,
            f.first_result(shl),
        ))
        .unwrap();
    f.ins(InstructionData::ret(&[f.first_result(add)])).unwrap();

    let text = compile(&mut f);
    assert!(
        text.contains("add w4, w0, w1, LSL 3"),
        "shift not folded:\n{text}"
    );
    // The shift and its amount were consumed; no standalone lsl remains.
    assert!(!text.contains("lsl"), "unexpected standalone shift:\n{text}");
}

#[test]
fn loop_with_block_arguments_compiles() {
    // A counting loop built through variables, exercising placeholder
    // parameters, critical-edge splitting, and branch-argument moves.
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    let blk1 = f.create_block();
    let blk2 = f.create_block();
    let x = f.declare_var(I32);

    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let zero = f.ins(InstructionData::iconst(I32, 0)).unwrap();
    let zero_v = f.first_result(zero);
    f.def_var(x, zero_v);
    f.ins(InstructionData::jump(blk1, &[])).unwrap();

    f.switch_to_block(blk1);
    let cur = f.use_var(x).unwrap();
    let one = f.ins(InstructionData::iconst(I32, 1)).unwrap();
    let next = f
        .ins(InstructionData::binary(
            Opcode::Iadd,
            I32,
            cur,
            f.first_result(one),
        ))
        .unwrap();
    let next_v = f.first_result(next);
    f.def_var(x, next_v);
    let limit = f.ins(InstructionData::iconst(I32, 10)).unwrap();
    let cmp = f
        .ins(InstructionData::icmp(
            IntCC::UnsignedLessThan,
            next_v,
            f.first_result(limit),
        ))
        .unwrap();
    f.ins(InstructionData::branch(
        Opcode::Brnz,
        f.first_result(cmp),
        blk1,
        &[],
    ))
    .unwrap();
    f.ins(InstructionData::jump(blk2, &[])).unwrap();
    f.seal_block(blk1).unwrap();

    f.switch_to_block(blk2);
    f.seal_block(blk2).unwrap();
    let out = f.use_var(x).unwrap();
    f.ins(InstructionData::ret(&[out])).unwrap();

    let text = compile(&mut f);
    // The loop header keeps one parameter; the back edge was split, so the
    // trampoline carries the argument move and jumps back to the header.
    assert!(text.contains("b.hs") || text.contains("b.lo") || text.contains("cbnz"));
    assert!(text.contains("mov"), "expected block-argument moves:\n{text}");
    assert!(text.contains("b L"), "expected a back-edge jump:\n{text}");
    assert!(text.contains("ret"));
}

#[test]
fn float_arithmetic() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![F64]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, F64);
    let y = f.append_block_param(blk0, F64);
    let sum = f
        .ins(InstructionData::binary(Opcode::Fadd, F64, x, y))
        .unwrap();
    let root = f
        .ins(InstructionData::unary(
            Opcode::Sqrt,
            F64,
            f.first_result(sum),
        ))
        .unwrap();
    f.ins(InstructionData::ret(&[f.first_result(root)]))
        .unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tfadd d2, d0, d1\n\
         \tfsqrt d3, d2\n\
         \tfmov d4, d3\n\
         \tret\n"
    );
}

#[test]
fn float_constant_uses_a_literal_pool_load() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![F32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let k = f.ins(InstructionData::f32const(1.5)).unwrap();
    f.ins(InstructionData::ret(&[f.first_result(k)])).unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tldr s0, pc+8 ; b 8 ; data.f32 1.5\n\
         \tfmov s1, s0\n\
         \tret\n"
    );
}

#[test]
fn loads_and_stores_use_offset_addressing() {
    let mut f = SsaBuilder::new(Flags::default());
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let addr = f.append_block_param(blk0, I64);
    let loaded = f
        .ins(InstructionData::load(Opcode::Load, I32, addr, 8))
        .unwrap();
    f.ins(InstructionData::store(
        Opcode::Store,
        f.first_result(loaded),
        addr,
        12,
    ))
    .unwrap();
    f.ins(InstructionData::ret(&[])).unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tldr w1, [x0, #8]\n\
         \tstr w1, [x0, #12]\n\
         \tret\n"
    );
}

#[test]
fn br_table_emits_bounds_check_and_dispatch() {
    let mut f = SsaBuilder::new(Flags::default());
    let blk0 = f.create_block();
    let blk1 = f.create_block();
    let blk2 = f.create_block();
    let blk3 = f.create_block();

    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let idx = f.append_block_param(blk0, I32);
    f.ins(InstructionData::br_table(idx, blk3, vec![blk1, blk2]))
        .unwrap();

    for b in [blk1, blk2, blk3] {
        f.switch_to_block(b);
        f.seal_block(b).unwrap();
        f.ins(InstructionData::ret(&[])).unwrap();
    }

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tsubs wzr, w0, #0x2\n\
         \tb.hs L2\n\
         \tjt_sequence w0, [L3, L4]\n\
         L4 (SSA Block: blk2):\n\
         \tret\n\
         L3 (SSA Block: blk1):\n\
         \tret\n\
         L2 (SSA Block: blk3):\n\
         \tret\n"
    );
}

#[test]
fn conditional_trap_branches_over_udf() {
    let mut f = SsaBuilder::new(Flags::default());
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, I32);
    f.ins(InstructionData::trap_if(Opcode::Trapz, x, 5)).unwrap();
    f.ins(InstructionData::ret(&[])).unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tcbnz w0, 8 ; udf\n\
         \tret\n"
    );
}

#[test]
fn select_lowers_to_csel() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let c = f.append_block_param(blk0, I32);
    let x = f.append_block_param(blk0, I32);
    let y = f.append_block_param(blk0, I32);
    let sel = f.ins(InstructionData::select(I32, c, x, y)).unwrap();
    f.ins(InstructionData::ret(&[f.first_result(sel)])).unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \tsubs wzr, w0, #0x0\n\
         \tcsel w3, w1, w2, ne\n\
         \tmov w4, w3\n\
         \tret\n"
    );
}

#[test]
fn direct_call_references_the_callee() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let sig = f.declare_signature(Signature::new(vec![I32], vec![I32]));
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, I32);
    let call = f.ins(InstructionData::call(sig, 7, &[x])).unwrap();
    f.ins(InstructionData::ret(&[f.first_result(call)]))
        .unwrap();

    let text = compile(&mut f);
    assert_eq!(
        text,
        "L1 (SSA Block: blk0):\n\
         \tbl fn7\n\
         \tmov w2, w1\n\
         \tret\n"
    );
    assert!(f.signature(sig).used);
}

#[test]
fn zero_extension_folds_into_extended_register_operand() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I64]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let a = f.append_block_param(blk0, I64);
    let b = f.append_block_param(blk0, I32);
    let ext = f
        .ins(InstructionData::unary(Opcode::Uextend, I64, b))
        .unwrap();
    let add = f
        .ins(InstructionData::binary(
            Opcode::Iadd,
            I64,
            a,
            f.first_result(ext),
        ))
        .unwrap();
    f.ins(InstructionData::ret(&[f.first_result(add)])).unwrap();

    let text = compile(&mut f);
    assert!(
        text.contains("add x3, x0, w1, UXTW"),
        "extension not folded:\n{text}"
    );
}

#[test]
fn ctz_lowers_through_rbit() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    let x = f.append_block_param(blk0, I32);
    let c = f.ins(InstructionData::unary(Opcode::Ctz, I32, x)).unwrap();
    f.ins(InstructionData::ret(&[f.first_result(c)])).unwrap();

    assert_eq!(
        compile(&mut f),
        "L1 (SSA Block: blk0):\n\
         \trbit w3, w0\n\
         \tclz w1, w3\n\
         \tmov w2, w1\n\
         \tret\n"
    );
}

#[test]
fn compile_error_leaves_builder_reusable() {
    let mut f = SsaBuilder::new(Flags::default());
    f.declare_returns(vec![I32]);
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    // Popcnt has no AArch64 lowering here.
    let x = f.append_block_param(blk0, I32);
    let pop = f
        .ins(InstructionData::unary(Opcode::Popcnt, I32, x))
        .unwrap();
    f.ins(InstructionData::ret(&[f.first_result(pop)])).unwrap();
    f.run_passes().unwrap();

    let mut backend = backend();
    let err = machinst::compile(&f, backend.as_mut()).unwrap_err();
    assert_eq!(err, egret_codegen::CodegenError::UnsupportedOpcode(Opcode::Popcnt));

    // The same builder and backend compile the next function after reset.
    f.reset();
    let blk0 = f.create_block();
    f.switch_to_block(blk0);
    f.seal_block(blk0).unwrap();
    f.ins(InstructionData::ret(&[])).unwrap();
    f.run_passes().unwrap();
    let code = machinst::compile(&f, backend.as_mut()).unwrap();
    assert_eq!(code.format(), "L1 (SSA Block: blk0):\n\tret\n");
}

#[test]
fn builder_reset_reproduces_identical_output() {
    let mut f = SsaBuilder::new(Flags::default());
    let mut backend = backend();

    let mut build = |f: &mut SsaBuilder| {
        let blk0 = f.create_block();
        f.switch_to_block(blk0);
        f.seal_block(blk0).unwrap();
        let x = f.append_block_param(blk0, I32);
        let k = f.ins(InstructionData::iconst(I32, 41)).unwrap();
        let add = f
            .ins(InstructionData::binary(
                Opcode::Iadd,
                I32,
                x,
                f.first_result(k),
            ))
            .unwrap();
        f.ins(InstructionData::ret(&[f.first_result(add)]))
            .unwrap();
    };

    f.declare_returns(vec![I32]);
    build(&mut f);
    f.run_passes().unwrap();
    let first = machinst::compile(&f, backend.as_mut())
        .unwrap()
        .format()
        .to_string();

    f.reset();
    f.declare_returns(vec![I32]);
    build(&mut f);
    f.run_passes().unwrap();
    let second = machinst::compile(&f, backend.as_mut())
        .unwrap()
        .format()
        .to_string();

    assert_eq!(first, second);
    assert!(first.contains("add"));
}
