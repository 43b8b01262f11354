//! Incremental SSA construction.
//!
//! [`SsaBuilder`] lets a forward-only front-end (the WebAssembly translator)
//! build a function in block-argument SSA form without computing dominance
//! up front. The front-end declares variables, defines and reads them through
//! `def_var`/`use_var`, and *seals* each block once no further predecessors
//! can appear. Reads in unsealed blocks hand out placeholder values that are
//! turned into real block parameters at seal time; reads in sealed blocks
//! walk predecessors, inserting block parameters at join points. This is the
//! algorithm of Braun et al., "Simple and Efficient Construction of Static
//! Single Assignment Form" (CC 2013).
//!
//! The builder owns the instruction and block pools, the value tables, and
//! the pass results; `reset` makes one builder reusable across many
//! functions without reallocating.

use crate::ir::{
    Block, BlockData, BlockParam, Inst, InstructionData, Opcode, SigRef, Signature, Type, Value,
    Variable,
};
use crate::pool::Pool;
use crate::result::{CodegenError, CodegenResult};
use crate::settings::Flags;
use crate::ir::types;
use core::fmt::Write;
use core::mem;
use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::{EntityRef, PrimaryMap};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Incremental SSA builder and function container.
///
/// One builder compiles one function at a time; `reset` recycles it for the
/// next function while keeping its allocations.
pub struct SsaBuilder {
    flags: Flags,

    /// All blocks of the current function. The entry block is the first one
    /// created.
    pub(crate) blocks: Pool<Block, BlockData>,
    /// All instructions of the current function.
    pub(crate) insts: Pool<Inst, InstructionData>,
    /// Type of every SSA value.
    values: PrimaryMap<Value, Type>,
    /// Type of every declared front-end variable.
    variables: PrimaryMap<Variable, Type>,
    /// Declared call signatures.
    pub(crate) sigs: PrimaryMap<SigRef, Signature>,
    /// Result types of the function being built.
    return_types: Vec<Type>,

    /// Debug names attached to values.
    annotations: FxHashMap<Value, String>,
    /// Value aliases registered by redundant-phi elimination. Applied to the
    /// arguments of live instructions exactly once, during DCE.
    pub(crate) aliases: FxHashMap<Value, Value>,
    /// Per-value use counts of surviving instructions, filled by DCE.
    pub(crate) refcounts: Vec<u32>,

    /// Reverse postorder of reachable blocks, filled by the dominator pass.
    pub(crate) rpo: Vec<Block>,
    /// Immediate dominator of each reachable block; the entry dominates
    /// itself.
    pub(crate) idom: Vec<PackedOption<Block>>,
    /// Final emission order, filled by the layout pass.
    pub(crate) layout: Vec<Block>,

    current_block: PackedOption<Block>,
}

impl SsaBuilder {
    /// Create a builder with the given compilation flags.
    pub fn new(flags: Flags) -> Self {
        Self {
            flags,
            blocks: Pool::new(),
            insts: Pool::new(),
            values: PrimaryMap::new(),
            variables: PrimaryMap::new(),
            sigs: PrimaryMap::new(),
            return_types: Vec::new(),
            annotations: FxHashMap::default(),
            aliases: FxHashMap::default(),
            refcounts: Vec::new(),
            rpo: Vec::new(),
            idom: Vec::new(),
            layout: Vec::new(),
            current_block: None.into(),
        }
    }

    /// The compilation flags this builder was created with.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// Clear all per-function state, retaining allocations, so the builder
    /// can construct the next function.
    pub fn reset(&mut self) {
        self.blocks.reset();
        self.insts.reset();
        self.values.clear();
        self.variables.clear();
        self.sigs.clear();
        self.return_types.clear();
        self.annotations.clear();
        self.aliases.clear();
        self.refcounts.clear();
        self.rpo.clear();
        self.idom.clear();
        self.layout.clear();
        self.current_block = None.into();
    }

    // ------------------------------------------------------------------
    // Blocks.

    /// Allocate a new, empty, unsealed block. The first block created is the
    /// function entry.
    pub fn create_block(&mut self) -> Block {
        self.blocks.allocate()
    }

    /// Direct new instructions into `block`.
    pub fn switch_to_block(&mut self, block: Block) {
        debug_assert!(self.blocks.is_valid(block), "switch to unallocated {block}");
        self.current_block = block.into();
    }

    /// The block currently receiving instructions.
    pub fn current_block(&self) -> Option<Block> {
        self.current_block.expand()
    }

    /// The function entry block. Panics when no block has been created.
    pub fn entry_block(&self) -> Block {
        assert!(!self.blocks.is_empty(), "function has no entry block");
        Block::new(0)
    }

    /// Read access to a block record.
    pub fn block(&self, block: Block) -> &BlockData {
        &self.blocks[block]
    }

    /// The parameters of `block`, in order.
    pub fn block_params(&self, block: Block) -> &[BlockParam] {
        &self.blocks[block].params
    }

    /// Append a parameter of type `ty` to `block` and return its value.
    ///
    /// This is how the front-end declares the function parameters on the
    /// entry block; all other block parameters are produced by SSA
    /// construction itself.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let value = self.make_value(ty);
        self.blocks[block].params.push(BlockParam { ty, value });
        value
    }

    /// Declare that no further predecessors will be added to `block`.
    ///
    /// Resolves every placeholder handed out by [`use_var`](Self::use_var)
    /// while the block was unsealed: each becomes a real block parameter and
    /// every predecessor branch is extended with the reaching definition.
    pub fn seal_block(&mut self, block: Block) -> CodegenResult<()> {
        let data = &mut self.blocks[block];
        if data.sealed {
            return Err(CodegenError::MalformedSsa {
                block,
                reason: "block sealed twice",
            });
        }
        data.sealed = true;
        data.single_pred = match data.preds.as_slice() {
            [only] => only.block.into(),
            _ => None.into(),
        };
        let pending = mem::take(&mut data.unknown_values);
        for (var, placeholder) in pending {
            log::trace!("seal {block}: promoting {placeholder} to a parameter for {var}");
            let ty = self.values[placeholder];
            self.blocks[block].params.push(BlockParam {
                ty,
                value: placeholder,
            });
            self.fill_param_sources(var, block)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Variables and values.

    /// Declare a front-end variable of type `ty`.
    pub fn declare_var(&mut self, ty: Type) -> Variable {
        self.variables.push(ty)
    }

    /// The declared type of `var`.
    pub fn variable_type(&self, var: Variable) -> Type {
        self.variables[var]
    }

    /// Register a new definition of `var` in the current block.
    pub fn def_var(&mut self, var: Variable, value: Value) {
        let block = self.current_block.expand().expect("no current block");
        self.def_var_in(var, value, block);
    }

    /// Register a new definition of `var` in `block`.
    pub fn def_var_in(&mut self, var: Variable, value: Value, block: Block) {
        debug_assert_eq!(
            self.variables[var],
            self.values[value],
            "type of {value} does not match declared type of {var}"
        );
        self.blocks[block].last_definitions.insert(var, value);
    }

    /// The value of `var` at the current position; see
    /// [`find_value`](Self::find_value).
    pub fn use_var(&mut self, var: Variable) -> CodegenResult<Value> {
        let block = self.current_block.expand().expect("no current block");
        self.find_value(var, block)
    }

    /// The value of `var` visible at the end of `block`.
    ///
    /// Local definitions win. In an unsealed block a placeholder value is
    /// handed out and resolved at seal time. In a sealed block the reaching
    /// definition is found by walking predecessors, inserting a block
    /// parameter wherever more than one definition can reach.
    pub fn find_value(&mut self, var: Variable, block: Block) -> CodegenResult<Value> {
        if let Some(&v) = self.blocks[block].last_definitions.get(&var) {
            return Ok(v);
        }

        // Walk single-predecessor chains iteratively; they are the only
        // unbounded-depth case.
        let mut visited: SmallVec<[Block; 8]> = SmallVec::new();
        let mut b = block;
        let value = loop {
            if let Some(&v) = self.blocks[b].last_definitions.get(&var) {
                break v;
            }
            if !self.blocks[b].sealed {
                if b == block {
                    // A deferred block parameter: remember it and resolve it
                    // when the block is sealed.
                    let ty = self.variables[var];
                    let v = self.make_value(ty);
                    let data = &mut self.blocks[b];
                    data.last_definitions.insert(var, v);
                    data.unknown_values.push((var, v));
                    break v;
                }
                // A sealed block downstream depends on this block's value,
                // but the front-end has not sealed it yet. Sealing order must
                // be bottom-up along the read path.
                return Err(CodegenError::MalformedSsa {
                    block: b,
                    reason: "read through a sealed block reaches an unsealed predecessor",
                });
            }
            if let Some(pred) = self.blocks[b].single_pred.expand() {
                visited.push(b);
                b = pred;
                continue;
            }
            if self.blocks[b].preds.is_empty() {
                return Err(CodegenError::MalformedSsa {
                    block: b,
                    reason: "variable read with no reaching definition",
                });
            }
            // A join point: the value must become a block parameter.
            break self.add_join_param(var, b)?;
        };

        for visited_block in visited {
            self.blocks[visited_block]
                .last_definitions
                .insert(var, value);
        }
        Ok(value)
    }

    /// Insert a parameter for `var` at the join block `block` and collect the
    /// reaching definition from every predecessor.
    fn add_join_param(&mut self, var: Variable, block: Block) -> CodegenResult<Value> {
        let ty = self.variables[var];
        let param = self.make_value(ty);
        self.blocks[block].params.push(BlockParam { ty, value: param });
        // Record the parameter before walking predecessors: a loop reaching
        // back here must see it as the local definition.
        self.blocks[block].last_definitions.insert(var, param);
        log::trace!("{block}: inserted join parameter {param} for {var}");
        self.fill_param_sources(var, block)?;
        Ok(param)
    }

    /// Append the reaching definition of `var` in each predecessor of
    /// `block` to that predecessor's branch arguments.
    fn fill_param_sources(&mut self, var: Variable, block: Block) -> CodegenResult<()> {
        let preds: SmallVec<[crate::ir::BlockPredecessor; 4]> =
            SmallVec::from_slice(&self.blocks[block].preds);
        for pred in preds {
            if self.insts[pred.branch].opcode == Opcode::BrTable {
                // A table branch fans out to many targets and cannot say
                // which of them an argument belongs to; front-ends must
                // route such edges through intermediate blocks.
                return Err(CodegenError::MalformedSsa {
                    block,
                    reason: "jump-table edges cannot carry block arguments",
                });
            }
            let v = self.find_value(var, pred.block)?;
            self.insts[pred.branch].args.push(v);
        }
        Ok(())
    }

    fn make_value(&mut self, ty: Type) -> Value {
        debug_assert!(ty.is_valid());
        self.values.push(ty)
    }

    /// The type of `value`.
    pub fn value_type(&self, value: Value) -> Type {
        self.values[value]
    }

    /// Number of values allocated so far.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Number of instructions allocated so far.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Number of blocks allocated so far, including invalidated ones.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Attach a debug name to `value`; shows up in the IR display.
    pub fn annotate_value(&mut self, value: Value, name: &str) {
        self.annotations.insert(value, name.to_string());
    }

    /// The debug name of `value`, if any.
    pub fn value_annotation(&self, value: Value) -> Option<&str> {
        self.annotations.get(&value).map(String::as_str)
    }

    /// Resolve the alias chain of `value` to its final target.
    ///
    /// Values collapsed by redundant-phi elimination alias the surviving
    /// value; everything downstream of DCE sees only resolved values.
    pub fn resolve_alias(&self, value: Value) -> Value {
        let mut v = value;
        let mut steps = 0;
        while let Some(&next) = self.aliases.get(&v) {
            v = next;
            steps += 1;
            assert!(
                steps <= self.values.len(),
                "alias cycle involving {value}"
            );
        }
        v
    }

    /// Use count of `value` among surviving instructions, after DCE.
    pub fn value_refcount(&self, value: Value) -> u32 {
        self.refcounts.get(value.index()).copied().unwrap_or(0)
    }

    /// The whole per-value use-count vector, indexed by value number.
    pub fn value_refcounts(&self) -> &[u32] {
        &self.refcounts
    }

    // ------------------------------------------------------------------
    // Instructions.

    /// Allocate an instruction record without inserting it anywhere.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.insts.allocate();
        self.insts[inst] = data;
        inst
    }

    /// Read access to an instruction record.
    pub fn inst(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    /// The primary result of `inst`; panics when it has none.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.insts[inst]
            .result
            .expand()
            .unwrap_or_else(|| panic!("{inst} has no result"))
    }

    /// Append `inst` to the current block: link it behind the tail, allocate
    /// its result values from the per-opcode result-type rule, and record
    /// CFG edges when it branches.
    ///
    /// Branch targets must not be sealed yet; a branch is what adds a
    /// predecessor, and sealed blocks take no more predecessors.
    pub fn insert_inst(&mut self, inst: Inst) -> CodegenResult<()> {
        let block = self.current_block.expand().expect("no current block");

        // Link into the block's instruction list.
        if let Some(tail) = self.blocks[block].tail.expand() {
            debug_assert!(
                !self.insts[tail].opcode.is_terminator(),
                "inserting {inst} after terminator in {block}"
            );
            self.insts[tail].next = inst.into();
            self.insts[inst].prev = tail.into();
        } else {
            self.blocks[block].root = inst.into();
        }
        self.blocks[block].tail = inst.into();

        // Allocate result values.
        let (primary, extra) = self.result_types(inst);
        if let Some(ty) = primary {
            let v = self.make_value(ty);
            self.insts[inst].result = v.into();
        }
        for ty in extra {
            let v = self.make_value(ty);
            self.insts[inst].results.push(v);
        }

        // Record CFG edges for branches.
        if self.insts[inst].opcode.is_branch() {
            let targets: SmallVec<[Block; 4]> =
                self.insts[inst].branch_destinations().collect();
            for target in targets {
                if self.blocks[target].sealed {
                    return Err(CodegenError::MalformedSsa {
                        block: target,
                        reason: "branch adds a predecessor to a sealed block",
                    });
                }
                self.blocks[target].add_pred(block, inst);
                self.blocks[block].succs.push(target);
            }
        }
        Ok(())
    }

    /// Allocate and insert in one step, returning the new instruction.
    pub fn ins(&mut self, data: InstructionData) -> CodegenResult<Inst> {
        let inst = self.make_inst(data);
        self.insert_inst(inst)?;
        Ok(inst)
    }

    /// The per-opcode result-type rule: primary result type plus any extra
    /// result types, or `(None, [])` for non-producing opcodes.
    fn result_types(&self, inst: Inst) -> (Option<Type>, SmallVec<[Type; 2]>) {
        let data = &self.insts[inst];
        let opcode = data.opcode;
        if !opcode.produces_result() {
            return (None, SmallVec::new());
        }
        match opcode {
            Opcode::Icmp | Opcode::Fcmp | Opcode::VanyTrue | Opcode::VallTrue => {
                (Some(types::I32), SmallVec::new())
            }
            Opcode::Call | Opcode::CallIndirect => {
                let sig = data.sig.expand().expect("call without a signature");
                let returns = &self.sigs[sig].returns;
                let primary = returns.first().copied();
                let extra = SmallVec::from_iter(returns.iter().skip(1).copied());
                (primary, extra)
            }
            _ => {
                debug_assert!(data.ty.is_valid(), "{opcode} needs a controlling type");
                (Some(data.ty), SmallVec::new())
            }
        }
    }

    /// Remove `inst` from its block's instruction list. The record itself
    /// stays in the pool so indices remain stable until the next reset.
    pub(crate) fn unlink_inst(&mut self, block: Block, inst: Inst) {
        let (prev, next) = {
            let data = &self.insts[inst];
            (data.prev, data.next)
        };
        match prev.expand() {
            Some(p) => self.insts[p].next = next,
            None => self.blocks[block].root = next,
        }
        match next.expand() {
            Some(n) => self.insts[n].prev = prev,
            None => self.blocks[block].tail = prev,
        }
        self.insts[inst].prev = None.into();
        self.insts[inst].next = None.into();
    }

    // ------------------------------------------------------------------
    // Signatures and function results.

    /// Declare a call signature and return its reference.
    pub fn declare_signature(&mut self, sig: Signature) -> SigRef {
        self.sigs.push(sig)
    }

    /// The signature behind `sig`.
    pub fn signature(&self, sig: SigRef) -> &Signature {
        &self.sigs[sig]
    }

    /// Declare the result types of the function being built.
    pub fn declare_returns(&mut self, types: Vec<Type>) {
        self.return_types = types;
    }

    /// The declared result types of the function being built.
    pub fn return_types(&self) -> &[Type] {
        &self.return_types
    }

    // ------------------------------------------------------------------
    // Iteration.

    /// Iterate over blocks in creation order, skipping blocks removed by
    /// dead-block elimination.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys().filter(|&b| !self.blocks[b].invalid)
    }

    /// Reverse postorder of reachable blocks; valid after the passes ran.
    pub fn rpo(&self) -> &[Block] {
        &self.rpo
    }

    /// Emission order of blocks; valid after the passes ran.
    pub fn layout_order(&self) -> &[Block] {
        &self.layout
    }

    /// Iterate over the instructions of `block`, first to last.
    pub fn block_insts(&self, block: Block) -> impl Iterator<Item = Inst> + '_ {
        let mut next = self.blocks[block].root;
        core::iter::from_fn(move || {
            let inst = next.expand()?;
            next = self.insts[inst].next;
            Some(inst)
        })
    }

    /// Run the full pass pipeline; see the `passes` module for the order.
    pub fn run_passes(&mut self) -> CodegenResult<()> {
        crate::passes::run(self)
    }

    /// The immediate dominator of `block`; the entry dominates itself.
    /// `None` for unreachable blocks. Valid after the dominator pass ran.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom.get(block.index()).and_then(|d| d.expand())
    }

    /// Does `dominator` dominate `block`?
    ///
    /// Walks `block` upward through immediate dominators until it reaches
    /// `dominator` or the entry. Every block dominates itself; the entry
    /// dominates every reachable block. `false` when either block is
    /// unreachable.
    pub fn is_dominated_by(&self, block: Block, dominator: Block) -> bool {
        let entry = self.entry_block();
        let mut b = block;
        loop {
            if b == dominator {
                return true;
            }
            if b == entry {
                return false;
            }
            match self.idom(b) {
                Some(idom) => b = idom,
                None => return false,
            }
        }
    }

    // ------------------------------------------------------------------
    // Display.

    /// Render the whole function in the textual IR notation. Stable:
    /// formatting twice yields identical strings.
    pub fn display(&self) -> String {
        let mut out = String::new();
        for block in self.blocks() {
            write!(out, "{block}").unwrap();
            if !self.blocks[block].params.is_empty() {
                out.push('(');
                for (i, param) in self.blocks[block].params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write!(out, "{}: {}", param.value, param.ty).unwrap();
                    if let Some(name) = self.value_annotation(param.value) {
                        write!(out, " [{name}]").unwrap();
                    }
                }
                out.push(')');
            }
            out.push_str(":\n");
            for inst in self.block_insts(block) {
                writeln!(out, "    {}", self.insts[inst]).unwrap();
            }
        }
        out
    }
}
