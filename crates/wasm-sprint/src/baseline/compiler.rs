//! The opcode translator: one method per supported construct, each expressed
//! as a cache-state transformation plus primitive emission requests.
//!
//! Anything outside the supported subset is a *bailout*, not an error: the
//! compiler marks itself failed, binds the labels it still owes, and stops
//! translating. A higher tier is expected to retry the function.

use crate::abi;
use crate::abi::{ParamAssigner, ParamLoc};
use crate::baseline::cache_state::{CacheState, Location, VarState};
use crate::baseline::control::{BlockKind, ControlBlock};
use crate::baseline::reg::{Reg, RegClass, RegList};
use crate::baseline::value::ValueType;
use crate::baseline::{FunctionOutcome, ModuleEnv};
use crate::emit::{Constant, Emitter};

pub struct BaselineCompiler<'a, E: Emitter> {
    emit: &'a mut E,
    env: &'a ModuleEnv,
    state: CacheState,
    control: Vec<ControlBlock>,
    num_params: u32,
    num_locals: u32,
    local_types: Vec<ValueType>,
    return_type: Option<ValueType>,
    ok: bool,
    bailout_reason: Option<String>,
    reachable: bool,
    safepoint_table_offset: usize,
}

impl<'a, E: Emitter> BaselineCompiler<'a, E> {
    pub fn new(emit: &'a mut E, env: &'a ModuleEnv) -> Self {
        Self {
            emit,
            env,
            state: CacheState::new(),
            control: Vec::new(),
            num_params: 0,
            num_locals: 0,
            local_types: Vec::new(),
            return_type: None,
            ok: true,
            bailout_reason: None,
            reachable: true,
            safepoint_table_offset: 0,
        }
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Whether the current program point can be reached. The driver skips
    /// operators in dead regions (after `br`, `return`) up to the `end` that
    /// revives them.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn into_outcome(self) -> FunctionOutcome {
        FunctionOutcome {
            ok: self.ok,
            bailout_reason: self.bailout_reason,
            safepoint_table_offset: self.safepoint_table_offset,
        }
    }

    pub(crate) fn unsupported(&mut self, reason: impl Into<String>) {
        if !self.ok {
            return;
        }
        let reason = reason.into();
        tracing::debug!(target: "wasm_sprint::baseline", %reason, "baseline bailout");
        self.ok = false;
        self.bailout_reason = Some(reason);
        self.bind_unbound_labels();
    }

    /// Labels must be bound before the function ends, even when compilation
    /// is abandoned halfway through.
    fn bind_unbound_labels(&mut self) {
        for block in &mut self.control {
            if !block.label_bound {
                self.emit.bind(block.label);
                block.label_bound = true;
            }
        }
    }

    fn check_stack_size_limit(&mut self) {
        debug_assert!(self.state.height() >= self.num_locals);
        if self.state.height() - self.num_locals > abi::MAX_STACK_HEIGHT {
            self.unsupported("value stack grows too large");
        }
    }

    fn trace_state(&self, op: &'static str) {
        tracing::trace!(target: "wasm_sprint::baseline", op, state = %self.state);
    }

    #[inline]
    fn debug_check_state(&self) {
        debug_assert!(
            self.state.use_counts_consistent(),
            "use counts inconsistent: {}",
            self.state
        );
    }

    // ── Function Scaffolding ──

    pub fn start_function(
        &mut self,
        params: &[wasmparser::ValType],
        results: &[wasmparser::ValType],
        locals: &[(u32, wasmparser::ValType)],
    ) {
        if results.len() > 1 {
            return self.unsupported("multi-return");
        }
        if let Some(result) = results.first() {
            match ValueType::from_wasm(*result) {
                Some(ty) => self.return_type = Some(ty),
                None => return self.unsupported("exotic return type"),
            }
        }
        for ty in params {
            match ValueType::from_wasm(*ty) {
                Some(ty) => self.local_types.push(ty),
                None => return self.unsupported("exotic param/local"),
            }
        }
        self.num_params = self.local_types.len() as u32;
        for (count, ty) in locals {
            match ValueType::from_wasm(*ty) {
                Some(ty) => self
                    .local_types
                    .extend(std::iter::repeat(ty).take(*count as usize)),
                None => return self.unsupported("exotic param/local"),
            }
        }
        self.num_locals = self.local_types.len() as u32;
    }

    pub fn start_function_body(&mut self) {
        if !self.ok {
            return;
        }
        self.emit.enter_frame();
        self.emit
            .reserve_stack_space(self.num_locals + abi::MAX_STACK_HEIGHT);
        for ty in &self.local_types {
            match ty {
                ValueType::I32 | ValueType::F32 => {}
                ValueType::I64 => return self.unsupported("i64 param/local"),
                ValueType::F64 => return self.unsupported("f64 param/local"),
            }
        }
        self.emit.spill_context(abi::CONTEXT_REG);

        let mut assigner = ParamAssigner::new();
        for index in 0..self.num_params {
            self.process_parameter(index, &mut assigner);
        }

        // Non-parameter locals start zeroed. All f32 locals share one lazily
        // materialised zero register.
        let mut zero_fp_reg: Option<Reg> = None;
        for index in self.num_params..self.num_locals {
            match self.local_types[index as usize] {
                ValueType::I32 => self.state.push_constant(ValueType::I32, 0),
                ValueType::F32 => {
                    let reg = match zero_fp_reg {
                        Some(reg) => reg,
                        None => {
                            // May spill one of the registers holding parameters.
                            let reg = self.state.get_unused_register(
                                RegClass::Fp,
                                RegList::EMPTY,
                                self.emit,
                            );
                            self.emit.load_constant(reg, Constant::F32(0.0));
                            zero_fp_reg = Some(reg);
                            reg
                        }
                    };
                    self.state.push_register(ValueType::F32, reg);
                }
                _ => unreachable!("exotic local types bail out above"),
            }
        }

        let label = self.emit.create_label();
        self.control.push(ControlBlock::new(
            BlockKind::Block,
            label,
            self.num_locals,
            u32::from(self.return_type.is_some()),
        ));
        self.state.stack_base = self.num_locals;
        self.check_stack_size_limit();
        self.debug_check_state();
    }

    fn process_parameter(&mut self, index: u32, assigner: &mut ParamAssigner) {
        let ty = self.local_types[index as usize];
        let rc = ty.reg_class();
        match assigner.next(rc) {
            ParamLoc::Register(reg) => {
                if abi::is_cache_reg(reg) {
                    self.state.push_register(ty, reg);
                } else {
                    let cache_reg =
                        self.state
                            .get_unused_register(rc, RegList::EMPTY, self.emit);
                    self.emit.move_register(cache_reg, reg);
                    self.state.push_register(ty, cache_reg);
                }
            }
            ParamLoc::CallerFrameSlot(slot) => {
                let reg = self
                    .state
                    .get_unused_register(rc, RegList::EMPTY, self.emit);
                self.emit.load_caller_frame_slot(reg, slot);
                self.state.push_register(ty, reg);
            }
        }
    }

    pub fn finish_function(&mut self) {
        self.safepoint_table_offset = self.emit.code_offset();
    }

    // ── Constants ──

    pub fn i32_const(&mut self, value: i32) {
        if !self.ok {
            return;
        }
        self.state.push_constant(ValueType::I32, value);
        self.check_stack_size_limit();
    }

    pub fn f32_const(&mut self, value: f32) {
        if !self.ok {
            return;
        }
        let reg = self
            .state
            .get_unused_register(RegClass::Fp, RegList::EMPTY, self.emit);
        self.emit.load_constant(reg, Constant::F32(value));
        self.state.push_register(ValueType::F32, reg);
        self.check_stack_size_limit();
        self.debug_check_state();
    }

    // ── Locals ──

    pub fn local_get(&mut self, index: u32) {
        if !self.ok {
            return;
        }
        if index >= self.num_locals {
            return self.unsupported(format!("local {index} out of range"));
        }
        let slot = self.state.slots[index as usize];
        match slot.loc {
            Location::Register(reg) => self.state.push_register(slot.ty, reg),
            Location::Constant(value) => self.state.push_constant(slot.ty, value),
            Location::Stack => {
                let reg =
                    self.state
                        .get_unused_register(slot.ty.reg_class(), RegList::EMPTY, self.emit);
                self.emit.fill(reg, abi::slot_offset(index));
                self.state.push_register(slot.ty, reg);
            }
        }
        self.check_stack_size_limit();
        self.debug_check_state();
    }

    pub fn local_set(&mut self, index: u32, is_tee: bool) {
        if !self.ok {
            return;
        }
        if index >= self.num_locals {
            return self.unsupported(format!("local {index} out of range"));
        }
        let source = *self.state.slots.last().expect("set from empty stack");
        match source.loc {
            Location::Register(reg) => {
                self.release_local(index);
                self.state.slots[index as usize] = source;
                if is_tee {
                    // Both the local and the stack slot now reference it.
                    self.state.inc_used(reg);
                }
            }
            Location::Constant(_) => {
                self.release_local(index);
                self.state.slots[index as usize] = source;
            }
            Location::Stack => self.set_local_from_stack_slot(index),
        }
        if !is_tee {
            // The stack slot's register reference, if any, transferred to
            // the local above.
            self.state.slots.pop();
        }
        self.debug_check_state();
    }

    fn release_local(&mut self, index: u32) {
        if let Location::Register(reg) = self.state.slots[index as usize].loc {
            self.state.dec_used(reg);
        }
    }

    /// `local.set` whose source value is spilled: refill the local's own
    /// register if it has one to itself, otherwise route through a fresh one.
    fn set_local_from_stack_slot(&mut self, index: u32) {
        let dst = self.state.slots[index as usize];
        let top_offset = abi::slot_offset(self.state.height() - 1);
        if let Location::Register(reg) = dst.loc {
            if self.state.get_use_count(reg) == 1 {
                self.emit.fill(reg, top_offset);
                return;
            }
            self.state.dec_used(reg);
        }
        let reg = self
            .state
            .get_unused_register(dst.ty.reg_class(), RegList::EMPTY, self.emit);
        self.emit.fill(reg, top_offset);
        self.state.slots[index as usize] = VarState::reg(dst.ty, reg);
        self.state.inc_used(reg);
    }

    // ── Globals ──

    pub fn global_get(&mut self, index: u32) {
        if !self.ok {
            return;
        }
        let Some(global) = self.env.globals.get(index as usize).copied() else {
            return self.unsupported(format!("global {index} out of range"));
        };
        let Some(ty) = ValueType::from_wasm(global.ty) else {
            return self.unsupported("exotic global");
        };
        if ty.reg_class() != RegClass::Gp {
            return self.unsupported("non-int global");
        }
        if ty.size() > abi::PTR_SIZE {
            return self.unsupported("oversized global");
        }
        let mut pinned = RegList::EMPTY;
        let addr = pinned.set(
            self.state
                .get_unused_register(RegClass::Gp, pinned, self.emit),
        );
        self.emit
            .load_from_context(addr, abi::GLOBALS_START_OFFSET, abi::PTR_SIZE);
        let value = pinned.set(
            self.state
                .get_unused_register(ty.reg_class(), pinned, self.emit),
        );
        self.emit.load(value, addr, global.offset, ty.size());
        self.state.push_register(ty, value);
        self.check_stack_size_limit();
        self.debug_check_state();
    }

    pub fn global_set(&mut self, index: u32) {
        if !self.ok {
            return;
        }
        let Some(global) = self.env.globals.get(index as usize).copied() else {
            return self.unsupported(format!("global {index} out of range"));
        };
        if ValueType::from_wasm(global.ty) != Some(ValueType::I32) {
            return self.unsupported("non-i32 global");
        }
        let ty = ValueType::I32;
        let mut pinned = RegList::EMPTY;
        let addr = pinned.set(
            self.state
                .get_unused_register(RegClass::Gp, pinned, self.emit),
        );
        self.emit
            .load_from_context(addr, abi::GLOBALS_START_OFFSET, abi::PTR_SIZE);
        let value = pinned.set(self.state.pop_to_register(ty.reg_class(), pinned, self.emit));
        self.emit.store(addr, global.offset, value, ty.size());
        self.debug_check_state();
    }

    // ── Arithmetic ──

    pub fn i32_binop(&mut self, op: impl FnOnce(&mut E, Reg, Reg, Reg)) {
        if !self.ok {
            return;
        }
        self.trace_state("i32 binop");
        let mut pinned = RegList::EMPTY;
        let target = pinned.set(
            self.state
                .get_binary_op_target_register(RegClass::Gp, self.emit),
        );
        let rhs = pinned.set(self.state.pop_to_register(RegClass::Gp, pinned, self.emit));
        let lhs = self.state.pop_to_register(RegClass::Gp, pinned, self.emit);
        op(self.emit, target, lhs, rhs);
        self.state.push_register(ValueType::I32, target);
        self.debug_check_state();
    }

    pub fn f32_binop(&mut self, op: impl FnOnce(&mut E, Reg, Reg, Reg)) {
        if !self.ok {
            return;
        }
        self.trace_state("f32 binop");
        let mut pinned = RegList::EMPTY;
        let target = pinned.set(
            self.state
                .get_binary_op_target_register(RegClass::Fp, self.emit),
        );
        let rhs = pinned.set(self.state.pop_to_register(RegClass::Fp, pinned, self.emit));
        let lhs = self.state.pop_to_register(RegClass::Fp, pinned, self.emit);
        op(self.emit, target, lhs, rhs);
        self.state.push_register(ValueType::F32, target);
        self.debug_check_state();
    }

    // ── Stack Management ──

    pub fn drop_value(&mut self) {
        if !self.ok {
            return;
        }
        self.state.drop_top();
        self.debug_check_state();
    }

    /// Explicit `return`: the result, if any, travels in the fixed return
    /// register of its class.
    pub fn do_return(&mut self) {
        if !self.ok {
            return;
        }
        if let Some(ty) = self.return_type {
            let reg = self
                .state
                .pop_to_register(ty.reg_class(), RegList::EMPTY, self.emit);
            self.emit.move_to_return_register(reg);
        }
        self.emit.leave_frame();
        self.emit.ret();
        self.reachable = false;
    }

    // ── Control Flow ──

    pub fn enter_block(&mut self, kind: BlockKind, blockty: wasmparser::BlockType) {
        if !self.ok {
            return;
        }
        self.trace_state("block");
        let arity = match blockty {
            wasmparser::BlockType::Empty => 0,
            wasmparser::BlockType::Type(ty) => {
                if ValueType::from_wasm(ty).is_none() {
                    return self.unsupported("exotic block type");
                }
                1
            }
            wasmparser::BlockType::FuncType(_) => return self.unsupported("multi-value block"),
        };
        let label = self.emit.create_label();
        let mut block = ControlBlock::new(kind, label, self.state.height(), arity);
        if block.is_loop() {
            // Spill all locals before entering the loop, freeing the cache
            // registers and keeping the backward merge cheap.
            self.state.spill_locals(self.num_locals, self.emit);
            // Loop labels bind at the beginning of the block, block labels
            // at the end.
            self.emit.bind(label);
            block.label_bound = true;
            let mut snapshot = self.state.split();
            snapshot.stack_base = block.stack_base;
            block.label_state = Some(snapshot);
        }
        self.control.push(block);
        self.debug_check_state();
    }

    pub fn br(&mut self, depth: u32) {
        if !self.ok {
            return;
        }
        self.trace_state("br");
        let Some(target) = self.control.len().checked_sub(1 + depth as usize) else {
            return self.unsupported(format!("branch depth {depth} out of range"));
        };
        self.branch_to(target);
        self.reachable = false;
        self.debug_check_state();
    }

    pub fn br_if(&mut self, depth: u32) {
        if !self.ok {
            return;
        }
        self.trace_state("br_if");
        let Some(target) = self.control.len().checked_sub(1 + depth as usize) else {
            return self.unsupported(format!("branch depth {depth} out of range"));
        };
        let cont_false = self.emit.create_label();
        let value = self
            .state
            .pop_to_register(RegClass::Gp, RegList::EMPTY, self.emit);
        self.emit.jump_if_zero(value, cont_false);
        self.branch_to(target);
        self.emit.bind(cont_false);
        self.debug_check_state();
    }

    /// Merge into `target`'s label state and jump. The merge only emits
    /// code; the current state is untouched, so a conditional branch's
    /// fall-through keeps compiling from it.
    fn branch_to(&mut self, target_index: usize) {
        let arity = self.control[target_index].br_arity();
        let stack_base = self.control[target_index].stack_base;
        if self.control[target_index].label_state.is_none() {
            let target_state = self.state.init_merge(self.num_locals, stack_base, arity);
            self.control[target_index].label_state = Some(target_state);
        }
        self.control[target_index].reached = true;
        let label = self.control[target_index].label;
        let target_state = self.control[target_index]
            .label_state
            .as_ref()
            .expect("label state initialised above");
        self.state.merge_stack_with(target_state, arity, self.emit);
        self.emit.jmp(label);
    }

    /// `end`: reconcile the fall-through edge, restore the label state as
    /// the current state if the label was branched to, and bind it.
    pub fn end_control(&mut self) {
        if !self.ok {
            return;
        }
        self.trace_state("end");
        if self.control.is_empty() {
            return self.unsupported("end without open block");
        }
        if self.control.len() == 1 {
            self.finish_body();
            return;
        }
        if self.reachable {
            self.fall_through_to_top();
        }
        let mut block = self.control.pop().expect("end without open block");
        if block.end_merge_reached() {
            self.state
                .steal(block.label_state.take().expect("reached label has a state"));
            self.reachable = true;
        }
        if !block.label_bound {
            self.emit.bind(block.label);
        }
        self.debug_check_state();
    }

    fn fall_through_to_top(&mut self) {
        let index = self.control.len() - 1;
        if self.control[index].end_merge_reached() {
            let target_state = self.control[index]
                .label_state
                .as_ref()
                .expect("reached label has a state");
            self.state.merge_full_stack_with(target_state, self.emit);
        } else {
            let mut snapshot = self.state.split();
            snapshot.stack_base = self.control[index].stack_base;
            self.control[index].label_state = Some(snapshot);
        }
    }

    /// The function body's own `end`: the implicit return.
    fn finish_body(&mut self) {
        if self.reachable {
            self.fall_through_to_top();
        }
        let mut block = self.control.pop().expect("function block");
        if !block.label_bound {
            self.emit.bind(block.label);
        }
        if self.reachable || block.reached {
            if let Some(label_state) = block.label_state.take() {
                self.state.steal(label_state);
            }
            if let Some(ty) = self.return_type {
                let reg = self
                    .state
                    .pop_to_register(ty.reg_class(), RegList::EMPTY, self.emit);
                self.emit.move_to_return_register(reg);
            }
            self.emit.leave_frame();
            self.emit.ret();
        }
        self.reachable = false;
        self.debug_check_state();
    }
}
