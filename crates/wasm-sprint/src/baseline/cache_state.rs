//! The symbolic model of locals and the operand stack.
//!
//! Every value the function manipulates is a slot in this model. Slots
//! `[0, num_locals)` are the locals, everything above is the operand stack.
//! A slot knows where its value currently lives: in a cache register, as a
//! compile-time constant, or spilled to the frame slot addressed by its
//! index. All opcode translation is expressed as transformations of this
//! state plus primitive emission requests.

use std::fmt;

use crate::abi;
use crate::baseline::reg::{Reg, RegClass, RegList};
use crate::baseline::regalloc::UseCounts;
use crate::baseline::transfer::TransferRecipe;
use crate::baseline::value::ValueType;
use crate::emit::{Constant, Emitter};

/// Where a slot's value currently lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    /// Resident in a cache register.
    Register(Reg),
    /// A compile-time integer constant. Floating-point constants are
    /// materialised eagerly and never stored here.
    Constant(i32),
    /// Spilled to the frame slot addressed by the slot's index.
    Stack,
}

/// One virtual-stack slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarState {
    pub ty: ValueType,
    pub loc: Location,
}

impl VarState {
    #[must_use]
    pub fn reg(ty: ValueType, reg: Reg) -> Self {
        debug_assert_eq!(ty.reg_class(), reg.class());
        Self {
            ty,
            loc: Location::Register(reg),
        }
    }

    #[must_use]
    pub fn constant(ty: ValueType, value: i32) -> Self {
        debug_assert_eq!(ty.reg_class(), RegClass::Gp);
        Self {
            ty,
            loc: Location::Constant(value),
        }
    }

    #[must_use]
    pub fn stack(ty: ValueType) -> Self {
        Self {
            ty,
            loc: Location::Stack,
        }
    }

    #[must_use]
    pub fn is_reg(&self) -> bool {
        matches!(self.loc, Location::Register(_))
    }
}

/// The cache state: an ordered sequence of slots plus the register use
/// counts derived from it.
///
/// Snapshots taken at control-flow points are plain clones; the live state
/// and a label state never alias.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub slots: Vec<VarState>,
    use_counts: UseCounts,
    /// Height at which this state's operand stack begins. Only meaningful on
    /// label states; the live state tracks its base through the compiler's
    /// control stack.
    pub stack_base: u32,
}

impl CacheState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn push_register(&mut self, ty: ValueType, reg: Reg) {
        self.use_counts.inc(reg);
        self.slots.push(VarState::reg(ty, reg));
    }

    pub fn push_constant(&mut self, ty: ValueType, value: i32) {
        self.slots.push(VarState::constant(ty, value));
    }

    pub fn push_stack(&mut self, ty: ValueType) {
        self.slots.push(VarState::stack(ty));
    }

    #[must_use]
    pub fn get_use_count(&self, reg: Reg) -> u32 {
        self.use_counts.get(reg)
    }

    pub fn inc_used(&mut self, reg: Reg) {
        self.use_counts.inc(reg);
    }

    pub fn dec_used(&mut self, reg: Reg) {
        self.use_counts.dec(reg);
    }

    #[must_use]
    pub fn used_registers(&self) -> RegList {
        self.use_counts.used_registers()
    }

    #[must_use]
    pub fn has_unused_register(&self, class: RegClass, pinned: RegList) -> bool {
        self.use_counts.has_unused(class, pinned)
    }

    /// Returns a cache register of `class` outside `pinned`. If none is
    /// free, evicts one: every slot referencing the victim is spilled to its
    /// frame slot first.
    pub fn get_unused_register<E: Emitter>(
        &mut self,
        class: RegClass,
        pinned: RegList,
        emit: &mut E,
    ) -> Reg {
        if let Some(reg) = self.use_counts.unused(class, pinned) {
            return reg;
        }
        let victim = self.use_counts.next_victim(class, pinned);
        self.spill_register(victim, emit);
        victim
    }

    /// Spills every slot currently held in `reg` and clears its use count.
    pub fn spill_register<E: Emitter>(&mut self, reg: Reg, emit: &mut E) {
        debug_assert!(self.use_counts.is_used(reg));
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.loc == Location::Register(reg) {
                emit.spill(abi::slot_offset(index as u32), reg);
                slot.loc = Location::Stack;
            }
        }
        self.use_counts.clear(reg);
    }

    /// Materialises the top slot into a register of `class` and pops it.
    ///
    /// A value already in a register is reused even if that register is
    /// pinned; `pinned` only constrains fresh allocations.
    pub fn pop_to_register<E: Emitter>(
        &mut self,
        class: RegClass,
        pinned: RegList,
        emit: &mut E,
    ) -> Reg {
        let index = self.height() - 1;
        let slot = *self.slots.last().expect("pop from empty stack");
        match slot.loc {
            Location::Register(reg) => {
                // A wrong-class register here would be a type-checking hole.
                debug_assert_eq!(reg.class(), class);
                self.use_counts.dec(reg);
                self.slots.pop();
                reg
            }
            Location::Constant(value) => {
                let reg = self.get_unused_register(class, pinned, emit);
                emit.load_constant(reg, Constant::I32(value));
                self.slots.pop();
                reg
            }
            Location::Stack => {
                let reg = self.get_unused_register(class, pinned, emit);
                emit.fill(reg, abi::slot_offset(index));
                self.slots.pop();
                reg
            }
        }
    }

    /// Picks the register that will receive the result of a binary op
    /// consuming the top two slots: one of the operands' registers if that
    /// register is held by no other slot (reclaimable once the operand is
    /// popped), otherwise a fresh register.
    pub fn get_binary_op_target_register<E: Emitter>(
        &mut self,
        class: RegClass,
        emit: &mut E,
    ) -> Reg {
        debug_assert!(self.slots.len() >= 2);
        for slot in self.slots.iter().rev().take(2) {
            if let Location::Register(reg) = slot.loc {
                if reg.class() == class && self.use_counts.get(reg) == 1 {
                    return reg;
                }
            }
        }
        self.get_unused_register(class, RegList::EMPTY, emit)
    }

    /// Pops and discards the top slot.
    pub fn drop_top(&mut self) {
        let slot = self.slots.pop().expect("drop from empty stack");
        if let Location::Register(reg) = slot.loc {
            self.use_counts.dec(reg);
        }
    }

    /// Spills every local held in a register or as a constant. Idempotent:
    /// a second call finds only `Stack` locations and emits nothing.
    pub fn spill_locals<E: Emitter>(&mut self, num_locals: u32, emit: &mut E) {
        for index in 0..num_locals {
            let offset = abi::slot_offset(index);
            match self.slots[index as usize].loc {
                Location::Register(reg) => {
                    emit.spill(offset, reg);
                    self.use_counts.dec(reg);
                    self.slots[index as usize].loc = Location::Stack;
                }
                Location::Constant(value) => {
                    emit.load_constant(abi::GP_SCRATCH, Constant::I32(value));
                    emit.spill(offset, abi::GP_SCRATCH);
                    self.slots[index as usize].loc = Location::Stack;
                }
                Location::Stack => {}
            }
        }
    }

    /// Snapshot for a label whose only predecessor (so far) is the current
    /// state.
    #[must_use]
    pub fn split(&self) -> CacheState {
        self.clone()
    }

    /// Replaces the current state wholesale with a label state; the emitted
    /// code has already materialised the values at every incoming edge.
    pub fn steal(&mut self, source: CacheState) {
        *self = source;
    }

    /// Builds the canonical label state the first time a label is targeted.
    ///
    /// Locals and the shared outer stack keep their register and spilled
    /// locations; constants are demoted so every later predecessor has a
    /// location it can materialise into. Every register appears at most
    /// once in the result: aliased slots may diverge at other predecessors,
    /// and the merge's move resolution relies on each register having a
    /// single producer. Duplicates fall back to `Stack`, and the top
    /// `arity` values may instead claim a register unused in the source.
    #[must_use]
    pub fn init_merge(&self, num_locals: u32, stack_base: u32, arity: u32) -> CacheState {
        debug_assert!(stack_base >= num_locals);
        let target_height = stack_base + arity;
        debug_assert!(self.height() >= target_height);

        let mut taken = RegList::EMPTY;
        let mut slots = Vec::with_capacity(target_height as usize);
        for index in 0..stack_base {
            let slot = self.slots[index as usize];
            slots.push(match slot.loc {
                Location::Register(reg) if !taken.has(reg) => {
                    taken.set(reg);
                    slot
                }
                Location::Register(_) | Location::Constant(_) => VarState::stack(slot.ty),
                Location::Stack => slot,
            });
        }

        let src_base = self.height() - arity;
        for offset in 0..arity {
            let slot = self.slots[(src_base + offset) as usize];
            slots.push(match slot.loc {
                Location::Register(reg) if !taken.has(reg) => {
                    taken.set(reg);
                    slot
                }
                Location::Register(_) | Location::Constant(_) => {
                    // Claim a register no source slot lives in, so the
                    // incoming edges' moves cannot clobber live values.
                    let candidate = abi::cache_regs(slot.ty.reg_class())
                        .iter()
                        .copied()
                        .find(|r| !taken.has(*r) && !self.use_counts.is_used(*r));
                    match candidate {
                        Some(reg) => {
                            taken.set(reg);
                            VarState::reg(slot.ty, reg)
                        }
                        None => VarState::stack(slot.ty),
                    }
                }
                Location::Stack => slot,
            });
        }

        let mut state = CacheState {
            slots,
            use_counts: UseCounts::new(),
            stack_base,
        };
        state.recompute_use_counts();
        state
    }

    fn recompute_use_counts(&mut self) {
        self.use_counts = UseCounts::new();
        for slot in &self.slots {
            if let Location::Register(reg) = slot.loc {
                self.use_counts.inc(reg);
            }
        }
    }

    /// Emits the moves that make the machine state match `target` at a
    /// branch: locals and the shared outer stack slot by slot, then the top
    /// `arity` values, which may sit deeper in the current state than in the
    /// target. Emits code only; the current state is left untouched so the
    /// fall-through path can keep compiling from it.
    pub fn merge_stack_with<E: Emitter>(&self, target: &CacheState, arity: u32, emit: &mut E) {
        debug_assert!(target.height() >= arity);
        debug_assert!(self.height() >= arity);
        let target_base = target.height() - arity;
        let src_base = self.height() - arity;
        debug_assert!(src_base >= target_base);

        let mut recipe = TransferRecipe::new();
        for index in 0..target_base {
            self.transfer_slot(&mut recipe, target, index, index);
        }
        for offset in 0..arity {
            self.transfer_slot(&mut recipe, target, target_base + offset, src_base + offset);
        }
        recipe.execute(emit);
    }

    /// Merge for a fall-through edge, where heights already agree.
    pub fn merge_full_stack_with<E: Emitter>(&self, target: &CacheState, emit: &mut E) {
        debug_assert_eq!(self.height(), target.height());
        let mut recipe = TransferRecipe::new();
        for index in 0..self.height() {
            self.transfer_slot(&mut recipe, target, index, index);
        }
        recipe.execute(emit);
    }

    fn transfer_slot(
        &self,
        recipe: &mut TransferRecipe,
        target: &CacheState,
        dst_index: u32,
        src_index: u32,
    ) {
        let dst = target.slots[dst_index as usize];
        let src = self.slots[src_index as usize];
        debug_assert_eq!(dst.ty, src.ty);

        match (dst.loc, src.loc) {
            (Location::Stack, Location::Stack) => {
                if dst_index != src_index {
                    recipe.move_stack(
                        abi::slot_offset(dst_index),
                        abi::slot_offset(src_index),
                        dst.ty.reg_class(),
                    );
                }
            }
            (Location::Stack, Location::Register(reg)) => {
                recipe.spill(abi::slot_offset(dst_index), reg);
            }
            (Location::Stack, Location::Constant(value)) => {
                recipe.spill_constant(abi::slot_offset(dst_index), value);
            }
            (Location::Register(dst_reg), Location::Register(src_reg)) => {
                recipe.move_register(dst_reg, src_reg);
            }
            (Location::Register(reg), Location::Constant(value)) => {
                recipe.load_constant(reg, Constant::I32(value));
            }
            (Location::Register(reg), Location::Stack) => {
                recipe.fill(reg, abi::slot_offset(src_index));
            }
            (Location::Constant(expected), Location::Constant(actual)) => {
                // Constants survive in label states only where every
                // predecessor provably agrees (the untouchable region below
                // a loop's stack base).
                debug_assert_eq!(expected, actual);
            }
            (Location::Constant(_), _) => {
                unreachable!("constant label slot fed by a non-constant source")
            }
        }
    }

    /// Whether the use counts match the slot locations exactly. The compiler
    /// checks this after every state transformation in debug builds.
    #[must_use]
    pub fn use_counts_consistent(&self) -> bool {
        let mut expected = UseCounts::new();
        for slot in &self.slots {
            if let Location::Register(reg) = slot.loc {
                expected.inc(reg);
            }
        }
        for class in [RegClass::Gp, RegClass::Fp] {
            for reg in abi::cache_regs(class) {
                if expected.get(*reg) != self.use_counts.get(*reg) {
                    return false;
                }
            }
        }
        true
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, slot) in self.slots.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            match slot.loc {
                Location::Register(reg) => write!(f, "{}:{}", slot.ty, reg)?,
                Location::Constant(value) => write!(f, "{}:c{}", slot.ty, value)?,
                Location::Stack => write!(f, "{}:s", slot.ty)?,
            }
        }
        Ok(())
    }
}
