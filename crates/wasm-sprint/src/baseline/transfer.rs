//! Ordered execution of the data movement a control-flow merge requires.
//!
//! A merge is a parallel assignment: every target location receives the
//! value its paired source location holds *before* the merge. Executing it
//! sequentially needs care:
//!
//! 1. memory writes (spills and stack-to-stack moves) run first, in
//!    increasing target-slot order, so a shifted stack read still sees the
//!    original data;
//! 2. register-to-register moves run next, in topological order, with
//!    cycles broken through the per-class scratch register;
//! 3. register loads (constants and fills) run last, once no remaining move
//!    reads the destination registers.

use crate::abi;
use crate::baseline::reg::{Reg, RegClass};
use crate::emit::{Constant, Emitter};

#[derive(Debug, Clone, Copy)]
enum MemWrite {
    Spill { offset: i32, reg: Reg },
    SpillConstant { offset: i32, value: i32 },
    StackMove { dst: i32, src: i32, class: RegClass },
}

#[derive(Debug, Clone, Copy)]
struct RegMove {
    dst: Reg,
    src: Reg,
}

#[derive(Debug, Clone, Copy)]
enum LoadSrc {
    Const(Constant),
    Slot(i32),
}

#[derive(Debug, Clone, Copy)]
struct RegLoad {
    dst: Reg,
    src: LoadSrc,
}

/// Collects the moves of one merge, then emits them in a safe order.
#[derive(Debug, Default)]
pub struct TransferRecipe {
    writes: Vec<MemWrite>,
    moves: Vec<RegMove>,
    loads: Vec<RegLoad>,
}

impl TransferRecipe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spill(&mut self, offset: i32, reg: Reg) {
        self.writes.push(MemWrite::Spill { offset, reg });
    }

    pub fn spill_constant(&mut self, offset: i32, value: i32) {
        self.writes.push(MemWrite::SpillConstant { offset, value });
    }

    pub fn move_stack(&mut self, dst: i32, src: i32, class: RegClass) {
        debug_assert_ne!(dst, src);
        self.writes.push(MemWrite::StackMove { dst, src, class });
    }

    pub fn move_register(&mut self, dst: Reg, src: Reg) {
        debug_assert_eq!(dst.class(), src.class());
        if dst == src {
            return;
        }
        // A register may be the target of two slots only if both slots merge
        // the same value into it.
        if let Some(existing) = self.moves.iter().find(|m| m.dst == dst) {
            debug_assert_eq!(existing.src, src, "conflicting moves into {dst}");
            return;
        }
        self.moves.push(RegMove { dst, src });
    }

    pub fn load_constant(&mut self, dst: Reg, value: Constant) {
        if self.loads.iter().any(|l| l.dst == dst) {
            return;
        }
        self.loads.push(RegLoad {
            dst,
            src: LoadSrc::Const(value),
        });
    }

    pub fn fill(&mut self, dst: Reg, offset: i32) {
        if self.loads.iter().any(|l| l.dst == dst) {
            return;
        }
        self.loads.push(RegLoad {
            dst,
            src: LoadSrc::Slot(offset),
        });
    }

    pub fn execute<E: Emitter>(self, emit: &mut E) {
        for write in &self.writes {
            match *write {
                MemWrite::Spill { offset, reg } => emit.spill(offset, reg),
                MemWrite::SpillConstant { offset, value } => {
                    emit.load_constant(abi::GP_SCRATCH, Constant::I32(value));
                    emit.spill(offset, abi::GP_SCRATCH);
                }
                MemWrite::StackMove { dst, src, class } => {
                    let scratch = abi::scratch_reg(class);
                    emit.fill(scratch, src);
                    emit.spill(dst, scratch);
                }
            }
        }

        let mut moves = self.moves;
        while !moves.is_empty() {
            let ready = moves
                .iter()
                .position(|m| !moves.iter().any(|other| other.src == m.dst));
            match ready {
                Some(idx) => {
                    let m = moves.swap_remove(idx);
                    emit.move_register(m.dst, m.src);
                }
                None => {
                    // Every remaining destination is also a pending source: a
                    // cycle. Park one source in the scratch register and
                    // redirect its readers there.
                    let parked = moves[0].src;
                    let scratch = abi::scratch_reg(parked.class());
                    emit.move_register(scratch, parked);
                    for m in &mut moves {
                        if m.src == parked {
                            m.src = scratch;
                        }
                    }
                }
            }
        }

        for load in &self.loads {
            match load.src {
                LoadSrc::Const(value) => emit.load_constant(load.dst, value),
                LoadSrc::Slot(offset) => emit.fill(load.dst, offset),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::reg::Reg;
    use crate::mcode::{CodeBuffer, Inst};

    fn moves_of(buffer: &CodeBuffer) -> Vec<(Reg, Reg)> {
        buffer
            .insts()
            .iter()
            .filter_map(|inst| match inst {
                Inst::Move { dst, src } => Some((*dst, *src)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn independent_moves_run_in_dependency_order() {
        // r2 <- r3 must run before r3 <- r4 overwrites r3.
        let mut recipe = TransferRecipe::new();
        recipe.move_register(Reg::gp(3), Reg::gp(4));
        recipe.move_register(Reg::gp(2), Reg::gp(3));
        let mut buffer = CodeBuffer::new();
        recipe.execute(&mut buffer);

        assert_eq!(
            moves_of(&buffer),
            vec![(Reg::gp(2), Reg::gp(3)), (Reg::gp(3), Reg::gp(4))]
        );
    }

    #[test]
    fn swap_cycle_is_broken_through_the_scratch_register() {
        let mut recipe = TransferRecipe::new();
        recipe.move_register(Reg::gp(2), Reg::gp(3));
        recipe.move_register(Reg::gp(3), Reg::gp(2));
        let mut buffer = CodeBuffer::new();
        recipe.execute(&mut buffer);

        assert_eq!(
            moves_of(&buffer),
            vec![
                (abi::GP_SCRATCH, Reg::gp(3)),
                (Reg::gp(3), Reg::gp(2)),
                (Reg::gp(2), abi::GP_SCRATCH),
            ]
        );
    }

    #[test]
    fn identical_moves_are_deduplicated() {
        let mut recipe = TransferRecipe::new();
        recipe.move_register(Reg::gp(2), Reg::gp(3));
        recipe.move_register(Reg::gp(2), Reg::gp(3));
        recipe.move_register(Reg::gp(2), Reg::gp(2));
        let mut buffer = CodeBuffer::new();
        recipe.execute(&mut buffer);

        assert_eq!(moves_of(&buffer), vec![(Reg::gp(2), Reg::gp(3))]);
    }

    #[test]
    fn memory_writes_precede_register_moves_and_loads() {
        let mut recipe = TransferRecipe::new();
        recipe.fill(Reg::gp(4), 16);
        recipe.move_register(Reg::gp(2), Reg::gp(3));
        recipe.spill(8, Reg::gp(5));
        let mut buffer = CodeBuffer::new();
        recipe.execute(&mut buffer);

        let insts = buffer.insts();
        assert!(matches!(insts[0], Inst::Spill { offset: 8, .. }));
        assert!(matches!(insts[1], Inst::Move { .. }));
        assert!(matches!(insts[2], Inst::Fill { offset: 16, .. }));
    }

    #[test]
    fn stack_moves_go_through_scratch() {
        let mut recipe = TransferRecipe::new();
        recipe.move_stack(8, 24, RegClass::Gp);
        let mut buffer = CodeBuffer::new();
        recipe.execute(&mut buffer);

        let insts = buffer.insts();
        assert!(
            matches!(insts[0], Inst::Fill { reg, offset: 24 } if reg == abi::GP_SCRATCH)
        );
        assert!(
            matches!(insts[1], Inst::Spill { offset: 8, reg } if reg == abi::GP_SCRATCH)
        );
    }
}
