//! ABI constants shared by the baseline compiler and its emitters: register
//! assignments, the cache-register lists, parameter locations and the frame
//! layout of value slots.

use crate::baseline::reg::{Reg, RegClass};

// ── Register Assignments ──

/// GP registers the cache state is permitted to allocate.
pub const GP_CACHE_REGS: &[Reg] = &[
    Reg::gp(2),
    Reg::gp(3),
    Reg::gp(4),
    Reg::gp(5),
    Reg::gp(6),
    Reg::gp(7),
];

/// FP registers the cache state is permitted to allocate.
pub const FP_CACHE_REGS: &[Reg] = &[
    Reg::fp(1),
    Reg::fp(2),
    Reg::fp(3),
    Reg::fp(4),
    Reg::fp(5),
    Reg::fp(6),
];

/// Scratch register for merge moves and constant spills. Never allocated,
/// so it is always safe to clobber between two emitted instructions.
pub const GP_SCRATCH: Reg = Reg::gp(10);

/// FP counterpart of [`GP_SCRATCH`].
pub const FP_SCRATCH: Reg = Reg::fp(10);

/// Return value register for GP results (not in the cache list).
pub const GP_RETURN_REG: Reg = Reg::gp(0);

/// Return value register for FP results (not in the cache list).
pub const FP_RETURN_REG: Reg = Reg::fp(0);

/// The module context arrives here and is stored to its dedicated frame slot
/// in the prologue.
pub const CONTEXT_REG: Reg = Reg::gp(11);

/// GP parameter-passing registers, in order. The tail of the list is not in
/// the cache list; parameters landing there are moved into a cache register
/// before use.
pub const GP_PARAM_REGS: &[Reg] = &[
    Reg::gp(3),
    Reg::gp(4),
    Reg::gp(5),
    Reg::gp(6),
    Reg::gp(8),
    Reg::gp(9),
];

/// FP parameter-passing registers, in order.
pub const FP_PARAM_REGS: &[Reg] = &[Reg::fp(1), Reg::fp(2), Reg::fp(8), Reg::fp(9)];

#[must_use]
pub fn cache_regs(class: RegClass) -> &'static [Reg] {
    match class {
        RegClass::Gp => GP_CACHE_REGS,
        RegClass::Fp => FP_CACHE_REGS,
    }
}

#[must_use]
pub fn scratch_reg(class: RegClass) -> Reg {
    match class {
        RegClass::Gp => GP_SCRATCH,
        RegClass::Fp => FP_SCRATCH,
    }
}

#[must_use]
pub fn is_cache_reg(reg: Reg) -> bool {
    cache_regs(reg.class()).contains(&reg)
}

// ── Frame Layout ──

/// Operand-stack slots a function may use beyond its locals. Exceeding this
/// is a bailout, not an error; the frame is pre-reserved for this bound so a
/// slot's spill offset is a function of its index alone.
pub const MAX_STACK_HEIGHT: u32 = 8;

/// Bytes per value slot in the frame's spill area.
pub const SLOT_SIZE: u32 = 8;

/// Byte offset of value slot `index` within the frame's spill area.
#[must_use]
pub fn slot_offset(index: u32) -> i32 {
    (index * SLOT_SIZE) as i32
}

// ── Context Layout ──

/// Byte offset of the globals-base pointer within the context structure.
pub const GLOBALS_START_OFFSET: u32 = 8;

/// Pointer size of the target.
pub const PTR_SIZE: u32 = 8;

// ── Parameter Locations ──

/// Where an incoming parameter lives on function entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLoc {
    Register(Reg),
    CallerFrameSlot(u32),
}

/// Assigns parameter locations in declaration order: registers from the
/// per-class lists first, caller frame slots after.
#[derive(Debug, Default)]
pub struct ParamAssigner {
    gp_used: usize,
    fp_used: usize,
    slots_used: u32,
}

impl ParamAssigner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, class: RegClass) -> ParamLoc {
        match class {
            RegClass::Gp => {
                if self.gp_used < GP_PARAM_REGS.len() {
                    self.gp_used += 1;
                    return ParamLoc::Register(GP_PARAM_REGS[self.gp_used - 1]);
                }
            }
            RegClass::Fp => {
                if self.fp_used < FP_PARAM_REGS.len() {
                    self.fp_used += 1;
                    return ParamLoc::Register(FP_PARAM_REGS[self.fp_used - 1]);
                }
            }
        }
        self.slots_used += 1;
        ParamLoc::CallerFrameSlot(self.slots_used - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_and_return_regs_are_not_cache_regs() {
        for reg in [GP_SCRATCH, FP_SCRATCH, GP_RETURN_REG, FP_RETURN_REG, CONTEXT_REG] {
            assert!(!is_cache_reg(reg), "{reg} must not be allocatable");
        }
    }

    #[test]
    fn param_assignment_overflows_to_caller_frame_slots() {
        let mut assigner = ParamAssigner::new();
        for reg in GP_PARAM_REGS {
            assert_eq!(assigner.next(RegClass::Gp), ParamLoc::Register(*reg));
        }
        assert_eq!(assigner.next(RegClass::Gp), ParamLoc::CallerFrameSlot(0));
        // FP registers are assigned independently of the GP overflow.
        assert_eq!(
            assigner.next(RegClass::Fp),
            ParamLoc::Register(FP_PARAM_REGS[0])
        );
        assert_eq!(assigner.next(RegClass::Gp), ParamLoc::CallerFrameSlot(1));
    }

    #[test]
    fn param_reg_tails_are_outside_the_cache_lists() {
        assert!(GP_PARAM_REGS.iter().any(|r| !is_cache_reg(*r)));
        assert!(FP_PARAM_REGS.iter().any(|r| !is_cache_reg(*r)));
    }

    #[test]
    fn slot_offsets_are_slot_size_apart() {
        assert_eq!(slot_offset(0), 0);
        assert_eq!(slot_offset(3) - slot_offset(2), SLOT_SIZE as i32);
    }
}
