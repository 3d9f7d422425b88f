//! Instruction buffer with label management for the portable target.
//!
//! Branches to unbound labels are recorded as fixups and patched with
//! byte-relative offsets when the buffer is finished.

use super::Inst;
use crate::baseline::reg::Reg;
use crate::emit::{Constant, Emitter, Label};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct CodeBuffer {
    insts: Vec<Inst>,
    /// Instruction index each label is bound to, once bound.
    labels: Vec<Option<usize>>,
    /// `(instruction index, label)` pairs awaiting offset resolution.
    fixups: Vec<(usize, Label)>,
}

impl CodeBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    #[must_use]
    pub fn label_is_bound(&self, label: Label) -> bool {
        self.labels
            .get(label.index() as usize)
            .is_some_and(Option::is_some)
    }

    /// Whether every created label has been bound.
    #[must_use]
    pub fn all_labels_bound(&self) -> bool {
        self.labels.iter().all(Option::is_some)
    }

    fn byte_offset_of(&self, inst_index: usize) -> usize {
        self.insts[..inst_index]
            .iter()
            .map(|i| i.encode().len())
            .sum()
    }

    /// Resolves every branch fixup and encodes the instructions.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        let fixups = std::mem::take(&mut self.fixups);
        for (inst_index, label) in fixups {
            let target_index = self.labels[label.index() as usize]
                .ok_or_else(|| Error::Internal(format!("unresolved label {}", label.index())))?;
            let relative =
                self.byte_offset_of(target_index) as i32 - self.byte_offset_of(inst_index) as i32;
            match &mut self.insts[inst_index] {
                Inst::Jump { offset } | Inst::JumpIfZero { offset, .. } => *offset = relative,
                other => {
                    return Err(Error::Internal(format!(
                        "cannot fixup non-branch instruction {other:?}"
                    )));
                }
            }
        }

        let mut bytes = Vec::new();
        for inst in &self.insts {
            bytes.extend(inst.encode());
        }
        Ok(bytes)
    }
}

impl Emitter for CodeBuffer {
    fn create_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    fn bind(&mut self, label: Label) {
        let slot = &mut self.labels[label.index() as usize];
        debug_assert!(slot.is_none(), "label {} bound twice", label.index());
        *slot = Some(self.insts.len());
    }

    fn jmp(&mut self, label: Label) {
        self.fixups.push((self.insts.len(), label));
        self.insts.push(Inst::Jump { offset: 0 });
    }

    fn jump_if_zero(&mut self, reg: Reg, label: Label) {
        self.fixups.push((self.insts.len(), label));
        self.insts.push(Inst::JumpIfZero { reg, offset: 0 });
    }

    fn enter_frame(&mut self) {
        self.insts.push(Inst::EnterFrame);
    }

    fn reserve_stack_space(&mut self, slots: u32) {
        self.insts.push(Inst::ReserveStack { slots });
    }

    fn leave_frame(&mut self) {
        self.insts.push(Inst::LeaveFrame);
    }

    fn ret(&mut self) {
        self.insts.push(Inst::Ret);
    }

    fn move_register(&mut self, dst: Reg, src: Reg) {
        self.insts.push(Inst::Move { dst, src });
    }

    fn load_constant(&mut self, dst: Reg, value: Constant) {
        self.insts.push(match value {
            Constant::I32(value) => Inst::LoadImm { reg: dst, value },
            Constant::F32(value) => Inst::LoadImmF32 {
                reg: dst,
                bits: value.to_bits(),
            },
        });
    }

    fn load(&mut self, dst: Reg, base: Reg, offset: u32, size: u32) {
        self.insts.push(Inst::Load {
            dst,
            base,
            offset,
            size,
        });
    }

    fn store(&mut self, base: Reg, offset: u32, src: Reg, size: u32) {
        self.insts.push(Inst::Store {
            base,
            offset,
            src,
            size,
        });
    }

    fn spill(&mut self, offset: i32, reg: Reg) {
        self.insts.push(Inst::Spill { offset, reg });
    }

    fn fill(&mut self, reg: Reg, offset: i32) {
        self.insts.push(Inst::Fill { reg, offset });
    }

    fn load_from_context(&mut self, dst: Reg, offset: u32, size: u32) {
        self.insts.push(Inst::LoadFromContext {
            reg: dst,
            offset,
            size,
        });
    }

    fn spill_context(&mut self, reg: Reg) {
        self.insts.push(Inst::SpillContext { reg });
    }

    fn load_caller_frame_slot(&mut self, dst: Reg, slot_index: u32) {
        self.insts.push(Inst::LoadCallerFrameSlot {
            reg: dst,
            slot: slot_index,
        });
    }

    fn move_to_return_register(&mut self, reg: Reg) {
        self.insts.push(Inst::MoveToReturn { reg });
    }

    fn i32_add(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::Add32 { dst, lhs, rhs });
    }

    fn i32_sub(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::Sub32 { dst, lhs, rhs });
    }

    fn i32_mul(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::Mul32 { dst, lhs, rhs });
    }

    fn i32_and(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::And32 { dst, lhs, rhs });
    }

    fn i32_or(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::Or32 { dst, lhs, rhs });
    }

    fn i32_xor(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::Xor32 { dst, lhs, rhs });
    }

    fn f32_add(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::FAdd32 { dst, lhs, rhs });
    }

    fn f32_sub(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::FSub32 { dst, lhs, rhs });
    }

    fn f32_mul(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insts.push(Inst::FMul32 { dst, lhs, rhs });
    }

    fn code_offset(&self) -> usize {
        self.insts.iter().map(|i| i.encode().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_resolves_to_positive_offset() {
        let mut buffer = CodeBuffer::new();
        let label = buffer.create_label();
        buffer.jmp(label);
        buffer.i32_add(Reg::gp(2), Reg::gp(3), Reg::gp(4));
        buffer.bind(label);
        buffer.ret();

        buffer.finish().expect("finish");
        assert!(matches!(buffer.insts()[0], Inst::Jump { offset } if offset > 0));
    }

    #[test]
    fn backward_branch_resolves_to_negative_offset() {
        let mut buffer = CodeBuffer::new();
        let label = buffer.create_label();
        buffer.bind(label);
        buffer.i32_add(Reg::gp(2), Reg::gp(3), Reg::gp(4));
        buffer.jmp(label);

        buffer.finish().expect("finish");
        assert!(matches!(buffer.insts()[1], Inst::Jump { offset } if offset < 0));
    }

    #[test]
    fn unbound_label_is_an_internal_error() {
        let mut buffer = CodeBuffer::new();
        let label = buffer.create_label();
        buffer.jmp(label);
        assert!(buffer.finish().is_err());
        assert!(!buffer.all_labels_bound());
    }

    #[test]
    fn code_offset_counts_encoded_bytes() {
        let mut buffer = CodeBuffer::new();
        assert_eq!(buffer.code_offset(), 0);
        buffer.enter_frame();
        assert_eq!(buffer.code_offset(), 1);
        buffer.reserve_stack_space(4);
        assert_eq!(buffer.code_offset(), 6);
    }
}
