use super::Opcode;
use crate::baseline::reg::Reg;

/// One instruction of the portable target. Branch offsets are byte-relative
/// to the start of the branch instruction and are filled in when the buffer
/// resolves its fixups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inst {
    EnterFrame,
    ReserveStack { slots: u32 },
    LeaveFrame,
    Ret,
    Jump { offset: i32 },
    JumpIfZero { reg: Reg, offset: i32 },
    Move { dst: Reg, src: Reg },
    LoadImm { reg: Reg, value: i32 },
    LoadImmF32 { reg: Reg, bits: u32 },
    Spill { offset: i32, reg: Reg },
    Fill { reg: Reg, offset: i32 },
    Load { dst: Reg, base: Reg, offset: u32, size: u32 },
    Store { base: Reg, offset: u32, src: Reg, size: u32 },
    LoadFromContext { reg: Reg, offset: u32, size: u32 },
    SpillContext { reg: Reg },
    LoadCallerFrameSlot { reg: Reg, slot: u32 },
    MoveToReturn { reg: Reg },
    Add32 { dst: Reg, lhs: Reg, rhs: Reg },
    Sub32 { dst: Reg, lhs: Reg, rhs: Reg },
    Mul32 { dst: Reg, lhs: Reg, rhs: Reg },
    And32 { dst: Reg, lhs: Reg, rhs: Reg },
    Or32 { dst: Reg, lhs: Reg, rhs: Reg },
    Xor32 { dst: Reg, lhs: Reg, rhs: Reg },
    FAdd32 { dst: Reg, lhs: Reg, rhs: Reg },
    FSub32 { dst: Reg, lhs: Reg, rhs: Reg },
    FMul32 { dst: Reg, lhs: Reg, rhs: Reg },
}

impl Inst {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::EnterFrame => Opcode::EnterFrame,
            Self::ReserveStack { .. } => Opcode::ReserveStack,
            Self::LeaveFrame => Opcode::LeaveFrame,
            Self::Ret => Opcode::Ret,
            Self::Jump { .. } => Opcode::Jump,
            Self::JumpIfZero { .. } => Opcode::JumpIfZero,
            Self::Move { .. } => Opcode::Move,
            Self::LoadImm { .. } => Opcode::LoadImm,
            Self::LoadImmF32 { .. } => Opcode::LoadImmF32,
            Self::Spill { .. } => Opcode::Spill,
            Self::Fill { .. } => Opcode::Fill,
            Self::Load { .. } => Opcode::Load,
            Self::Store { .. } => Opcode::Store,
            Self::LoadFromContext { .. } => Opcode::LoadFromContext,
            Self::SpillContext { .. } => Opcode::SpillContext,
            Self::LoadCallerFrameSlot { .. } => Opcode::LoadCallerFrameSlot,
            Self::MoveToReturn { .. } => Opcode::MoveToReturn,
            Self::Add32 { .. } => Opcode::Add32,
            Self::Sub32 { .. } => Opcode::Sub32,
            Self::Mul32 { .. } => Opcode::Mul32,
            Self::And32 { .. } => Opcode::And32,
            Self::Or32 { .. } => Opcode::Or32,
            Self::Xor32 { .. } => Opcode::Xor32,
            Self::FAdd32 { .. } => Opcode::FAdd32,
            Self::FSub32 { .. } => Opcode::FSub32,
            Self::FMul32 { .. } => Opcode::FMul32,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.opcode() as u8];
        match *self {
            Self::EnterFrame | Self::LeaveFrame | Self::Ret => {}
            Self::ReserveStack { slots } => bytes.extend_from_slice(&slots.to_le_bytes()),
            Self::Jump { offset } => bytes.extend_from_slice(&offset.to_le_bytes()),
            Self::JumpIfZero { reg, offset } => {
                bytes.push(reg.encode());
                bytes.extend_from_slice(&offset.to_le_bytes());
            }
            Self::Move { dst, src } => bytes.extend_from_slice(&[dst.encode(), src.encode()]),
            Self::LoadImm { reg, value } => {
                bytes.push(reg.encode());
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            Self::LoadImmF32 { reg, bits } => {
                bytes.push(reg.encode());
                bytes.extend_from_slice(&bits.to_le_bytes());
            }
            Self::Spill { offset, reg } => {
                bytes.push(reg.encode());
                bytes.extend_from_slice(&offset.to_le_bytes());
            }
            Self::Fill { reg, offset } => {
                bytes.push(reg.encode());
                bytes.extend_from_slice(&offset.to_le_bytes());
            }
            Self::Load {
                dst,
                base,
                offset,
                size,
            } => {
                bytes.extend_from_slice(&[dst.encode(), base.encode(), size as u8]);
                bytes.extend_from_slice(&offset.to_le_bytes());
            }
            Self::Store {
                base,
                offset,
                src,
                size,
            } => {
                bytes.extend_from_slice(&[base.encode(), src.encode(), size as u8]);
                bytes.extend_from_slice(&offset.to_le_bytes());
            }
            Self::LoadFromContext { reg, offset, size } => {
                bytes.extend_from_slice(&[reg.encode(), size as u8]);
                bytes.extend_from_slice(&offset.to_le_bytes());
            }
            Self::SpillContext { reg } | Self::MoveToReturn { reg } => bytes.push(reg.encode()),
            Self::LoadCallerFrameSlot { reg, slot } => {
                bytes.push(reg.encode());
                bytes.extend_from_slice(&slot.to_le_bytes());
            }
            Self::Add32 { dst, lhs, rhs }
            | Self::Sub32 { dst, lhs, rhs }
            | Self::Mul32 { dst, lhs, rhs }
            | Self::And32 { dst, lhs, rhs }
            | Self::Or32 { dst, lhs, rhs }
            | Self::Xor32 { dst, lhs, rhs }
            | Self::FAdd32 { dst, lhs, rhs }
            | Self::FSub32 { dst, lhs, rhs }
            | Self::FMul32 { dst, lhs, rhs } => {
                bytes.extend_from_slice(&[dst.encode(), lhs.encode(), rhs.encode()]);
            }
        }
        bytes
    }
}
