//! Test harness for wasm-sprint unit tests.
//!
//! Provides WAT compilation helpers and pattern assertions over the portable
//! instruction set. Only available when running tests or when the
//! `test-harness` feature is enabled.
//!
//! # Example
//!
//! ```rust
//! use wasm_sprint::test_harness::*;
//!
//! let function = compile_wat_function(
//!     r#"
//!     (module
//!         (func (param i32 i32) (result i32)
//!             local.get 0
//!             local.get 1
//!             i32.add
//!         )
//!     )
//!     "#,
//! )
//! .expect("compile");
//! assert!(function.ok);
//! assert_has_pattern(
//!     function.insts(),
//!     &[InstPattern::Add32 {
//!         dst: Pat::Any,
//!         lhs: Pat::Any,
//!         rhs: Pat::Any,
//!     }],
//! );
//! ```

use crate::baseline::reg::Reg;
use crate::baseline::{CompiledFunction, CompiledModule};
use crate::mcode::{Inst, Opcode};
use crate::{Error, Result};

/// Parse WAT (WebAssembly Text) format to a WASM binary.
pub fn wat_to_wasm(wat: &str) -> Result<Vec<u8>> {
    wat::parse_str(wat).map_err(|e| Error::Internal(format!("WAT parse error: {e}")))
}

/// Compile a WAT module with the baseline compiler.
pub fn compile_wat(wat: &str) -> Result<CompiledModule> {
    let wasm = wat_to_wasm(wat)?;
    crate::baseline::compile(&wasm)
}

/// Compile a WAT module and return its first function.
pub fn compile_wat_function(wat: &str) -> Result<CompiledFunction> {
    let mut module = compile_wat(wat)?;
    if module.functions.is_empty() {
        return Err(Error::Internal("module has no function".to_string()));
    }
    Ok(module.functions.remove(0))
}

/// Pattern matching for instruction fields.
#[derive(Debug, Clone)]
pub enum Pat<T> {
    /// Match any value.
    Any,
    /// Match an exact value.
    Exact(T),
    /// Match if the value satisfies a predicate.
    Predicate(fn(&T) -> bool),
}

impl<T: PartialEq> Pat<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Pat::Any => true,
            Pat::Exact(expected) => value == expected,
            Pat::Predicate(pred) => pred(value),
        }
    }
}

/// Pattern over one instruction, with wildcards per field.
#[derive(Debug, Clone)]
pub enum InstPattern {
    /// Match any instruction.
    Any,
    EnterFrame,
    ReserveStack { slots: Pat<u32> },
    LeaveFrame,
    Ret,
    Jump { offset: Pat<i32> },
    JumpIfZero { reg: Pat<Reg>, offset: Pat<i32> },
    Move { dst: Pat<Reg>, src: Pat<Reg> },
    LoadImm { reg: Pat<Reg>, value: Pat<i32> },
    LoadImmF32 { reg: Pat<Reg>, bits: Pat<u32> },
    Spill { offset: Pat<i32>, reg: Pat<Reg> },
    Fill { reg: Pat<Reg>, offset: Pat<i32> },
    Load { dst: Pat<Reg>, base: Pat<Reg>, offset: Pat<u32>, size: Pat<u32> },
    Store { base: Pat<Reg>, offset: Pat<u32>, src: Pat<Reg>, size: Pat<u32> },
    LoadFromContext { reg: Pat<Reg>, offset: Pat<u32> },
    SpillContext { reg: Pat<Reg> },
    LoadCallerFrameSlot { reg: Pat<Reg>, slot: Pat<u32> },
    MoveToReturn { reg: Pat<Reg> },
    Add32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    Sub32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    Mul32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    And32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    Or32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    Xor32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    FAdd32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    FSub32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
    FMul32 { dst: Pat<Reg>, lhs: Pat<Reg>, rhs: Pat<Reg> },
}

impl InstPattern {
    pub fn matches(&self, inst: &Inst) -> bool {
        match (self, inst) {
            (Self::Any, _) => true,
            (Self::EnterFrame, Inst::EnterFrame)
            | (Self::LeaveFrame, Inst::LeaveFrame)
            | (Self::Ret, Inst::Ret) => true,
            (Self::ReserveStack { slots }, Inst::ReserveStack { slots: s }) => slots.matches(s),
            (Self::Jump { offset }, Inst::Jump { offset: o }) => offset.matches(o),
            (Self::JumpIfZero { reg, offset }, Inst::JumpIfZero { reg: r, offset: o }) => {
                reg.matches(r) && offset.matches(o)
            }
            (Self::Move { dst, src }, Inst::Move { dst: d, src: s }) => {
                dst.matches(d) && src.matches(s)
            }
            (Self::LoadImm { reg, value }, Inst::LoadImm { reg: r, value: v }) => {
                reg.matches(r) && value.matches(v)
            }
            (Self::LoadImmF32 { reg, bits }, Inst::LoadImmF32 { reg: r, bits: b }) => {
                reg.matches(r) && bits.matches(b)
            }
            (Self::Spill { offset, reg }, Inst::Spill { offset: o, reg: r }) => {
                offset.matches(o) && reg.matches(r)
            }
            (Self::Fill { reg, offset }, Inst::Fill { reg: r, offset: o }) => {
                reg.matches(r) && offset.matches(o)
            }
            (
                Self::Load {
                    dst,
                    base,
                    offset,
                    size,
                },
                Inst::Load {
                    dst: d,
                    base: b,
                    offset: o,
                    size: s,
                },
            ) => dst.matches(d) && base.matches(b) && offset.matches(o) && size.matches(s),
            (
                Self::Store {
                    base,
                    offset,
                    src,
                    size,
                },
                Inst::Store {
                    base: b,
                    offset: o,
                    src: v,
                    size: s,
                },
            ) => base.matches(b) && offset.matches(o) && src.matches(v) && size.matches(s),
            (
                Self::LoadFromContext { reg, offset },
                Inst::LoadFromContext {
                    reg: r, offset: o, ..
                },
            ) => reg.matches(r) && offset.matches(o),
            (Self::SpillContext { reg }, Inst::SpillContext { reg: r }) => reg.matches(r),
            (
                Self::LoadCallerFrameSlot { reg, slot },
                Inst::LoadCallerFrameSlot { reg: r, slot: s },
            ) => reg.matches(r) && slot.matches(s),
            (Self::MoveToReturn { reg }, Inst::MoveToReturn { reg: r }) => reg.matches(r),
            (Self::Add32 { dst, lhs, rhs }, Inst::Add32 { dst: d, lhs: l, rhs: r })
            | (Self::Sub32 { dst, lhs, rhs }, Inst::Sub32 { dst: d, lhs: l, rhs: r })
            | (Self::Mul32 { dst, lhs, rhs }, Inst::Mul32 { dst: d, lhs: l, rhs: r })
            | (Self::And32 { dst, lhs, rhs }, Inst::And32 { dst: d, lhs: l, rhs: r })
            | (Self::Or32 { dst, lhs, rhs }, Inst::Or32 { dst: d, lhs: l, rhs: r })
            | (Self::Xor32 { dst, lhs, rhs }, Inst::Xor32 { dst: d, lhs: l, rhs: r })
            | (Self::FAdd32 { dst, lhs, rhs }, Inst::FAdd32 { dst: d, lhs: l, rhs: r })
            | (Self::FSub32 { dst, lhs, rhs }, Inst::FSub32 { dst: d, lhs: l, rhs: r })
            | (Self::FMul32 { dst, lhs, rhs }, Inst::FMul32 { dst: d, lhs: l, rhs: r }) => {
                dst.matches(d) && lhs.matches(l) && rhs.matches(r)
            }
            _ => false,
        }
    }
}

/// Find a contiguous pattern in an instruction sequence; returns the index
/// of the first match.
pub fn find_pattern(insts: &[Inst], pattern: &[InstPattern]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }
    'outer: for start in 0..=insts.len().saturating_sub(pattern.len()) {
        for (i, pat) in pattern.iter().enumerate() {
            if !pat.matches(&insts[start + i]) {
                continue 'outer;
            }
        }
        return Some(start);
    }
    None
}

/// Assert that an instruction sequence contains a contiguous pattern.
pub fn assert_has_pattern(insts: &[Inst], pattern: &[InstPattern]) {
    if find_pattern(insts, pattern).is_none() {
        panic!(
            "Pattern not found in instruction sequence.\n\nExpected pattern:\n{}\n\nActual instructions:\n{}",
            format_list(pattern),
            format_list(insts)
        );
    }
}

/// Assert that an instruction sequence matches a pattern exactly.
pub fn assert_matches(insts: &[Inst], pattern: &[InstPattern]) {
    if insts.len() != pattern.len() {
        panic!(
            "Instruction count mismatch: expected {}, got {}.\n\nExpected pattern:\n{}\n\nActual instructions:\n{}",
            pattern.len(),
            insts.len(),
            format_list(pattern),
            format_list(insts)
        );
    }
    for (i, (inst, pat)) in insts.iter().zip(pattern.iter()).enumerate() {
        assert!(
            pat.matches(inst),
            "Instruction mismatch at index {i}:\nExpected: {pat:?}\nActual:   {inst:?}\n\nFull instructions:\n{}",
            format_list(insts)
        );
    }
}

fn format_list<T: std::fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  {item:?}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count instructions with a specific opcode.
pub fn count_opcode(insts: &[Inst], opcode: Opcode) -> usize {
    insts.iter().filter(|i| i.opcode() == opcode).count()
}

/// Whether an instruction sequence contains a specific opcode.
pub fn has_opcode(insts: &[Inst], opcode: Opcode) -> bool {
    insts.iter().any(|i| i.opcode() == opcode)
}

/// Filter instructions by opcode.
pub fn filter_by_opcode(insts: &[Inst], opcode: Opcode) -> Vec<&Inst> {
    insts.iter().filter(|i| i.opcode() == opcode).collect()
}
