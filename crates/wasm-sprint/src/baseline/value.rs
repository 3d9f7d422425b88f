//! Wasm value types as modelled by the baseline compiler.

use std::fmt;

use crate::baseline::reg::RegClass;

/// The numeric value types. Only `I32` and `F32` are fully supported by the
/// baseline; `I64` appears in cache-state slots for `global.get` results, and
/// everything else triggers a bailout at the first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    #[must_use]
    pub fn reg_class(self) -> RegClass {
        match self {
            Self::I32 | Self::I64 => RegClass::Gp,
            Self::F32 | Self::F64 => RegClass::Fp,
        }
    }

    #[must_use]
    pub fn size_log2(self) -> u32 {
        match self {
            Self::I32 | Self::F32 => 2,
            Self::I64 | Self::F64 => 3,
        }
    }

    /// Size of a value of this type in bytes.
    #[must_use]
    pub fn size(self) -> u32 {
        1 << self.size_log2()
    }

    /// Maps a decoded type to the baseline's model. Reference and vector
    /// types have no representation here; using one is a bailout, not an
    /// error.
    #[must_use]
    pub fn from_wasm(ty: wasmparser::ValType) -> Option<Self> {
        match ty {
            wasmparser::ValType::I32 => Some(Self::I32),
            wasmparser::ValType::I64 => Some(Self::I64),
            wasmparser::ValType::F32 => Some(Self::F32),
            wasmparser::ValType::F64 => Some(Self::F64),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
