//! wasm-sprint: a baseline single-pass compiler for WebAssembly function
//! bodies.
//!
//! The compiler consumes decoded operators and emits code directly, without
//! an intermediate representation. Register assignment, constant propagation
//! and control-flow merging all run over one symbolic structure, the
//! [`baseline::cache_state::CacheState`], which tracks where every local and
//! operand-stack value currently lives. Functions the baseline cannot handle
//! bail out gracefully (`ok = false`) for a higher tier to retry.

pub mod abi;
pub mod baseline;
pub mod emit;
pub mod error;
pub mod mcode;

/// Test harness module for writing unit and integration tests.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use baseline::{
    CompiledFunction, CompiledModule, FunctionOutcome, ModuleEnv, compile, compile_function,
};
pub use emit::{Constant, Emitter, Label};
pub use error::{Error, Result};
pub use mcode::{CodeBuffer, Inst, Opcode};
