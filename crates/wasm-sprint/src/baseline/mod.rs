//! The baseline compiler: module parsing, the per-function driver, and the
//! cache-state machinery it is built on.
//!
//! The module-level entry point [`compile`] runs every code-section entry
//! through the single-pass compiler against the portable reference target.
//! Embedders with their own target drive [`compile_function`] with their own
//! [`Emitter`] instead.

pub mod cache_state;
pub mod compiler;
pub mod control;
pub mod reg;
pub mod regalloc;
pub mod transfer;
pub mod value;

use wasmparser::{FunctionBody, Operator, Parser, Payload, TypeRef, ValType};

use crate::emit::Emitter;
use crate::mcode::{CodeBuffer, Inst};
use crate::{Error, Result};
use compiler::BaselineCompiler;
use control::BlockKind;

/// Byte size a global occupies in the module's globals area.
fn global_size(ty: ValType) -> u32 {
    match ty {
        ValType::I32 | ValType::F32 => 4,
        ValType::I64 | ValType::F64 => 8,
        ValType::V128 => 16,
        _ => crate::abi::PTR_SIZE,
    }
}

/// One global as the compiler sees it: its type and its byte offset off the
/// globals-base pointer.
#[derive(Debug, Clone, Copy)]
pub struct GlobalDesc {
    pub ty: ValType,
    pub offset: u32,
    pub mutable: bool,
}

/// Module-level facts the per-function compiler needs.
#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    pub globals: Vec<GlobalDesc>,
}

impl ModuleEnv {
    fn push_global(&mut self, ty: ValType, mutable: bool, next_offset: &mut u32) {
        let size = global_size(ty);
        let offset = next_offset.next_multiple_of(size);
        *next_offset = offset + size;
        self.globals.push(GlobalDesc {
            ty,
            offset,
            mutable,
        });
    }
}

/// Result of running the baseline over one function body.
///
/// `ok = false` is a bailout, not an error: the function is valid but uses
/// something the baseline does not handle, and a higher tier should retry
/// it. No partial code survives a bailout.
#[derive(Debug)]
pub struct FunctionOutcome {
    pub ok: bool,
    pub bailout_reason: Option<String>,
    pub safepoint_table_offset: usize,
}

/// A function compiled against the portable reference target.
#[derive(Debug)]
pub struct CompiledFunction {
    pub index: u32,
    pub ok: bool,
    pub bailout_reason: Option<String>,
    pub safepoint_table_offset: usize,
    insts: Vec<Inst>,
    code: Vec<u8>,
}

impl CompiledFunction {
    #[must_use]
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

#[derive(Debug, Default)]
pub struct CompiledModule {
    pub functions: Vec<CompiledFunction>,
}

/// Compiles every function body in `wasm` with the baseline compiler.
///
/// Errors are reserved for malformed input; a function the baseline cannot
/// handle comes back with `ok = false` and a reason.
pub fn compile(wasm: &[u8]) -> Result<CompiledModule> {
    let mut func_types: Vec<wasmparser::FuncType> = Vec::new();
    let mut function_type_indices: Vec<u32> = Vec::new();
    let mut num_imported_funcs = 0u32;
    let mut env = ModuleEnv::default();
    let mut next_global_offset = 0u32;
    let mut bodies: Vec<FunctionBody<'_>> = Vec::new();

    for payload in Parser::new(0).parse_all(wasm) {
        match payload? {
            Payload::TypeSection(reader) => {
                for rec_group in reader {
                    for sub_type in rec_group?.into_types() {
                        if let wasmparser::CompositeInnerType::Func(f) =
                            &sub_type.composite_type.inner
                        {
                            func_types.push(f.clone());
                        }
                    }
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    match import?.ty {
                        TypeRef::Func(_) => num_imported_funcs += 1,
                        TypeRef::Global(global) => env.push_global(
                            global.content_type,
                            global.mutable,
                            &mut next_global_offset,
                        ),
                        _ => {}
                    }
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    function_type_indices.push(type_index?);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    env.push_global(
                        global.ty.content_type,
                        global.ty.mutable,
                        &mut next_global_offset,
                    );
                }
            }
            Payload::CodeSectionEntry(body) => bodies.push(body),
            _ => {}
        }
    }

    let mut functions = Vec::with_capacity(bodies.len());
    for (i, body) in bodies.iter().enumerate() {
        let index = num_imported_funcs + i as u32;
        let type_index = function_type_indices
            .get(i)
            .copied()
            .ok_or(Error::FunctionTypeNotFound(index))?;
        let func_type = func_types
            .get(type_index as usize)
            .ok_or(Error::FunctionTypeNotFound(index))?;

        let mut buffer = CodeBuffer::new();
        let outcome = compile_function(body, func_type, &env, &mut buffer)?;
        let function = if outcome.ok {
            let code = buffer.finish()?;
            CompiledFunction {
                index,
                ok: true,
                bailout_reason: None,
                safepoint_table_offset: outcome.safepoint_table_offset,
                insts: buffer.insts().to_vec(),
                code,
            }
        } else {
            // The buffer's contents are discarded wholesale.
            CompiledFunction {
                index,
                ok: false,
                bailout_reason: outcome.bailout_reason,
                safepoint_table_offset: 0,
                insts: Vec::new(),
                code: Vec::new(),
            }
        };
        tracing::debug!(
            target: "wasm_sprint::baseline",
            function = function.index,
            ok = function.ok,
            code_bytes = function.code.len(),
            "baseline compilation finished"
        );
        functions.push(function);
    }

    Ok(CompiledModule { functions })
}

/// Runs the baseline compiler over a single function body against any
/// emitter.
pub fn compile_function<E: Emitter>(
    body: &FunctionBody<'_>,
    func_type: &wasmparser::FuncType,
    env: &ModuleEnv,
    emit: &mut E,
) -> Result<FunctionOutcome> {
    let mut locals = Vec::new();
    for local in body.get_locals_reader()? {
        locals.push(local?);
    }

    let mut compiler = BaselineCompiler::new(emit, env);
    compiler.start_function(func_type.params(), func_type.results(), &locals);
    compiler.start_function_body();

    // Code after an unconditional branch is dead until the `end` of the
    // enclosing block; nested blocks opened inside a dead region cannot be
    // branch targets from live code, so they are skipped wholesale.
    let mut dead_depth = 0u32;
    let mut reader = body.get_operators_reader()?;
    while !reader.eof() {
        if !compiler.ok() {
            break;
        }
        let op = reader.read()?;
        if !compiler.is_reachable() {
            match op {
                Operator::Block { .. } | Operator::Loop { .. } | Operator::If { .. } => {
                    dead_depth += 1;
                }
                Operator::End => {
                    if dead_depth > 0 {
                        dead_depth -= 1;
                    } else {
                        compiler.end_control();
                    }
                }
                _ => {}
            }
            continue;
        }
        translate_op(&mut compiler, &op);
    }

    compiler.finish_function();
    Ok(compiler.into_outcome())
}

fn translate_op<E: Emitter>(compiler: &mut BaselineCompiler<'_, E>, op: &Operator<'_>) {
    match op {
        Operator::Nop => {}
        Operator::I32Const { value } => compiler.i32_const(*value),
        Operator::F32Const { value } => compiler.f32_const(f32::from_bits(value.bits())),
        Operator::LocalGet { local_index } => compiler.local_get(*local_index),
        Operator::LocalSet { local_index } => compiler.local_set(*local_index, false),
        Operator::LocalTee { local_index } => compiler.local_set(*local_index, true),
        Operator::GlobalGet { global_index } => compiler.global_get(*global_index),
        Operator::GlobalSet { global_index } => compiler.global_set(*global_index),
        Operator::I32Add => compiler.i32_binop(|e, dst, lhs, rhs| e.i32_add(dst, lhs, rhs)),
        Operator::I32Sub => compiler.i32_binop(|e, dst, lhs, rhs| e.i32_sub(dst, lhs, rhs)),
        Operator::I32Mul => compiler.i32_binop(|e, dst, lhs, rhs| e.i32_mul(dst, lhs, rhs)),
        Operator::I32And => compiler.i32_binop(|e, dst, lhs, rhs| e.i32_and(dst, lhs, rhs)),
        Operator::I32Or => compiler.i32_binop(|e, dst, lhs, rhs| e.i32_or(dst, lhs, rhs)),
        Operator::I32Xor => compiler.i32_binop(|e, dst, lhs, rhs| e.i32_xor(dst, lhs, rhs)),
        Operator::F32Add => compiler.f32_binop(|e, dst, lhs, rhs| e.f32_add(dst, lhs, rhs)),
        Operator::F32Sub => compiler.f32_binop(|e, dst, lhs, rhs| e.f32_sub(dst, lhs, rhs)),
        Operator::F32Mul => compiler.f32_binop(|e, dst, lhs, rhs| e.f32_mul(dst, lhs, rhs)),
        Operator::Drop => compiler.drop_value(),
        Operator::Return => compiler.do_return(),
        Operator::Block { blockty } => compiler.enter_block(BlockKind::Block, *blockty),
        Operator::Loop { blockty } => compiler.enter_block(BlockKind::Loop, *blockty),
        Operator::End => compiler.end_control(),
        Operator::Br { relative_depth } => compiler.br(*relative_depth),
        Operator::BrIf { relative_depth } => compiler.br_if(*relative_depth),
        Operator::I64Const { .. } => compiler.unsupported("i64.const"),
        Operator::F64Const { .. } => compiler.unsupported("f64.const"),
        Operator::Unreachable => compiler.unsupported("unreachable"),
        Operator::If { .. } => compiler.unsupported("if"),
        Operator::Else => compiler.unsupported("else"),
        Operator::Select => compiler.unsupported("select"),
        Operator::BrTable { .. } => compiler.unsupported("br_table"),
        Operator::Call { .. } => compiler.unsupported("call"),
        Operator::CallIndirect { .. } => compiler.unsupported("call_indirect"),
        Operator::I32Load { .. }
        | Operator::I64Load { .. }
        | Operator::F32Load { .. }
        | Operator::F64Load { .. } => compiler.unsupported("memory load"),
        Operator::I32Store { .. }
        | Operator::I64Store { .. }
        | Operator::F32Store { .. }
        | Operator::F64Store { .. } => compiler.unsupported("memory store"),
        Operator::MemorySize { .. } => compiler.unsupported("memory.size"),
        Operator::MemoryGrow { .. } => compiler.unsupported("memory.grow"),
        op => compiler.unsupported(format!("{op:?}")),
    }
}
