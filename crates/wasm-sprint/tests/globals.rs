//! Global access: loads and stores through the context's globals-base
//! pointer.

use wasm_sprint::abi;
use wasm_sprint::test_harness::*;
use wasm_sprint::Opcode;

#[test]
fn global_get_loads_through_the_context() {
    let function = compile_wat_function(
        r#"
        (module
            (global $g (mut i32) (i32.const 0))
            (func (result i32)
                global.get $g
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_has_pattern(
        function.insts(),
        &[
            InstPattern::LoadFromContext {
                reg: Pat::Any,
                offset: Pat::Exact(abi::GLOBALS_START_OFFSET),
            },
            InstPattern::Load {
                dst: Pat::Any,
                base: Pat::Any,
                offset: Pat::Exact(0),
                size: Pat::Exact(4),
            },
        ],
    );
}

#[test]
fn global_set_stores_through_the_context() {
    let function = compile_wat_function(
        r#"
        (module
            (global $g (mut i32) (i32.const 0))
            (func (param i32)
                local.get 0
                global.set $g
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_has_pattern(
        function.insts(),
        &[
            InstPattern::LoadFromContext {
                reg: Pat::Any,
                offset: Pat::Exact(abi::GLOBALS_START_OFFSET),
            },
            InstPattern::Store {
                base: Pat::Any,
                offset: Pat::Exact(0),
                src: Pat::Exact(abi::GP_PARAM_REGS[0]),
                size: Pat::Exact(4),
            },
        ],
    );
}

/// Globals get byte offsets in declaration order, aligned to their size.
#[test]
fn global_offsets_are_assigned_and_aligned() {
    let function = compile_wat_function(
        r#"
        (module
            (global $a (mut i32) (i32.const 0))
            (global $b (mut i64) (i64.const 0))
            (global $c (mut i32) (i32.const 0))
            (func (result i32)
                global.get $c
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    // $a at 0, $b aligned up to 8, $c at 16.
    assert_has_pattern(
        function.insts(),
        &[InstPattern::Load {
            dst: Pat::Any,
            base: Pat::Any,
            offset: Pat::Exact(16),
            size: Pat::Exact(4),
        }],
    );
}

/// `global.get` of an i64 is the one place an i64 value is produced; it
/// loads pointer-width and can flow to the return register.
#[test]
fn i64_global_get_is_supported() {
    let function = compile_wat_function(
        r#"
        (module
            (global $g (mut i64) (i64.const 0))
            (func (result i64)
                global.get $g
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_has_pattern(
        function.insts(),
        &[InstPattern::Load {
            dst: Pat::Any,
            base: Pat::Any,
            offset: Pat::Exact(0),
            size: Pat::Exact(8),
        }],
    );
    assert_eq!(count_opcode(function.insts(), Opcode::MoveToReturn), 1);
}

#[test]
fn float_global_get_bails_out() {
    let function = compile_wat_function(
        r#"
        (module
            (global $g (mut f32) (f32.const 0))
            (func (result f32)
                global.get $g
            )
        )
        "#,
    )
    .expect("parse and drive");
    assert!(!function.ok);
    assert_eq!(function.bailout_reason.as_deref(), Some("non-int global"));
}

#[test]
fn i64_global_set_bails_out() {
    let function = compile_wat_function(
        r#"
        (module
            (global $g (mut i64) (i64.const 0))
            (func (param i32)
                (global.set $g (i64.extend_i32_u (local.get 0)))
            )
        )
        "#,
    )
    .expect("parse and drive");
    assert!(!function.ok);
    // The extension op bails before the global store is reached.
    assert!(function.bailout_reason.is_some());
}

/// Imported globals occupy offsets before module-defined ones.
#[test]
fn imported_globals_come_first_in_the_layout() {
    let function = compile_wat_function(
        r#"
        (module
            (import "env" "base" (global i32))
            (global $g (mut i32) (i32.const 0))
            (func (result i32)
                global.get $g
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_has_pattern(
        function.insts(),
        &[InstPattern::Load {
            dst: Pat::Any,
            base: Pat::Any,
            offset: Pat::Exact(4),
            size: Pat::Exact(4),
        }],
    );
}
