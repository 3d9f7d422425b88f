//! Straight-line compilation: parameters, constants, arithmetic, and the
//! return sequence.

use wasm_sprint::abi;
use wasm_sprint::baseline::reg::Reg;
use wasm_sprint::test_harness::*;
use wasm_sprint::Opcode;

/// `(i32) -> i32` identity: the parameter register flows straight to the
/// return register, with an empty operand stack at `end`.
#[test]
fn identity_function_forwards_the_parameter_register() {
    let function = compile_wat_function(
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);

    assert_matches(
        function.insts(),
        &[
            InstPattern::EnterFrame,
            InstPattern::ReserveStack {
                slots: Pat::Exact(1 + abi::MAX_STACK_HEIGHT),
            },
            InstPattern::SpillContext {
                reg: Pat::Exact(abi::CONTEXT_REG),
            },
            InstPattern::MoveToReturn {
                reg: Pat::Exact(abi::GP_PARAM_REGS[0]),
            },
            InstPattern::LeaveFrame,
            InstPattern::Ret,
        ],
    );
}

/// Adding two register-resident parameters emits exactly one add and no
/// spills when cache registers are free.
#[test]
fn add_two_params_emits_one_add_and_no_spills() {
    let function = compile_wat_function(
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);

    assert_eq!(count_opcode(function.insts(), Opcode::Add32), 1);
    assert_eq!(count_opcode(function.insts(), Opcode::Spill), 0);
    assert_eq!(count_opcode(function.insts(), Opcode::Fill), 0);
    assert_has_pattern(
        function.insts(),
        &[
            InstPattern::Add32 {
                dst: Pat::Any,
                lhs: Pat::Exact(abi::GP_PARAM_REGS[0]),
                rhs: Pat::Exact(abi::GP_PARAM_REGS[1]),
            },
            InstPattern::MoveToReturn { reg: Pat::Any },
        ],
    );
}

/// A constant stays symbolic until the return sequence materialises it
/// directly into a register headed for the return register.
#[test]
fn constant_result_is_materialised_only_at_the_return() {
    let function = compile_wat_function(
        r#"
        (module
            (func (result i32)
                i32.const 7
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);

    assert_eq!(count_opcode(function.insts(), Opcode::LoadImm), 1);
    assert_matches(
        function.insts(),
        &[
            InstPattern::EnterFrame,
            InstPattern::ReserveStack {
                slots: Pat::Exact(abi::MAX_STACK_HEIGHT),
            },
            InstPattern::SpillContext { reg: Pat::Any },
            InstPattern::LoadImm {
                reg: Pat::Any,
                value: Pat::Exact(7),
            },
            InstPattern::MoveToReturn { reg: Pat::Any },
            InstPattern::LeaveFrame,
            InstPattern::Ret,
        ],
    );
}

/// Two pushes of the same local alias one register; the binop target must
/// not clobber it.
#[test]
fn doubled_local_does_not_reuse_its_register_as_target() {
    let function = compile_wat_function(
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
                local.get 0
                i32.mul
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);

    let param = abi::GP_PARAM_REGS[0];
    assert_has_pattern(
        function.insts(),
        &[InstPattern::Mul32 {
            dst: Pat::Predicate(|r: &Reg| *r != Reg::gp(3)),
            lhs: Pat::Exact(param),
            rhs: Pat::Exact(param),
        }],
    );
}

#[test]
fn all_integer_binops_lower_to_their_opcode() {
    for (wat_op, opcode) in [
        ("i32.add", Opcode::Add32),
        ("i32.sub", Opcode::Sub32),
        ("i32.mul", Opcode::Mul32),
        ("i32.and", Opcode::And32),
        ("i32.or", Opcode::Or32),
        ("i32.xor", Opcode::Xor32),
    ] {
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    {wat_op}
                )
            )
            "#
        ))
        .expect("compile");
        assert!(function.ok, "{wat_op} should compile");
        assert_eq!(
            count_opcode(function.insts(), opcode),
            1,
            "expected one {opcode:?} for {wat_op}"
        );
    }
}

#[test]
fn float_binops_use_fp_cache_registers() {
    for (wat_op, opcode) in [
        ("f32.add", Opcode::FAdd32),
        ("f32.sub", Opcode::FSub32),
        ("f32.mul", Opcode::FMul32),
    ] {
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param f32 f32) (result f32)
                    local.get 0
                    local.get 1
                    {wat_op}
                )
            )
            "#
        ))
        .expect("compile");
        assert!(function.ok, "{wat_op} should compile");
        assert_eq!(count_opcode(function.insts(), opcode), 1);
        assert_has_pattern(
            function.insts(),
            &[InstPattern::MoveToReturn {
                reg: Pat::Predicate(|r: &Reg| !r.is_gp()),
            }],
        );
    }
}

/// `f32.const` has no symbolic form; it is materialised eagerly into an FP
/// register.
#[test]
fn f32_const_is_materialised_eagerly() {
    let function = compile_wat_function(
        r#"
        (module
            (func (result f32)
                f32.const 1.5
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_has_pattern(
        function.insts(),
        &[InstPattern::LoadImmF32 {
            reg: Pat::Exact(abi::FP_CACHE_REGS[0]),
            bits: Pat::Exact(1.5f32.to_bits()),
        }],
    );
}

/// All uninitialised f32 locals share one materialised zero register.
#[test]
fn f32_locals_share_a_single_zero_register() {
    let function = compile_wat_function(
        r#"
        (module
            (func (result f32)
                (local f32 f32 f32)
                local.get 1
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_eq!(count_opcode(function.insts(), Opcode::LoadImmF32), 1);
    assert_has_pattern(
        function.insts(),
        &[InstPattern::LoadImmF32 {
            reg: Pat::Any,
            bits: Pat::Exact(0.0f32.to_bits()),
        }],
    );
}

#[test]
fn drop_discards_without_emitting_code() {
    let function = compile_wat_function(
        r#"
        (module
            (func (result i32)
                i32.const 1
                i32.const 2
                drop
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    // Only the surviving constant is materialised.
    assert_eq!(count_opcode(function.insts(), Opcode::LoadImm), 1);
    assert_has_pattern(
        function.insts(),
        &[InstPattern::LoadImm {
            reg: Pat::Any,
            value: Pat::Exact(1),
        }],
    );
}

/// An explicit `return` emits the epilogue; the trailing dead code adds
/// nothing.
#[test]
fn explicit_return_skips_trailing_dead_code() {
    let function = compile_wat_function(
        r#"
        (module
            (func (result i32)
                i32.const 1
                return
                i32.const 2
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_eq!(count_opcode(function.insts(), Opcode::Ret), 1);
    assert_eq!(count_opcode(function.insts(), Opcode::LoadImm), 1);
}

#[test]
fn safepoint_table_offset_lands_at_the_end_of_the_code() {
    let function = compile_wat_function(
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    assert_eq!(function.safepoint_table_offset, function.code().len());
}

#[test]
fn local_set_overwrites_and_tee_keeps_the_value() {
    let function = compile_wat_function(
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.set 1
                local.get 1
            )
        )
        "#,
    )
    .expect("compile");
    assert!(function.ok);
    // Both locals end up aliasing the first parameter's register.
    assert_has_pattern(
        function.insts(),
        &[InstPattern::MoveToReturn {
            reg: Pat::Exact(abi::GP_PARAM_REGS[0]),
        }],
    );

    let tee = compile_wat_function(
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.tee 1
            )
        )
        "#,
    )
    .expect("compile");
    assert!(tee.ok);
    assert_has_pattern(
        tee.insts(),
        &[InstPattern::MoveToReturn {
            reg: Pat::Exact(abi::GP_PARAM_REGS[0]),
        }],
    );
}
