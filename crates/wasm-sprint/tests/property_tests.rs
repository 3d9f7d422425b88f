//! Property-based tests for the baseline compiler.
//!
//! Uses `proptest` to generate programs and verify invariants:
//! - valid modules in the supported subset always compile with `ok = true`
//!   (debug assertions inside the cache state check register use counts on
//!   every transformation);
//! - the operand-stack bound is exact;
//! - bailouts never retain code.

use std::fmt::Write;

use proptest::prelude::*;
use wasm_sprint::test_harness::*;
use wasm_sprint::Opcode;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Chains of i32 operations over random constants compile cleanly.
    #[test]
    fn operation_chains_compile(chain_len in 1usize..15, seed in any::<i32>()) {
        let ops = ["i32.add", "i32.sub", "i32.mul", "i32.and", "i32.or", "i32.xor"];
        let mut body = String::from("local.get 0\n");
        for i in 0..chain_len {
            writeln!(body, "i32.const {}", seed.wrapping_add(i as i32)).unwrap();
            body.push_str(ops[i % ops.len()]);
            body.push('\n');
        }
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32) (result i32)
                    {body}
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok, "chain of {chain_len} failed: {:?}", function.bailout_reason);
        prop_assert!(!function.code().is_empty());
    }

    /// Nested blocks of any depth compile.
    #[test]
    fn nested_blocks_compile(depth in 1usize..10) {
        let mut body = String::new();
        for _ in 0..depth {
            body.push_str("(block ");
        }
        body.push_str("nop");
        for _ in 0..depth {
            body.push(')');
        }
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32) (result i32)
                    {body}
                    local.get 0
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok, "depth {depth} failed: {:?}", function.bailout_reason);
    }

    /// Nested loops of any depth compile, and locals spill exactly once.
    #[test]
    fn nested_loops_compile(depth in 1usize..5) {
        let mut body = String::new();
        for _ in 0..depth {
            body.push_str("(block (loop ");
        }
        body.push_str("nop");
        for _ in 0..depth {
            body.push_str("))");
        }
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32) (result i32)
                    {body}
                    local.get 0
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok, "depth {depth} failed: {:?}", function.bailout_reason);
        // The parameter spills at the first loop entry; inner entries find
        // it already spilled.
        prop_assert_eq!(count_opcode(function.insts(), Opcode::Spill), 1);
    }

    /// Any number of locals fits the pre-reserved frame.
    #[test]
    fn many_locals_compile(num_locals in 1usize..20) {
        let locals: String = (0..num_locals).map(|_| "(local i32)").collect::<Vec<_>>().join(" ");
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32) (result i32)
                    {locals}
                    local.get 0
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok);
    }

    /// The operand-stack bound is exact: up to 8 operands pass, 9 bail.
    #[test]
    fn stack_bound_is_exact(depth in 1u32..12) {
        let pushes: String = (0..depth).map(|i| format!("i32.const {i}\n")).collect();
        let drops = "drop\n".repeat(depth as usize - 1);
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (result i32)
                    {pushes}
                    {drops}
                )
            )
            "#
        )).expect("parse and drive");
        if depth <= 8 {
            prop_assert!(function.ok, "depth {depth} should pass");
        } else {
            prop_assert!(!function.ok, "depth {depth} should bail");
            prop_assert!(function.insts().is_empty());
        }
    }

    /// Local get/set/tee shuffles keep the use counts consistent (checked
    /// by debug assertions during compilation).
    #[test]
    fn local_shuffles_compile(rounds in 1usize..10, tee in any::<bool>()) {
        let op = if tee { "local.tee 1\ndrop" } else { "local.set 1" };
        let mut body = String::new();
        for _ in 0..rounds {
            writeln!(body, "local.get 0\n{op}").unwrap();
            body.push_str("local.get 1\nlocal.set 0\n");
        }
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    {body}
                    local.get 0
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok, "failed: {:?}", function.bailout_reason);
    }

    /// Conditional branches with constant payloads always converge on one
    /// merge register.
    #[test]
    fn br_if_merges_compile(a in any::<i32>(), b in any::<i32>()) {
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32) (result i32)
                    (block (result i32)
                        i32.const {a}
                        local.get 0
                        br_if 0
                        drop
                        i32.const {b}
                    )
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok);
        prop_assert!(function.code().len() > 0);
    }

    /// Loops driven by a mutated local compile for any iteration constant.
    #[test]
    fn counting_loops_compile(step in 1i32..1000) {
        let function = compile_wat_function(&format!(
            r#"
            (module
                (func (param i32) (result i32)
                    (loop
                        local.get 0
                        i32.const {step}
                        i32.sub
                        local.tee 0
                        br_if 0
                    )
                    local.get 0
                )
            )
            "#
        )).expect("compile");
        prop_assert!(function.ok);
    }
}
