//! Id invariants checked across scripted operation sequences.

use std::collections::{HashMap, HashSet};

use magnifier_core::*;
use magnifier_ir::{FuncRef, InstRef, OptLevel, verify_function};

const PROGRAM: &str = "\
define i32 @clamp(i32 %x, i32 %lo, i32 %hi) {
entry:
  %below = icmp slt i32 %x, %lo
  br i1 %below, label %low, label %check
low:
  ret i32 %lo
check:
  %above = icmp sgt i32 %x, %hi
  %r = select i32 %above, %hi, %x
  ret i32 %r
}

define i32 @neg(i32 %x) {
entry:
  %y = sub i32 0, %x
  ret i32 %y
}

define i32 @main(i32 %n) {
entry:
  %c = call i32 @clamp(i32 %n, i32 0, i32 10)
  %d = mul i32 %c, 2
  ret i32 %d
}

define i32 @indirect(ptr %fp, i32 %v) {
entry:
  %r = call i32 %fp(i32 %v)
  ret i32 %r
}
";

fn function_named(explorer: &Explorer, name: &str) -> (ValueId, FuncRef) {
    explorer
        .functions(true)
        .into_iter()
        .find(|&(_, f)| explorer.context().func_name(f) == name)
        .unwrap_or_else(|| panic!("no function named {name}"))
}

fn first_call(explorer: &Explorer, func: FuncRef) -> ValueId {
    let ctx = explorer.context();
    let call = ctx
        .func_insts(func)
        .into_iter()
        .find(|&i| ctx.inst_kind(i).is_call())
        .expect("function has a call");
    explorer.instruction_id(call)
}

fn originals(explorer: &Explorer, func: FuncRef) -> HashMap<InstRef, ValueId> {
    explorer
        .context()
        .func_insts(func)
        .into_iter()
        .map(|i| (i, explorer.get_id(Node::Instruction(i), IdKind::Original)))
        .collect()
}

/// Every invariant that must hold between operations.
fn check_invariants(explorer: &Explorer) {
    let ctx = explorer.context();
    let mut seen = HashSet::new();
    for (id, func) in explorer.functions(true) {
        assert!(seen.insert(id), "function id {id} reused");

        for (i, &arg) in ctx.func_params(func).iter().enumerate() {
            let expected = id + i as u64 + 1;
            assert_eq!(
                explorer.argument_id(arg),
                expected,
                "argument {i} of @{}",
                ctx.func_name(func)
            );
            assert_eq!(explorer.resolve_argument(expected), Some(arg));
            assert!(seen.insert(expected));
        }
        for inst in ctx.func_insts(func) {
            let inst_id = explorer.instruction_id(inst);
            assert!(seen.insert(inst_id), "instruction id {inst_id} reused");
            assert_eq!(explorer.resolve_instruction(inst_id), Some(inst));
            let original = explorer.get_id(Node::Instruction(inst), IdKind::Original);
            assert_ne!(original, INVALID_VALUE_ID);
        }
        for &block in ctx.func_blocks(func) {
            let block_id = explorer.block_id(block);
            assert!(seen.insert(block_id), "block id {block_id} reused");
            assert_eq!(explorer.resolve_block(block_id), Some(block));
        }

        let report = verify_function(ctx, func);
        assert!(report.is_ok(), "{report}");
    }

    for module in ctx.modules() {
        for &f in ctx.module_funcs(module) {
            assert!(
                !ctx.func_name(f).starts_with("magnifier.substitution_hook"),
                "hook function @{} survived",
                ctx.func_name(f)
            );
        }
    }
}

#[test]
fn invariants_hold_across_a_session() {
    let mut explorer = Explorer::new();
    explorer.load_module("m", PROGRAM).unwrap();
    check_invariants(&explorer);

    let (_, main) = function_named(&explorer, "main");
    let call = first_call(&explorer, main);
    let inlined = explorer
        .inline_function_call(call, &mut DirectCallResolver, &mut NullSubstitutionObserver)
        .unwrap();
    check_invariants(&explorer);

    let inlined_func = explorer.resolve_function(inlined).unwrap();
    let n = explorer.argument_id(explorer.context().func_param(inlined_func, 0));
    let substituted = explorer
        .substitute_argument_with_value(n, 20, &mut NullSubstitutionObserver)
        .unwrap();
    check_invariants(&explorer);

    let optimized = explorer.optimize_function(substituted, OptLevel::O2).unwrap();
    check_invariants(&explorer);
    let text = explorer.print_function(optimized).unwrap();
    assert!(text.contains("ret i32 20"), "{text}");

    let (_, indirect) = function_named(&explorer, "indirect");
    let indirect_call = first_call(&explorer, indirect);
    let (clamp_id, _) = function_named(&explorer, "clamp");
    let err = explorer
        .devirtualize_function(indirect_call, clamp_id, &mut NullSubstitutionObserver)
        .unwrap_err();
    assert_eq!(err.error, DevirtualizeError::ArgNumMismatch);
    check_invariants(&explorer);

    let (neg_id, _) = function_named(&explorer, "neg");
    explorer
        .devirtualize_function(indirect_call, neg_id, &mut NullSubstitutionObserver)
        .unwrap();
    check_invariants(&explorer);

    let before = explorer.next_id();
    let mul = explorer
        .context()
        .func_insts(main)
        .into_iter()
        .find(|&i| !explorer.context().inst_kind(i).is_call())
        .unwrap();
    let err = explorer
        .inline_function_call(
            explorer.instruction_id(mul),
            &mut DirectCallResolver,
            &mut NullSubstitutionObserver,
        )
        .unwrap_err();
    assert_eq!(err.error, InlineError::NotACallBaseInstruction);
    assert_eq!(explorer.next_id(), before);
    check_invariants(&explorer);

    explorer.delete_function(inlined).unwrap();
    assert_eq!(explorer.resolve_function(inlined), None);
    check_invariants(&explorer);
}

#[test]
fn originals_are_stable_through_derivations() {
    let mut explorer = Explorer::new();
    explorer.load_module("m", PROGRAM).unwrap();
    let (main_id, main) = function_named(&explorer, "main");
    let (_, clamp) = function_named(&explorer, "clamp");
    let main_before = originals(&explorer, main);
    let mut known: HashSet<ValueId> = main_before.values().copied().collect();
    known.extend(originals(&explorer, clamp).values().copied());

    let call = first_call(&explorer, main);
    let mut current = explorer
        .inline_function_call(call, &mut DirectCallResolver, &mut NullSubstitutionObserver)
        .unwrap();
    for level in [OptLevel::O1, OptLevel::O2, OptLevel::O3] {
        let func = explorer.resolve_function(current).unwrap();
        assert_eq!(explorer.get_id(Node::Function(func), IdKind::Original), main_id);
        for inst in explorer.context().func_insts(func) {
            let original = explorer.get_id(Node::Instruction(inst), IdKind::Original);
            let derived = explorer.instruction_id(inst);
            assert!(
                known.contains(&original) || original == derived,
                "instruction {derived} has unknown lineage {original}"
            );
            known.insert(original);
        }
        current = explorer.optimize_function(current, level).unwrap();
    }

    // The source function was never touched.
    assert_eq!(originals(&explorer, main), main_before);
    assert_eq!(explorer.function_id(main), main_id);
}

#[test]
fn reindexing_an_unmodified_clone_only_changes_derived_ids() {
    let mut explorer = Explorer::new();
    explorer.load_module("m", PROGRAM).unwrap();
    let (neg_id, neg) = function_named(&explorer, "neg");

    // `neg` is already as simple as it gets, so O1 leaves the clone as is.
    let copy_id = explorer.optimize_function(neg_id, OptLevel::O1).unwrap();
    let copy = explorer.resolve_function(copy_id).unwrap();
    let ctx = explorer.context();
    let (before, after) = (ctx.func_insts(neg), ctx.func_insts(copy));
    assert_eq!(before.len(), after.len());

    for (&old, &new) in before.iter().zip(&after) {
        assert_ne!(explorer.instruction_id(old), explorer.instruction_id(new));
        assert_eq!(
            explorer.get_id(Node::Instruction(old), IdKind::Original),
            explorer.get_id(Node::Instruction(new), IdKind::Original)
        );
    }
    assert_ne!(copy_id, neg_id);
    assert_eq!(explorer.get_id(Node::Function(copy), IdKind::Original), neg_id);
    assert_eq!(explorer.function_kind(copy), FunctionKind::Generated);
}

#[test]
fn failed_operations_leave_no_trace() {
    let mut explorer = Explorer::with_config(ExplorerConfig::default().with_inline_limit(2));
    explorer.load_module("m", PROGRAM).unwrap();
    let listed = explorer.functions(true);
    let next = explorer.next_id();

    let (_, main) = function_named(&explorer, "main");
    let call = first_call(&explorer, main);
    let err = explorer
        .inline_function_call(call, &mut DirectCallResolver, &mut NullSubstitutionObserver)
        .unwrap_err();
    assert!(matches!(err.error, InlineError::InlineOperationFailed(_)));

    assert_eq!(explorer.functions(true), listed);
    assert_eq!(explorer.next_id(), next);
    check_invariants(&explorer);
}
