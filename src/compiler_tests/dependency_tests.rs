//! Tests for dependency record construction and the depth-first scheduler

use super::{module, program, use_module};
use crate::compiler::codegen::dependencies::{build_dependency_records, schedule};
use crate::compiler::string_interning::StringTable;

#[test]
fn lowers_dependencies_before_dependents() {
    let program = program(vec![
        module("main", vec![use_module("util"), use_module("math")]),
        module("util", vec![use_module("math")]),
        module("math", vec![]),
    ]);

    let mut interner = StringTable::new();
    let mut records = build_dependency_records(&program, &mut interner);

    let mut order = Vec::new();
    schedule(&mut records, &mut |module_id| {
        order.push(module_id.resolve(&interner).to_string());
        Ok(())
    })
    .expect("an acyclic graph should schedule");

    assert_eq!(
        order,
        vec!["math", "util", "main"],
        "every module should be lowered after its dependencies"
    );
}

#[test]
fn ties_break_in_program_order() {
    let program = program(vec![
        module("a", vec![]),
        module("b", vec![]),
        module("c", vec![]),
    ]);

    let mut interner = StringTable::new();
    let mut records = build_dependency_records(&program, &mut interner);

    let mut order = Vec::new();
    schedule(&mut records, &mut |module_id| {
        order.push(module_id.resolve(&interner).to_string());
        Ok(())
    })
    .unwrap();

    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn each_module_is_lowered_exactly_once() {
    // diamond: main -> (left, right) -> shared
    let program = program(vec![
        module("main", vec![use_module("left"), use_module("right")]),
        module("left", vec![use_module("shared")]),
        module("right", vec![use_module("shared")]),
        module("shared", vec![]),
    ]);

    let mut interner = StringTable::new();
    let mut records = build_dependency_records(&program, &mut interner);

    let mut order = Vec::new();
    schedule(&mut records, &mut |module_id| {
        order.push(module_id.resolve(&interner).to_string());
        Ok(())
    })
    .unwrap();

    assert_eq!(order.len(), 4, "no module should be lowered twice");
    assert_eq!(order[0], "shared");
    assert_eq!(order.last().map(String::as_str), Some("main"));
}

#[test]
fn cycles_are_fatal_and_name_the_modules_involved() {
    let program = program(vec![
        module("a", vec![use_module("b")]),
        module("b", vec![use_module("a")]),
    ]);

    let mut interner = StringTable::new();
    let mut records = build_dependency_records(&program, &mut interner);

    let error = schedule(&mut records, &mut |_| Ok(()))
        .expect_err("a cyclic graph must be rejected");

    assert!(
        error.msg.contains("a") && error.msg.contains("b"),
        "the cycle error should name both modules, got: {}",
        error.msg
    );
    assert!(
        error.msg.to_lowercase().contains("circular"),
        "the error should say it is a cycle, got: {}",
        error.msg
    );
}

#[test]
fn self_imports_are_not_dependency_edges() {
    // the link pass warns and skips these, so they must not look like cycles
    let program = program(vec![module("loopy", vec![use_module("loopy")])]);

    let mut interner = StringTable::new();
    let mut records = build_dependency_records(&program, &mut interner);
    assert!(records[0].deps.is_empty(), "a self-use is not an edge");

    schedule(&mut records, &mut |_| Ok(()))
        .expect("a self-importing module still schedules");
}

#[test]
fn missing_dependencies_are_fatal() {
    let program = program(vec![module("main", vec![use_module("ghost")])]);

    let mut interner = StringTable::new();
    let mut records = build_dependency_records(&program, &mut interner);

    let error = schedule(&mut records, &mut |_| Ok(())).expect_err("missing dependency");
    assert!(
        error.msg.contains("ghost"),
        "the error should name the missing module, got: {}",
        error.msg
    );
}
