//! Tests for the parallel object emitter

use super::{int_function, lower_program, main_module, module, program, return_int};
use crate::compiler::ast::Expression;
use crate::compiler::codegen::object_emitter::{emit_objects, worker_count};
use crate::settings::{BuildConfig, COMPILE_THREADS_ENV};
use std::fs;

fn config_for(dir: &std::path::Path) -> BuildConfig {
    BuildConfig {
        output_dir: dir.to_path_buf(),
        ..BuildConfig::default()
    }
}

fn eight_module_program() -> crate::compiler::ast::Program {
    let mut modules: Vec<_> = (0..8i64)
        .map(|i| {
            module(
                &format!("m{i}"),
                vec![int_function(&format!("f{i}"), &[], vec![return_int(i)])],
            )
        })
        .collect();
    modules.push(main_module(Expression::IntLiteral(0), vec![]));
    program(modules)
}

#[test]
fn emits_one_object_per_module_in_program_order() {
    let mut session = lower_program(&eight_module_program()).expect("program should lower");

    let out_dir = tempfile::tempdir().expect("temp dir");
    let config = config_for(out_dir.path());

    let units = session.registry.take_units();
    let objects = emit_objects(units, &session.interner, &config).expect("emission should succeed");

    assert_eq!(objects.len(), 9, "one object per module");
    for (i, path) in objects.iter().take(8).enumerate() {
        assert!(
            path.ends_with(format!("m{i}.o")),
            "object paths keep program order, got {path:?} at {i}"
        );
        let bytes = fs::read(path).expect("object file should exist");
        assert!(!bytes.is_empty(), "object files should not be empty");
    }
    assert!(objects[8].ends_with("main.o"));
}

#[test]
fn save_intermediates_writes_textual_ir() {
    let program = program(vec![main_module(Expression::IntLiteral(0), vec![])]);
    let mut session = lower_program(&program).expect("program should lower");

    let out_dir = tempfile::tempdir().expect("temp dir");
    let mut config = config_for(out_dir.path());
    config.save_intermediates = true;

    let units = session.registry.take_units();
    emit_objects(units, &session.interner, &config).expect("emission should succeed");

    let ir = fs::read_to_string(out_dir.path().join("main.clif"))
        .expect("the textual IR file should exist");
    assert!(
        ir.contains("function"),
        "the IR dump should contain at least one function"
    );
}

// Worker count rules and cross-worker determinism share one test because
// they both mutate the environment, and tests in this binary run in
// parallel threads.
#[test]
fn worker_env_override_and_parallel_determinism() {
    // --- worker count selection rules ---
    unsafe { std::env::set_var(COMPILE_THREADS_ENV, "3") };
    assert_eq!(worker_count(100), 3, "an in-range override wins");
    assert_eq!(worker_count(2), 2, "the module count caps the pool");

    unsafe { std::env::set_var(COMPILE_THREADS_ENV, "0") };
    let detected = worker_count(100);
    assert!(detected >= 1, "out-of-range overrides fall back");

    unsafe { std::env::set_var(COMPILE_THREADS_ENV, "65") };
    assert_eq!(
        worker_count(100),
        detected,
        "values above the cap are ignored like any other invalid override"
    );

    unsafe { std::env::set_var(COMPILE_THREADS_ENV, "not-a-number") };
    assert_eq!(worker_count(100), detected);

    unsafe { std::env::remove_var(COMPILE_THREADS_ENV) };
    assert!(worker_count(1) == 1, "a single module needs a single worker");

    // --- determinism across worker counts ---
    let emit_with = |workers: &str| {
        unsafe { std::env::set_var(COMPILE_THREADS_ENV, workers) };
        let mut session = lower_program(&eight_module_program()).expect("program should lower");
        let out_dir = tempfile::tempdir().expect("temp dir");
        let config = config_for(out_dir.path());
        let units = session.registry.take_units();
        let objects =
            emit_objects(units, &session.interner, &config).expect("emission should succeed");
        let bytes: Vec<Vec<u8>> = objects.iter().map(|p| fs::read(p).unwrap()).collect();
        drop(out_dir);
        bytes
    };

    let serial = emit_with("1");
    let parallel = emit_with("8");
    unsafe { std::env::remove_var(COMPILE_THREADS_ENV) };

    assert_eq!(
        serial, parallel,
        "object files must be byte-identical for any worker count"
    );
}
