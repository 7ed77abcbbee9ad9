//! The Luma compiler core.
//!
//! Takes a fully parsed and type-checked program, an ordered forest of
//! module trees, and produces a linked native executable. The pipeline:
//! create units, link imports, warm the lookup caches, lower bodies in
//! dependency order, emit objects in parallel, invoke the system linker.

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod compiler_dev_logging;
pub mod compiler_errors;
pub mod compiler_warnings;
pub mod linker;
pub mod string_interning;

use crate::compiler::ast::Program;
use crate::compiler::codegen::lowering::{run_create_pass, run_link_pass, run_lower_pass};
use crate::compiler::codegen::object_emitter::emit_objects;
use crate::compiler::codegen::session::CodegenSession;
use crate::compiler::compiler_errors::{CompileError, CompilerMessages, ErrorLocation};
use crate::compiler::compiler_warnings::CompilerWarning;
use crate::settings::{BuildConfig, MAIN_MODULE_NAME};
use crate::timer_log;
use std::path::PathBuf;
use std::time::Instant;

/// What a successful compilation leaves on disk
#[derive(Debug)]
pub struct BuildArtifacts {
    /// Per-module object files, in program order
    pub objects: Vec<PathBuf>,
    /// The linked executable; absent in documentation mode
    pub executable: Option<PathBuf>,
    pub warnings: Vec<CompilerWarning>,
}

/// Compile a program to a linked executable (or print its documentation).
pub fn compile_program(
    program: &Program,
    config: &BuildConfig,
) -> Result<BuildArtifacts, CompilerMessages> {
    if config.docs {
        return Ok(print_documentation(program));
    }

    let mut session = match CodegenSession::new() {
        Ok(session) => session,
        Err(e) => return Err(CompilerMessages::from_error(e)),
    };

    match compile_with_session(&mut session, program, config) {
        Ok(mut artifacts) => {
            artifacts.warnings = std::mem::take(&mut session.warnings);
            Ok(artifacts)
        }
        Err(e) => Err(CompilerMessages {
            errors: vec![e],
            warnings: std::mem::take(&mut session.warnings),
        }),
    }
}

fn compile_with_session(
    session: &mut CodegenSession,
    program: &Program,
    config: &BuildConfig,
) -> Result<BuildArtifacts, CompileError> {
    if program.modules.is_empty() {
        return Err(CompileError::rule_error(
            "The program contains no modules",
            ErrorLocation::default(),
        ));
    }

    if !program.modules.iter().any(|m| m.name == MAIN_MODULE_NAME) {
        return Err(CompileError::rule_error(
            format!("The program has no '{MAIN_MODULE_NAME}' module to link an executable from"),
            ErrorLocation::default(),
        ));
    }

    // ----------------------------------
    //      Pass 1: create units
    // ----------------------------------
    let time = Instant::now();
    run_create_pass(session, program)?;
    timer_log!(time, "Units created in: ");

    // ----------------------------------
    //      Pass 2: link imports
    // ----------------------------------
    let time = Instant::now();
    run_link_pass(session, program)?;
    timer_log!(time, "Imports linked in: ");

    // Cache warm-up is the precondition for fast lookups during lowering
    session.warm_caches();

    // ----------------------------------
    //      Pass 3: lower bodies
    // ----------------------------------
    let time = Instant::now();
    run_lower_pass(session, program)?;
    timer_log!(time, "Modules lowered in: ");

    // ----------------------------------
    //      Parallel object emission
    // ----------------------------------
    let time = Instant::now();
    let units = session.registry.take_units();
    let objects = emit_objects(units, &session.interner, config)?;
    timer_log!(time, "Objects emitted in: ");

    // ----------------------------------
    //             Linking
    // ----------------------------------
    let time = Instant::now();
    let executable = linker::link_objects(&objects, config)?;
    timer_log!(time, "Linked in: ");

    Ok(BuildArtifacts {
        objects,
        executable: Some(executable),
        warnings: Vec::new(),
    })
}

/// Documentation mode: the core's share of it is the per-module doc strings;
/// everything richer lives in the surrounding tool.
fn print_documentation(program: &Program) -> BuildArtifacts {
    for module in &program.modules {
        println!("# Module {}", module.name);
        if let Some(docs) = &module.docs {
            println!("{docs}");
        }
        println!();
    }

    BuildArtifacts {
        objects: Vec::new(),
        executable: None,
        warnings: Vec::new(),
    }
}
