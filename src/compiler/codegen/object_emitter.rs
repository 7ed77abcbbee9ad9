//! Parallel lowering of populated units to native object files.
//!
//! Each unit is consumed by one task: its queued function bodies are
//! compiled into the backend module, the module is finished, and the bytes
//! land in `<output_dir>/<module_name>.o`. Tasks run on a dedicated worker
//! pool sized by `LUMA_COMPILE_THREADS` (clamped to `[1, 64]`), the detected
//! CPU count, or a fallback of four: always capped at the module count.
//!
//! Tasks touch disjoint backend modules and only read the interner, so the
//! phase parallelises without locks. A failing task never cancels its
//! siblings; every task runs to completion and the overall result names the
//! first failing module in registry order.

use crate::compiler::codegen::module_registry::ModuleUnit;
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::string_interning::StringTable;
use crate::settings::{
    BuildConfig, COMPILE_THREADS_ENV, FALLBACK_COMPILE_THREADS, MAX_COMPILE_THREADS,
};
use crate::{codegen_log, return_file_error};
use cranelift_codegen::Context;
use cranelift_module::Module;
use rayon::ThreadPoolBuilder;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::fs;
use std::path::{Path, PathBuf};

struct TaskOutcome {
    module: String,
    result: Result<PathBuf, String>,
}

/// Lower every unit to an object file under `config.output_dir`.
/// Returns the object paths in registry order.
pub fn emit_objects(
    units: Vec<ModuleUnit>,
    interner: &StringTable,
    config: &BuildConfig,
) -> Result<Vec<PathBuf>, CompileError> {
    ensure_output_dir(&config.output_dir)?;

    let workers = worker_count(units.len());
    codegen_log!(
        "emitting {} object file(s) on {workers} worker(s)",
        units.len()
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| {
            CompileError::system_error(format!("Could not spawn emission workers: {e}"))
        })?;

    let jobs: Vec<(String, ModuleUnit)> = units
        .into_iter()
        .map(|unit| (unit.name.resolve(interner).to_owned(), unit))
        .collect();

    let output_dir = config.output_dir.clone();
    let save_intermediates = config.save_intermediates;

    let outcomes: Vec<TaskOutcome> = pool.install(|| {
        jobs.into_par_iter()
            .map(|(name, unit)| {
                let result = emit_unit(unit, &name, &output_dir, save_intermediates);
                TaskOutcome {
                    module: name,
                    result,
                }
            })
            .collect()
    });

    // every task has run to completion; report the first failure in order
    let mut object_paths = Vec::with_capacity(outcomes.len());
    for outcome in &outcomes {
        match &outcome.result {
            Ok(path) => object_paths.push(path.clone()),
            Err(msg) => {
                return Err(CompileError::codegen_error(
                    format!("Object emission failed for module '{}': {msg}", outcome.module),
                    ErrorLocation::in_module(&outcome.module),
                ));
            }
        }
    }

    Ok(object_paths)
}

/// One emission task: compile the queued function bodies, finish the module,
/// write the object (and the textual IR when asked to keep intermediates).
fn emit_unit(
    mut unit: ModuleUnit,
    name: &str,
    output_dir: &Path,
    save_intermediates: bool,
) -> Result<PathBuf, String> {
    let pending = std::mem::take(&mut unit.pending_functions);
    let mut ir_text = String::new();
    let mut ctx = Context::new();

    for (func_id, func) in pending {
        if save_intermediates {
            ir_text.push_str(&format!("{}\n", func.display()));
        }

        ctx.func = func;
        unit.object
            .define_function(func_id, &mut ctx)
            .map_err(|e| e.to_string())?;
        ctx.clear();
    }

    let product = unit.object.finish();
    let bytes = product.emit().map_err(|e| e.to_string())?;

    let object_path = output_dir.join(format!("{name}.o"));
    fs::write(&object_path, bytes).map_err(|e| e.to_string())?;

    if save_intermediates {
        let ir_path = output_dir.join(format!("{name}.clif"));
        fs::write(&ir_path, ir_text).map_err(|e| e.to_string())?;
    }

    Ok(object_path)
}

/// Worker count: environment override when it parses and lands in
/// `[1, MAX_COMPILE_THREADS]`, else the detected CPU count, else the
/// fallback. Always capped at the number of modules.
pub fn worker_count(module_count: usize) -> usize {
    let configured = std::env::var(COMPILE_THREADS_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| (1..=MAX_COMPILE_THREADS).contains(n));

    let workers = configured.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get().min(MAX_COMPILE_THREADS))
            .unwrap_or(FALLBACK_COMPILE_THREADS)
    });

    workers.min(module_count).max(1)
}

#[cfg(unix)]
fn ensure_output_dir(dir: &Path) -> Result<(), CompileError> {
    use std::os::unix::fs::DirBuilderExt;

    if dir.is_dir() {
        return Ok(());
    }

    let result = fs::DirBuilder::new().recursive(true).mode(0o755).create(dir);
    if let Err(e) = result {
        return_file_error!("Could not create output directory {}: {e}", dir.display());
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_output_dir(dir: &Path) -> Result<(), CompileError> {
    if let Err(e) = fs::create_dir_all(dir) {
        return_file_error!("Could not create output directory {}: {e}", dir.display());
    }
    Ok(())
}
