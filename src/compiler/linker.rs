//! Invoking the system linker over the emitted objects.
//!
//! The link command goes through the system C compiler driver (`cc`, with
//! `gcc` as a fallback when `cc` is missing) because the driver knows where
//! the C runtime startup objects live on every platform. Command composition
//! is a pure function so the platform branches stay testable without
//! spawning anything.

use crate::compiler::compiler_errors::CompileError;
use crate::settings::BuildConfig;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A composed (but not yet spawned) linker invocation
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCommand {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PieMode {
    /// Position-independent executable, the default
    Pie,
    /// Fallback for toolchains that reject `-pie` with non-PIC startup files
    NoPie,
}

/// Compose the link command for one platform.
///
/// On macOS-like systems dead-code stripping happens at link time and the
/// binary is stripped afterwards; `-pie`/`-no-pie` switches only exist on
/// the other platforms.
pub fn compose_link_command(
    driver: &str,
    target_os: &str,
    opt_level: u8,
    objects: &[PathBuf],
    executable: &Path,
    pie_mode: PieMode,
) -> LinkCommand {
    let mut args: Vec<String> = Vec::with_capacity(objects.len() + 6);

    args.push(format!("-O{opt_level}"));

    if target_os == "macos" {
        args.push("-Wl,-dead_strip".to_string());
    } else {
        match pie_mode {
            PieMode::Pie => args.push("-pie".to_string()),
            PieMode::NoPie => args.push("-no-pie".to_string()),
        }
    }

    for object in objects {
        args.push(object.display().to_string());
    }

    args.push("-o".to_string());
    args.push(executable.display().to_string());

    LinkCommand {
        program: driver.to_string(),
        args,
    }
}

/// Link the objects into an executable named by the config, in the working
/// directory. Retries with `-no-pie` when the default link fails.
pub fn link_objects(
    objects: &[PathBuf],
    config: &BuildConfig,
) -> Result<PathBuf, CompileError> {
    let executable = PathBuf::from(&config.executable_name);
    let driver = resolve_driver()?;

    let primary = compose_link_command(
        &driver,
        std::env::consts::OS,
        config.opt_level,
        objects,
        &executable,
        PieMode::Pie,
    );

    let primary_output = run_link(&primary)?;
    if primary_output.status.success() {
        strip_binary(&executable);
        return Ok(executable);
    }

    // non-macOS toolchains sometimes reject -pie; retry without it
    if std::env::consts::OS != "macos" {
        let fallback = compose_link_command(
            &driver,
            std::env::consts::OS,
            config.opt_level,
            objects,
            &executable,
            PieMode::NoPie,
        );

        let fallback_output = run_link(&fallback)?;
        if fallback_output.status.success() {
            return Ok(executable);
        }

        return Err(CompileError::link_error(format!(
            "Linking failed with both '-pie' and '-no-pie':\n{}",
            String::from_utf8_lossy(&fallback_output.stderr)
        )));
    }

    Err(CompileError::link_error(format!(
        "Linking failed:\n{}",
        String::from_utf8_lossy(&primary_output.stderr)
    )))
}

/// Find a usable C compiler driver: `cc` first, `gcc` as a fallback
fn resolve_driver() -> Result<String, CompileError> {
    for candidate in ["cc", "gcc"] {
        let probe = Command::new(candidate).arg("--version").output();
        if probe.is_ok() {
            return Ok(candidate.to_string());
        }
    }

    Err(CompileError::system_error(
        "No C compiler driver found: tried 'cc' and 'gcc'",
    ))
}

fn run_link(command: &LinkCommand) -> Result<std::process::Output, CompileError> {
    Command::new(&command.program)
        .args(&command.args)
        .output()
        .map_err(|e| {
            CompileError::system_error(format!(
                "Could not run linker '{}': {e}",
                command.program
            ))
        })
}

/// Strip local symbols from the binary on macOS; best-effort elsewhere a no-op
fn strip_binary(executable: &Path) {
    if std::env::consts::OS == "macos" {
        let _ = Command::new("strip").arg("-x").arg(executable).status();
    }
}
