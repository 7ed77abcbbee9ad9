use colour::{e_red_ln, green_ln_bold, grey_ln, red_ln};
use luma::compiler::ast::{ModuleNode, Program};
use luma::compiler::compiler_errors::print_compiler_messages;
use luma::compiler::compiler_warnings::print_formatted_warning;
use luma::settings::{BuildConfig, PROGRAM_FILE_EXTENSION};
use luma::compile_program;
use std::path::{Path, PathBuf};
use std::time::Instant;
use std::{env, fs};

enum Command {
    /// Compile a program file or project directory to a native executable
    Build(PathBuf),
}

fn main() {
    let compiler_args: Vec<String> = env::args().collect();

    if compiler_args.len() < 2 {
        print_help(false);
        return;
    }

    let command = match get_command(&compiler_args[1..]) {
        Ok(command) => command,
        Err(e) => {
            red_ln!("{}", e);
            print_help(true);
            std::process::exit(1);
        }
    };

    let Command::Build(path) = command;

    let mut config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            e_red_ln!("{}", e.msg);
            std::process::exit(1);
        }
    };

    let disable_timers = apply_flags(&mut config, &compiler_args[2..]);

    let program = match load_program(&path, &config) {
        Ok(program) => program,
        Err(e) => {
            e_red_ln!("{}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();

    match compile_program(&program, &config) {
        Ok(artifacts) => {
            if !config.disable_warnings {
                for warning in &artifacts.warnings {
                    print_formatted_warning(warning);
                }
            }

            if let Some(executable) = &artifacts.executable {
                if !disable_timers {
                    let duration = start.elapsed();
                    grey_ln!("------------------------------------");
                    print!("Built ");
                    green_ln_bold!("{} in {:?}", executable.display(), duration);
                }
            }
        }
        Err(mut messages) => {
            if config.disable_warnings {
                messages.warnings.clear();
            }
            e_red_ln!("Errors while building program:\n");
            print_compiler_messages(&messages);
            std::process::exit(1);
        }
    }
}

fn get_command(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("build") => {
            let path = args
                .get(1)
                .filter(|a| !a.starts_with("--"))
                .ok_or("The build command needs a program file or project directory")?;
            Ok(Command::Build(PathBuf::from(path)))
        }
        Some(other) if !other.starts_with("--") => {
            Err(format!("Unknown command '{other}'"))
        }
        _ => Err("No command given".to_string()),
    }
}

/// Fold command line flags over the config. Returns whether timers are off.
fn apply_flags(config: &mut BuildConfig, args: &[String]) -> bool {
    let mut disable_timers = false;

    for arg in args {
        if let Some(level) = arg.strip_prefix("--opt=") {
            match level.parse::<u8>() {
                Ok(level) if level <= 3 => config.opt_level = level,
                _ => red_ln!("Ignoring invalid optimisation level '{}'", level),
            }
        } else if let Some(name) = arg.strip_prefix("--name=") {
            config.executable_name = name.to_string();
        } else {
            match arg.as_str() {
                "--save-ir" => config.save_intermediates = true,
                "--docs" => config.docs = true,
                "--disable-warnings" => config.disable_warnings = true,
                "--disable-timers" => disable_timers = true,
                other if other.starts_with("--") => {
                    red_ln!("Ignoring unknown flag '{}'", other);
                }
                _ => {}
            }
        }
    }

    disable_timers
}

fn load_config(path: &Path) -> Result<BuildConfig, luma::CompileError> {
    if path.is_dir() {
        BuildConfig::from_project_dir(path)
    } else {
        Ok(BuildConfig::default())
    }
}

/// A program arrives either as one JSON file holding the whole module
/// forest, or as a project directory whose config lists per-module files.
fn load_program(path: &Path, config: &BuildConfig) -> Result<Program, String> {
    if path.is_file() {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Could not read {}: {e}", path.display()))?;
        return serde_json::from_str(&raw)
            .map_err(|e| format!("{} is not a valid program: {e}", path.display()));
    }

    if config.module_files.is_empty() {
        return Err(format!(
            "No modules listed in {}/luma.toml and no .{PROGRAM_FILE_EXTENSION} file given",
            path.display()
        ));
    }

    let mut modules: Vec<ModuleNode> = Vec::with_capacity(config.module_files.len());
    for file in &config.module_files {
        let raw = fs::read_to_string(file)
            .map_err(|e| format!("Could not read {}: {e}", file.display()))?;
        let module: ModuleNode = serde_json::from_str(&raw)
            .map_err(|e| format!("{} is not a valid module: {e}", file.display()))?;
        modules.push(module);
    }

    Ok(Program { modules })
}

fn print_help(after_error: bool) {
    if after_error {
        println!();
    }

    println!("Luma compiler");
    println!();
    println!("Usage:");
    println!("  luma build <program.json>     compile a program file");
    println!("  luma build <project dir>      compile the project described by luma.toml");
    println!();
    println!("Flags:");
    println!("  --opt=<0..3>          optimisation level passed to the linker");
    println!("  --name=<executable>   name of the produced binary");
    println!("  --save-ir             keep per-module textual IR next to the objects");
    println!("  --docs                print module documentation instead of building");
    println!("  --disable-warnings    don't print warnings");
    println!("  --disable-timers      don't print build timings");
}
