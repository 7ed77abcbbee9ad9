use crate::compiler::compiler_errors::{CompileError, ErrorLocation, ErrorType};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "luma.toml";
pub const PROGRAM_FILE_EXTENSION: &str = "json";
pub const OBJECT_DIR_NAME: &str = "build";
pub const DEFAULT_EXECUTABLE_NAME: &str = "output";

pub const MAIN_MODULE_NAME: &str = "main";
pub const MAIN_FUNCTION_NAME: &str = "main";

/// Worker pool bounds for parallel object emission
pub const MAX_COMPILE_THREADS: usize = 64;
pub const FALLBACK_COMPILE_THREADS: usize = 4;
pub const COMPILE_THREADS_ENV: &str = "LUMA_COMPILE_THREADS";

// A rough guess at how many symbols the smallest common module will have,
// used to pre-size symbol lists and caches.
pub const MINIMUM_LIKELY_SYMBOLS: usize = 8;

/// What the surrounding tool asks the core to do.
///
/// Parsed from CLI flags, optionally seeded from a `luma.toml` next to the
/// program file.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Optimisation level passed through to the linker, 0..3
    pub opt_level: u8,

    /// Also write per-module textual IR next to the object files
    pub save_intermediates: bool,

    /// Base name of the produced executable
    pub executable_name: String,

    /// The program's module files, in program order
    pub module_files: Vec<PathBuf>,

    /// Generate documentation instead of a native build
    pub docs: bool,

    /// Directory that receives the per-module object files
    pub output_dir: PathBuf,

    pub disable_warnings: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            opt_level: 0,
            save_intermediates: false,
            executable_name: DEFAULT_EXECUTABLE_NAME.to_string(),
            module_files: Vec::new(),
            docs: false,
            output_dir: PathBuf::from(OBJECT_DIR_NAME),
            disable_warnings: false,
        }
    }
}

/// The subset of `luma.toml` the core cares about
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    opt_level: Option<u8>,
    #[serde(default)]
    save_intermediates: Option<bool>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    modules: Option<Vec<PathBuf>>,
}

impl BuildConfig {
    /// Load `luma.toml` from the given directory, if present, and fold it
    /// over the defaults. CLI flags are applied on top by the caller.
    pub fn from_project_dir(dir: &Path) -> Result<BuildConfig, CompileError> {
        let mut config = BuildConfig::default();

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(config);
        }

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            CompileError::file_error(format!(
                "Could not read {}: {}",
                config_path.display(),
                e
            ))
        })?;

        let parsed: ConfigFile = toml::from_str(&raw).map_err(|e| {
            CompileError::new(
                format!("{} is not valid TOML: {}", config_path.display(), e),
                ErrorLocation::default(),
                ErrorType::Config,
            )
        })?;

        if let Some(name) = parsed.name {
            config.executable_name = name;
        }
        if let Some(level) = parsed.opt_level {
            if level > 3 {
                return Err(CompileError::new(
                    format!("opt_level must be between 0 and 3, found {level}"),
                    ErrorLocation::default(),
                    ErrorType::Config,
                ));
            }
            config.opt_level = level;
        }
        if let Some(save) = parsed.save_intermediates {
            config.save_intermediates = save;
        }
        if let Some(out) = parsed.output_dir {
            config.output_dir = dir.join(out);
        }
        if let Some(modules) = parsed.modules {
            config.module_files = modules.iter().map(|m| dir.join(m)).collect();
        }

        Ok(config)
    }
}
