//! # Compiler Error Handling
//!
//! Unified error handling for the Luma compiler core. All error types are
//! consolidated here with structured metadata so tooling can analyse
//! failures without parsing message strings.
//!
//! The error system is built around three core types:
//! - [`CompileError`]: the unified error type with owned data
//! - [`ErrorLocation`]: module/item context for a diagnostic
//! - [`CompilerMessages`]: the final set of errors and warnings from a compilation
//!
//! ## Error Categories
//!
//! - **Rule**: structural violations: duplicate modules, unknown imports,
//!   unresolved symbols, dependency cycles
//! - **Type**: translation violations: private field access, assignment to a
//!   function, member access on a non-struct, element type mismatches
//! - **Codegen**: the native backend refused something we built: failed
//!   verification, object emission errors, unsupported targets
//! - **File**: filesystem problems around the output directory
//! - **Link**: the system linker failed on both the primary and fallback command
//! - **Config**: malformed project configuration
//! - **Compiler**: internal bugs (not the user's fault)
//!
//! Each category has a `return_*_error!` macro so call sites stay terse and
//! consistent: `return_rule_error!(location, "message {}", args)`.

use crate::compiler::compiler_warnings::{CompilerWarning, print_formatted_warning};
use colour::{e_dark_magenta, e_dark_yellow_ln, e_magenta_ln, e_red_ln, e_yellow};
use std::collections::HashMap;

/// The final set of errors and warnings emitted from the compiler
#[derive(Debug, Default)]
pub struct CompilerMessages {
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompilerWarning>,
}

impl CompilerMessages {
    pub fn new() -> Self {
        CompilerMessages {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn from_error(error: CompileError) -> Self {
        CompilerMessages {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Eq, Hash, PartialEq, Clone)]
pub enum ErrorMetaDataKey {
    ModuleName,
    SymbolName,
    QualifiedName,
    CompilationStage,

    // Optional suggestions
    PrimarySuggestion,
    AlternativeSuggestion,

    // Data type information
    ExpectedType,
    FoundType,
}

/// Where a diagnostic came from: the module being compiled and, when known,
/// the declaration inside it. The core never sees source positions (the
/// parser owns those), so module/item context is what we report.
#[derive(Debug, Clone, Default)]
pub struct ErrorLocation {
    pub module: String,
    pub item: String,
}

impl ErrorLocation {
    pub fn in_module(module: impl Into<String>) -> ErrorLocation {
        ErrorLocation {
            module: module.into(),
            item: String::new(),
        }
    }

    pub fn in_item(module: impl Into<String>, item: impl Into<String>) -> ErrorLocation {
        ErrorLocation {
            module: module.into(),
            item: item.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub msg: String,
    pub location: ErrorLocation,
    pub error_type: ErrorType,

    // This is for creating more structured and detailed error messages
    pub metadata: HashMap<ErrorMetaDataKey, String>,
}

impl CompileError {
    pub fn new(
        msg: impl Into<String>,
        location: ErrorLocation,
        error_type: ErrorType,
    ) -> CompileError {
        CompileError {
            msg: msg.into(),
            location,
            error_type,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: ErrorMetaDataKey, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    /// Create a rule error with a descriptive message
    pub fn rule_error(msg: impl Into<String>, location: ErrorLocation) -> Self {
        CompileError::new(msg, location, ErrorType::Rule)
    }

    /// Create a type error for translation violations
    pub fn type_error(msg: impl Into<String>, location: ErrorLocation) -> Self {
        CompileError::new(msg, location, ErrorType::Type)
    }

    /// Create a codegen error wrapping a backend diagnostic string
    pub fn codegen_error(msg: impl Into<String>, location: ErrorLocation) -> Self {
        CompileError::new(msg, location, ErrorType::Codegen)
    }

    /// Create a file system error
    pub fn file_error(msg: impl Into<String>) -> Self {
        CompileError::new(msg, ErrorLocation::default(), ErrorType::File)
    }

    /// Create a linker error
    pub fn link_error(msg: impl Into<String>) -> Self {
        CompileError::new(msg, ErrorLocation::default(), ErrorType::Link)
    }

    /// Create an operating system resource error
    pub fn system_error(msg: impl Into<String>) -> Self {
        CompileError::new(msg, ErrorLocation::default(), ErrorType::System)
    }

    /// Create a compiler error (internal bug, not the user's fault)
    pub fn compiler_error(msg: impl Into<String>) -> Self {
        CompileError::new(msg, ErrorLocation::default(), ErrorType::Compiler)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum ErrorType {
    Rule,
    Type,
    Codegen,
    File,
    Link,
    System,
    Config,
    Compiler,
}

pub fn error_type_to_str(e_type: &ErrorType) -> &'static str {
    match e_type {
        ErrorType::Rule => "Language Rule Violation",
        ErrorType::Type => "Type Error",
        ErrorType::Codegen => "Code Generation Failure",
        ErrorType::File => "File Error",
        ErrorType::Link => "Linker Failure",
        ErrorType::System => "System Failure",
        ErrorType::Config => "Malformed Config",
        ErrorType::Compiler => "Compiler Bug",
    }
}

/// Returns a new CompileError for structural rule violations.
///
/// Rule errors cover duplicate module names, imports of unknown modules,
/// unresolved symbols and dependency cycles.
///
/// Usage: `return_rule_error!(location, "Module '{}' does not exist", name)`;
#[macro_export]
macro_rules! return_rule_error {
    ($location:expr, $fmt:expr, $($arg:expr),+ $(,)?) => {
        return Err($crate::compiler::compiler_errors::CompileError::rule_error(
            format!($fmt, $($arg),+),
            $location,
        ))
    };
    ($location:expr, $msg:expr) => {
        return Err($crate::compiler::compiler_errors::CompileError::rule_error(
            $msg, $location,
        ))
    };
}

/// Returns a new CompileError for translation violations.
///
/// Usage: `return_type_error!(location, "Cannot assign to function '{}'", name)`;
#[macro_export]
macro_rules! return_type_error {
    ($location:expr, $fmt:expr, $($arg:expr),+ $(,)?) => {
        return Err($crate::compiler::compiler_errors::CompileError::type_error(
            format!($fmt, $($arg),+),
            $location,
        ))
    };
    ($location:expr, $msg:expr) => {
        return Err($crate::compiler::compiler_errors::CompileError::type_error(
            $msg, $location,
        ))
    };
}

/// Returns a new CompileError wrapping a native backend diagnostic.
///
/// Usage: `return_codegen_error!(location, "Object emission failed: {}", err)`;
#[macro_export]
macro_rules! return_codegen_error {
    ($location:expr, $fmt:expr, $($arg:expr),+ $(,)?) => {
        return Err($crate::compiler::compiler_errors::CompileError::codegen_error(
            format!($fmt, $($arg),+),
            $location,
        ))
    };
    ($location:expr, $msg:expr) => {
        return Err($crate::compiler::compiler_errors::CompileError::codegen_error(
            $msg, $location,
        ))
    };
}

/// Returns a new CompileError for filesystem problems.
///
/// Usage: `return_file_error!("Could not create output directory {}: {}", dir, err)`;
#[macro_export]
macro_rules! return_file_error {
    ($fmt:expr, $($arg:expr),+ $(,)?) => {
        return Err($crate::compiler::compiler_errors::CompileError::file_error(
            format!($fmt, $($arg),+),
        ))
    };
    ($msg:expr) => {
        return Err($crate::compiler::compiler_errors::CompileError::file_error($msg))
    };
}

/// Returns a new CompileError for internal compiler bugs.
///
/// Compiler errors indicate bugs in the compiler itself, not user code issues.
#[macro_export]
macro_rules! return_compiler_error {
    ($fmt:expr, $($arg:expr),+ $(,)?) => {
        return Err($crate::compiler::compiler_errors::CompileError::compiler_error(
            format!($fmt, $($arg),+),
        ))
    };
    ($msg:expr) => {
        return Err($crate::compiler::compiler_errors::CompileError::compiler_error($msg))
    };
}

pub fn print_compiler_messages(messages: &CompilerMessages) {
    for err in &messages.errors {
        print_formatted_error(err);
    }

    for warning in &messages.warnings {
        print_formatted_warning(warning);
    }
}

pub fn print_formatted_error(e: &CompileError) {
    let context = if e.location.item.is_empty() {
        e.location.module.clone()
    } else {
        format!("{} :: {}", e.location.module, e.location.item)
    };

    match e.error_type {
        ErrorType::Rule | ErrorType::Type => {
            eprint!("\n(╯°□°)╯ 🔥 ");
            e_dark_magenta!("{}", context);
            eprintln!(" 🔥");
            e_red_ln!("{}", error_type_to_str(&e.error_type));
        }

        ErrorType::Codegen => {
            eprint!("\nヽ༼☉ ‿ ⚆༽ﾉ 🔥🔥 ");
            e_dark_magenta!("{}", context);
            eprintln!(" 🔥🔥");
            e_yellow!("CODE GENERATION FAILED - ");
            e_dark_yellow_ln!("the native backend rejected this module");
        }

        ErrorType::File => {
            e_red_ln!("🏚 Can't create/read file or directory");
        }

        ErrorType::Link => {
            e_yellow!("LINKER FAILED - ");
            e_dark_yellow_ln!("both the primary and fallback link commands exited non-zero");
        }

        ErrorType::System => {
            e_yellow!("SYSTEM FAILURE - ");
            e_dark_yellow_ln!("the operating system refused a resource the compiler needs");
        }

        ErrorType::Config => {
            e_yellow!("CONFIG FILE ISSUE - ");
            e_dark_yellow_ln!("something doesn't make sense inside the project config");
        }

        ErrorType::Compiler => {
            e_yellow!("COMPILER BUG - ");
            e_dark_yellow_ln!("this is the compiler's fault, not yours");
        }
    }

    if !e.location.module.is_empty() {
        e_dark_magenta!("Module ");
        e_magenta_ln!("{}", e.location.module);
    }

    e_red_ln!("  {}", e.msg);
}
