//! Builtin functions the language exposes without an import.
//!
//! The backend has no inline-assembly surface, so every builtin lowers to a
//! libc call on every platform. Each definition names the libc symbols it
//! needs; the expression lowerer declares those lazily per module.

use crate::compiler::codegen::symbols::LumaType;

/// Defines a builtin function callable from Luma code
#[derive(Debug, Clone)]
pub struct BuiltinDef {
    /// Function name as used in Luma code
    pub name: &'static str,
    pub parameters: &'static [LumaType],
    pub return_type: LumaType,
    /// The libc symbols this builtin expands into
    pub libc_symbols: &'static [&'static str],
}

/// Writes a string to standard output, no trailing newline added
pub const OUTPUT: BuiltinDef = BuiltinDef {
    name: "output",
    parameters: &[LumaType::Str],
    return_type: LumaType::Unit,
    libc_symbols: &["strlen", "write"],
};

/// Terminates the process with the given status
pub const EXIT: BuiltinDef = BuiltinDef {
    name: "exit",
    parameters: &[LumaType::Int],
    return_type: LumaType::Unit,
    libc_symbols: &["exit"],
};

const BUILTINS: &[&BuiltinDef] = &[&OUTPUT, &EXIT];

/// Look a builtin up by its Luma-side name
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().copied().find(|b| b.name == name)
}
