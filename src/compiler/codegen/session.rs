//! The per-compilation backend session.
//!
//! Owns everything with compilation-wide lifetime: the backend settings,
//! the module registry, the struct list and the lookup caches. A new
//! compilation starts from a fresh session, which is what guarantees the
//! caches are cleared between runs: they cannot outlive the units they
//! index.

use crate::compiler::ast::TypeExpr;
use crate::compiler::codegen::module_registry::ModuleRegistry;
use crate::compiler::codegen::symbols::{
    LumaType, SessionCaches, StructInfo, resolve_type_expr,
};
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::compiler_warnings::CompilerWarning;
use crate::compiler::string_interning::{StringId, StringTable};
use cranelift_codegen::ir::Type;
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::FunctionBuilderContext;
use rustc_hash::FxHashSet;

pub struct CodegenSession {
    pub interner: StringTable,
    pub registry: ModuleRegistry,

    /// All user-defined structs, in registration order; `LumaType::Struct`
    /// indexes into this list
    pub structs: Vec<StructInfo>,

    /// Names of user-defined enums; enum-typed declarations lower to Int
    pub enums: FxHashSet<StringId>,

    pub caches: SessionCaches,
    pub warnings: Vec<CompilerWarning>,

    /// Reusable scratch space for building each function
    pub builder_ctx: FunctionBuilderContext,

    /// Backend settings shared by every ISA instance the session creates
    flags: settings::Flags,

    /// Pointer width of the host target, cached at session construction
    pub pointer_type: Type,
}

impl std::fmt::Debug for CodegenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodegenSession")
            .field("registry", &self.registry)
            .field("structs", &self.structs)
            .field("enums", &self.enums)
            .field("warnings", &self.warnings)
            .field("pointer_type", &self.pointer_type)
            .finish_non_exhaustive()
    }
}

impl CodegenSession {
    pub fn new() -> Result<CodegenSession, CompileError> {
        let mut flag_builder = settings::builder();

        // Position-independent objects so the linker can produce a PIE,
        // no backend optimisation beyond what it always does.
        flag_builder.set("is_pic", "true").map_err(flag_error)?;
        flag_builder.set("opt_level", "none").map_err(flag_error)?;
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(flag_error)?;

        let flags = settings::Flags::new(flag_builder);

        // Probe the host once to learn the pointer width; every unit gets
        // its own ISA instance from the same flag set later.
        let probe = host_isa(&flags)?;
        let pointer_type = probe.pointer_type();

        Ok(CodegenSession {
            interner: StringTable::new(),
            registry: ModuleRegistry::new(),
            structs: Vec::new(),
            enums: FxHashSet::default(),
            caches: SessionCaches::new(),
            warnings: Vec::new(),
            builder_ctx: FunctionBuilderContext::new(),
            flags,
            pointer_type,
        })
    }

    /// A fresh ISA for one unit or one emission task. Host triple, host CPU,
    /// host features.
    pub fn make_isa(&self) -> Result<OwnedTargetIsa, CompileError> {
        host_isa(&self.flags)
    }

    /// Resolve a checker type annotation against the session's struct and
    /// enum registries.
    pub fn resolve_type(
        &self,
        ty: &TypeExpr,
        location: ErrorLocation,
    ) -> Result<LumaType, CompileError> {
        resolve_type_expr(
            ty,
            &self.interner,
            &self.structs,
            &self.caches,
            &self.enums,
            location,
        )
    }

    /// Struct lookup by name: cache when warmed, linear search before that.
    /// Both paths agree: the cache is built from this same list.
    pub fn find_struct(&self, name: StringId) -> Option<usize> {
        if self.caches.is_warmed() {
            return self.caches.structs.get(&name).copied();
        }
        self.structs.iter().position(|s| s.name == name)
    }

    pub fn register_struct(&mut self, info: StructInfo) -> usize {
        self.structs.push(info);
        self.structs.len() - 1
    }

    /// Warm every lookup cache. Precondition for the lower pass.
    pub fn warm_caches(&mut self) {
        self.caches.warm(&self.registry, &self.structs);
    }
}

fn host_isa(flags: &settings::Flags) -> Result<OwnedTargetIsa, CompileError> {
    let isa_builder = cranelift_native::builder().map_err(|msg| {
        CompileError::codegen_error(
            format!("Host machine is not supported by the backend: {msg}"),
            ErrorLocation::default(),
        )
    })?;

    isa_builder.finish(flags.clone()).map_err(|e| {
        CompileError::codegen_error(
            format!("Could not create a target machine: {e}"),
            ErrorLocation::default(),
        )
    })
}

fn flag_error(e: settings::SetError) -> CompileError {
    CompileError::compiler_error(format!("Invalid backend flag: {e}"))
}
