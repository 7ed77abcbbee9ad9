//! Symbol tables and the process-wide lookup caches.
//!
//! Each module compilation unit owns a flat list of [`Symbol`]s in insertion
//! order. On top of that, the session carries three caches warmed after the
//! link pass: `(module, symbol)` -> symbol handle, struct name -> struct info,
//! and field name -> first struct known to contain that field (a best-effort
//! reverse index used as a fast path before linear search).
//!
//! Cache entries are indices into the registry and the session struct list,
//! never owning references, so they are invalidated wholesale when the units
//! are consumed by object emission.

use crate::compiler::ast::TypeExpr;
use crate::compiler::codegen::module_registry::ModuleRegistry;
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::string_interning::{StringId, StringTable};
use cranelift_codegen::ir::{Signature, Type, types};
use cranelift_module::{DataId, FuncId};
use rustc_hash::{FxHashMap, FxHashSet};

/// The language-level type of a value flowing through lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LumaType {
    Int,
    Float,
    Bool,
    Str,
    Unit,
    /// Index into the session struct list
    Struct(usize),
    /// Enums are integers at runtime; the id is the enum's type name
    Enum(StringId),
}

impl LumaType {
    /// The backend type carrying a value of this language type.
    /// Struct values are carried as pointers to their storage.
    pub fn backend_type(self, pointer_type: Type) -> Type {
        match self {
            LumaType::Int => types::I64,
            LumaType::Float => types::F64,
            LumaType::Bool => types::I8,
            LumaType::Str => pointer_type,
            LumaType::Unit => types::I8,
            LumaType::Struct(_) => pointer_type,
            LumaType::Enum(_) => types::I64,
        }
    }

    /// What a pointer of this type points at, when it is a pointer at all
    pub fn pointee(self) -> Option<Type> {
        match self {
            LumaType::Str => Some(types::I8),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, LumaType::Int | LumaType::Enum(_))
    }

    pub fn describe(self, table: &StringTable, structs: &[StructInfo]) -> String {
        match self {
            LumaType::Int => "Int".to_string(),
            LumaType::Float => "Float".to_string(),
            LumaType::Bool => "Bool".to_string(),
            LumaType::Str => "Str".to_string(),
            LumaType::Unit => "Unit".to_string(),
            LumaType::Struct(idx) => structs[idx].name.resolve(table).to_string(),
            LumaType::Enum(name) => name.resolve(table).to_string(),
        }
    }
}

/// A binding exported or defined by a module compilation unit.
///
/// A symbol is uniquely identified within a unit by its binding name. The
/// binding name can differ from the link-time name: an aliased import of
/// `add` from `util` is bound as `util.add` but resolves to the object
/// symbol `add`.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: StringId,

    /// External linkage: visible to importers and present in the object's
    /// symbol table. The special name `main` is always external.
    pub public: bool,

    /// True for declarations created by the import machinery; imported
    /// symbols are never re-exported by a further import.
    pub imported: bool,

    pub kind: SymbolKind,
}

/// What a symbol is, with the backend handles needed to use it.
///
/// The element type of pointer-valued symbols is carried as a field of the
/// variant that has one rather than as a nullable field on every symbol.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    Function {
        id: FuncId,
        /// The full backend signature. Imports clone this wholesale, which
        /// is what preserves the calling convention and per-parameter
        /// purposes across module boundaries.
        signature: Signature,
        params: Vec<LumaType>,
        ret: LumaType,
    },

    Global {
        id: DataId,
        ty: LumaType,
        /// Pointee type for pointer-valued globals
        pointee: Option<Type>,
        writable: bool,
    },

    /// A compile-time integer constant (an enum member). Needs no backend
    /// declaration; qualified access folds it into an immediate.
    EnumConstant { value: i64 },
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: StringId,
    pub ty: LumaType,
    /// Pointee type when the field is pointer-valued
    pub pointee: Option<Type>,
    pub public: bool,
    /// Byte offset inside the struct; field order matches memory layout
    pub offset: u32,
}

/// Layout and visibility record for a user-defined struct.
///
/// The backend has no aggregate types; the explicit offsets here drive every
/// field address computation, so their order must match the declaration.
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: StringId,
    /// The module that declared the struct; private fields are only
    /// accessible from code generated for this module.
    pub module: StringId,
    pub fields: Vec<StructField>,
    pub size: u32,
    pub align: u32,
}

impl StructInfo {
    pub fn field(&self, name: StringId) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The session-owned lookup caches. Created empty, warmed once between the
/// link pass and the lower pass, read-only afterwards.
#[derive(Debug, Default)]
pub struct SessionCaches {
    /// (module name, binding name) -> (unit index, symbol index)
    pub symbols: FxHashMap<(StringId, StringId), (usize, usize)>,

    /// struct name -> index into the session struct list
    pub structs: FxHashMap<StringId, usize>,

    /// field name -> first struct (in registration order) declaring it
    pub field_to_struct: FxHashMap<StringId, usize>,

    warmed: bool,
}

impl SessionCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed
    }

    /// Populate every cache from the registry and struct list. Must run
    /// after all units are created and linked, before lowering begins.
    pub fn warm(&mut self, registry: &ModuleRegistry, structs: &[StructInfo]) {
        self.symbols.clear();
        self.structs.clear();
        self.field_to_struct.clear();

        for (unit_idx, unit) in registry.units().iter().enumerate() {
            for (sym_idx, symbol) in unit.symbols.iter().enumerate() {
                self.symbols
                    .insert((unit.name, symbol.name), (unit_idx, sym_idx));
            }
        }

        for (struct_idx, info) in structs.iter().enumerate() {
            self.structs.insert(info.name, struct_idx);
            for field in &info.fields {
                // first registered struct wins for the reverse index
                self.field_to_struct.entry(field.name).or_insert(struct_idx);
            }
        }

        self.warmed = true;
    }

    /// Record a symbol added after warm-up (lazily declared externals) so
    /// cache lookups keep agreeing with linear search.
    pub fn record_symbol(
        &mut self,
        module: StringId,
        name: StringId,
        unit_idx: usize,
        sym_idx: usize,
    ) {
        if self.warmed {
            self.symbols.insert((module, name), (unit_idx, sym_idx));
        }
    }
}

/// Resolve a checker type annotation to a language type. Struct lookups go
/// through the cache when it is warmed and fall back to a linear search of
/// the registration list before that; both paths agree by construction.
pub fn resolve_type_expr(
    ty: &TypeExpr,
    interner: &StringTable,
    structs: &[StructInfo],
    caches: &SessionCaches,
    enums: &FxHashSet<StringId>,
    location: ErrorLocation,
) -> Result<LumaType, CompileError> {
    match ty {
        TypeExpr::Int => Ok(LumaType::Int),
        TypeExpr::Float => Ok(LumaType::Float),
        TypeExpr::Bool => Ok(LumaType::Bool),
        TypeExpr::Str => Ok(LumaType::Str),
        TypeExpr::Named(name) => {
            let Some(id) = interner.get(name) else {
                return Err(CompileError::rule_error(
                    format!("Unknown type '{name}'"),
                    location,
                ));
            };

            let struct_hit = if caches.is_warmed() {
                caches.structs.get(&id).copied()
            } else {
                structs.iter().position(|s| s.name == id)
            };

            if let Some(idx) = struct_hit {
                return Ok(LumaType::Struct(idx));
            }
            if enums.contains(&id) {
                return Ok(LumaType::Enum(id));
            }

            Err(CompileError::rule_error(
                format!("Unknown type '{name}'"),
                location,
            ))
        }
    }
}

/// Exact lookup within one unit, by binding name.
pub fn find_symbol_in_module(
    registry: &ModuleRegistry,
    unit_idx: usize,
    name: StringId,
) -> Option<(usize, usize)> {
    registry.units()[unit_idx]
        .find_symbol(name)
        .map(|sym_idx| (unit_idx, sym_idx))
}

/// Global lookup: with a module given, delegate to the exact search; without
/// one, search the current unit first, then every other unit in registry
/// insertion order. Modules are never reordered for name resolution.
pub fn find_symbol_global(
    registry: &ModuleRegistry,
    caches: &SessionCaches,
    name: StringId,
    module: Option<StringId>,
) -> Option<(usize, usize)> {
    if let Some(module_name) = module {
        let unit_idx = registry.unit_index(module_name)?;
        if caches.is_warmed() {
            if let Some(&hit) = caches.symbols.get(&(module_name, name)) {
                return Some(hit);
            }
            return None;
        }
        return find_symbol_in_module(registry, unit_idx, name);
    }

    let current = registry.current_index();
    if let Some(hit) = find_symbol_in_module(registry, current, name) {
        return Some(hit);
    }

    for (unit_idx, unit) in registry.units().iter().enumerate() {
        if unit_idx == current {
            continue;
        }
        if let Some(sym_idx) = unit.find_symbol(name) {
            return Some((unit_idx, sym_idx));
        }
    }

    None
}
