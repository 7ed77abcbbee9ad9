//! The registry of module compilation units.
//!
//! One [`ModuleUnit`] exists per program module. Each unit owns its backend
//! module (the object file in the making), its symbol list, and its pending
//! function bodies. Units are created during the create pass, populated
//! during the lower pass, and consumed one by one during object emission.

use crate::compiler::codegen::symbols::Symbol;
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::string_interning::{StringId, StringTable};
use crate::settings::{MAIN_MODULE_NAME, MINIMUM_LIKELY_SYMBOLS};
use cranelift_codegen::ir::Function;
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_module::{FuncId, default_libcall_names};
use cranelift_object::{ObjectBuilder, ObjectModule};
use rustc_hash::FxHashMap;

/// A module compilation unit: the per-module container that owns a backend
/// module, its symbols and its metadata.
impl std::fmt::Debug for ModuleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleUnit")
            .field("name", &self.name)
            .field("symbols", &self.symbols)
            .field("pending_functions", &self.pending_functions.len())
            .finish_non_exhaustive()
    }
}

pub struct ModuleUnit {
    pub name: StringId,

    /// The backend module. Declarations and data land here during the
    /// create/link passes; function bodies are queued in `pending_functions`
    /// and compiled into the module by the (possibly parallel) emitter.
    pub object: ObjectModule,

    /// Symbols in insertion order; binding names are unique within a unit
    pub symbols: Vec<Symbol>,

    /// Lowered but not yet compiled function bodies, in definition order
    pub pending_functions: Vec<(FuncId, Function)>,

    /// Lazily declared libc imports (write, strlen, exit), by name
    pub libc_funcs: FxHashMap<String, FuncId>,

    pub is_main: bool,
}

impl ModuleUnit {
    /// Exact lookup by binding name, linear over insertion order
    pub fn find_symbol(&self, name: StringId) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> usize {
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }
}

/// Ordered collection of module compilation units.
///
/// Iteration order is creation order, which is program order; every lookup
/// that walks the registry does so deterministically.
#[derive(Default, Debug)]
pub struct ModuleRegistry {
    units: Vec<ModuleUnit>,
    current: usize,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry {
            units: Vec::new(),
            current: 0,
        }
    }

    /// Create a new unit with a fresh backend module for `name`.
    /// Fails if a unit with this name already exists.
    pub fn create_unit(
        &mut self,
        name: StringId,
        interner: &StringTable,
        isa: OwnedTargetIsa,
    ) -> Result<usize, CompileError> {
        let name_str = interner.resolve(name);

        if self.unit_index(name).is_some() {
            return Err(CompileError::rule_error(
                format!("Duplicate module name '{name_str}'"),
                ErrorLocation::in_module(name_str),
            ));
        }

        let builder = ObjectBuilder::new(isa, name_str.to_owned(), default_libcall_names())
            .map_err(|e| {
                CompileError::codegen_error(
                    format!("Could not create backend module for '{name_str}': {e}"),
                    ErrorLocation::in_module(name_str),
                )
            })?;

        let unit = ModuleUnit {
            name,
            object: ObjectModule::new(builder),
            symbols: Vec::with_capacity(MINIMUM_LIKELY_SYMBOLS),
            pending_functions: Vec::new(),
            libc_funcs: FxHashMap::default(),
            is_main: name_str == MAIN_MODULE_NAME,
        };

        self.units.push(unit);
        Ok(self.units.len() - 1)
    }

    /// Linear search by module name
    pub fn find_unit(&self, name: StringId) -> Option<&ModuleUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn unit_index(&self, name: StringId) -> Option<usize> {
        self.units.iter().position(|u| u.name == name)
    }

    /// Change which unit subsequent symbol insertions target
    pub fn set_current(&mut self, index: usize) {
        debug_assert!(index < self.units.len());
        self.current = index;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &ModuleUnit {
        &self.units[self.current]
    }

    pub fn current_mut(&mut self) -> &mut ModuleUnit {
        &mut self.units[self.current]
    }

    pub fn units(&self) -> &[ModuleUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut Vec<ModuleUnit> {
        &mut self.units
    }

    pub fn unit(&self, index: usize) -> &ModuleUnit {
        &self.units[index]
    }

    pub fn unit_mut(&mut self, index: usize) -> &mut ModuleUnit {
        &mut self.units[index]
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Hand the units over to the emitter, leaving the registry empty.
    /// Any cache entry into the registry is dead after this.
    pub fn take_units(&mut self) -> Vec<ModuleUnit> {
        self.current = 0;
        std::mem::take(&mut self.units)
    }
}
