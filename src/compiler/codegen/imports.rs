//! Cross-module symbol resolution and import machinery.
//!
//! Two jobs live here. `import_module_symbols` is the link-pass workhorse:
//! it mirrors every external symbol of a source unit into the current unit
//! as an external declaration, optionally under an alias. The `resolve_*`
//! family is the lowering-time path for qualified access (`A::B`,
//! `A::B::C`) and for unqualified names that turn out to live in another
//! module: externals are declared lazily on first use and recorded so a
//! second resolution returns the same declaration instead of minting a new
//! one.
//!
//! Importing a function clones its full backend signature, which is what
//! carries the calling convention and per-parameter purposes across the
//! module boundary.

use crate::compiler::codegen::module_registry::ModuleRegistry;
use crate::compiler::codegen::symbols::{
    SessionCaches, Symbol, SymbolKind, find_symbol_global, find_symbol_in_module,
};
use crate::compiler::compiler_errors::{CompileError, ErrorLocation, ErrorMetaDataKey};
use crate::compiler::string_interning::{StringId, StringTable};
use cranelift_module::{Linkage, Module, ModuleError};

/// Create external declarations in the current unit for every external
/// symbol of `source_idx`. Binding names are `alias.name` when an alias is
/// given, else `name`. Duplicate bindings are no-ops.
pub fn import_module_symbols(
    registry: &mut ModuleRegistry,
    interner: &mut StringTable,
    caches: &mut SessionCaches,
    source_idx: usize,
    alias: Option<StringId>,
) -> Result<(), CompileError> {
    let current_idx = registry.current_index();
    debug_assert_ne!(source_idx, current_idx, "self-imports are skipped upstream");

    // Snapshot the importable symbols so the borrow on the source unit ends
    // before we start declaring into the current unit.
    let importable: Vec<Symbol> = registry
        .unit(source_idx)
        .symbols
        .iter()
        .filter(|s| s.public && !s.imported)
        .cloned()
        .collect();

    for symbol in importable {
        let binding = match alias {
            Some(alias_id) => {
                let dotted = format!(
                    "{}.{}",
                    alias_id.resolve(interner),
                    symbol.name.resolve(interner)
                );
                interner.intern(&dotted)
            }
            None => symbol.name,
        };

        declare_external(registry, interner, caches, &symbol, binding)?;
    }

    Ok(())
}

/// Declare one external for `symbol` (defined in another unit) into the
/// current unit under `binding`. No-op when the binding already exists.
/// Returns the symbol's position in the current unit.
pub fn declare_external(
    registry: &mut ModuleRegistry,
    interner: &StringTable,
    caches: &mut SessionCaches,
    symbol: &Symbol,
    binding: StringId,
) -> Result<usize, CompileError> {
    let current_idx = registry.current_index();

    if let Some(existing) = registry.current().find_symbol(binding) {
        return Ok(existing);
    }

    let link_name = symbol.name.resolve(interner).to_owned();
    let module_name = registry.current().name;
    let unit = registry.current_mut();

    let kind = match &symbol.kind {
        SymbolKind::Function {
            signature,
            params,
            ret,
            ..
        } => {
            let func_id = unit
                .object
                .declare_function(&link_name, Linkage::Import, signature)
                .map_err(|e| import_error(&link_name, interner, module_name, e))?;

            SymbolKind::Function {
                id: func_id,
                signature: signature.clone(),
                params: params.clone(),
                ret: *ret,
            }
        }

        SymbolKind::Global {
            ty,
            pointee,
            writable,
            ..
        } => {
            let data_id = unit
                .object
                .declare_data(&link_name, Linkage::Import, *writable, false)
                .map_err(|e| import_error(&link_name, interner, module_name, e))?;

            SymbolKind::Global {
                id: data_id,
                ty: *ty,
                pointee: *pointee,
                writable: *writable,
            }
        }

        // Compile-time constants cross module boundaries by value
        SymbolKind::EnumConstant { value } => SymbolKind::EnumConstant { value: *value },
    };

    let sym_idx = unit.add_symbol(Symbol {
        name: binding,
        public: false,
        imported: true,
        kind,
    });

    caches.record_symbol(module_name, binding, current_idx, sym_idx);
    Ok(sym_idx)
}

/// Resolve a qualified access path (`A::B` or `A::B::C`) against the
/// registry, lazily importing into the current unit where needed.
/// Returns the (unit, symbol) position the caller should read.
pub fn resolve_qualified(
    registry: &mut ModuleRegistry,
    interner: &mut StringTable,
    caches: &mut SessionCaches,
    path: &[String],
    location: ErrorLocation,
) -> Result<(usize, usize), CompileError> {
    if path.len() < 2 || path.len() > 3 || path.iter().any(|s| s.is_empty()) {
        return Err(CompileError::rule_error(
            format!(
                "Malformed qualified access '{}'",
                path.join("::")
            ),
            location,
        ));
    }

    if path.len() == 3 {
        return resolve_chained(registry, interner, caches, path, location);
    }

    let qualified = path.join("::");
    let tail = interner.intern(&path[1]);
    let dotted = interner.intern(&format!("{}.{}", path[0], path[1]));

    let current_idx = registry.current_index();

    // Already bound in the current unit: a prior import, a prior lazy
    // resolution, or an enum member of this module (`Shade::Green` stores
    // as `Shade.Green`).
    if let Some((unit, index)) = find_symbol_in_module(registry, current_idx, dotted) {
        return Ok((unit, index));
    }

    // Search every other unit for the unqualified name, in registry order
    let found = registry
        .units()
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != current_idx)
        .find_map(|(idx, unit)| {
            unit.find_symbol(tail)
                .map(|sym_idx| (idx, unit.symbols[sym_idx].clone()))
        });

    let Some((_, symbol)) = found else {
        return Err(unresolved_error(&qualified, &path[1], location));
    };

    if !symbol.public {
        return Err(unresolved_error(&qualified, &path[1], location));
    }

    // Functions are recorded under both the bare and the qualified binding
    // so later unqualified uses and repeated qualified uses hit the same
    // declaration. Globals get the same treatment and resolve to a load at
    // the use site.
    declare_external(registry, interner, caches, &symbol, tail)?;
    let idx = declare_external(registry, interner, caches, &symbol, dotted)?;

    Ok((current_idx, idx))
}

/// `A::B::C`: the enum constant `B.C`, looked up inside module `A` first,
/// then across every unit.
fn resolve_chained(
    registry: &mut ModuleRegistry,
    interner: &mut StringTable,
    caches: &mut SessionCaches,
    path: &[String],
    location: ErrorLocation,
) -> Result<(usize, usize), CompileError> {
    let qualified = path.join("::");
    let unqualified = format!("{}::{}", path[1], path[2]);
    let dotted = interner.intern(&format!("{}.{}", path[1], path[2]));

    if let Some(module) = interner.get(&path[0]).and_then(|m| registry.unit_index(m)) {
        if let Some(hit) = lookup_constant(registry, caches, module, dotted) {
            return Ok(hit);
        }
    }

    for unit_idx in 0..registry.len() {
        if let Some(hit) = lookup_constant(registry, caches, unit_idx, dotted) {
            return Ok(hit);
        }
    }

    Err(unresolved_error(&qualified, &unqualified, location))
}

fn lookup_constant(
    registry: &ModuleRegistry,
    caches: &SessionCaches,
    unit_idx: usize,
    dotted: StringId,
) -> Option<(usize, usize)> {
    let unit = registry.unit(unit_idx);

    let sym_idx = if caches.is_warmed() {
        let (cached_unit, sym_idx) = *caches.symbols.get(&(unit.name, dotted))?;
        debug_assert_eq!(cached_unit, unit_idx);
        sym_idx
    } else {
        unit.find_symbol(dotted)?
    };

    let symbol = &unit.symbols[sym_idx];
    match symbol.kind {
        SymbolKind::EnumConstant { .. } if symbol.public || unit_idx == registry.current_index() => {
            Some((unit_idx, sym_idx))
        }
        _ => None,
    }
}

/// Unqualified name that is not bound in the current unit: search the other
/// units in registry order and import the first external match.
pub fn resolve_unqualified(
    registry: &mut ModuleRegistry,
    interner: &mut StringTable,
    caches: &mut SessionCaches,
    name: StringId,
    location: ErrorLocation,
) -> Result<(usize, usize), CompileError> {
    let current_idx = registry.current_index();

    match find_symbol_global(registry, caches, name, None) {
        Some((unit_idx, sym_idx)) if unit_idx == current_idx => Ok((unit_idx, sym_idx)),

        Some((unit_idx, sym_idx)) => {
            let symbol = registry.unit(unit_idx).symbols[sym_idx].clone();
            if !symbol.public {
                let name_str = name.resolve(interner);
                return Err(CompileError::rule_error(
                    format!("Symbol '{name_str}' is not defined in any module"),
                    location,
                )
                .with_metadata(ErrorMetaDataKey::SymbolName, name_str));
            }

            let idx = declare_external(registry, interner, caches, &symbol, name)?;
            Ok((current_idx, idx))
        }

        None => {
            let name_str = name.resolve(interner);
            Err(CompileError::rule_error(
                format!("Symbol '{name_str}' is not defined in any module"),
                location,
            )
            .with_metadata(ErrorMetaDataKey::SymbolName, name_str))
        }
    }
}

fn unresolved_error(qualified: &str, unqualified: &str, location: ErrorLocation) -> CompileError {
    CompileError::rule_error(
        format!(
            "Could not resolve '{qualified}': no symbol '{unqualified}' is visible in any module"
        ),
        location,
    )
    .with_metadata(ErrorMetaDataKey::QualifiedName, qualified)
    .with_metadata(ErrorMetaDataKey::SymbolName, unqualified)
}

fn import_error(
    name: &str,
    interner: &StringTable,
    module: StringId,
    err: ModuleError,
) -> CompileError {
    CompileError::codegen_error(
        format!("Could not declare external '{name}': {err}"),
        ErrorLocation::in_module(module.resolve(interner)),
    )
}
