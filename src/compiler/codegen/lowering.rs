//! The multi-pass lowering driver.
//!
//! Three deterministic passes over the program's modules:
//!
//! 1. **Create**: one compilation unit per module (duplicates are fatal),
//!    then a declaration scan: enums and structs first so types resolve
//!    across modules, then function signatures and globals. After this pass
//!    every unit's exportable surface is known.
//! 2. **Link**: every `use` directive mirrors the source unit's external
//!    symbols into the importing unit. Unknown modules are fatal;
//!    self-imports warn and are skipped.
//! 3. **Lower**: dependency records are built afresh and the scheduler
//!    walks them depth-first in program order, lowering each module's
//!    function bodies only after its dependencies are done.
//!
//! The symbol and struct caches are warmed between passes 2 and 3; lowering
//! relies on them for fast lookups.

use crate::compiler::ast::{
    EnumMember, Expression, FieldDef, ModuleNode, Param, Program, Statement, TypeExpr, UnaryOp,
};
use crate::compiler::codegen::dependencies::{build_dependency_records, schedule};
use crate::compiler::codegen::expressions::FunctionLowerer;
use crate::compiler::codegen::session::CodegenSession;
use crate::compiler::codegen::symbols::{LumaType, StructField, StructInfo, Symbol, SymbolKind};
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::compiler_warnings::CompilerWarning;
use crate::compiler::string_interning::StringId;
use crate::settings::MAIN_FUNCTION_NAME;
use crate::{ast_log, codegen_log, return_rule_error, return_type_error};
use cranelift_codegen::ir::{AbiParam, ArgumentPurpose, Function, Signature, UserFuncName, types};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{Linkage, Module};

/// Pass 1: create a compilation unit per module and scan declarations.
pub fn run_create_pass(
    session: &mut CodegenSession,
    program: &Program,
) -> Result<(), CompileError> {
    // unit creation, in program order
    for module in &program.modules {
        if module.name.is_empty() {
            return_rule_error!(ErrorLocation::default(), "Module names must not be empty");
        }

        ast_log!("creating unit for module '{}'", module.name);

        let name_id = session.interner.intern(&module.name);
        let isa = session.make_isa()?;
        let idx = session
            .registry
            .create_unit(name_id, &session.interner, isa)?;
        session.registry.set_current(idx);
    }

    // enums first so struct fields and signatures can name them
    for (idx, module) in program.modules.iter().enumerate() {
        session.registry.set_current(idx);
        for stmt in &module.body {
            if let Statement::Enum {
                name,
                public,
                members,
            } = stmt
            {
                register_enum(session, &module.name, name, *public, members)?;
            }
        }
    }

    for (idx, module) in program.modules.iter().enumerate() {
        session.registry.set_current(idx);
        for stmt in &module.body {
            if let Statement::Struct {
                name,
                public: _,
                fields,
            } = stmt
            {
                register_struct(session, &module.name, name, fields)?;
            }
        }
    }

    // function signatures and globals
    for (idx, module) in program.modules.iter().enumerate() {
        session.registry.set_current(idx);
        for stmt in &module.body {
            match stmt {
                Statement::Function {
                    name,
                    public,
                    params,
                    returns,
                    ..
                } => declare_function(session, &module.name, name, *public, params, returns)?,

                Statement::Global {
                    name,
                    public,
                    ty,
                    value,
                } => define_global(session, &module.name, name, *public, ty, value)?,

                _ => {}
            }
        }
    }

    Ok(())
}

/// Pass 2: resolve every `use` directive into external declarations.
pub fn run_link_pass(session: &mut CodegenSession, program: &Program) -> Result<(), CompileError> {
    for (idx, module) in program.modules.iter().enumerate() {
        session.registry.set_current(idx);

        for stmt in &module.body {
            let Statement::Use {
                module: target,
                alias,
            } = stmt
            else {
                continue;
            };

            let target_id = session.interner.intern(target);
            let Some(source_idx) = session.registry.unit_index(target_id) else {
                return_rule_error!(
                    ErrorLocation::in_module(&module.name),
                    "Module '{}' uses unknown module '{}'",
                    module.name,
                    target,
                );
            };

            if source_idx == idx {
                session
                    .warnings
                    .push(CompilerWarning::self_import(&module.name));
                continue;
            }

            let alias_id = alias.as_deref().map(|a| session.interner.intern(a));
            crate::compiler::codegen::imports::import_module_symbols(
                &mut session.registry,
                &mut session.interner,
                &mut session.caches,
                source_idx,
                alias_id,
            )?;
        }
    }

    Ok(())
}

/// Pass 3: lower every function body, dependencies first.
pub fn run_lower_pass(session: &mut CodegenSession, program: &Program) -> Result<(), CompileError> {
    debug_assert!(
        session.caches.is_warmed(),
        "caches must be warmed before lowering"
    );

    let mut records = build_dependency_records(program, &mut session.interner);

    schedule(&mut records, &mut |module_id| {
        let module = program
            .modules
            .iter()
            .find(|m| session.interner.get(&m.name) == Some(module_id))
            .expect("dependency records come from this program");

        lower_module(session, module_id, module)
    })
}

fn lower_module(
    session: &mut CodegenSession,
    module_id: StringId,
    module: &ModuleNode,
) -> Result<(), CompileError> {
    let idx = session
        .registry
        .unit_index(module_id)
        .expect("unit was created in pass 1");
    session.registry.set_current(idx);

    codegen_log!("lowering module '{}'", module.name);

    for stmt in &module.body {
        match stmt {
            Statement::Function {
                name,
                params,
                body,
                ..
            } => lower_function(session, module, name, params, body)?,

            // handled by earlier passes
            Statement::Use { .. }
            | Statement::Struct { .. }
            | Statement::Enum { .. }
            | Statement::Global { .. } => {}

            _ => {
                return_rule_error!(
                    ErrorLocation::in_module(&module.name),
                    "Only declarations are allowed at module scope"
                );
            }
        }
    }

    Ok(())
}

fn lower_function(
    session: &mut CodegenSession,
    module: &ModuleNode,
    name: &str,
    params: &[Param],
    body: &[Statement],
) -> Result<(), CompileError> {
    let unit_idx = session.registry.current_index();

    let name_id = session
        .interner
        .get(name)
        .expect("function was declared in pass 1");
    let sym_idx = session
        .registry
        .current()
        .find_symbol(name_id)
        .expect("function was declared in pass 1");

    let (func_id, signature, param_types, ret) =
        match &session.registry.current().symbols[sym_idx].kind {
            SymbolKind::Function {
                id,
                signature,
                params,
                ret,
            } => (*id, signature.clone(), params.clone(), *ret),
            _ => {
                return Err(CompileError::compiler_error(format!(
                    "'{name}' was not declared as a function"
                )));
            }
        };

    let is_main_fn = session.registry.current().is_main && name == MAIN_FUNCTION_NAME;

    let mut func =
        Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), signature);

    {
        let CodegenSession {
            registry,
            interner,
            caches,
            structs,
            enums,
            warnings,
            builder_ctx,
            pointer_type,
            ..
        } = session;

        let mut builder = FunctionBuilder::new(&mut func, builder_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let block_params = builder.block_params(entry).to_vec();

        let mut lowerer = FunctionLowerer::new(
            builder,
            registry,
            interner,
            caches,
            structs,
            enums,
            warnings,
            *pointer_type,
            module.name.clone(),
            name.to_owned(),
            ret,
            is_main_fn,
        );

        // a struct-returning function receives its return slot first
        let value_params = if matches!(ret, LumaType::Struct(_)) {
            lowerer.sret = Some(block_params[0]);
            &block_params[1..]
        } else {
            &block_params[..]
        };

        for ((param, &value), &ty) in params.iter().zip(value_params).zip(&param_types) {
            let param_id = lowerer.interner.intern(&param.name);
            lowerer.declare_local(param_id, ty, value);
        }

        let terminated = lowerer.lower_statements(body)?;
        if !terminated {
            lowerer.emit_default_return();
        }

        lowerer.finish();
    }

    // the backend verifier runs in debug builds only
    #[cfg(debug_assertions)]
    {
        use cranelift_codegen::verifier::verify_function;

        let isa = session.registry.unit(unit_idx).object.isa();
        verify_function(&func, isa).map_err(|errors| {
            CompileError::codegen_error(
                format!("Function '{name}' failed backend verification:\n{errors}"),
                ErrorLocation::in_item(&module.name, name),
            )
        })?;
    }

    session
        .registry
        .unit_mut(unit_idx)
        .pending_functions
        .push((func_id, func));

    Ok(())
}

// ----------------------------------
//        Declaration helpers
// ----------------------------------

fn register_enum(
    session: &mut CodegenSession,
    module_name: &str,
    name: &str,
    public: bool,
    members: &[EnumMember],
) -> Result<(), CompileError> {
    let name_id = session.interner.intern(name);

    if session.enums.contains(&name_id) || session.find_struct(name_id).is_some() {
        return_rule_error!(
            ErrorLocation::in_module(module_name),
            "Type '{}' is already defined",
            name,
        );
    }
    session.enums.insert(name_id);

    let mut next_value: i64 = 0;
    for member in members {
        let value = member.value.unwrap_or(next_value);
        next_value = value + 1;

        let member_id = session
            .interner
            .intern(&format!("{name}.{}", member.name));

        let unit = session.registry.current_mut();
        if unit.find_symbol(member_id).is_some() {
            return_rule_error!(
                ErrorLocation::in_module(module_name),
                "Enum member '{}::{}' is already defined",
                name,
                member.name,
            );
        }

        unit.add_symbol(Symbol {
            name: member_id,
            public,
            imported: false,
            kind: SymbolKind::EnumConstant { value },
        });
    }

    Ok(())
}

fn register_struct(
    session: &mut CodegenSession,
    module_name: &str,
    name: &str,
    fields: &[FieldDef],
) -> Result<(), CompileError> {
    let name_id = session.interner.intern(name);

    if session.enums.contains(&name_id) || session.find_struct(name_id).is_some() {
        return_rule_error!(
            ErrorLocation::in_module(module_name),
            "Type '{}' is already defined",
            name,
        );
    }

    let location = ErrorLocation::in_item(module_name, name);
    let pointer_bytes = session.pointer_type.bytes();

    let mut layout_fields: Vec<StructField> = Vec::with_capacity(fields.len());
    let mut offset: u32 = 0;
    let mut align: u32 = 1;

    for field in fields {
        let ty = session.resolve_type(&field.ty, location.clone())?;

        let (size, field_align) = match ty {
            LumaType::Int | LumaType::Enum(_) => (8, 8),
            LumaType::Float => (8, 8),
            LumaType::Bool => (1, 1),
            LumaType::Str => (pointer_bytes, pointer_bytes),
            LumaType::Struct(_) | LumaType::Unit => {
                return_type_error!(
                    location,
                    "Field '{}' of struct '{}' must have a scalar type",
                    field.name,
                    name,
                );
            }
        };

        offset = offset.next_multiple_of(field_align);
        align = align.max(field_align);

        layout_fields.push(StructField {
            name: session.interner.intern(&field.name),
            ty,
            pointee: ty.pointee(),
            public: field.public,
            offset,
        });

        offset += size;
    }

    let size = offset.next_multiple_of(align);
    let module_id = session.interner.intern(module_name);

    session.register_struct(StructInfo {
        name: name_id,
        module: module_id,
        fields: layout_fields,
        size,
        align,
    });

    Ok(())
}

fn declare_function(
    session: &mut CodegenSession,
    module_name: &str,
    name: &str,
    public: bool,
    params: &[Param],
    returns: &Option<TypeExpr>,
) -> Result<(), CompileError> {
    let location = ErrorLocation::in_item(module_name, name);

    let name_id = session.interner.intern(name);
    if session.registry.current().find_symbol(name_id).is_some() {
        return Err(CompileError::rule_error(
            format!("Symbol '{name}' is already defined in module '{module_name}'"),
            location,
        ));
    }

    let param_types: Vec<LumaType> = params
        .iter()
        .map(|p| session.resolve_type(&p.ty, location.clone()))
        .collect::<Result<_, _>>()?;

    let ret = match returns {
        Some(ty) => session.resolve_type(ty, location.clone())?,
        None => LumaType::Unit,
    };

    let is_entry = session.registry.current().is_main && name == MAIN_FUNCTION_NAME;
    let pointer_type = session.pointer_type;

    let unit = session.registry.current_mut();
    let mut sig: Signature = unit.object.make_signature();

    // struct returns go through a pointer parameter the caller provides;
    // the pointer travels back in the return value as well
    if matches!(ret, LumaType::Struct(_)) {
        sig.params
            .push(AbiParam::special(pointer_type, ArgumentPurpose::StructReturn));
        sig.returns
            .push(AbiParam::special(pointer_type, ArgumentPurpose::StructReturn));
    }

    for &ty in &param_types {
        sig.params.push(AbiParam::new(ty.backend_type(pointer_type)));
    }

    if is_entry {
        // the C runtime expects main to return an int
        sig.returns.push(AbiParam::new(types::I32));
    } else if !matches!(ret, LumaType::Unit | LumaType::Struct(_)) {
        sig.returns.push(AbiParam::new(ret.backend_type(pointer_type)));
    }

    // the name main always has external linkage
    let linkage = if public || name == MAIN_FUNCTION_NAME {
        Linkage::Export
    } else {
        Linkage::Local
    };

    let func_id = unit
        .object
        .declare_function(name, linkage, &sig)
        .map_err(|e| {
            CompileError::codegen_error(
                format!("Could not declare function '{name}': {e}"),
                location.clone(),
            )
        })?;

    unit.add_symbol(Symbol {
        name: name_id,
        public: public || name == MAIN_FUNCTION_NAME,
        imported: false,
        kind: SymbolKind::Function {
            id: func_id,
            signature: sig,
            params: param_types,
            ret,
        },
    });

    Ok(())
}

fn define_global(
    session: &mut CodegenSession,
    module_name: &str,
    name: &str,
    public: bool,
    ty: &TypeExpr,
    value: &Expression,
) -> Result<(), CompileError> {
    let location = ErrorLocation::in_item(module_name, name);

    let name_id = session.interner.intern(name);
    if session.registry.current().find_symbol(name_id).is_some() {
        return Err(CompileError::rule_error(
            format!("Symbol '{name}' is already defined in module '{module_name}'"),
            location,
        ));
    }

    let luma_ty = session.resolve_type(ty, location.clone())?;
    let bytes = fold_global_initialiser(value, luma_ty, &location)?;

    let linkage = if public { Linkage::Export } else { Linkage::Local };
    let align = bytes.len() as u64;

    let unit = session.registry.current_mut();
    let data_id = unit
        .object
        .declare_data(name, linkage, true, false)
        .map_err(|e| {
            CompileError::codegen_error(
                format!("Could not declare global '{name}': {e}"),
                location.clone(),
            )
        })?;

    let mut desc = cranelift_module::DataDescription::new();
    desc.define(bytes.into_boxed_slice());
    desc.set_align(align);
    unit.object.define_data(data_id, &desc).map_err(|e| {
        CompileError::codegen_error(
            format!("Could not define global '{name}': {e}"),
            location.clone(),
        )
    })?;

    unit.add_symbol(Symbol {
        name: name_id,
        public,
        imported: false,
        kind: SymbolKind::Global {
            id: data_id,
            ty: luma_ty,
            pointee: luma_ty.pointee(),
            writable: true,
        },
    });

    Ok(())
}

/// Global initialisers fold at compile time to numeric or boolean constants
fn fold_global_initialiser(
    value: &Expression,
    ty: LumaType,
    location: &ErrorLocation,
) -> Result<Vec<u8>, CompileError> {
    let mismatch = |found: &str| {
        CompileError::type_error(
            format!("Global initialiser does not match its declared type (found {found})"),
            location.clone(),
        )
    };

    match (value, ty) {
        (Expression::IntLiteral(v), LumaType::Int | LumaType::Enum(_)) => {
            Ok(v.to_le_bytes().to_vec())
        }
        (Expression::FloatLiteral(v), LumaType::Float) => Ok(v.to_le_bytes().to_vec()),
        (Expression::BoolLiteral(v), LumaType::Bool) => Ok(vec![*v as u8]),
        (
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            },
            _,
        ) => match (operand.as_ref(), ty) {
            (Expression::IntLiteral(v), LumaType::Int) => Ok((-v).to_le_bytes().to_vec()),
            (Expression::FloatLiteral(v), LumaType::Float) => Ok((-v).to_le_bytes().to_vec()),
            _ => Err(mismatch("a negated non-literal")),
        },
        (Expression::IntLiteral(_), _) => Err(mismatch("Int")),
        (Expression::FloatLiteral(_), _) => Err(mismatch("Float")),
        (Expression::BoolLiteral(_), _) => Err(mismatch("Bool")),
        _ => Err(CompileError::type_error(
            "Global initialisers must be integer, float or boolean constants",
            location.clone(),
        )),
    }
}
