//! Statement and expression lowering inside one function body.
//!
//! [`FunctionLowerer`] wraps a `cranelift_frontend::FunctionBuilder` together
//! with mutable access to the registry, the caches and the interner, because
//! lowering an expression can resolve names across module boundaries and
//! declare externals in the current unit on the way.
//!
//! Block discipline: blocks are created as control flow needs them, filled in
//! any order, and sealed all at once before finalising. A statement reports
//! whether it terminated the current block so dead merge blocks are never
//! created.

use crate::compiler::ast::{
    BinaryOp, Expression, Statement, SwitchCase, TypeExpr, UnaryOp,
};
use crate::compiler::builtins::{self, BuiltinDef};
use crate::compiler::codegen::imports;
use crate::compiler::codegen::module_registry::ModuleRegistry;
use crate::compiler::codegen::string_escapes;
use crate::compiler::codegen::symbols::{
    LumaType, SessionCaches, StructInfo, SymbolKind, resolve_type_expr,
};
use crate::compiler::compiler_errors::{CompileError, ErrorLocation};
use crate::compiler::compiler_warnings::CompilerWarning;
use crate::compiler::string_interning::{StringId, StringTable};
use crate::{return_rule_error, return_type_error};
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    AbiParam, Block, InstBuilder, MemFlags, Signature, StackSlotData, StackSlotKind, Type, Value,
    types,
};
use cranelift_frontend::{FunctionBuilder, Switch, Variable};
use cranelift_module::{DataDescription, FuncId, Linkage, Module};
use rustc_hash::{FxHashMap, FxHashSet};

/// A backend value tagged with its language type
#[derive(Clone, Copy, Debug)]
pub struct TypedValue {
    pub value: Value,
    pub ty: LumaType,
}

#[derive(Clone, Copy)]
struct LocalVar {
    var: Variable,
    ty: LumaType,
}

/// Break and continue targets of the innermost loop
struct LoopTargets {
    continue_block: Block,
    exit_block: Block,
}

pub struct FunctionLowerer<'a, 'b> {
    pub builder: FunctionBuilder<'b>,
    pub registry: &'a mut ModuleRegistry,
    pub interner: &'a mut StringTable,
    pub caches: &'a mut SessionCaches,
    pub structs: &'a [StructInfo],
    pub enums: &'a FxHashSet<StringId>,
    pub warnings: &'a mut Vec<CompilerWarning>,
    pub pointer_type: Type,

    pub module_name: String,
    pub function_name: String,

    /// Declared return type of the function being lowered
    pub ret: LumaType,

    /// The struct-return pointer parameter, when the function returns a struct
    pub sret: Option<Value>,

    /// True for `main` in the main module: declared as returning i32 for the
    /// C runtime regardless of its Luma return type
    pub is_main_fn: bool,

    vars: FxHashMap<StringId, LocalVar>,
    next_var: u32,
    loop_stack: Vec<LoopTargets>,
}

impl<'a, 'b> FunctionLowerer<'a, 'b> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        builder: FunctionBuilder<'b>,
        registry: &'a mut ModuleRegistry,
        interner: &'a mut StringTable,
        caches: &'a mut SessionCaches,
        structs: &'a [StructInfo],
        enums: &'a FxHashSet<StringId>,
        warnings: &'a mut Vec<CompilerWarning>,
        pointer_type: Type,
        module_name: String,
        function_name: String,
        ret: LumaType,
        is_main_fn: bool,
    ) -> Self {
        FunctionLowerer {
            builder,
            registry,
            interner,
            caches,
            structs,
            enums,
            warnings,
            pointer_type,
            module_name,
            function_name,
            ret,
            sret: None,
            is_main_fn,
            vars: FxHashMap::default(),
            next_var: 0,
            loop_stack: Vec::new(),
        }
    }

    fn loc(&self) -> ErrorLocation {
        ErrorLocation::in_item(&self.module_name, &self.function_name)
    }

    /// Seal and finalise the function once every statement is lowered
    pub fn finish(mut self) {
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    /// Bind a function parameter or local to a fresh backend variable
    pub fn declare_local(&mut self, name: StringId, ty: LumaType, value: Value) {
        let var = Variable::from_u32(self.next_var);
        self.next_var += 1;

        self.builder.declare_var(var, ty.backend_type(self.pointer_type));
        self.builder.def_var(var, value);
        self.vars.insert(name, LocalVar { var, ty });
    }

    /// Lower a statement list. Returns true when the list terminated the
    /// current block (return, break, continue, or all branches terminated).
    pub fn lower_statements(&mut self, statements: &[Statement]) -> Result<bool, CompileError> {
        for statement in statements {
            if self.lower_statement(statement)? {
                // anything after a terminator is unreachable; the checker
                // upstream rejects it, so we simply stop here
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn lower_statement(&mut self, statement: &Statement) -> Result<bool, CompileError> {
        match statement {
            Statement::Let { name, ty, value } => {
                let value = self.lower_expression(value)?;

                if let Some(annotation) = ty {
                    let expected = self.resolve_type(annotation)?;
                    self.check_types(expected, value.ty, "variable declaration")?;
                }

                let name_id = self.interner.intern(name);
                self.declare_local(name_id, value.ty, value.value);
                Ok(false)
            }

            Statement::Assign { target, value } => {
                self.lower_assignment(target, value)?;
                Ok(false)
            }

            Statement::Return { value } => {
                self.lower_return(value.as_ref())?;
                Ok(true)
            }

            Statement::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, then_body, else_body),

            Statement::While { condition, body } => {
                self.lower_while(condition, body)?;
                Ok(false)
            }

            Statement::Switch {
                scrutinee,
                cases,
                default,
            } => self.lower_switch(scrutinee, cases, default),

            Statement::Break => {
                let Some(targets) = self.loop_stack.last() else {
                    return_rule_error!(self.loc(), "'break' outside of a loop");
                };
                let exit = targets.exit_block;
                self.builder.ins().jump(exit, &[]);
                Ok(true)
            }

            Statement::Continue => {
                let Some(targets) = self.loop_stack.last() else {
                    return_rule_error!(self.loc(), "'continue' outside of a loop");
                };
                let header = targets.continue_block;
                self.builder.ins().jump(header, &[]);
                Ok(true)
            }

            Statement::Expr(expr) => {
                self.lower_expression(expr)?;
                Ok(false)
            }

            // Declarations do not appear inside function bodies
            Statement::Use { .. }
            | Statement::Function { .. }
            | Statement::Struct { .. }
            | Statement::Enum { .. }
            | Statement::Global { .. } => {
                return_rule_error!(self.loc(), "Declarations are not allowed inside function bodies");
            }
        }
    }

    fn lower_if(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: &[Statement],
    ) -> Result<bool, CompileError> {
        let cond = self.lower_expression(condition)?;
        self.check_types(LumaType::Bool, cond.ty, "if condition")?;

        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();

        self.builder
            .ins()
            .brif(cond.value, then_block, &[], else_block, &[]);

        let mut open_ends: Vec<Block> = Vec::new();

        self.builder.switch_to_block(then_block);
        if !self.lower_statements(then_body)? {
            open_ends.push(self.builder.current_block().unwrap());
        }

        self.builder.switch_to_block(else_block);
        if !self.lower_statements(else_body)? {
            open_ends.push(self.builder.current_block().unwrap());
        }

        self.join_open_ends(open_ends)
    }

    fn lower_while(
        &mut self,
        condition: &Expression,
        body: &[Statement],
    ) -> Result<(), CompileError> {
        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(header, &[]);

        self.builder.switch_to_block(header);
        let cond = self.lower_expression(condition)?;
        self.check_types(LumaType::Bool, cond.ty, "while condition")?;
        self.builder
            .ins()
            .brif(cond.value, body_block, &[], exit, &[]);

        self.builder.switch_to_block(body_block);
        self.loop_stack.push(LoopTargets {
            continue_block: header,
            exit_block: exit,
        });
        let terminated = self.lower_statements(body)?;
        self.loop_stack.pop();

        if !terminated {
            self.builder.ins().jump(header, &[]);
        }

        self.builder.switch_to_block(exit);
        Ok(())
    }

    fn lower_switch(
        &mut self,
        scrutinee: &Expression,
        cases: &[SwitchCase],
        default: &[Statement],
    ) -> Result<bool, CompileError> {
        let value = self.lower_expression(scrutinee)?;
        if !value.ty.is_integer() {
            return_type_error!(
                self.loc(),
                "Switch scrutinee must be an integer, found {}",
                self.describe(value.ty),
            );
        }

        let default_block = self.builder.create_block();
        let mut switch = Switch::new();
        let mut seen: FxHashSet<i64> = FxHashSet::default();
        let mut case_blocks: Vec<Block> = Vec::with_capacity(cases.len());

        for case in cases {
            let label = self.fold_case_label(&case.label)?;
            if !seen.insert(label) {
                return Err(CompileError::type_error(
                    format!("Duplicate switch case {label}"),
                    self.loc(),
                ));
            }
            let block = self.builder.create_block();
            switch.set_entry(label as u64 as u128, block);
            case_blocks.push(block);
        }

        switch.emit(&mut self.builder, value.value, default_block);

        let mut open_ends: Vec<Block> = Vec::new();

        for (case, block) in cases.iter().zip(case_blocks) {
            self.builder.switch_to_block(block);
            if !self.lower_statements(&case.body)? {
                open_ends.push(self.builder.current_block().unwrap());
            }
        }

        self.builder.switch_to_block(default_block);
        if !self.lower_statements(default)? {
            open_ends.push(self.builder.current_block().unwrap());
        }

        self.join_open_ends(open_ends)
    }

    /// Join every unterminated branch into a fresh merge block. When no
    /// branch falls through, no merge block is created and the statement
    /// itself terminates.
    fn join_open_ends(&mut self, open_ends: Vec<Block>) -> Result<bool, CompileError> {
        if open_ends.is_empty() {
            return Ok(true);
        }

        let merge = self.builder.create_block();
        for block in open_ends {
            self.builder.switch_to_block(block);
            self.builder.ins().jump(merge, &[]);
        }
        self.builder.switch_to_block(merge);
        Ok(false)
    }

    /// Case labels fold at compile time: integer literals, negated integer
    /// literals, or qualified enum member access.
    fn fold_case_label(&mut self, label: &Expression) -> Result<i64, CompileError> {
        match label {
            Expression::IntLiteral(v) => Ok(*v),
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match operand.as_ref() {
                Expression::IntLiteral(v) => Ok(-v),
                _ => Err(self.bad_case_label()),
            },
            Expression::QualifiedAccess { path } => {
                let location = self.loc();
                let (unit, index) = imports::resolve_qualified(
                    self.registry,
                    self.interner,
                    self.caches,
                    path,
                    location,
                )?;
                match self.registry.unit(unit).symbols[index].kind {
                    SymbolKind::EnumConstant { value } => Ok(value),
                    _ => Err(self.bad_case_label()),
                }
            }
            _ => Err(self.bad_case_label()),
        }
    }

    fn bad_case_label(&self) -> CompileError {
        CompileError::type_error(
            "Switch case labels must be integer constants or enum members",
            self.loc(),
        )
    }

    fn lower_return(&mut self, value: Option<&Expression>) -> Result<(), CompileError> {
        // main is declared as returning i32 for the C runtime
        if self.is_main_fn {
            let status = match value {
                Some(expr) => {
                    let v = self.lower_expression(expr)?;
                    self.check_types(LumaType::Int, v.ty, "return value of main")?;
                    self.builder.ins().ireduce(types::I32, v.value)
                }
                None => self.builder.ins().iconst(types::I32, 0),
            };
            self.builder.ins().return_(&[status]);
            return Ok(());
        }

        match (self.ret, value) {
            (LumaType::Unit, None) => {
                self.builder.ins().return_(&[]);
            }
            (LumaType::Unit, Some(_)) => {
                return Err(CompileError::type_error(
                    "This function does not return a value",
                    self.loc(),
                ));
            }
            (LumaType::Struct(idx), Some(expr)) => {
                let v = self.lower_expression(expr)?;
                self.check_types(LumaType::Struct(idx), v.ty, "return value")?;

                // copy into the caller-provided struct-return slot
                let sret = self.sret.expect("struct-returning function without sret");
                let size = self.structs[idx].size;
                let align = self.structs[idx].align as u8;
                let config = self.registry.current().object.isa().frontend_config();
                self.builder.emit_small_memory_copy(
                    config,
                    sret,
                    v.value,
                    size as u64,
                    align,
                    align,
                    true,
                    MemFlags::trusted(),
                );
                self.builder.ins().return_(&[sret]);
            }
            (LumaType::Struct(_), None) => {
                return Err(CompileError::type_error(
                    "This function must return a value",
                    self.loc(),
                ));
            }
            (expected, Some(expr)) => {
                let v = self.lower_expression(expr)?;
                self.check_types(expected, v.ty, "return value")?;
                self.builder.ins().return_(&[v.value]);
            }
            (_, None) => {
                return Err(CompileError::type_error(
                    "This function must return a value",
                    self.loc(),
                ));
            }
        }

        Ok(())
    }

    /// Fill the current block when control can fall off the end of the body
    pub fn emit_default_return(&mut self) {
        if self.is_main_fn {
            let zero = self.builder.ins().iconst(types::I32, 0);
            self.builder.ins().return_(&[zero]);
            return;
        }

        match self.ret {
            LumaType::Unit => {
                self.builder.ins().return_(&[]);
            }
            LumaType::Int | LumaType::Enum(_) => {
                let zero = self.builder.ins().iconst(types::I64, 0);
                self.builder.ins().return_(&[zero]);
            }
            LumaType::Float => {
                let zero = self.builder.ins().f64const(0.0);
                self.builder.ins().return_(&[zero]);
            }
            LumaType::Bool => {
                let zero = self.builder.ins().iconst(types::I8, 0);
                self.builder.ins().return_(&[zero]);
            }
            LumaType::Str => {
                let null = self.builder.ins().iconst(self.pointer_type, 0);
                self.builder.ins().return_(&[null]);
            }
            LumaType::Struct(_) => {
                let sret = self.sret.expect("struct-returning function without sret");
                self.builder.ins().return_(&[sret]);
            }
        }
    }

    // ----------------------------------
    //           Assignments
    // ----------------------------------

    fn lower_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), CompileError> {
        match target {
            Expression::Variable(name) => {
                let name_id = self.interner.intern(name);

                if let Some(local) = self.vars.get(&name_id).copied() {
                    let v = self.lower_expression(value)?;
                    self.check_types(local.ty, v.ty, "assignment")?;
                    self.builder.def_var(local.var, v.value);
                    return Ok(());
                }

                self.assign_global(name_id, name, value)
            }

            Expression::FieldAccess { base, field } => {
                let base_value = self.lower_expression(base)?;
                let field_id = self.interner.intern(field);
                let (field_ty, offset) = self.struct_field(base_value.ty, field_id, field)?;

                let v = self.lower_expression(value)?;
                self.check_types(field_ty, v.ty, "field assignment")?;
                self.builder.ins().store(
                    MemFlags::trusted(),
                    v.value,
                    base_value.value,
                    offset as i32,
                );
                Ok(())
            }

            _ => Err(CompileError::type_error(
                "Invalid assignment target",
                self.loc(),
            )),
        }
    }

    fn assign_global(
        &mut self,
        name_id: StringId,
        name: &str,
        value: &Expression,
    ) -> Result<(), CompileError> {
        let location = self.loc();
        let (unit_idx, sym_idx) = imports::resolve_unqualified(
            self.registry,
            self.interner,
            self.caches,
            name_id,
            location,
        )?;

        let (data_id, ty) = match self.registry.unit(unit_idx).symbols[sym_idx].kind {
            SymbolKind::Global {
                id, ty, writable, ..
            } => {
                if !writable {
                    return Err(CompileError::type_error(
                        format!("'{name}' is not assignable"),
                        self.loc(),
                    ));
                }
                (id, ty)
            }
            SymbolKind::Function { .. } => {
                return Err(CompileError::type_error(
                    format!("Cannot assign to function '{name}'"),
                    self.loc(),
                ));
            }
            SymbolKind::EnumConstant { .. } => {
                return Err(CompileError::type_error(
                    format!("Cannot assign to enum member '{name}'"),
                    self.loc(),
                ));
            }
        };

        let v = self.lower_expression(value)?;
        self.check_types(ty, v.ty, "assignment")?;

        let addr = self.global_address(data_id);
        self.builder
            .ins()
            .store(MemFlags::trusted(), v.value, addr, 0);
        Ok(())
    }

    // ----------------------------------
    //           Expressions
    // ----------------------------------

    pub fn lower_expression(&mut self, expr: &Expression) -> Result<TypedValue, CompileError> {
        match expr {
            Expression::IntLiteral(v) => {
                let value = self.builder.ins().iconst(types::I64, *v);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Int,
                })
            }

            Expression::FloatLiteral(v) => {
                let value = self.builder.ins().f64const(*v);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Float,
                })
            }

            Expression::BoolLiteral(v) => {
                let value = self.builder.ins().iconst(types::I8, *v as i64);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Bool,
                })
            }

            Expression::StringLiteral(text) => self.lower_string_literal(text),

            Expression::Variable(name) => self.lower_variable(name),

            Expression::Unary { op, operand } => self.lower_unary(*op, operand),

            Expression::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),

            Expression::Call { callee, args } => self.lower_call(callee, args),

            Expression::QualifiedCall { path, args } => self.lower_qualified_call(path, args),

            Expression::QualifiedAccess { path } => self.lower_qualified_access(path),

            Expression::FieldAccess { base, field } => self.lower_field_access(base, field),

            Expression::StructLiteral { name, fields } => self.lower_struct_literal(name, fields),
        }
    }

    fn lower_string_literal(&mut self, text: &str) -> Result<TypedValue, CompileError> {
        let decoded = string_escapes::decode(text);
        for c in decoded.unknown_escapes {
            self.warnings
                .push(CompilerWarning::unknown_escape(&self.module_name, c));
        }

        let mut bytes = decoded.bytes;
        bytes.push(0);

        let unit = self.registry.current_mut();
        let data_id = unit
            .object
            .declare_anonymous_data(false, false)
            .map_err(|e| {
                CompileError::codegen_error(
                    format!("Could not declare string data: {e}"),
                    ErrorLocation::in_module(&self.module_name),
                )
            })?;

        let mut desc = DataDescription::new();
        desc.define(bytes.into_boxed_slice());
        desc.set_align(1);
        unit.object.define_data(data_id, &desc).map_err(|e| {
            CompileError::codegen_error(
                format!("Could not define string data: {e}"),
                ErrorLocation::in_module(&self.module_name),
            )
        })?;

        let gv = unit.object.declare_data_in_func(data_id, self.builder.func);
        let value = self.builder.ins().symbol_value(self.pointer_type, gv);

        Ok(TypedValue {
            value,
            ty: LumaType::Str,
        })
    }

    fn lower_variable(&mut self, name: &str) -> Result<TypedValue, CompileError> {
        let name_id = self.interner.intern(name);

        if let Some(local) = self.vars.get(&name_id).copied() {
            let value = self.builder.use_var(local.var);
            return Ok(TypedValue {
                value,
                ty: local.ty,
            });
        }

        let location = self.loc();
        let (unit_idx, sym_idx) = imports::resolve_unqualified(
            self.registry,
            self.interner,
            self.caches,
            name_id,
            location,
        )?;

        match self.registry.unit(unit_idx).symbols[sym_idx].kind {
            SymbolKind::Global { id, ty, .. } => Ok(self.load_global(id, ty)),
            SymbolKind::EnumConstant { value } => {
                let value = self.builder.ins().iconst(types::I64, value);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Int,
                })
            }
            SymbolKind::Function { .. } => Err(CompileError::type_error(
                format!("Function '{name}' used as a value"),
                self.loc(),
            )),
        }
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expression,
    ) -> Result<TypedValue, CompileError> {
        let v = self.lower_expression(operand)?;

        match (op, v.ty) {
            (UnaryOp::Neg, LumaType::Int) | (UnaryOp::Neg, LumaType::Enum(_)) => {
                let value = self.builder.ins().ineg(v.value);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Int,
                })
            }
            (UnaryOp::Neg, LumaType::Float) => {
                let value = self.builder.ins().fneg(v.value);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Float,
                })
            }
            (UnaryOp::Not, LumaType::Bool) => {
                let value = self.builder.ins().bxor_imm(v.value, 1);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Bool,
                })
            }
            _ => Err(CompileError::type_error(
                format!("Invalid operand type {} for unary operator", self.describe(v.ty)),
                self.loc(),
            )),
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<TypedValue, CompileError> {
        let l = self.lower_expression(lhs)?;
        let r = self.lower_expression(rhs)?;

        let both_int = l.ty.is_integer() && r.ty.is_integer();
        let both_float = l.ty == LumaType::Float && r.ty == LumaType::Float;
        let both_bool = l.ty == LumaType::Bool && r.ty == LumaType::Bool;

        let (value, ty) = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                if both_int {
                    let value = match op {
                        BinaryOp::Add => self.builder.ins().iadd(l.value, r.value),
                        BinaryOp::Sub => self.builder.ins().isub(l.value, r.value),
                        BinaryOp::Mul => self.builder.ins().imul(l.value, r.value),
                        BinaryOp::Div => self.builder.ins().sdiv(l.value, r.value),
                        BinaryOp::Rem => self.builder.ins().srem(l.value, r.value),
                        _ => unreachable!(),
                    };
                    (value, LumaType::Int)
                } else if both_float && op != BinaryOp::Rem {
                    let value = match op {
                        BinaryOp::Add => self.builder.ins().fadd(l.value, r.value),
                        BinaryOp::Sub => self.builder.ins().fsub(l.value, r.value),
                        BinaryOp::Mul => self.builder.ins().fmul(l.value, r.value),
                        BinaryOp::Div => self.builder.ins().fdiv(l.value, r.value),
                        _ => unreachable!(),
                    };
                    (value, LumaType::Float)
                } else {
                    return Err(self.binary_type_error(l.ty, r.ty));
                }
            }

            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt
            | BinaryOp::Ge => {
                if both_int || both_bool {
                    let cc = match op {
                        BinaryOp::Eq => IntCC::Equal,
                        BinaryOp::Ne => IntCC::NotEqual,
                        BinaryOp::Lt => IntCC::SignedLessThan,
                        BinaryOp::Le => IntCC::SignedLessThanOrEqual,
                        BinaryOp::Gt => IntCC::SignedGreaterThan,
                        BinaryOp::Ge => IntCC::SignedGreaterThanOrEqual,
                        _ => unreachable!(),
                    };
                    let value = self.builder.ins().icmp(cc, l.value, r.value);
                    (value, LumaType::Bool)
                } else if both_float {
                    let cc = match op {
                        BinaryOp::Eq => FloatCC::Equal,
                        BinaryOp::Ne => FloatCC::NotEqual,
                        BinaryOp::Lt => FloatCC::LessThan,
                        BinaryOp::Le => FloatCC::LessThanOrEqual,
                        BinaryOp::Gt => FloatCC::GreaterThan,
                        BinaryOp::Ge => FloatCC::GreaterThanOrEqual,
                        _ => unreachable!(),
                    };
                    let value = self.builder.ins().fcmp(cc, l.value, r.value);
                    (value, LumaType::Bool)
                } else {
                    return Err(self.binary_type_error(l.ty, r.ty));
                }
            }

            BinaryOp::And | BinaryOp::Or => {
                if both_bool {
                    let value = match op {
                        BinaryOp::And => self.builder.ins().band(l.value, r.value),
                        BinaryOp::Or => self.builder.ins().bor(l.value, r.value),
                        _ => unreachable!(),
                    };
                    (value, LumaType::Bool)
                } else {
                    return Err(self.binary_type_error(l.ty, r.ty));
                }
            }
        };

        Ok(TypedValue { value, ty })
    }

    fn binary_type_error(&self, lhs: LumaType, rhs: LumaType) -> CompileError {
        CompileError::type_error(
            format!(
                "Invalid operand types {} and {} for binary operator",
                self.describe(lhs),
                self.describe(rhs)
            ),
            self.loc(),
        )
    }

    // ----------------------------------
    //         Calls and builtins
    // ----------------------------------

    fn lower_call(
        &mut self,
        callee: &str,
        args: &[Expression],
    ) -> Result<TypedValue, CompileError> {
        let callee_id = self.interner.intern(callee);

        // a symbol in the current unit wins over a builtin of the same name
        if let Some(sym_idx) = self.registry.current().find_symbol(callee_id) {
            let current = self.registry.current_index();
            return self.call_symbol(current, sym_idx, callee, args);
        }

        if let Some(builtin) = builtins::lookup(callee) {
            return self.lower_builtin_call(builtin, args);
        }

        let location = self.loc();
        let (unit_idx, sym_idx) = imports::resolve_unqualified(
            self.registry,
            self.interner,
            self.caches,
            callee_id,
            location,
        )?;
        self.call_symbol(unit_idx, sym_idx, callee, args)
    }

    fn lower_qualified_call(
        &mut self,
        path: &[String],
        args: &[Expression],
    ) -> Result<TypedValue, CompileError> {
        let location = self.loc();
        let (unit_idx, sym_idx) = imports::resolve_qualified(
            self.registry,
            self.interner,
            self.caches,
            path,
            location,
        )?;

        let name = Expression::qualified_name(path);
        self.call_symbol(unit_idx, sym_idx, &name, args)
    }

    fn lower_qualified_access(&mut self, path: &[String]) -> Result<TypedValue, CompileError> {
        let location = self.loc();
        let (unit_idx, sym_idx) = imports::resolve_qualified(
            self.registry,
            self.interner,
            self.caches,
            path,
            location,
        )?;

        match self.registry.unit(unit_idx).symbols[sym_idx].kind.clone() {
            SymbolKind::EnumConstant { value } => {
                let value = self.builder.ins().iconst(types::I64, value);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Int,
                })
            }
            SymbolKind::Global { id, ty, .. } => Ok(self.load_global(id, ty)),
            SymbolKind::Function { id, .. } => {
                // the value of a function is its address
                let unit = self.registry.current_mut();
                let func_ref = unit.object.declare_func_in_func(id, self.builder.func);
                let value = self.builder.ins().func_addr(self.pointer_type, func_ref);
                Ok(TypedValue {
                    value,
                    ty: LumaType::Int,
                })
            }
        }
    }

    /// Shared call path for unqualified and qualified calls. The symbol must
    /// already be declared in (or imported into) the current unit, except for
    /// enum constants which cannot be called at all.
    fn call_symbol(
        &mut self,
        unit_idx: usize,
        sym_idx: usize,
        display_name: &str,
        args: &[Expression],
    ) -> Result<TypedValue, CompileError> {
        let (func_id, params, ret) =
            match &self.registry.unit(unit_idx).symbols[sym_idx].kind {
                SymbolKind::Function {
                    id, params, ret, ..
                } => (*id, params.clone(), *ret),
                _ => {
                    return Err(CompileError::type_error(
                        format!("'{display_name}' is not a function"),
                        self.loc(),
                    ));
                }
            };

        if args.len() != params.len() {
            return Err(CompileError::type_error(
                format!(
                    "'{display_name}' takes {} argument(s), {} given",
                    params.len(),
                    args.len()
                ),
                self.loc(),
            ));
        }

        let mut arg_values: Vec<Value> = Vec::with_capacity(args.len() + 1);

        // struct returns go through a caller-allocated slot passed first
        let sret_slot = if let LumaType::Struct(struct_idx) = ret {
            let info = &self.structs[struct_idx];
            let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
                StackSlotKind::ExplicitSlot,
                info.size,
                info.align.trailing_zeros() as u8,
            ));
            let addr = self.builder.ins().stack_addr(self.pointer_type, slot, 0);
            arg_values.push(addr);
            Some(addr)
        } else {
            None
        };

        for (arg, &param_ty) in args.iter().zip(&params) {
            let v = self.lower_expression(arg)?;
            self.check_types(param_ty, v.ty, "call argument")?;
            arg_values.push(v.value);
        }

        let unit = self.registry.current_mut();
        let func_ref = unit
            .object
            .declare_func_in_func(func_id, self.builder.func);
        let call = self.builder.ins().call(func_ref, &arg_values);
        let first_result = self.builder.inst_results(call).first().copied();

        let value = match ret {
            // give unit a harmless placeholder value
            LumaType::Unit => self.builder.ins().iconst(types::I8, 0),
            // the callee returns the sret pointer it was given
            LumaType::Struct(_) => {
                first_result.unwrap_or_else(|| sret_slot.expect("sret slot must exist"))
            }
            _ => first_result.expect("non-unit function call must produce a result"),
        };

        Ok(TypedValue { value, ty: ret })
    }

    fn lower_builtin_call(
        &mut self,
        builtin: &'static BuiltinDef,
        args: &[Expression],
    ) -> Result<TypedValue, CompileError> {
        if args.len() != builtin.parameters.len() {
            return Err(CompileError::type_error(
                format!(
                    "'{}' takes {} argument(s), {} given",
                    builtin.name,
                    builtin.parameters.len(),
                    args.len()
                ),
                self.loc(),
            ));
        }

        let mut values: Vec<TypedValue> = Vec::with_capacity(args.len());
        for (arg, &param_ty) in args.iter().zip(builtin.parameters) {
            let mut v = self.lower_expression(arg)?;

            // floats passed to integer parameters coerce with a warning
            if param_ty == LumaType::Int && v.ty == LumaType::Float {
                self.warnings.push(CompilerWarning::float_coercion(
                    &self.module_name,
                    builtin.name,
                ));
                v = TypedValue {
                    value: self.builder.ins().fcvt_to_sint(types::I64, v.value),
                    ty: LumaType::Int,
                };
            }

            self.check_types(param_ty, v.ty, "builtin argument")?;
            values.push(v);
        }

        match builtin.name {
            "output" => {
                let string_ptr = values[0].value;

                let strlen = self.declare_libc("strlen")?;
                let write = self.declare_libc("write")?;

                let unit = self.registry.current_mut();
                let strlen_ref = unit.object.declare_func_in_func(strlen, self.builder.func);
                let len_call = self.builder.ins().call(strlen_ref, &[string_ptr]);
                let len = self.builder.inst_results(len_call)[0];

                let stdout_fd = self.builder.ins().iconst(types::I32, 1);
                let unit = self.registry.current_mut();
                let write_ref = unit.object.declare_func_in_func(write, self.builder.func);
                self.builder
                    .ins()
                    .call(write_ref, &[stdout_fd, string_ptr, len]);
            }
            "exit" => {
                let status = self.builder.ins().ireduce(types::I32, values[0].value);
                let exit = self.declare_libc("exit")?;
                let unit = self.registry.current_mut();
                let exit_ref = unit.object.declare_func_in_func(exit, self.builder.func);
                self.builder.ins().call(exit_ref, &[status]);
            }
            other => {
                return Err(CompileError::compiler_error(format!(
                    "Builtin '{other}' has no lowering"
                )));
            }
        }

        let value = self.builder.ins().iconst(types::I8, 0);
        Ok(TypedValue {
            value,
            ty: LumaType::Unit,
        })
    }

    /// Declare (or reuse) a libc import in the current unit
    fn declare_libc(&mut self, name: &str) -> Result<FuncId, CompileError> {
        if let Some(&id) = self.registry.current().libc_funcs.get(name) {
            return Ok(id);
        }

        let ptr = self.pointer_type;
        let unit = self.registry.current_mut();
        let mut sig: Signature = unit.object.make_signature();

        match name {
            "strlen" => {
                sig.params.push(AbiParam::new(ptr));
                sig.returns.push(AbiParam::new(ptr));
            }
            "write" => {
                sig.params.push(AbiParam::new(types::I32));
                sig.params.push(AbiParam::new(ptr));
                sig.params.push(AbiParam::new(ptr));
                sig.returns.push(AbiParam::new(ptr));
            }
            "exit" => {
                sig.params.push(AbiParam::new(types::I32));
            }
            other => {
                return Err(CompileError::compiler_error(format!(
                    "Unknown libc function '{other}'"
                )));
            }
        }

        let id = unit
            .object
            .declare_function(name, Linkage::Import, &sig)
            .map_err(|e| {
                CompileError::codegen_error(
                    format!("Could not declare libc function '{name}': {e}"),
                    ErrorLocation::in_module(&self.module_name),
                )
            })?;

        unit.libc_funcs.insert(name.to_owned(), id);
        Ok(id)
    }

    // ----------------------------------
    //        Structs and fields
    // ----------------------------------

    fn lower_field_access(
        &mut self,
        base: &Expression,
        field: &str,
    ) -> Result<TypedValue, CompileError> {
        let base_value = self.lower_expression(base)?;
        let field_id = self.interner.intern(field);
        let (field_ty, offset) = self.struct_field(base_value.ty, field_id, field)?;

        let load_ty = field_ty.backend_type(self.pointer_type);
        let value = self.builder.ins().load(
            load_ty,
            MemFlags::trusted(),
            base_value.value,
            offset as i32,
        );

        Ok(TypedValue {
            value,
            ty: field_ty,
        })
    }

    /// Find a field on the struct behind `base_ty`, checking visibility.
    /// The field name reverse index is consulted first as a fast path; a
    /// miss there falls back to the struct's own field list.
    fn struct_field(
        &self,
        base_ty: LumaType,
        field_id: StringId,
        field: &str,
    ) -> Result<(LumaType, u32), CompileError> {
        let LumaType::Struct(struct_idx) = base_ty else {
            return Err(CompileError::type_error(
                format!(
                    "Member access on a non-struct value of type {}",
                    self.describe(base_ty)
                ),
                self.loc(),
            ));
        };

        let info = &self.structs[struct_idx];

        // fast path: the reverse index may point straight at our struct
        let field_info = match self.caches.field_to_struct.get(&field_id) {
            Some(&cached_idx) if cached_idx == struct_idx => {
                self.structs[cached_idx].field(field_id)
            }
            _ => info.field(field_id),
        };

        let Some(field_info) = field_info else {
            return Err(CompileError::type_error(
                format!(
                    "Struct '{}' has no field '{field}'",
                    info.name.resolve(self.interner)
                ),
                self.loc(),
            ));
        };

        let module_id = self.interner.get(&self.module_name);
        if !field_info.public && Some(info.module) != module_id {
            return Err(CompileError::type_error(
                format!(
                    "Field '{field}' of struct '{}' is private",
                    info.name.resolve(self.interner)
                ),
                self.loc(),
            ));
        }

        Ok((field_info.ty, field_info.offset))
    }

    fn lower_struct_literal(
        &mut self,
        name: &str,
        fields: &[(String, Expression)],
    ) -> Result<TypedValue, CompileError> {
        let Some(name_id) = self.interner.get(name) else {
            return Err(CompileError::rule_error(
                format!("Unknown struct '{name}'"),
                self.loc(),
            ));
        };

        let struct_idx = if self.caches.is_warmed() {
            self.caches.structs.get(&name_id).copied()
        } else {
            self.structs.iter().position(|s| s.name == name_id)
        };
        let Some(struct_idx) = struct_idx else {
            return Err(CompileError::rule_error(
                format!("Unknown struct '{name}'"),
                self.loc(),
            ));
        };

        let info = &self.structs[struct_idx];

        if fields.len() != info.fields.len() {
            return Err(CompileError::type_error(
                format!(
                    "Struct '{name}' has {} field(s), {} given",
                    info.fields.len(),
                    fields.len()
                ),
                self.loc(),
            ));
        }

        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            info.size,
            info.align.trailing_zeros() as u8,
        ));
        let addr = self.builder.ins().stack_addr(self.pointer_type, slot, 0);

        for (field_name, field_expr) in fields {
            let field_id = self.interner.intern(field_name);
            let (field_ty, offset) =
                self.struct_field(LumaType::Struct(struct_idx), field_id, field_name)?;

            let v = self.lower_expression(field_expr)?;
            self.check_types(field_ty, v.ty, "struct field")?;
            self.builder
                .ins()
                .store(MemFlags::trusted(), v.value, addr, offset as i32);
        }

        Ok(TypedValue {
            value: addr,
            ty: LumaType::Struct(struct_idx),
        })
    }

    // ----------------------------------
    //             Helpers
    // ----------------------------------

    fn load_global(&mut self, data_id: cranelift_module::DataId, ty: LumaType) -> TypedValue {
        let addr = self.global_address(data_id);
        let load_ty = ty.backend_type(self.pointer_type);
        let value = self
            .builder
            .ins()
            .load(load_ty, MemFlags::trusted(), addr, 0);
        TypedValue { value, ty }
    }

    fn global_address(&mut self, data_id: cranelift_module::DataId) -> Value {
        let unit = self.registry.current_mut();
        let gv = unit.object.declare_data_in_func(data_id, self.builder.func);
        self.builder.ins().symbol_value(self.pointer_type, gv)
    }

    fn resolve_type(&self, ty: &TypeExpr) -> Result<LumaType, CompileError> {
        resolve_type_expr(
            ty,
            self.interner,
            self.structs,
            self.caches,
            self.enums,
            self.loc(),
        )
    }

    /// Type agreement with integer leniency: enums are integers at runtime
    fn check_types(
        &self,
        expected: LumaType,
        found: LumaType,
        context: &str,
    ) -> Result<(), CompileError> {
        let matches = expected == found || (expected.is_integer() && found.is_integer());
        if matches {
            return Ok(());
        }

        Err(CompileError::type_error(
            format!(
                "Type mismatch in {context}: expected {}, found {}",
                self.describe(expected),
                self.describe(found)
            ),
            self.loc(),
        ))
    }

    fn describe(&self, ty: LumaType) -> String {
        ty.describe(self.interner, self.structs)
    }
}
