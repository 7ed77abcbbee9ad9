// Shared helpers for the compiler test modules: tiny AST builders and a
// driver that runs a program through the create/link/lower passes without
// emitting objects or linking.

mod dependency_tests;
mod emitter_tests;
mod escape_tests;
mod lowering_tests;
mod symbol_cache_tests;

use crate::compiler::ast::{
    Expression, ModuleNode, Param, Program, Statement, TypeExpr,
};
use crate::compiler::codegen::lowering::{run_create_pass, run_link_pass, run_lower_pass};
use crate::compiler::codegen::session::CodegenSession;
use crate::compiler::compiler_errors::CompileError;

pub(crate) fn module(name: &str, body: Vec<Statement>) -> ModuleNode {
    ModuleNode {
        name: name.to_string(),
        docs: None,
        body,
    }
}

pub(crate) fn program(modules: Vec<ModuleNode>) -> Program {
    Program { modules }
}

pub(crate) fn use_module(name: &str) -> Statement {
    Statement::Use {
        module: name.to_string(),
        alias: None,
    }
}

/// A public function with Int parameters returning Int
pub(crate) fn int_function(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::Function {
        name: name.to_string(),
        public: true,
        params: params
            .iter()
            .map(|p| Param {
                name: p.to_string(),
                ty: TypeExpr::Int,
            })
            .collect(),
        returns: Some(TypeExpr::Int),
        body,
    }
}

pub(crate) fn return_int(value: i64) -> Statement {
    Statement::Return {
        value: Some(Expression::IntLiteral(value)),
    }
}

/// `main` returning the given expression
pub(crate) fn main_module(value: Expression, extra: Vec<Statement>) -> ModuleNode {
    let mut body = extra;
    body.push(Statement::Function {
        name: "main".to_string(),
        public: true,
        params: Vec::new(),
        returns: Some(TypeExpr::Int),
        body: vec![Statement::Return { value: Some(value) }],
    });
    module("main", body)
}

/// Run the three lowering passes, returning the populated session
pub(crate) fn lower_program(program: &Program) -> Result<CodegenSession, CompileError> {
    let mut session = CodegenSession::new()?;
    run_create_pass(&mut session, program)?;
    run_link_pass(&mut session, program)?;
    session.warm_caches();
    run_lower_pass(&mut session, program)?;
    Ok(session)
}
