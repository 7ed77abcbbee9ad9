//! Tests for the pass driver and statement lowering error paths

use super::{int_function, lower_program, main_module, module, program, return_int, use_module};
use crate::compiler::ast::{
    EnumMember, Expression, FieldDef, Statement, SwitchCase, TypeExpr,
};
use crate::compiler::compiler_errors::ErrorType;
use crate::{compile_program, settings::BuildConfig};

#[test]
fn a_hello_program_lowers_and_queues_function_bodies() {
    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![Statement::Function {
            name: "greet".to_string(),
            public: false,
            params: Vec::new(),
            returns: None,
            body: vec![Statement::Expr(Expression::Call {
                callee: "output".to_string(),
                args: vec![Expression::StringLiteral("Hello\\n".to_string())],
            })],
        }],
    )]);

    let session = lower_program(&program).expect("the hello program should lower");

    let main_id = session.interner.get("main").unwrap();
    let unit = session.registry.find_unit(main_id).unwrap();
    assert_eq!(
        unit.pending_functions.len(),
        2,
        "both greet and main should be queued for emission"
    );
    assert!(unit.is_main, "the module named main is the main unit");
}

#[test]
fn programs_without_a_main_module_cannot_build() {
    let no_main = program(vec![module("util", vec![])]);
    let config = BuildConfig::default();

    let messages = compile_program(&no_main, &config).expect_err("no main module");
    assert!(
        messages.errors[0].msg.contains("main"),
        "the error should point at the missing main module"
    );
}

#[test]
fn docs_mode_skips_code_generation() {
    let program = program(vec![module("util", vec![])]);
    let config = BuildConfig {
        docs: true,
        ..BuildConfig::default()
    };

    let artifacts = compile_program(&program, &config).expect("docs mode should not build");
    assert!(artifacts.executable.is_none());
    assert!(artifacts.objects.is_empty());
}

#[test]
fn duplicate_symbols_in_a_module_are_fatal() {
    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![
            int_function("twice", &[], vec![return_int(1)]),
            int_function("twice", &[], vec![return_int(2)]),
        ],
    )]);

    let error = lower_program(&program).expect_err("duplicate symbols must fail");
    assert_eq!(error.error_type, ErrorType::Rule);
    assert!(error.msg.contains("twice"));
}

#[test]
fn private_struct_fields_are_rejected_across_modules() {
    let program = program(vec![
        module(
            "vault",
            vec![Statement::Struct {
                name: "Secret".to_string(),
                public: true,
                fields: vec![
                    FieldDef {
                        name: "shown".to_string(),
                        ty: TypeExpr::Int,
                        public: true,
                    },
                    FieldDef {
                        name: "hidden".to_string(),
                        ty: TypeExpr::Int,
                        public: false,
                    },
                ],
            }],
        ),
        main_module(
            Expression::FieldAccess {
                base: Box::new(Expression::StructLiteral {
                    name: "Secret".to_string(),
                    fields: vec![
                        ("shown".to_string(), Expression::IntLiteral(1)),
                        ("hidden".to_string(), Expression::IntLiteral(2)),
                    ],
                }),
                field: "shown".to_string(),
            },
            vec![use_module("vault")],
        ),
    ]);

    let error = lower_program(&program).expect_err("private fields must not cross modules");
    assert_eq!(error.error_type, ErrorType::Type);
    assert!(
        error.msg.contains("hidden") && error.msg.to_lowercase().contains("private"),
        "expected a private-field error, got: {}",
        error.msg
    );
}

#[test]
fn assigning_to_a_function_is_rejected() {
    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![
            int_function("f", &[], vec![return_int(1)]),
            Statement::Function {
                name: "clobber".to_string(),
                public: false,
                params: Vec::new(),
                returns: None,
                body: vec![Statement::Assign {
                    target: Expression::Variable("f".to_string()),
                    value: Expression::IntLiteral(3),
                }],
            },
        ],
    )]);

    let error = lower_program(&program).expect_err("assignment to a function must fail");
    assert_eq!(error.error_type, ErrorType::Type);
    assert!(error.msg.contains("f"));
}

#[test]
fn member_access_on_a_non_struct_is_rejected() {
    let program = program(vec![main_module(
        Expression::FieldAccess {
            base: Box::new(Expression::IntLiteral(3)),
            field: "x".to_string(),
        },
        vec![],
    )]);

    let error = lower_program(&program).expect_err("field access on Int must fail");
    assert_eq!(error.error_type, ErrorType::Type);
    assert!(error.msg.to_lowercase().contains("non-struct"));
}

#[test]
fn switch_rejects_duplicate_case_labels() {
    let switch = Statement::Switch {
        scrutinee: Expression::IntLiteral(1),
        cases: vec![
            SwitchCase {
                label: Expression::IntLiteral(1),
                body: vec![return_int(1)],
            },
            SwitchCase {
                label: Expression::IntLiteral(1),
                body: vec![return_int(2)],
            },
        ],
        default: Vec::new(),
    };

    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![Statement::Function {
            name: "pick".to_string(),
            public: false,
            params: Vec::new(),
            returns: Some(TypeExpr::Int),
            body: vec![switch, return_int(0)],
        }],
    )]);

    let error = lower_program(&program).expect_err("duplicate cases must fail");
    assert!(error.msg.to_lowercase().contains("duplicate"));
}

#[test]
fn switch_case_labels_accept_enum_members() {
    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![
            Statement::Enum {
                name: "Mode".to_string(),
                public: false,
                members: vec![
                    EnumMember {
                        name: "Off".to_string(),
                        value: None,
                    },
                    EnumMember {
                        name: "On".to_string(),
                        value: None,
                    },
                ],
            },
            Statement::Function {
                name: "pick".to_string(),
                public: false,
                params: Vec::new(),
                returns: Some(TypeExpr::Int),
                body: vec![
                    Statement::Switch {
                        scrutinee: Expression::QualifiedAccess {
                            path: vec!["Mode".to_string(), "On".to_string()],
                        },
                        cases: vec![
                            SwitchCase {
                                label: Expression::QualifiedAccess {
                                    path: vec!["Mode".to_string(), "Off".to_string()],
                                },
                                body: vec![return_int(10)],
                            },
                            SwitchCase {
                                label: Expression::QualifiedAccess {
                                    path: vec!["Mode".to_string(), "On".to_string()],
                                },
                                body: vec![return_int(11)],
                            },
                        ],
                        default: vec![return_int(12)],
                    },
                    return_int(0),
                ],
            },
        ],
    )]);

    lower_program(&program).expect("enum case labels should lower");
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![Statement::Function {
            name: "runaway".to_string(),
            public: false,
            params: Vec::new(),
            returns: None,
            body: vec![Statement::Break],
        }],
    )]);

    let error = lower_program(&program).expect_err("break outside a loop must fail");
    assert_eq!(error.error_type, ErrorType::Rule);
}

#[test]
fn loops_and_conditionals_lower() {
    // sum the numbers below five, with an early exit
    let body = vec![
        Statement::Let {
            name: "total".to_string(),
            ty: Some(TypeExpr::Int),
            value: Expression::IntLiteral(0),
        },
        Statement::Let {
            name: "i".to_string(),
            ty: None,
            value: Expression::IntLiteral(0),
        },
        Statement::While {
            condition: Expression::Binary {
                op: crate::compiler::ast::BinaryOp::Lt,
                lhs: Box::new(Expression::Variable("i".to_string())),
                rhs: Box::new(Expression::IntLiteral(5)),
            },
            body: vec![
                Statement::If {
                    condition: Expression::Binary {
                        op: crate::compiler::ast::BinaryOp::Eq,
                        lhs: Box::new(Expression::Variable("i".to_string())),
                        rhs: Box::new(Expression::IntLiteral(4)),
                    },
                    then_body: vec![Statement::Break],
                    else_body: Vec::new(),
                },
                Statement::Assign {
                    target: Expression::Variable("total".to_string()),
                    value: Expression::Binary {
                        op: crate::compiler::ast::BinaryOp::Add,
                        lhs: Box::new(Expression::Variable("total".to_string())),
                        rhs: Box::new(Expression::Variable("i".to_string())),
                    },
                },
                Statement::Assign {
                    target: Expression::Variable("i".to_string()),
                    value: Expression::Binary {
                        op: crate::compiler::ast::BinaryOp::Add,
                        lhs: Box::new(Expression::Variable("i".to_string())),
                        rhs: Box::new(Expression::IntLiteral(1)),
                    },
                },
            ],
        },
        Statement::Return {
            value: Some(Expression::Variable("total".to_string())),
        },
    ];

    let program = program(vec![main_module(
        Expression::IntLiteral(0),
        vec![Statement::Function {
            name: "sum".to_string(),
            public: false,
            params: Vec::new(),
            returns: Some(TypeExpr::Int),
            body,
        }],
    )]);

    lower_program(&program).expect("loops and conditionals should lower");
}
