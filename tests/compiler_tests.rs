//! End-to-end scenarios: build real programs, link them with the system C
//! compiler, run the executables and compare their observable behaviour.
//!
//! Every test skips quietly when no C compiler driver is installed, since
//! linking is the one stage that needs one.

use luma::compiler::ast::{
    EnumMember, Expression, FieldDef, ModuleNode, Param, Program, Statement, SwitchCase, TypeExpr,
};
use luma::settings::BuildConfig;
use luma::compile_program;
use std::path::Path;
use std::process::Command;

fn have_cc() -> bool {
    Command::new("cc").arg("--version").output().is_ok()
        || Command::new("gcc").arg("--version").output().is_ok()
}

fn module(name: &str, body: Vec<Statement>) -> ModuleNode {
    ModuleNode {
        name: name.to_string(),
        docs: None,
        body,
    }
}

fn use_module(name: &str) -> Statement {
    Statement::Use {
        module: name.to_string(),
        alias: None,
    }
}

fn main_fn(body: Vec<Statement>) -> Statement {
    Statement::Function {
        name: "main".to_string(),
        public: true,
        params: Vec::new(),
        returns: Some(TypeExpr::Int),
        body,
    }
}

fn return_expr(value: Expression) -> Statement {
    Statement::Return { value: Some(value) }
}

fn int(value: i64) -> Expression {
    Expression::IntLiteral(value)
}

/// Compile into a temp dir and return (objects dir, executable path)
fn build(program: &Program, dir: &Path) -> Result<std::path::PathBuf, String> {
    let config = BuildConfig {
        output_dir: dir.join("build"),
        executable_name: dir.join("output").display().to_string(),
        ..BuildConfig::default()
    };

    match compile_program(program, &config) {
        Ok(artifacts) => Ok(artifacts.executable.expect("a native build links")),
        Err(messages) => Err(messages
            .errors
            .iter()
            .map(|e| e.msg.clone())
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn run(executable: &Path) -> (i32, String) {
    let output = Command::new(executable)
        .output()
        .expect("the produced executable should run");
    (
        output.status.code().expect("an exit status"),
        String::from_utf8_lossy(&output.stdout).to_string(),
    )
}

#[test]
fn s1_hello_prints_and_exits_zero() {
    if !have_cc() {
        return;
    }

    let program = Program {
        modules: vec![module(
            "main",
            vec![main_fn(vec![
                Statement::Expr(Expression::Call {
                    callee: "output".to_string(),
                    args: vec![Expression::StringLiteral("Hello\\n".to_string())],
                }),
                return_expr(int(0)),
            ])],
        )],
    };

    let dir = tempfile::tempdir().unwrap();
    let executable = build(&program, dir.path()).expect("hello should build");

    let (status, stdout) = run(&executable);
    assert_eq!(stdout, "Hello\n", "the escape-decoded string is printed");
    assert_eq!(status, 0);
}

#[test]
fn s2_two_modules_link_and_call_across_the_boundary() {
    if !have_cc() {
        return;
    }

    let program = Program {
        modules: vec![
            module(
                "util",
                vec![Statement::Function {
                    name: "add".to_string(),
                    public: true,
                    params: vec![
                        Param {
                            name: "a".to_string(),
                            ty: TypeExpr::Int,
                        },
                        Param {
                            name: "b".to_string(),
                            ty: TypeExpr::Int,
                        },
                    ],
                    returns: Some(TypeExpr::Int),
                    body: vec![return_expr(Expression::Binary {
                        op: luma::compiler::ast::BinaryOp::Add,
                        lhs: Box::new(Expression::Variable("a".to_string())),
                        rhs: Box::new(Expression::Variable("b".to_string())),
                    })],
                }],
            ),
            module(
                "main",
                vec![
                    use_module("util"),
                    main_fn(vec![return_expr(Expression::QualifiedCall {
                        path: vec!["util".to_string(), "add".to_string()],
                        args: vec![int(2), int(3)],
                    })]),
                ],
            ),
        ],
    };

    let dir = tempfile::tempdir().unwrap();
    let executable = build(&program, dir.path()).expect("two-module program should build");

    assert!(
        dir.path().join("build/util.o").exists(),
        "util should emit its own object"
    );
    assert!(dir.path().join("build/main.o").exists());

    let (status, _) = run(&executable);
    assert_eq!(status, 5, "util::add(2, 3) is the exit status");
}

#[test]
fn s3_struct_returns_cross_modules_correctly() {
    if !have_cc() {
        return;
    }

    let program = Program {
        modules: vec![
            module(
                "geom",
                vec![
                    Statement::Struct {
                        name: "Point".to_string(),
                        public: true,
                        fields: vec![
                            FieldDef {
                                name: "x".to_string(),
                                ty: TypeExpr::Float,
                                public: true,
                            },
                            FieldDef {
                                name: "y".to_string(),
                                ty: TypeExpr::Float,
                                public: true,
                            },
                        ],
                    },
                    Statement::Function {
                        name: "make".to_string(),
                        public: true,
                        params: Vec::new(),
                        returns: Some(TypeExpr::Named("Point".to_string())),
                        body: vec![return_expr(Expression::StructLiteral {
                            name: "Point".to_string(),
                            fields: vec![
                                ("x".to_string(), Expression::FloatLiteral(3.0)),
                                ("y".to_string(), Expression::FloatLiteral(4.0)),
                            ],
                        })],
                    },
                ],
            ),
            module(
                "main",
                vec![
                    use_module("geom"),
                    main_fn(vec![
                        Statement::Let {
                            name: "p".to_string(),
                            ty: None,
                            value: Expression::QualifiedCall {
                                path: vec!["geom".to_string(), "make".to_string()],
                                args: Vec::new(),
                            },
                        },
                        Statement::If {
                            condition: Expression::Binary {
                                op: luma::compiler::ast::BinaryOp::Eq,
                                lhs: Box::new(Expression::Binary {
                                    op: luma::compiler::ast::BinaryOp::Add,
                                    lhs: Box::new(Expression::FieldAccess {
                                        base: Box::new(Expression::Variable("p".to_string())),
                                        field: "x".to_string(),
                                    }),
                                    rhs: Box::new(Expression::FieldAccess {
                                        base: Box::new(Expression::Variable("p".to_string())),
                                        field: "y".to_string(),
                                    }),
                                }),
                                rhs: Box::new(Expression::FloatLiteral(7.0)),
                            },
                            then_body: vec![return_expr(int(3))],
                            else_body: vec![return_expr(int(4))],
                        },
                    ]),
                ],
            ),
        ],
    };

    let dir = tempfile::tempdir().unwrap();
    let executable = build(&program, dir.path()).expect("struct-return program should build");

    let (status, _) = run(&executable);
    assert_eq!(status, 3, "the struct fields should add up numerically");
}

#[test]
fn s4_enum_constants_cross_modules_into_switches() {
    if !have_cc() {
        return;
    }

    let shade_case = |member: &str, result: i64| SwitchCase {
        label: Expression::QualifiedAccess {
            path: vec![
                "color".to_string(),
                "Shade".to_string(),
                member.to_string(),
            ],
        },
        body: vec![return_expr(int(result))],
    };

    let program = Program {
        modules: vec![
            module(
                "color",
                vec![Statement::Enum {
                    name: "Shade".to_string(),
                    public: true,
                    members: vec![
                        EnumMember {
                            name: "Red".to_string(),
                            value: None,
                        },
                        EnumMember {
                            name: "Green".to_string(),
                            value: None,
                        },
                        EnumMember {
                            name: "Blue".to_string(),
                            value: None,
                        },
                    ],
                }],
            ),
            module(
                "main",
                vec![
                    use_module("color"),
                    main_fn(vec![
                        Statement::Switch {
                            scrutinee: Expression::QualifiedAccess {
                                path: vec![
                                    "color".to_string(),
                                    "Shade".to_string(),
                                    "Green".to_string(),
                                ],
                            },
                            cases: vec![
                                shade_case("Red", 10),
                                shade_case("Green", 11),
                                shade_case("Blue", 12),
                            ],
                            default: vec![return_expr(int(13))],
                        },
                        return_expr(int(14)),
                    ]),
                ],
            ),
        ],
    };

    let dir = tempfile::tempdir().unwrap();
    let executable = build(&program, dir.path()).expect("enum switch program should build");

    let (status, _) = run(&executable);
    assert_eq!(status, 11, "the Green arm should be taken");
}

#[test]
fn s5_cyclic_use_graphs_are_rejected_without_objects() {
    let program = Program {
        modules: vec![
            module("main", vec![use_module("a"), main_fn(vec![return_expr(int(0))])]),
            module("a", vec![use_module("b")]),
            module("b", vec![use_module("a")]),
        ],
    };

    let dir = tempfile::tempdir().unwrap();
    let error = build(&program, dir.path()).expect_err("a cyclic program must not build");

    assert!(
        error.to_lowercase().contains("circular"),
        "the error should report a cycle, got: {error}"
    );
    assert!(
        error.contains("a -> b") || error.contains("b -> a"),
        "the cycle error should name the modules involved, got: {error}"
    );

    let build_dir = dir.path().join("build");
    let object_count = build_dir
        .read_dir()
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(object_count, 0, "no object files may be written");
}

#[test]
fn s6_worker_count_does_not_change_the_program() {
    if !have_cc() {
        return;
    }

    let mut modules: Vec<ModuleNode> = (0..8i64)
        .map(|i| {
            module(
                &format!("m{i}"),
                vec![Statement::Function {
                    name: format!("f{i}"),
                    public: true,
                    params: Vec::new(),
                    returns: Some(TypeExpr::Int),
                    body: vec![return_expr(int(i))],
                }],
            )
        })
        .collect();

    // main = f0() + f1() + ... + f7() = 28
    let mut sum = Expression::QualifiedCall {
        path: vec!["m0".to_string(), "f0".to_string()],
        args: Vec::new(),
    };
    for i in 1..8 {
        sum = Expression::Binary {
            op: luma::compiler::ast::BinaryOp::Add,
            lhs: Box::new(sum),
            rhs: Box::new(Expression::QualifiedCall {
                path: vec![format!("m{i}"), format!("f{i}")],
                args: Vec::new(),
            }),
        };
    }

    let mut body: Vec<Statement> = (0..8).map(|i| use_module(&format!("m{i}"))).collect();
    body.push(main_fn(vec![return_expr(sum)]));
    modules.push(module("main", body));

    let program = Program { modules };

    let build_with_workers = |workers: &str| {
        unsafe { std::env::set_var("LUMA_COMPILE_THREADS", workers) };
        let dir = tempfile::tempdir().unwrap();
        let executable = build(&program, dir.path()).expect("the program should build");
        let (status, stdout) = run(&executable);

        let mut objects: Vec<(String, Vec<u8>)> = dir
            .path()
            .join("build")
            .read_dir()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().to_string(),
                    std::fs::read(e.path()).unwrap(),
                )
            })
            .collect();
        objects.sort();
        (status, stdout, objects)
    };

    let serial = build_with_workers("1");
    let parallel = build_with_workers("8");
    unsafe { std::env::remove_var("LUMA_COMPILE_THREADS") };

    assert_eq!(serial.0, 28, "the sum of the eight functions");
    assert_eq!(serial.0, parallel.0, "identical exit status");
    assert_eq!(serial.1, parallel.1, "identical output");
    assert_eq!(
        serial.2, parallel.2,
        "object files must be byte-identical for any worker count"
    );
}
