//! Input contract of the code generation core.
//!
//! The parser and type checker live upstream of this crate; what arrives here
//! is an ordered forest of module trees with every name spelled out and every
//! declaration annotated with its type. The serde derives exist so a program
//! can be handed to the `luma` binary as JSON, matching what the frontend
//! pipeline emits.

use serde::{Deserialize, Serialize};

/// A fully parsed and type-checked program: an ordered sequence of modules.
/// Program order is the canonical tie-break order everywhere the core iterates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub modules: Vec<ModuleNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleNode {
    /// Unique module name, must be non-empty. The module named `main`
    /// becomes the main compilation unit.
    pub name: String,

    /// Optional documentation string for the module
    #[serde(default)]
    pub docs: Option<String>,

    /// Ordered body: use directives, declarations and statements
    #[serde(default)]
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    /// Explicit discriminant; members without one continue counting up
    /// from the previous member, starting at zero.
    #[serde(default)]
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Case label, must fold to an integer constant at compile time
    /// (an integer literal or a qualified enum member access).
    pub label: Expression,
    #[serde(default)]
    pub body: Vec<Statement>,
}

/// The types the checker annotates declarations with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Int,
    Float,
    Bool,
    Str,
    /// A user-defined struct or enum, by name
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `use other_module` or `use other_module as alias`
    Use {
        module: String,
        #[serde(default)]
        alias: Option<String>,
    },

    Function {
        name: String,
        #[serde(default)]
        public: bool,
        #[serde(default)]
        params: Vec<Param>,
        #[serde(default)]
        returns: Option<TypeExpr>,
        #[serde(default)]
        body: Vec<Statement>,
    },

    Struct {
        name: String,
        #[serde(default)]
        public: bool,
        fields: Vec<FieldDef>,
    },

    Enum {
        name: String,
        #[serde(default)]
        public: bool,
        members: Vec<EnumMember>,
    },

    /// Module-level variable with a constant initialiser
    Global {
        name: String,
        #[serde(default)]
        public: bool,
        ty: TypeExpr,
        value: Expression,
    },

    Let {
        name: String,
        #[serde(default)]
        ty: Option<TypeExpr>,
        value: Expression,
    },

    Assign {
        target: Expression,
        value: Expression,
    },

    Return {
        #[serde(default)]
        value: Option<Expression>,
    },

    If {
        condition: Expression,
        #[serde(default)]
        then_body: Vec<Statement>,
        #[serde(default)]
        else_body: Vec<Statement>,
    },

    While {
        condition: Expression,
        #[serde(default)]
        body: Vec<Statement>,
    },

    /// Integer switch; case labels are compile-time constants
    Switch {
        scrutinee: Expression,
        #[serde(default)]
        cases: Vec<SwitchCase>,
        #[serde(default)]
        default: Vec<Statement>,
    },

    Break,
    Continue,

    Expr(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    /// Raw source text of the literal; escape sequences are decoded at lowering
    StringLiteral(String),

    Variable(String),

    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    /// Unqualified call: a function in the current module, an imported
    /// binding, or a builtin
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<Expression>,
    },

    /// Compile-time qualified access: `A::B` or `A::B::C`
    QualifiedAccess {
        path: Vec<String>,
    },

    /// Qualified call: `A::f(args)`
    QualifiedCall {
        path: Vec<String>,
        #[serde(default)]
        args: Vec<Expression>,
    },

    FieldAccess {
        base: Box<Expression>,
        field: String,
    },

    StructLiteral {
        name: String,
        fields: Vec<(String, Expression)>,
    },
}

impl Expression {
    /// Render a qualified path back to its source form for diagnostics
    pub fn qualified_name(path: &[String]) -> String {
        path.join("::")
    }
}
