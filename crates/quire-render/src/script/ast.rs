//! Syntax tree of compiled scripts.

use serde_json::Value;

/// Binary operators, in the order the parser assigns precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    /// `[a, b]` or `['k' => v]`; unkeyed entries have no key.
    Array(Vec<(Option<Expr>, Expr)>),
    Var(String),
    /// `$a[k]`; `$a[]` (append) has no key and is only valid as a target.
    Index(Box<Expr>, Option<Box<Expr>>),
    Prop(Box<Expr>, String),
    MethodCall(Box<Expr>, String, Vec<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    /// `c ? a : b`, or `c ?: b` when the middle operand is absent.
    Ternary(Box<Expr>, Option<Box<Expr>>, Box<Expr>),
    /// `t = v`, or `t op= v` when an operator is present.
    Assign(Box<Expr>, Option<BinaryOp>, Box<Expr>),
    IncDec {
        target: Box<Expr>,
        delta: i64,
        prefix: bool,
    },
}

/// One executable node of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Echo(Expr),
    Expr(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        iterable: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Node>,
    },
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
        body: Vec<Node>,
    },
    While {
        cond: Expr,
        body: Vec<Node>,
    },
    Break,
    Continue,
}

/// A parsed compiled template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub(crate) nodes: Vec<Node>,
}
