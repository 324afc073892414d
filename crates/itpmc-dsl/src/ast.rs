/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A spanned AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A single-procedure program given as a control-flow automaton.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub vars: Vec<Spanned<VarDecl>>,
    /// Initial-state constraints; conjoined.
    pub init: Vec<Spanned<Expr>>,
    pub locations: Vec<Spanned<LocationDecl>>,
    pub edges: Vec<Spanned<EdgeDecl>>,
    pub span: Span,
}

/// Variable declaration: `var x: 0..15;` or `var b: bool;`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: VarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Bool,
    Range { lo: i64, hi: i64 },
}

impl std::fmt::Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarType::Bool => write!(f, "bool"),
            VarType::Range { lo, hi } => write!(f, "{lo}..{hi}"),
        }
    }
}

/// Location declaration: `location head;`, `location err error;`
#[derive(Debug, Clone, PartialEq)]
pub struct LocationDecl {
    pub name: String,
    pub initial: bool,
    pub error: bool,
}

/// Edge declaration: `edge a -> b when g do x := e, y := *;`
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDecl {
    pub from: String,
    pub to: String,
    pub guard: Option<Spanned<Expr>>,
    /// Simultaneous assignments.
    pub updates: Vec<Spanned<Assignment>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub var: String,
    pub value: AssignValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    Expr(Expr),
    /// Nondeterministic choice from the variable's domain.
    Havoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Expression (boolean or integer; checked during lowering).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    BoolLit(bool),
    Var(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::IntLit(n) => write!(f, "{n}"),
            Expr::BoolLit(b) => write!(f, "{b}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Add(l, r) => write!(f, "({l} + {r})"),
            Expr::Sub(l, r) => write!(f, "({l} - {r})"),
            Expr::Mul(l, r) => write!(f, "({l} * {r})"),
            Expr::Neg(e) => write!(f, "-{e}"),
            Expr::Cmp(op, l, r) => write!(f, "({l} {op} {r})"),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::And(l, r) => write!(f, "({l} && {r})"),
            Expr::Or(l, r) => write!(f, "({l} || {r})"),
        }
    }
}
