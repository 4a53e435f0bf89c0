//! AST definitions.
//!
//! The tree is immutable after parsing: later phases attach facts in side
//! tables instead of rewriting nodes. `History` nodes carry a parser-issued
//! `NodeId` so those tables can key on node identity.

/// 1-based source position of a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// Identity of a `History` node, unique within one parsed program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Expression types
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal
    IntLiteral(i64),
    /// Float literal
    FloatLiteral(f64),
    /// String literal
    StringLiteral(String),
    /// Boolean literal
    BoolLiteral(bool),
    /// Identifier
    Ident { name: String, span: Span },
    /// Namespace or import-alias member access (`ta.sma`, `color.red`)
    Member {
        object: String,
        name: String,
        span: Span,
    },
    /// Binary operation
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// Function call with positional and keyword arguments
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        span: Span,
    },
    /// Conditional expression (`cond ? a : b`)
    Ternary {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// Historical offset access (`expr[n]`): the value of `expr` as of
    /// `n` bars earlier. Never a positional index.
    History {
        id: NodeId,
        base: Box<Expr>,
        offset: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    /// Position of the leftmost positioned node, used for diagnostics on
    /// nodes that do not carry their own span.
    pub fn position(&self) -> Option<Span> {
        match self {
            Expr::Ident { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::History { span, .. } => Some(*span),
            Expr::BinOp { left, right, .. } => left.position().or_else(|| right.position()),
            Expr::UnaryOp { operand, .. } => operand.position(),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => condition
                .position()
                .or_else(|| then_value.position())
                .or_else(|| else_value.position()),
            _ => None,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

/// Statement types
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Variable declaration (`name = value`)
    Assign {
        name: String,
        value: Expr,
        span: Span,
    },
    /// Reassignment of an existing variable (`name := value`). Kept
    /// distinct from `Assign`: reassignment sites are where recursive
    /// formulas are detected.
    Reassign {
        name: String,
        value: Expr,
        span: Span,
    },
    /// If statement; bodies hold reassignments and nested ifs only
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    /// Single-expression function declaration (`name(params) => body`)
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Expr,
        exported: bool,
        span: Span,
    },
    /// Library import (`import owner/name/version as alias`)
    Import {
        specifier: String,
        alias: String,
        span: Span,
    },
    /// Expression statement (`plot(...)`, declaration calls)
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::Reassign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::FuncDef { span, .. }
            | Stmt::Import { span, .. } => *span,
            Stmt::Expr(expr) => expr.position().unwrap_or(Span::new(1, 1)),
        }
    }
}

/// Program (version pragma plus statements)
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub version: Option<u32>,
    pub statements: Vec<Stmt>,
}
