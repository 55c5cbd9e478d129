//! Abstract Syntax Tree definitions for Dash

use std::fmt;
use std::sync::Arc;

/// Source location span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A node with associated source span
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

/// Simple identifier
pub type Identifier = Spanned<String>;

// =============================================================================
// Chunks
// =============================================================================

/// A parsed source unit
///
/// Source text that is exactly one expression statement is a bare expression;
/// everything else is a module whose value is its export bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Expression(Expr),
    Module(Module),
}

/// A sequence of top-level statements
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// A braced block; the last expression statement (if any) is its tail value
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
    pub span: Span,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its effects
    Expr(Expr),
    /// `name := value` or `name: T = value`
    Declaration(Declaration),
    /// `name = value`
    Assignment { target: Identifier, value: Expr },
    /// `fn name(params) body`
    Function(FunctionDecl),
    /// `export ...`
    Export(ExportItem),
    /// `for x in xs { ... }`
    For(ForLoop),
    /// `return [value]`
    Return(Option<Expr>),
    /// `throw value`
    Throw(Expr),
}

/// Variable declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Annotation expressions, in source order
    pub annotations: Vec<Expr>,
    pub name: Identifier,
    /// Explicit type constraint; `Any` when absent
    pub ty: Option<Expr>,
    pub value: Expr,
    pub span: Span,
}

/// Named function declaration, added to the overload set of `name`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Identifier,
    pub function: Arc<FunctionLiteral>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportItem {
    Declaration(Declaration),
    Function(FunctionDecl),
    Name(Identifier),
}

/// `for variable in iterable { body }`, used by both the loop statement
/// and the array comprehension expression
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub variable: Identifier,
    pub iterable: Box<Expr>,
    pub body: Block,
    pub span: Span,
}

// =============================================================================
// Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub params: Vec<Parameter>,
    pub return_type: Option<Expr>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub ty: Option<Expr>,
    pub default: Option<Expr>,
    pub span: Span,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    String(String),
    Identifier(String),

    /// `[a, b, for x in xs { x }]`
    Array(Vec<Expr>),
    /// `{ a: 1, b: 2 }`
    Object(Vec<(Identifier, Expr)>),
    /// `fn(params) body`
    Function(Arc<FunctionLiteral>),
    /// `{ statements; tail }`
    Block(Block),

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `value as T`
    Cast {
        value: Box<Expr>,
        ty: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Switch {
        subject: Option<Box<Expr>>,
        cases: Vec<SwitchCase>,
        default: Option<Box<Expr>>,
    },
    /// Array comprehension
    For(Box<ForLoop>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub pattern: Expr,
    pub result: Expr,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `.name` and `[index]`
    Dereference,
}

impl BinaryOp {
    /// Get operator precedence (higher = binds tighter)
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Concat => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
            BinaryOp::Pow => 7,
            BinaryOp::Dereference => 8,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Dereference => ".",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Plus => write!(f, "+"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}
