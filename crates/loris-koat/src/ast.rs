use num::BigInt;

use loris_ir::rel::CmpOp;

/// Byte range into the source text, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.end.saturating_sub(span.start)).into()
    }
}

/// A parsed KoAT file.
#[derive(Debug, Clone)]
pub struct KoatFile {
    pub goal: String,
    pub start: StartTerm,
    pub vars: Vec<String>,
    pub rules: Vec<KoatRule>,
}

#[derive(Debug, Clone)]
pub enum StartTerm {
    /// `(STARTTERM (FUNCTIONSYMBOLS f))`
    Symbol(String),
    /// `(STARTTERM CONSTRUCTOR-BASED)`: the first rule's lhs starts.
    ConstructorBased,
}

/// One rule line: `lhs -> rhs [guard]` or `lhs -{ cost }> rhs [guard]`.
#[derive(Debug, Clone)]
pub struct KoatRule {
    pub lhs: FunApp,
    pub cost: Option<PExpr>,
    pub rhs: Vec<FunApp>,
    pub guard: Vec<Cond>,
    pub span: Span,
}

/// A function application `f(e1, ..., ek)`.
#[derive(Debug, Clone)]
pub struct FunApp {
    pub name: String,
    pub args: Vec<PExpr>,
    pub span: Span,
}

/// Parsed arithmetic expression, before variable resolution.
#[derive(Debug, Clone)]
pub enum PExpr {
    Num(BigInt),
    Var(String, Span),
    Neg(Box<PExpr>),
    Add(Box<PExpr>, Box<PExpr>),
    Sub(Box<PExpr>, Box<PExpr>),
    Mul(Box<PExpr>, Box<PExpr>),
    Div(Box<PExpr>, Box<PExpr>, Span),
    Pow(Box<PExpr>, Box<PExpr>),
}

/// Parsed guard atom. `TRUE` atoms are dropped during lowering.
#[derive(Debug, Clone)]
pub enum Cond {
    True,
    Cmp {
        lhs: PExpr,
        op: CmpOp,
        rhs: PExpr,
        span: Span,
    },
}
