use miette::Diagnostic;
use thiserror::Error;

/// Fatal errors for malformed input. Everything here surfaces with line
/// context through miette; the engine itself never produces these.
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(loris::koat::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Division is not allowed in the input")]
    #[diagnostic(code(loris::koat::division))]
    Division {
        #[label("division here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unknown variable '{name}'")]
    #[diagnostic(
        code(loris::koat::unknown_variable),
        help("every variable must be listed in the (VAR ...) declaration")
    )]
    UnknownVariable {
        name: String,
        #[label("not declared")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unsupported expression on left-hand side")]
    #[diagnostic(
        code(loris::koat::lhs_arg),
        help("left-hand-side arguments must be variables or integer constants")
    )]
    UnsupportedLhsArg {
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Function symbol '{name}' redeclared with {found} arguments, expected {expected}")]
    #[diagnostic(code(loris::koat::arity))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Non-polynomial cost in the input")]
    #[diagnostic(code(loris::koat::cost))]
    NonPolynomialCost {
        #[label("this cost")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("No rules for start term '{name}'")]
    #[diagnostic(code(loris::koat::start_term))]
    UnknownStartTerm { name: String },

    #[error("No rules defined")]
    #[diagnostic(code(loris::koat::no_rules))]
    NoRules,

    #[error("Unable to read {path}: {source}")]
    #[diagnostic(code(loris::koat::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
