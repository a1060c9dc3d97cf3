//! Schemy - a small Scheme-derived interpreter
//!
//! This crate reads source text into a nested-list representation, evaluates it
//! against an explicit, list-backed lexical environment and prints the results.
//!
//! ```scheme
//! (define (make-adder m) (lambda (n) (+ m n)))
//! (define add2 (make-adder 2))
//! (add2 3)                                  ; => 5
//! (let loop ([n 5] [acc 0])
//!   (if (> n 0) (loop (- n 1) (+ acc n)) acc)) ; => 15
//! ```
//!
//! ## Semantics in brief
//!
//! - Only `#f` is false; `0`, `()` and `""` are all true.
//! - Lists are flat sequences: `(cons 1 '(2 3))` is `(1 2 3)` and `(cons 1 2)` is `(1 2)`.
//! - The environment is a flat stack of bindings delimited by `#scope` markers.
//!   A scope whose result is a closure keeps its bindings alive for that closure.
//! - Primitive procedures live in ordered libraries (`core-lib`, `ext-lib`,
//!   `list-lib`, `string-lib`) that are consulted after the binding chain.
//!
//! ## Modules
//!
//! - `parser`: preprocessing, tokenizing, bracket checks, abbreviation expansion
//! - `environment`: the flat binding stack with scope markers
//! - `evaluator`: the interpreter, closure application and special forms
//! - `libs`: primitive procedure libraries and host extension functions
//! - `printer`: textual rendering of values
//! - `import`: top-level `(import "...")` resolution with a parsed-code cache

use std::fmt;

use thiserror::Error;

use crate::ast::Value;

/// Default limit on nested compound expressions; one user-level call costs a few levels.
///
/// The host stack grows on demand, so this bounds runaway recursion rather
/// than protecting the stack.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Opening and closing brackets of one family don't balance
    UnmatchedBrackets,
    /// Invalid or unexpected syntax (stray closers, dangling abbreviations)
    InvalidSyntax,
    /// Input ended before a literal or comment was complete
    Incomplete,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 40 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 40;

        let tail = input.get(error_offset..).unwrap_or_default();
        let mut context: String = tail.chars().take(MAX_CONTEXT).collect();
        if tail.chars().count() > MAX_CONTEXT {
            context.push_str("[...]");
        }
        let context = context.replace('\n', "\\n").replace('\r', "");

        ParseError {
            kind,
            message: message.into(),
            context: Some(context),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " Near: {context}")?;
        }
        Ok(())
    }
}

/// Accepted argument counts of a procedure or special form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive on both ends
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(min) => count >= min,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }

    /// Check `count` against this arity, naming `form` in the error.
    pub fn validate(&self, form: &str, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::ArityMismatch {
                form: form.to_owned(),
                expected: *self,
                given: count,
            })
        }
    }
}

/// "1 argument" / "3 arguments"
pub(crate) fn count_text(count: usize) -> String {
    if count == 1 {
        "1 argument".to_owned()
    } else {
        format!("{count} arguments")
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Exact(n) => write!(f, "{}", count_text(n)),
            Arity::AtLeast(n) => write!(f, "at least {}", count_text(n)),
            Arity::Range(min, max) => {
                write!(f, "from {} to {}", count_text(min), count_text(max))
            }
            Arity::Any => write!(f, "any number of arguments"),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(ParseError),
    #[error("Unbound identifier: {0}")]
    UnboundIdentifier(String),
    #[error("Identifier already defined: {0}")]
    AlreadyDefined(String),
    #[error("Identifier is not defined: {0}")]
    NotDefined(String),
    #[error("Unspecified value of identifier: {0}")]
    UnspecifiedValue(String),
    #[error("Cannot set unspecified value to identifier: {0}.")]
    CannotBindUnspecified(String),
    #[error("'{form}' requires {expected}. Given: {}", count_text(*.given))]
    ArityMismatch {
        form: String,
        expected: Arity,
        given: usize,
    },
    #[error("'{form}' requires {expected}. Given: {given}")]
    TypeMismatch {
        form: String,
        expected: String,
        given: String,
    },
    #[error("'{form}' index {index} is out of range for a list of length {length}")]
    OutOfRange {
        form: String,
        index: usize,
        length: usize,
    },
    /// Application of something that isn't a procedure
    #[error("Improper function application. {0}")]
    ImproperApplication(String),
    #[error("{message}")]
    ImproperSpecialForm { form: String, message: String },
    #[error("'{0}' division by zero.")]
    DivisionByZero(String),
    #[error("Unknown lib: {0}")]
    UnrecognizedLibrary(String),
    /// A value thrown by `raise`; carries any datum, not only text
    #[error("{}", printer::stringify(.0))]
    Raised(Value),
    #[error("Evaluation depth limit exceeded (max: {0})")]
    EvalDepthExceeded(usize),
    #[error("Cannot import '{location}': {message}")]
    Import { location: String, message: String },
}

impl Error {
    pub(crate) fn improper(form: &str, message: impl Into<String>) -> Self {
        Error::ImproperSpecialForm {
            form: form.to_owned(),
            message: message.into(),
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::Parse(error)
    }
}

pub mod ast;
pub mod environment;
pub mod evaluator;
pub mod libs;
pub mod options;
pub mod parser;
pub mod printer;

#[cfg(feature = "import")]
pub mod import;

pub use evaluator::Interpreter;
pub use options::Options;

/// Parse and evaluate a whole program, returning the value of its last form.
///
/// Each call builds a fresh interpreter and root environment.
pub fn evaluate(source: &str, options: &Options) -> Result<Value, Error> {
    let program = parser::parse(source)?;
    Interpreter::new(options)?.eval_program(&program)
}

/// Host-boundary variant of [`evaluate`] that never fails.
///
/// Returns the printed result, an empty string for an unspecified result,
/// the printed payload of a `raise`, or `"Error: <message>"`.
pub fn evaluate_to_string(source: &str, options: &Options) -> String {
    result_to_string(evaluate(source, options))
}

pub(crate) fn result_to_string(result: Result<Value, Error>) -> String {
    match result {
        Ok(Value::Unspecified) => String::new(),
        Ok(value) => printer::stringify(&value),
        Err(Error::Raised(value)) => printer::stringify(&value),
        Err(err) => format!("Error: {err}"),
    }
}

/// Evaluate a program after splicing in every top-level `(import "...")` form.
///
/// Imports are resolved before any form is evaluated; the outcome is handed
/// to `callback`.
#[cfg(feature = "import")]
pub fn evaluate_with_imports<F>(
    source: &str,
    options: &Options,
    resolver: &mut dyn import::ImportResolver,
    callback: F,
) where
    F: FnOnce(Result<Value, Error>),
{
    let result = parser::parse(source)
        .and_then(|program| import::resolve_imports(program, resolver))
        .and_then(|program| Interpreter::new(options)?.eval_program(&program));
    callback(result);
}
