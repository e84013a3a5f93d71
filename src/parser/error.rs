use crate::parser::ast::Value;
use crate::parser::lexer::Span;
use std::fmt;

/// Classification of everything that can go wrong while tokenizing, parsing,
/// or evaluating a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input at the character level (bad escape, stray character).
    Lexical,
    /// The token stream does not match the grammar.
    Syntax,
    /// Variable or function lookup miss.
    NameNotFound,
    /// A user function was called with the wrong number of arguments.
    ArityMismatch,
    /// The divisor promoted to zero.
    DivideByZero,
    /// `break`/`continue` outside a loop, or `return` outside a function.
    StructuralContext,
    /// An explicit `for` step whose sign contradicts the loop direction.
    DirectionalStep,
    /// A `throw` expression raised by the calculation itself.
    UserThrow,
    /// A host-registered native function reported a failure.
    HostFunction,
}

#[derive(Debug, Clone)]
pub struct FormCalcError {
    pub kind: ErrorKind,
    pub message: String,
    /// Source position, when the failure maps to one (lex/parse errors do).
    pub span: Option<Span>,
    /// The thrown value, for `UserThrow`.
    pub payload: Option<Value>,
}

impl FormCalcError {
    pub fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            span: None,
            payload: None,
        }
    }

    pub fn with_span(kind: ErrorKind, message: String, span: Span) -> Self {
        Self {
            kind,
            message,
            span: Some(span),
            payload: None,
        }
    }

    pub fn lexical(message: String, span: Span) -> Self {
        Self::with_span(ErrorKind::Lexical, message, span)
    }

    pub fn syntax(message: String, span: Span) -> Self {
        Self::with_span(ErrorKind::Syntax, message, span)
    }

    pub fn variable_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NameNotFound,
            format!("variable \"{}\" not found", name),
        )
    }

    pub fn function_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NameNotFound,
            format!("function \"{}\" not found", name),
        )
    }

    pub fn arity_mismatch(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!(
                "function \"{}\" expects {} parameters but called with {} arguments",
                name, expected, got
            ),
        )
    }

    pub fn divide_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "divide by zero".to_string())
    }

    pub fn structural(message: String) -> Self {
        Self::new(ErrorKind::StructuralContext, message)
    }

    pub fn directional_step(message: String) -> Self {
        Self::new(ErrorKind::DirectionalStep, message)
    }

    pub fn user_throw(payload: Option<Value>) -> Self {
        let message = match &payload {
            Some(value) => format!("thrown: {}", value),
            None => "thrown".to_string(),
        };
        Self {
            kind: ErrorKind::UserThrow,
            message,
            span: None,
            payload,
        }
    }

    pub fn host_function(name: &str, source: &anyhow::Error) -> Self {
        Self::new(
            ErrorKind::HostFunction,
            format!("function \"{}\" failed: {:#}", name, source),
        )
    }
}

impl fmt::Display for FormCalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "Error at {}: {}", span, self.message),
            None => write!(f, "Error: {}", self.message),
        }
    }
}

impl std::error::Error for FormCalcError {}
