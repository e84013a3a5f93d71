//! FormCalc language pipeline: lexer, parser, environment, evaluator.

pub mod ast;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod statement_parser;


pub use ast::{Accessor, BinaryOp, Expression, Program, Statement, UnaryOp, Value};
pub use environment::{
    AccessorPath, ContextKind, ContextTag, Environment, FunctionDef, NativeCallback,
};
pub use error::{ErrorKind, FormCalcError};
pub use evaluator::{ControlFlow, Evaluator};
pub use lexer::{Lexer, Span, SpannedToken, Token};
pub use statement_parser::{parse, StatementParser};
