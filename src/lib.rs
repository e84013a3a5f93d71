//! # FormCalc Core
//!
//! Tokenizer, parser, and tree-walking evaluator for the FormCalc
//! calculation language: case-insensitive keywords, case-sensitive
//! variables, scoped symbol tables with root-first function lookup, and
//! locale-aware string comparison.
//!
//! ## Example
//!
//! ```ignore
//! use formcalc_core::Engine;
//!
//! let mut engine = Engine::with_locale("de")?;
//! let outcome = engine.calculate("2 * 3 + 4 / 5");
//! assert_eq!(outcome.value.unwrap().to_string(), "6.8");
//! ```

pub mod engine;
pub mod parser;

// Re-export the host-facing surface
pub use engine::{Calculation, Engine};
pub use parser::{ErrorKind, FormCalcError, Program, Value};
