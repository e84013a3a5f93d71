//! Engine entry point: host configuration and the `calculate` call
//!
//! The engine owns the environment (so natives registered at the root frame
//! persist across calculations) and the collator built from the host's
//! locale. `calculate` collects lexical, syntax, and runtime errors into the
//! outcome instead of propagating them; only host setup problems (a bad
//! locale tag, missing collation data) surface as `anyhow` errors.

use crate::parser::ast::{Program, Value};
use crate::parser::environment::{Environment, FunctionDef};
use crate::parser::error::FormCalcError;
use crate::parser::evaluator::Evaluator;
use crate::parser::statement_parser;
use anyhow::Context;
use icu_collator::{Collator, CollatorOptions};
use icu_locid::Locale;
use std::rc::Rc;

/// Outcome of one calculation.
#[derive(Debug)]
pub struct Calculation {
    /// The parsed tree, present whenever the parse succeeded.
    pub program: Option<Program>,
    pub errors: Vec<FormCalcError>,
    /// The final value; absent for an empty program or on any error.
    pub value: Option<Value>,
}

impl Calculation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Engine {
    env: Environment,
    collator: Collator,
}

impl Engine {
    /// An engine with root (locale-independent) collation.
    pub fn new() -> anyhow::Result<Self> {
        Self::build(Locale::default())
    }

    /// An engine whose string comparisons follow the given BCP-47 locale.
    pub fn with_locale(tag: &str) -> anyhow::Result<Self> {
        let locale: Locale = tag
            .parse()
            .ok()
            .with_context(|| format!("invalid locale tag \"{}\"", tag))?;
        Self::build(locale)
    }

    fn build(locale: Locale) -> anyhow::Result<Self> {
        let collator = Collator::try_new(&locale.clone().into(), CollatorOptions::new())
            .map_err(|e| anyhow::anyhow!("no collation data for \"{}\": {}", locale, e))?;
        Ok(Engine {
            env: Environment::new(),
            collator,
        })
    }

    /// Install a native function in the root frame. Natives survive the
    /// per-calculation reset and shadow same-named user definitions, since
    /// function lookup checks the root frame first.
    pub fn register_function<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<Option<Value>> + 'static,
    {
        self.env.register_function(
            name,
            FunctionDef::Native {
                callback: Rc::new(callback),
            },
            Some(0),
        );
    }

    /// Tokenize, parse, and evaluate one source text.
    pub fn calculate(&mut self, source: &str) -> Calculation {
        let program = match statement_parser::parse(source) {
            Ok(program) => program,
            Err(error) => {
                return Calculation {
                    program: None,
                    errors: vec![error],
                    value: None,
                };
            }
        };

        let result = Evaluator::new(&mut self.env, &self.collator).eval_program(&program);
        match result {
            Ok(value) => Calculation {
                program: Some(program),
                errors: Vec::new(),
                value,
            },
            Err(error) => Calculation {
                program: Some(program),
                errors: vec![error],
                value: None,
            },
        }
    }
}
