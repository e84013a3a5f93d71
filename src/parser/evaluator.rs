//! Tree-walking evaluator for FormCalc
//!
//! Expression evaluation yields `Option<Value>`: `None` is the absent
//! result (an empty function body, an empty program), distinct from
//! `Value::Null`. Statements yield a [`ControlFlow`] signal that loop and
//! function boundaries inspect; `exit` and `throw` unwind on the error
//! channel so they can cross expression boundaries.
//!
//! Every scope boundary pops its frame on the way out, normal or not, and
//! forwards the frame's current value to the enclosing frame (an absent
//! value forwards nothing). That is what makes a value poked right before
//! `break` become the loop's result, and a value poked before `exit` the
//! program's result.

use crate::parser::ast::{
    Accessor, BinaryOp, Container, ContainerIndex, Direction, Expression, Program, Statement,
    UnaryOp, Value,
};
use crate::parser::environment::{
    AccessorPath, ContextKind, ContextTag, Environment, FunctionDef, PathSegment, SegmentKind,
};
use crate::parser::error::FormCalcError;
use icu_collator::Collator;
use std::cmp::Ordering;

/// Statement-level control flow signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return,
}

/// Non-local exits that cross expression boundaries.
pub(crate) enum Unwind {
    /// `exit`: terminate the program, keeping the current value.
    Exit,
    Error(FormCalcError),
}

impl From<FormCalcError> for Unwind {
    fn from(error: FormCalcError) -> Self {
        Unwind::Error(error)
    }
}

type EvalResult<T> = Result<T, Unwind>;

/// Promote a value to a number: finite numbers pass, non-finite collapse to
/// zero, text parses its longest leading float prefix, everything else is
/// zero.
pub fn promote_any(value: &Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => {
            if n.is_finite() {
                *n
            } else {
                0.0
            }
        }
        Some(Value::Text(s)) => parse_leading_float(s),
        _ => 0.0,
    }
}

/// Like [`promote_any`], but null and absent pass through as `None`.
pub fn promote_non_null(value: &Option<Value>) -> Option<f64> {
    if is_nullish(value) {
        None
    } else {
        Some(promote_any(value))
    }
}

fn is_nullish(value: &Option<Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Longest leading float prefix of the text, else zero. `"10abc"` is 10,
/// `"abc"` is 0.
fn parse_leading_float(text: &str) -> f64 {
    let chars: Vec<char> = text.trim_start().chars().collect();
    let mut i = 0;
    if matches!(chars.first(), Some('+') | Some('-')) {
        i += 1;
    }
    let mut has_digits = false;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        has_digits = true;
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        let after_dot = i + 1;
        let mut j = after_dot;
        while chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
            j += 1;
        }
        if has_digits || j > after_dot {
            has_digits = has_digits || j > after_dot;
            i = j;
        }
    }
    if has_digits && matches!(chars.get(i), Some('e') | Some('E')) {
        let signed = matches!(chars.get(i + 1), Some('+') | Some('-'));
        let digit_at = i + if signed { 2 } else { 1 };
        if chars.get(digit_at).is_some_and(|c| c.is_ascii_digit()) {
            let mut j = digit_at;
            while chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
                j += 1;
            }
            i = j;
        }
    }
    if !has_digits {
        return 0.0;
    }
    let prefix: String = chars[..i].iter().collect();
    prefix.parse::<f64>().unwrap_or(0.0)
}

/// General truthiness, used by `while` conditions: null and absent are
/// false, numbers must be non-zero and non-NaN, text must be non-empty,
/// collections and function references are true.
fn is_truthy(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Number(n)) => *n != 0.0 && !n.is_nan(),
        Some(Value::Text(s)) => !s.is_empty(),
        Some(Value::Function(_)) | Some(Value::Collection(_)) => true,
    }
}

/// An `if` condition only takes a branch for a non-zero, non-NaN number.
fn is_branch_condition(value: &Option<Value>) -> bool {
    matches!(value, Some(Value::Number(n)) if *n != 0.0 && !n.is_nan())
}

fn bool_value(b: bool) -> Option<Value> {
    Some(Value::Number(if b { 1.0 } else { 0.0 }))
}

pub struct Evaluator<'a> {
    env: &'a mut Environment,
    collator: &'a Collator,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a mut Environment, collator: &'a Collator) -> Self {
        Evaluator { env, collator }
    }

    /// Evaluate a whole program in a fresh top-level scope. The result is
    /// whatever the current-value stack holds at the end, even when `exit`
    /// cut the run short.
    pub fn eval_program(&mut self, program: &Program) -> Result<Option<Value>, FormCalcError> {
        self.env.reset();
        let scope = self.env.depth();
        match self.eval_statements(&program.statements) {
            Ok(_) | Err(Unwind::Exit) => self.env.pop_to(scope),
            Err(Unwind::Error(error)) => Err(error),
        }
    }

    fn eval_statements(&mut self, statements: &[Statement]) -> EvalResult<ControlFlow> {
        for statement in statements {
            match self.eval_statement(statement)? {
                ControlFlow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn eval_statement(&mut self, statement: &Statement) -> EvalResult<ControlFlow> {
        match statement {
            Statement::Expression(expr) => {
                let value = self.eval_expression(expr)?;
                self.env.poke(value);
                Ok(ControlFlow::Normal)
            }
            Statement::VarDecl { name, init } => {
                let value = match init {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Some(Value::text("")),
                };
                self.env
                    .set_variable(name, value.clone(), Some(self.env.depth()));
                self.env.poke(value);
                Ok(ControlFlow::Normal)
            }
            Statement::FuncDecl { name, params, body } => {
                self.env.register_function(
                    name,
                    FunctionDef::User {
                        params: params.clone(),
                        body: body.clone(),
                    },
                    None,
                );
                Ok(ControlFlow::Normal)
            }
            Statement::Block(body) => self.eval_scoped(body),
            Statement::If {
                condition,
                then_branch,
                elseifs,
                else_branch,
            } => self.eval_if(condition, then_branch, elseifs, else_branch.as_deref()),
            Statement::While { condition, body } => {
                self.env.push(ContextTag::While);
                let result = self.run_while(condition, body);
                self.forward_scope(result)
            }
            Statement::For {
                declares,
                name,
                start,
                direction,
                end,
                step,
                body,
            } => {
                let scope = self.env.push(ContextTag::For);
                let result =
                    self.run_for(*declares, name, start, *direction, end, step.as_ref(), body, scope);
                self.forward_scope(result)
            }
            Statement::ForEach { name, args, body } => {
                let scope = self.env.push(ContextTag::Foreach);
                let result = self.run_foreach(name, args, body, scope);
                self.forward_scope(result)
            }
            Statement::Break => {
                if self.env.in_context(ContextKind::Loop) {
                    Ok(ControlFlow::Break)
                } else {
                    Err(FormCalcError::structural("break outside of loop".to_string()).into())
                }
            }
            Statement::Continue => {
                if self.env.in_context(ContextKind::Loop) {
                    Ok(ControlFlow::Continue)
                } else {
                    Err(FormCalcError::structural("continue outside of loop".to_string()).into())
                }
            }
            Statement::Return => {
                if self.env.in_context(ContextKind::Function) {
                    Ok(ControlFlow::Return)
                } else {
                    Err(FormCalcError::structural("return outside of function".to_string()).into())
                }
            }
            Statement::Exit => Err(Unwind::Exit),
            Statement::Throw(expr) => {
                let payload = self.eval_expression(expr)?;
                Err(FormCalcError::user_throw(payload).into())
            }
        }
    }

    /// Pop the current frame and forward its value to the enclosing frame,
    /// on the normal path and on any unwind alike.
    fn forward_scope(&mut self, result: EvalResult<ControlFlow>) -> EvalResult<ControlFlow> {
        let value = self.env.pop()?;
        self.env.poke(value);
        result
    }

    /// Run a statement list in its own block frame.
    fn eval_scoped(&mut self, body: &[Statement]) -> EvalResult<ControlFlow> {
        self.env.push(ContextTag::Block);
        let result = self.eval_statements(body);
        self.forward_scope(result)
    }

    fn eval_if(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        elseifs: &[(Expression, Vec<Statement>)],
        else_branch: Option<&[Statement]>,
    ) -> EvalResult<ControlFlow> {
        let value = self.eval_expression(condition)?;
        if is_branch_condition(&value) {
            return self.eval_scoped(then_branch);
        }
        for (condition, branch) in elseifs {
            let value = self.eval_expression(condition)?;
            if is_branch_condition(&value) {
                return self.eval_scoped(branch);
            }
        }
        if let Some(branch) = else_branch {
            return self.eval_scoped(branch);
        }
        Ok(ControlFlow::Normal)
    }

    /// Loop inside an already-pushed While frame; the caller pops it.
    fn run_while(&mut self, condition: &Expression, body: &[Statement]) -> EvalResult<ControlFlow> {
        loop {
            let value = self.eval_expression(condition)?;
            if !is_truthy(&value) {
                return Ok(ControlFlow::Normal);
            }
            match self.eval_statements(body)? {
                ControlFlow::Normal | ControlFlow::Continue => {}
                ControlFlow::Break => return Ok(ControlFlow::Normal),
                ControlFlow::Return => return Ok(ControlFlow::Return),
            }
        }
    }

    /// Loop inside an already-pushed For frame; the caller pops it.
    #[allow(clippy::too_many_arguments)]
    fn run_for(
        &mut self,
        declares: bool,
        name: &str,
        start: &Expression,
        direction: Direction,
        end: &Expression,
        step: Option<&Expression>,
        body: &[Statement],
        scope: usize,
    ) -> EvalResult<ControlFlow> {
        let start_value = self.eval_expression(start)?;
        let mut iterator = promote_any(&start_value);

        let step_value = match step {
            Some(expr) => {
                let value = self.eval_expression(expr)?;
                let step_value = promote_any(&value);
                match direction {
                    Direction::UpTo if step_value <= 0.0 => {
                        return Err(FormCalcError::directional_step(
                            "for loop 'upto' step must be a positive value".to_string(),
                        )
                        .into());
                    }
                    Direction::DownTo if step_value >= 0.0 => {
                        return Err(FormCalcError::directional_step(
                            "for loop 'downto' step must be a negative value".to_string(),
                        )
                        .into());
                    }
                    _ => step_value,
                }
            }
            None => match direction {
                Direction::UpTo => 1.0,
                Direction::DownTo => -1.0,
            },
        };

        // With `var` the iterator is bound at the loop frame; without it the
        // write goes through to an enclosing binding (or creates one here).
        let forced = if declares { Some(scope) } else { None };
        self.env
            .set_variable(name, Some(Value::Number(iterator)), forced);

        loop {
            // The end expression may have side effects, so it runs per pass.
            let end_value = self.eval_expression(end)?;
            let limit = promote_any(&end_value);
            let proceed = match direction {
                Direction::UpTo => iterator <= limit,
                Direction::DownTo => iterator >= limit,
            };
            if !proceed {
                return Ok(ControlFlow::Normal);
            }
            match self.eval_statements(body)? {
                ControlFlow::Normal | ControlFlow::Continue => {
                    iterator += step_value;
                    self.env
                        .set_variable(name, Some(Value::Number(iterator)), None);
                }
                ControlFlow::Break => return Ok(ControlFlow::Normal),
                ControlFlow::Return => return Ok(ControlFlow::Return),
            }
        }
    }

    /// Loop inside an already-pushed Foreach frame; the caller pops it.
    fn run_foreach(
        &mut self,
        name: &str,
        args: &[Expression],
        body: &[Statement],
        scope: usize,
    ) -> EvalResult<ControlFlow> {
        self.env
            .set_variable(name, Some(Value::text("")), Some(scope));

        // Arguments evaluate eagerly; collections flatten one level and
        // absent results contribute no iteration at all.
        let mut items = Vec::new();
        for arg in args {
            match self.eval_expression(arg)? {
                None => {}
                Some(Value::Collection(members)) => items.extend(members),
                Some(value) => items.push(value),
            }
        }

        for item in items {
            self.env.set_variable(name, Some(item), None);
            match self.eval_statements(body)? {
                ControlFlow::Normal | ControlFlow::Continue => {}
                ControlFlow::Break => return Ok(ControlFlow::Normal),
                ControlFlow::Return => return Ok(ControlFlow::Return),
            }
        }
        Ok(ControlFlow::Normal)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_expression(&mut self, expr: &Expression) -> EvalResult<Option<Value>> {
        match expr {
            Expression::Literal(value) => Ok(Some(value.clone())),
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expression(lhs)?;
                let rhs = self.eval_expression(rhs)?;
                Ok(self.apply_binary(*op, lhs, rhs)?)
            }
            Expression::Unary { op, operand } => {
                let value = self.eval_expression(operand)?;
                Ok(apply_unary(*op, value))
            }
            Expression::Call { name, args } => self.eval_call(name, args),
            Expression::Reference {
                accessor,
                all_children,
            } => {
                let path = self.build_path(accessor, *all_children)?;
                Ok(self.env.get_path(&path)?)
            }
            Expression::Assign { target, value } => {
                // Right-hand side first, then the store.
                let value = self.eval_expression(value)?;
                let path = self.build_path(target, false)?;
                self.env.set_path(&path, value.clone())?;
                Ok(value)
            }
        }
    }

    fn apply_binary(
        &self,
        op: BinaryOp,
        lhs: Option<Value>,
        rhs: Option<Value>,
    ) -> Result<Option<Value>, FormCalcError> {
        match op {
            BinaryOp::Or | BinaryOp::And | BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul
            | BinaryOp::Div => {
                if is_nullish(&lhs) && is_nullish(&rhs) {
                    return Ok(Some(Value::Null));
                }
                let a = promote_any(&lhs);
                let b = promote_any(&rhs);
                let result = match op {
                    BinaryOp::Or => return Ok(bool_value(a != 0.0 || b != 0.0)),
                    BinaryOp::And => return Ok(bool_value(a != 0.0 && b != 0.0)),
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => {
                        // The promoted divisor decides: /0, /false, /null,
                        // /nan, /infinity all land here.
                        if b == 0.0 {
                            return Err(FormCalcError::divide_by_zero());
                        }
                        a / b
                    }
                    _ => unreachable!(),
                };
                Ok(Some(Value::Number(result)))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = match (&lhs, &rhs) {
                    (Some(Value::Text(a)), Some(Value::Text(b))) => {
                        self.collator.compare(a, b) == Ordering::Equal
                    }
                    _ => match (promote_non_null(&lhs), promote_non_null(&rhs)) {
                        (None, None) => true,
                        (None, _) | (_, None) => false,
                        (Some(a), Some(b)) => a == b,
                    },
                };
                Ok(bool_value(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Le | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Gt => {
                let ordering = match (&lhs, &rhs) {
                    (Some(Value::Text(a)), Some(Value::Text(b))) => self.collator.compare(a, b),
                    _ => {
                        // Null orders as zero.
                        let a = promote_non_null(&lhs).unwrap_or(0.0);
                        let b = promote_non_null(&rhs).unwrap_or(0.0);
                        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                    }
                };
                let result = match op {
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Ge => ordering != Ordering::Less,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => unreachable!(),
                };
                Ok(bool_value(result))
            }
        }
    }

    fn eval_call(&mut self, name: &str, args: &[Expression]) -> EvalResult<Option<Value>> {
        let def = self.env.find_function(name)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg)?);
        }

        match def {
            FunctionDef::Native { callback } => {
                let host_args: Vec<Value> = values
                    .into_iter()
                    .map(|v| v.unwrap_or(Value::Null))
                    .collect();
                match callback(&host_args) {
                    Ok(value) => Ok(value),
                    Err(error) => Err(FormCalcError::host_function(name, &error).into()),
                }
            }
            FunctionDef::User { params, body } => {
                if values.len() != params.len() {
                    return Err(
                        FormCalcError::arity_mismatch(name, params.len(), values.len()).into(),
                    );
                }
                let scope = self.env.push(ContextTag::Function);
                for (param, value) in params.iter().zip(values) {
                    self.env.set_variable(param, value, Some(scope));
                }
                // Break/continue never surface here: the function frame makes
                // them structural errors at their own statement. Return just
                // completes the call.
                let result = self.eval_statements(&body);
                let value = self.env.pop()?;
                match result {
                    Ok(_) => Ok(value),
                    Err(unwind) => {
                        // An exit or throw crossing the call still forwards
                        // the body's value to the caller's frame.
                        self.env.poke(value);
                        Err(unwind)
                    }
                }
            }
        }
    }

    /// Evaluate an accessor into an addressing path: method-call arguments
    /// and index expressions run now, resolution is the environment's job.
    fn build_path(
        &mut self,
        accessor: &Accessor,
        all_children: bool,
    ) -> EvalResult<AccessorPath> {
        let mut segments = Vec::with_capacity(1 + accessor.rest.len());
        segments.push(PathSegment {
            separator: None,
            kind: self.eval_container(&accessor.first)?,
        });
        for (separator, container) in &accessor.rest {
            segments.push(PathSegment {
                separator: Some(*separator),
                kind: self.eval_container(container)?,
            });
        }
        Ok(AccessorPath {
            segments,
            all_children,
        })
    }

    fn eval_container(&mut self, container: &Container) -> EvalResult<SegmentKind> {
        match container {
            Container::Name(name) => Ok(SegmentKind::Name(name.clone())),
            Container::Indexed { name, index } => {
                let index = match index {
                    ContainerIndex::All => None,
                    ContainerIndex::At(expr) => {
                        let value = self.eval_expression(expr)?;
                        Some(value.unwrap_or(Value::Null))
                    }
                };
                Ok(SegmentKind::Index {
                    name: name.clone(),
                    index,
                })
            }
            Container::MethodCall { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    let value = self.eval_expression(arg)?;
                    values.push(value.unwrap_or(Value::Null));
                }
                Ok(SegmentKind::Call {
                    name: name.clone(),
                    args: values,
                })
            }
        }
    }
}

fn apply_unary(op: UnaryOp, value: Option<Value>) -> Option<Value> {
    match op {
        UnaryOp::Neg | UnaryOp::Pos if is_nullish(&value) => Some(Value::Null),
        UnaryOp::Neg => Some(Value::Number(-promote_any(&value))),
        UnaryOp::Pos => Some(Value::Number(promote_any(&value))),
        UnaryOp::Not => bool_value(promote_any(&value) == 0.0),
    }
}
