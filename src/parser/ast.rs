//! Syntax tree and runtime values for FormCalc

use std::fmt;

/// A parsed calculation: a sequence of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            statements: Vec::new(),
        }
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Iteration direction of a `for` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    UpTo,
    DownTo,
}

/// Accessor separators: `.` (child), `..` (descendant), `.#` (class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Child,
    Descendant,
    Class,
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Separator::Child => write!(f, "."),
            Separator::Descendant => write!(f, ".."),
            Separator::Class => write!(f, ".#"),
        }
    }
}

/// Index inside an indexed container: `name[*]` or `name[expr]`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerIndex {
    All,
    At(Box<Expression>),
}

/// One link of an accessor chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    Name(String),
    Indexed {
        name: String,
        index: ContainerIndex,
    },
    MethodCall {
        name: String,
        args: Vec<Expression>,
    },
}

impl Container {
    pub fn name(&self) -> &str {
        match self {
            Container::Name(name) => name,
            Container::Indexed { name, .. } => name,
            Container::MethodCall { name, .. } => name,
        }
    }
}

/// An accessor chain: a first container followed by separated containers.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub first: Container,
    pub rest: Vec<(Separator, Container)>,
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first.name())?;
        for (separator, container) in &self.rest {
            write!(f, "{}{}", separator, container.name())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Le => "le",
            BinaryOp::Ge => "ge",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    /// Accessor read; `all_children` is the trailing `.*`.
    Reference {
        accessor: Accessor,
        all_children: bool,
    },
    /// `accessor = simple-expression`
    Assign {
        target: Accessor,
        value: Box<Expression>,
    },
}

impl Expression {
    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn number(value: f64) -> Self {
        Expression::Literal(Value::Number(value))
    }

}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    /// `var name [= init]`
    VarDecl {
        name: String,
        init: Option<Expression>,
    },
    /// `func name(params) do body endfunc`
    FuncDecl {
        name: String,
        params: Vec<String>,
        body: Vec<Statement>,
    },
    /// `do ... end`
    Block(Vec<Statement>),
    If {
        condition: Expression,
        then_branch: Vec<Statement>,
        elseifs: Vec<(Expression, Vec<Statement>)>,
        else_branch: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        declares: bool,
        name: String,
        start: Expression,
        direction: Direction,
        end: Expression,
        step: Option<Expression>,
        body: Vec<Statement>,
    },
    ForEach {
        name: String,
        args: Vec<Expression>,
        body: Vec<Statement>,
    },
    Break,
    Continue,
    Return,
    Exit,
    Throw(Expression),
}

/// A runtime value. `Function` is a by-name function reference; hosts can
/// hand these back from native calls.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Function(String),
    Collection(Vec<Value>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Collection(a), Value::Collection(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => {
                if n.is_nan() {
                    write!(f, "nan")
                } else if n.is_infinite() {
                    write!(f, "{}infinity", if *n < 0.0 { "-" } else { "" })
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
            Value::Function(name) => write!(f, "<func {}>", name),
            Value::Collection(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(100.0).to_string(), "100");
        assert_eq!(Value::Number(6.8).to_string(), "6.8");
        assert_eq!(Value::Number(-230.0).to_string(), "-230");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::text("foo").to_string(), "foo");
    }

    #[test]
    fn test_accessor_display() {
        let chained = Accessor {
            first: Container::Name("a".to_string()),
            rest: vec![(Separator::Child, Container::Name("b".to_string()))],
        };
        assert_eq!(chained.to_string(), "a.b");
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(1.0), Value::text("1"));
        assert_eq!(Value::Null, Value::Null);
    }
}
