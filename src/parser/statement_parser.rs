//! Statement parser for FormCalc calculations
//!
//! Recursive descent over the token stream with one or two tokens of
//! lookahead and no backtracking:
//! - identifier followed by `(` begins a function call
//! - after an accessor chain, `=` begins an assignment whose right side is a
//!   full simple expression, so `1 + b = 2` parses as `1 + (b = 2)`
//! - inside a chain, the token after a name decides between a method call
//!   (`(`), an indexed container (`[`), and a bare name
//!
//! Binary operators form a ladder of left-associative levels, loosest first:
//! or, and, equality, relational, additive, multiplicative, unary, primary.

use crate::parser::ast::{
    Accessor, BinaryOp, Container, ContainerIndex, Direction, Expression, Program, Separator,
    Statement, UnaryOp, Value,
};
use crate::parser::error::FormCalcError;
use crate::parser::lexer::{Lexer, Span, SpannedToken, Token};

/// Parse a source text into a program.
pub fn parse(input: &str) -> Result<Program, FormCalcError> {
    StatementParser::new(input)?.parse_program()
}

/// Parses statements and programs (sequences of statements)
pub struct StatementParser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl StatementParser {
    /// Create a new statement parser from input string
    pub fn new(input: &str) -> Result<Self, FormCalcError> {
        let tokens = Lexer::new(input).tokenize_spanned()?;
        Ok(StatementParser {
            tokens,
            position: 0,
        })
    }

    /// Current token
    fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|st| &st.token)
            .unwrap_or(&Token::Eof)
    }

    /// Current span (position in source)
    fn current_span(&self) -> Span {
        self.tokens
            .get(self.position)
            .map(|st| st.span)
            .unwrap_or_default()
    }

    /// Peek at the token after the current one
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position + 1)
            .map(|st| &st.token)
            .unwrap_or(&Token::Eof)
    }

    /// Advance to the next token
    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    /// Check if current token matches (without consuming)
    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn check_any(&self, tokens: &[Token]) -> bool {
        tokens.iter().any(|t| self.check(t))
    }

    /// Expect a specific token
    fn expect(&mut self, expected: &Token) -> Result<(), FormCalcError> {
        if self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(FormCalcError::syntax(
                format!("expected {:?}, found {:?}", expected, self.current()),
                self.current_span(),
            ))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, FormCalcError> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(FormCalcError::syntax(
                format!("expected a name {}, found {:?}", context, other),
                self.current_span(),
            )),
        }
    }

    /// Parse a complete program (sequence of statements)
    pub fn parse_program(&mut self) -> Result<Program, FormCalcError> {
        let mut program = Program::new();
        while !self.check(&Token::Eof) {
            program.push(self.parse_statement()?);
        }
        Ok(program)
    }

    /// Statements up to (not consuming) one of the construct's terminators.
    fn parse_statement_list(
        &mut self,
        terminators: &[Token],
    ) -> Result<Vec<Statement>, FormCalcError> {
        let mut statements = Vec::new();
        while !self.check(&Token::Eof) && !self.check_any(terminators) {
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    /// Parse a single statement
    pub fn parse_statement(&mut self) -> Result<Statement, FormCalcError> {
        match self.current() {
            Token::If => self.parse_if_statement(),
            Token::While => self.parse_while_statement(),
            Token::For => self.parse_for_statement(),
            Token::ForEach => self.parse_foreach_statement(),
            Token::Do => self.parse_block_statement(),
            Token::Var => self.parse_var_statement(),
            Token::Func => self.parse_func_statement(),
            Token::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            Token::Continue => {
                self.advance();
                Ok(Statement::Continue)
            }
            Token::Return => {
                self.advance();
                Ok(Statement::Return)
            }
            Token::Exit => {
                self.advance();
                Ok(Statement::Exit)
            }
            Token::Throw => {
                self.advance();
                let payload = self.parse_simple_expression()?;
                Ok(Statement::Throw(payload))
            }
            _ => {
                let expr = self.parse_simple_expression()?;
                Ok(Statement::Expression(expr))
            }
        }
    }

    /// Parse: if ( cond ) then ... [elseif ( cond ) then ...]* [else ...] endif
    fn parse_if_statement(&mut self) -> Result<Statement, FormCalcError> {
        const BRANCH_ENDS: &[Token] = &[Token::ElseIf, Token::Else, Token::EndIf];

        self.expect(&Token::If)?;
        self.expect(&Token::LeftParen)?;
        let condition = self.parse_simple_expression()?;
        self.expect(&Token::RightParen)?;
        self.expect(&Token::Then)?;
        let then_branch = self.parse_statement_list(BRANCH_ENDS)?;

        let mut elseifs = Vec::new();
        while self.check(&Token::ElseIf) {
            self.advance();
            self.expect(&Token::LeftParen)?;
            let condition = self.parse_simple_expression()?;
            self.expect(&Token::RightParen)?;
            self.expect(&Token::Then)?;
            let branch = self.parse_statement_list(BRANCH_ENDS)?;
            elseifs.push((condition, branch));
        }

        let else_branch = if self.check(&Token::Else) {
            self.advance();
            Some(self.parse_statement_list(&[Token::EndIf])?)
        } else {
            None
        };
        self.expect(&Token::EndIf)?;

        Ok(Statement::If {
            condition,
            then_branch,
            elseifs,
            else_branch,
        })
    }

    /// Parse: while ( cond ) do ... endwhile
    fn parse_while_statement(&mut self) -> Result<Statement, FormCalcError> {
        self.expect(&Token::While)?;
        self.expect(&Token::LeftParen)?;
        let condition = self.parse_simple_expression()?;
        self.expect(&Token::RightParen)?;
        self.expect(&Token::Do)?;
        let body = self.parse_statement_list(&[Token::EndWhile])?;
        self.expect(&Token::EndWhile)?;

        Ok(Statement::While { condition, body })
    }

    /// Parse: for [var] name = start (upto|downto) end [step s] do ... endfor
    fn parse_for_statement(&mut self) -> Result<Statement, FormCalcError> {
        self.expect(&Token::For)?;
        let declares = if self.check(&Token::Var) {
            self.advance();
            true
        } else {
            false
        };
        let name = self.expect_identifier("after 'for'")?;
        self.expect(&Token::Equals)?;
        let start = self.parse_simple_expression()?;

        let direction = match self.current() {
            Token::UpTo => Direction::UpTo,
            Token::DownTo => Direction::DownTo,
            other => {
                return Err(FormCalcError::syntax(
                    format!("expected 'upto' or 'downto', found {:?}", other),
                    self.current_span(),
                ));
            }
        };
        self.advance();
        let end = self.parse_simple_expression()?;

        let step = if self.check(&Token::Step) {
            self.advance();
            Some(self.parse_simple_expression()?)
        } else {
            None
        };

        self.expect(&Token::Do)?;
        let body = self.parse_statement_list(&[Token::EndFor])?;
        self.expect(&Token::EndFor)?;

        Ok(Statement::For {
            declares,
            name,
            start,
            direction,
            end,
            step,
            body,
        })
    }

    /// Parse: foreach name in ( args ) do ... endfor
    fn parse_foreach_statement(&mut self) -> Result<Statement, FormCalcError> {
        self.expect(&Token::ForEach)?;
        let name = self.expect_identifier("after 'foreach'")?;
        self.expect(&Token::In)?;
        self.expect(&Token::LeftParen)?;
        let args = self.parse_argument_list()?;
        self.expect(&Token::RightParen)?;
        self.expect(&Token::Do)?;
        let body = self.parse_statement_list(&[Token::EndFor])?;
        self.expect(&Token::EndFor)?;

        Ok(Statement::ForEach { name, args, body })
    }

    /// Parse: do ... end
    fn parse_block_statement(&mut self) -> Result<Statement, FormCalcError> {
        self.expect(&Token::Do)?;
        let body = self.parse_statement_list(&[Token::End])?;
        self.expect(&Token::End)?;
        Ok(Statement::Block(body))
    }

    /// Parse: var name [= init]
    fn parse_var_statement(&mut self) -> Result<Statement, FormCalcError> {
        self.expect(&Token::Var)?;
        let name = self.expect_identifier("after 'var'")?;
        let init = if self.check(&Token::Equals) {
            self.advance();
            Some(self.parse_simple_expression()?)
        } else {
            None
        };
        Ok(Statement::VarDecl { name, init })
    }

    /// Parse: func name ( params ) do ... endfunc
    fn parse_func_statement(&mut self) -> Result<Statement, FormCalcError> {
        self.expect(&Token::Func)?;
        let name = self.expect_identifier("after 'func'")?;
        self.expect(&Token::LeftParen)?;

        let mut params = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                params.push(self.expect_identifier("in parameter list")?);
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RightParen)?;

        self.expect(&Token::Do)?;
        let body = self.parse_statement_list(&[Token::EndFunc])?;
        self.expect(&Token::EndFunc)?;

        Ok(Statement::FuncDecl { name, params, body })
    }

    // ------------------------------------------------------------------
    // Expression ladder
    // ------------------------------------------------------------------

    /// Loosest level: `or` / `|`
    pub fn parse_simple_expression(&mut self) -> Result<Expression, FormCalcError> {
        let mut lhs = self.parse_logical_and()?;
        while self.check_any(&[Token::Or, Token::Pipe]) {
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expression::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    /// `and` / `&`
    fn parse_logical_and(&mut self) -> Result<Expression, FormCalcError> {
        let mut lhs = self.parse_equality()?;
        while self.check_any(&[Token::And, Token::Ampersand]) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expression::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    /// `eq` / `==` / `ne` / `<>`
    fn parse_equality(&mut self) -> Result<Expression, FormCalcError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.current() {
                Token::Eq | Token::EqualsEquals => BinaryOp::Eq,
                Token::Ne | Token::NotEquals => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// `le` / `ge` / `lt` / `gt` and their symbol forms
    fn parse_relational(&mut self) -> Result<Expression, FormCalcError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.current() {
                Token::Le | Token::LessEqual => BinaryOp::Le,
                Token::Ge | Token::GreaterEqual => BinaryOp::Ge,
                Token::Lt | Token::Less => BinaryOp::Lt,
                Token::Gt | Token::Greater => BinaryOp::Gt,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// `+` / `-`
    fn parse_additive(&mut self) -> Result<Expression, FormCalcError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// `*` / `/`
    fn parse_multiplicative(&mut self) -> Result<Expression, FormCalcError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// Prefix `-` / `+` / `not`
    fn parse_unary(&mut self) -> Result<Expression, FormCalcError> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            Token::Not => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expression::unary(op, operand))
    }

    fn parse_primary(&mut self) -> Result<Expression, FormCalcError> {
        match self.current().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expression::number(n))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expression::Literal(Value::Text(s)))
            }
            Token::Null => {
                self.advance();
                Ok(Expression::Literal(Value::Null))
            }
            Token::Nan => {
                self.advance();
                Ok(Expression::number(f64::NAN))
            }
            Token::Infinity => {
                self.advance();
                Ok(Expression::number(f64::INFINITY))
            }
            Token::True => {
                self.advance();
                Ok(Expression::number(1.0))
            }
            Token::False => {
                self.advance();
                Ok(Expression::number(0.0))
            }
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_simple_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(inner)
            }
            Token::Identifier(name) => {
                // Function call gate: a name directly followed by `(`.
                if self.peek() == &Token::LeftParen {
                    self.advance();
                    self.advance();
                    let args = self.parse_argument_list()?;
                    self.expect(&Token::RightParen)?;
                    Ok(Expression::Call { name, args })
                } else {
                    self.parse_accessor_expression()
                }
            }
            other => Err(FormCalcError::syntax(
                format!("expected an expression, found {:?}", other),
                self.current_span(),
            )),
        }
    }

    /// Accessor chain, then either an assignment or an optional `.*` suffix.
    fn parse_accessor_expression(&mut self) -> Result<Expression, FormCalcError> {
        let accessor = self.parse_accessor()?;

        if self.check(&Token::Equals) {
            self.advance();
            let value = self.parse_simple_expression()?;
            return Ok(Expression::Assign {
                target: accessor,
                value: Box::new(value),
            });
        }

        let all_children = if self.check(&Token::DotStar) {
            self.advance();
            true
        } else {
            false
        };
        Ok(Expression::Reference {
            accessor,
            all_children,
        })
    }

    fn parse_accessor(&mut self) -> Result<Accessor, FormCalcError> {
        let first = self.parse_container()?;
        let mut rest = Vec::new();
        loop {
            let separator = match self.current() {
                Token::Dot => Separator::Child,
                Token::DotDot => Separator::Descendant,
                Token::DotHash => Separator::Class,
                _ => break,
            };
            self.advance();
            let container = self.parse_container()?;
            rest.push((separator, container));
        }
        Ok(Accessor { first, rest })
    }

    /// One container: a name, `name(args)`, or `name[*]` / `name[expr]`.
    fn parse_container(&mut self) -> Result<Container, FormCalcError> {
        let name = self.expect_identifier("in accessor")?;
        match self.current() {
            Token::LeftParen => {
                self.advance();
                let args = self.parse_argument_list()?;
                self.expect(&Token::RightParen)?;
                Ok(Container::MethodCall { name, args })
            }
            Token::LeftBracket => {
                self.advance();
                let index = if self.check(&Token::Star) {
                    self.advance();
                    ContainerIndex::All
                } else {
                    ContainerIndex::At(Box::new(self.parse_simple_expression()?))
                };
                self.expect(&Token::RightBracket)?;
                Ok(Container::Indexed { name, index })
            }
            _ => Ok(Container::Name(name)),
        }
    }

    /// Comma-separated simple expressions, possibly empty; the caller owns
    /// the surrounding parentheses.
    fn parse_argument_list(&mut self) -> Result<Vec<Expression>, FormCalcError> {
        let mut args = Vec::new();
        if self.check(&Token::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_simple_expression()?);
            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{BinaryOp, Expression, Statement};

    fn single_expression(input: &str) -> Expression {
        let program = parse(input).unwrap();
        assert_eq!(program.statements.len(), 1, "expected one statement");
        match program.statements.into_iter().next().unwrap() {
            Statement::Expression(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_multiplicative_binds_tighter_than_additive() {
        // 2 * 3 + 4 => (2 * 3) + 4
        let expr = single_expression("2 * 3 + 4");
        match expr {
            Expression::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(
                    *lhs,
                    Expression::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_fold() {
        // 1 - 2 - 3 => (1 - 2) - 3
        let expr = single_expression("1 - 2 - 3");
        match expr {
            Expression::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::Sub);
                assert_eq!(*rhs, Expression::number(3.0));
                assert!(matches!(
                    *lhs,
                    Expression::Binary {
                        op: BinaryOp::Sub,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_assignment_binds_as_primary() {
        // 1 + b = 2 => 1 + (b = 2)
        let expr = single_expression("1 + b = 2");
        match expr {
            Expression::Binary { op, rhs, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(*rhs, Expression::Assign { .. }));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_relational_does_not_chain_into_not() {
        // `2 < 3 not 1 == 1` is two statements: `2 < 3` and `not 1 == 1`.
        let program = parse("2 < 3 not 1 == 1").unwrap();
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_call_gate() {
        assert!(matches!(
            single_expression("foo(1, 2)"),
            Expression::Call { .. }
        ));
        assert!(matches!(
            single_expression("foo"),
            Expression::Reference { .. }
        ));
    }

    #[test]
    fn test_accessor_chain() {
        // One leading container plus two (separator, container) pairs,
        // with the `.*` suffix marking the all-children reference.
        let expr = single_expression("a.b[2]..c(1).*");
        match expr {
            Expression::Reference {
                accessor,
                all_children,
            } => {
                assert!(all_children);
                assert_eq!(accessor.first, Container::Name("a".to_string()));
                assert_eq!(accessor.rest.len(), 2);
                assert_eq!(accessor.rest[0].0, Separator::Child);
                assert!(matches!(accessor.rest[0].1, Container::Indexed { .. }));
                assert_eq!(accessor.rest[1].0, Separator::Descendant);
                assert!(matches!(accessor.rest[1].1, Container::MethodCall { .. }));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_if_with_elseifs() {
        let program = parse(
            "if (1) then 1 elseif (2) then 2 elseif (3) then 3 else 4 endif",
        )
        .unwrap();
        match &program.statements[0] {
            Statement::If {
                elseifs,
                else_branch,
                ..
            } => {
                assert_eq!(elseifs.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_variants() {
        let program = parse("for var i = 0 upto 10 step 2 do i endfor").unwrap();
        match &program.statements[0] {
            Statement::For {
                declares,
                direction,
                step,
                ..
            } => {
                assert!(*declares);
                assert_eq!(*direction, Direction::UpTo);
                assert!(step.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }

        let program = parse("for i = 10 downto 0 do i endfor").unwrap();
        match &program.statements[0] {
            Statement::For {
                declares,
                direction,
                step,
                ..
            } => {
                assert!(!*declares);
                assert_eq!(*direction, Direction::DownTo);
                assert!(step.is_none());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_foreach() {
        let program = parse("foreach x in (1, 2, 3) do x endfor").unwrap();
        match &program.statements[0] {
            Statement::ForEach { name, args, .. } => {
                assert_eq!(name, "x");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected foreach, got {:?}", other),
        }
    }

    #[test]
    fn test_func_declaration() {
        let program = parse("func add(a, b) do a + b endfunc").unwrap();
        match &program.statements[0] {
            Statement::FuncDecl { name, params, body } => {
                assert_eq!(name, "add");
                assert_eq!(params, &["a".to_string(), "b".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected func, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_terminator_is_syntax_error() {
        assert!(parse("if (1) then 2").is_err());
        assert!(parse("while (1) do 2").is_err());
        assert!(parse("do 1 2 3").is_err());
    }

    #[test]
    fn test_keyword_in_expression_position_is_error() {
        assert!(parse("1 + endif").is_err());
    }
}
