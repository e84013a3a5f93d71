//! Tokenizer for the FormCalc language
//!
//! Keywords are case-insensitive but reserved only as whole words: the lexer
//! scans a maximal identifier first and classifies it afterwards, so `form`
//! or `ifx` stay plain identifiers while `If` and `IF` are keywords.

use crate::parser::error::FormCalcError;
use std::fmt;

/// Source position of a token, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// String literal with quote doubling and `\u` escapes already decoded.
    StringLiteral(String),
    Identifier(String),

    // Keywords
    If,
    Then,
    ElseIf,
    Else,
    EndIf,
    While,
    Do,
    EndWhile,
    End,
    For,
    UpTo,
    DownTo,
    Step,
    EndFor,
    ForEach,
    In,
    Break,
    Continue,
    Var,
    Func,
    EndFunc,
    Throw,
    Return,
    Exit,

    // Literal keywords
    Null,
    Nan,
    Infinity,
    True,
    False,

    // Word operators
    Or,
    And,
    Not,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,

    // Symbol operators
    Equals,
    EqualsEquals,
    NotEquals,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Pipe,
    Ampersand,
    Plus,
    Minus,
    Star,
    Slash,

    // Separators
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    DotDot,
    DotHash,
    DotStar,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Classify a scanned word. Keywords match case-insensitively.
fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_lowercase().as_str() {
        "if" => Token::If,
        "then" => Token::Then,
        "elseif" => Token::ElseIf,
        "else" => Token::Else,
        "endif" => Token::EndIf,
        "while" => Token::While,
        "do" => Token::Do,
        "endwhile" => Token::EndWhile,
        "end" => Token::End,
        "for" => Token::For,
        "upto" => Token::UpTo,
        "downto" => Token::DownTo,
        "step" => Token::Step,
        "endfor" => Token::EndFor,
        "foreach" => Token::ForEach,
        "in" => Token::In,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "var" => Token::Var,
        "func" => Token::Func,
        "endfunc" => Token::EndFunc,
        "throw" => Token::Throw,
        "return" => Token::Return,
        "exit" => Token::Exit,
        "null" => Token::Null,
        "nan" => Token::Nan,
        "infinity" => Token::Infinity,
        "true" => Token::True,
        "false" => Token::False,
        "or" => Token::Or,
        "and" => Token::And,
        "not" => Token::Not,
        "eq" => Token::Eq,
        "ne" => Token::Ne,
        "le" => Token::Le,
        "ge" => Token::Ge,
        "lt" => Token::Lt,
        "gt" => Token::Gt,
        _ => return None,
    };
    Some(token)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || c == '!'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Character scanner producing spanned tokens.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.position + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Span starting at the given mark and ending at the current position.
    fn span_from(&self, mark: (usize, usize, usize)) -> Span {
        let (offset, line, column) = mark;
        Span {
            offset,
            len: self.position - offset,
            line,
            column,
        }
    }

    fn mark(&self) -> (usize, usize, usize) {
        (self.position, self.line, self.column)
    }

    pub fn tokenize_spanned(&mut self) -> Result<Vec<SpannedToken>, FormCalcError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            // Whitespace
            if c.is_whitespace() {
                self.bump();
                continue;
            }

            // Comments run to end of line: `; ...` or `// ...`
            if c == ';' || (c == '/' && self.peek_at(1) == Some('/')) {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            let mark = self.mark();

            let token = if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                self.scan_number(mark)?
            } else if c == '"' {
                self.scan_string(mark)?
            } else if is_identifier_start(c) {
                self.scan_word()
            } else {
                self.scan_operator(mark)?
            };

            tokens.push(SpannedToken {
                token,
                span: self.span_from(mark),
            });
        }

        Ok(tokens)
    }

    /// Number literal: `\d+(\.\d*)?`, `.\d+`, optional exponent. The exponent
    /// is only consumed when at least one digit follows it, so `2e` lexes as
    /// the number 2 and the identifier `e`.
    fn scan_number(&mut self, mark: (usize, usize, usize)) -> Result<Token, FormCalcError> {
        let mut text = String::new();

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        if self.peek() == Some('.') && (!text.is_empty() || self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            text.push(self.bump().unwrap());
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let signed = matches!(self.peek_at(1), Some('+') | Some('-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
                if signed {
                    text.push(self.bump().unwrap());
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
        }

        match text.parse::<f64>() {
            Ok(value) => Ok(Token::Number(value)),
            Err(_) => Err(FormCalcError::lexical(
                format!("malformed number literal \"{}\"", text),
                self.span_from(mark),
            )),
        }
    }

    /// String literal: `""` doubles to one quote, `\uXXXX` / `\uXXXXXXXX`
    /// decode to the code point (a surrogate escape pair decodes to the
    /// single code point it encodes), any other backslash is literal.
    fn scan_string(&mut self, mark: (usize, usize, usize)) -> Result<Token, FormCalcError> {
        self.bump(); // opening quote
        let mut text = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(FormCalcError::lexical(
                        "unterminated string literal".to_string(),
                        self.span_from(mark),
                    ));
                }
                Some('"') => {
                    self.bump();
                    if self.peek() == Some('"') {
                        self.bump();
                        text.push('"');
                    } else {
                        return Ok(Token::StringLiteral(text));
                    }
                }
                Some('\\') if self.peek_at(1) == Some('u') => {
                    let value = match self.scan_unicode_escape() {
                        Some(value) => value,
                        None => {
                            // Not a well-formed escape, the backslash is literal.
                            self.bump();
                            text.push('\\');
                            continue;
                        }
                    };
                    let code_point = if (0xD800..0xDC00).contains(&value) {
                        // High surrogate: require the low half as another escape.
                        match self.scan_unicode_escape() {
                            Some(low) if (0xDC00..0xE000).contains(&low) => {
                                0x10000 + ((value - 0xD800) << 10) + (low - 0xDC00)
                            }
                            _ => {
                                return Err(FormCalcError::lexical(
                                    format!("unpaired surrogate escape \\u{:04X}", value),
                                    self.span_from(mark),
                                ));
                            }
                        }
                    } else {
                        value
                    };
                    match char::from_u32(code_point) {
                        Some(c) => text.push(c),
                        None => {
                            return Err(FormCalcError::lexical(
                                format!("invalid unicode escape \\u{:X}", code_point),
                                self.span_from(mark),
                            ));
                        }
                    }
                }
                Some(c) => {
                    self.bump();
                    text.push(c);
                }
            }
        }
    }

    /// Consume `\uXXXX` or `\uXXXXXXXX` (8 hex digits tried first) and return
    /// the value; leaves the input untouched when no 4 hex digits follow.
    fn scan_unicode_escape(&mut self) -> Option<u32> {
        if self.peek() != Some('\\') || self.peek_at(1) != Some('u') {
            return None;
        }
        let mut digits = 0;
        while digits < 8 && self.peek_at(2 + digits).is_some_and(|c| c.is_ascii_hexdigit()) {
            digits += 1;
        }
        let take = if digits >= 8 {
            8
        } else if digits >= 4 {
            4
        } else {
            return None;
        };
        self.bump(); // backslash
        self.bump(); // u
        let mut value = 0u32;
        for _ in 0..take {
            let digit = self.bump().unwrap().to_digit(16).unwrap();
            value = (value << 4) | digit;
        }
        Some(value)
    }

    fn scan_word(&mut self) -> Token {
        let mut word = String::new();
        word.push(self.bump().unwrap());
        while self.peek().is_some_and(is_identifier_continue) {
            word.push(self.bump().unwrap());
        }
        keyword(&word).unwrap_or(Token::Identifier(word))
    }

    fn scan_operator(&mut self, mark: (usize, usize, usize)) -> Result<Token, FormCalcError> {
        let c = self.bump().unwrap();
        let token = match c {
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token::EqualsEquals
                } else {
                    Token::Equals
                }
            }
            '<' => match self.peek() {
                Some('>') => {
                    self.bump();
                    Token::NotEquals
                }
                Some('=') => {
                    self.bump();
                    Token::LessEqual
                }
                _ => Token::Less,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '.' => match self.peek() {
                Some('.') => {
                    self.bump();
                    Token::DotDot
                }
                Some('#') => {
                    self.bump();
                    Token::DotHash
                }
                Some('*') => {
                    self.bump();
                    Token::DotStar
                }
                _ => Token::Dot,
            },
            '|' => Token::Pipe,
            '&' => Token::Ampersand,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            ',' => Token::Comma,
            other => {
                return Err(FormCalcError::lexical(
                    format!("unrecognized character '{}'", other),
                    self.span_from(mark),
                ));
            }
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize_spanned()
            .unwrap()
            .into_iter()
            .map(|st| st.token)
            .collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(tokens("if IF If"), vec![Token::If, Token::If, Token::If]);
        assert_eq!(tokens("EndWhile"), vec![Token::EndWhile]);
    }

    #[test]
    fn test_keyword_prefix_stays_identifier() {
        assert_eq!(tokens("form"), vec![Token::Identifier("form".to_string())]);
        assert_eq!(tokens("ifx"), vec![Token::Identifier("ifx".to_string())]);
        assert_eq!(
            tokens("endfunction"),
            vec![Token::Identifier("endfunction".to_string())]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("1e+2"), vec![Token::Number(100.0)]);
        assert_eq!(tokens("23.e+1"), vec![Token::Number(230.0)]);
        assert_eq!(tokens(".5"), vec![Token::Number(0.5)]);
        assert_eq!(tokens("8."), vec![Token::Number(8.0)]);
        // No digit after the exponent marker: `e` starts an identifier.
        assert_eq!(
            tokens("2e"),
            vec![Token::Number(2.0), Token::Identifier("e".to_string())]
        );
    }

    #[test]
    fn test_minus_is_not_part_of_literal() {
        assert_eq!(tokens("-1"), vec![Token::Minus, Token::Number(1.0)]);
    }

    #[test]
    fn test_string_quote_doubling() {
        assert_eq!(
            tokens("\"foo\"\"bar\""),
            vec![Token::StringLiteral("foo\"bar".to_string())]
        );
    }

    #[test]
    fn test_string_unicode_escapes() {
        assert_eq!(
            tokens("\"\\u0041\""),
            vec![Token::StringLiteral("A".to_string())]
        );
        assert_eq!(
            tokens("\"\\u00000041\""),
            vec![Token::StringLiteral("A".to_string())]
        );
        // Surrogate pair decodes to a single code point.
        assert_eq!(
            tokens("\"\\uD83D\\uDE00\""),
            vec![Token::StringLiteral("\u{1F600}".to_string())]
        );
        // Backslash without a well-formed escape is literal.
        assert_eq!(
            tokens("\"\\x\""),
            vec![Token::StringLiteral("\\x".to_string())]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new("\"abc").tokenize_spanned().is_err());
    }

    #[test]
    fn test_comments() {
        assert_eq!(tokens("1 ; trailing"), vec![Token::Number(1.0)]);
        assert_eq!(
            tokens("1 // comment\n2"),
            vec![Token::Number(1.0), Token::Number(2.0)]
        );
    }

    #[test]
    fn test_accessor_separators() {
        assert_eq!(
            tokens("a.b..c.#d.*"),
            vec![
                Token::Identifier("a".to_string()),
                Token::Dot,
                Token::Identifier("b".to_string()),
                Token::DotDot,
                Token::Identifier("c".to_string()),
                Token::DotHash,
                Token::Identifier("d".to_string()),
                Token::DotStar,
            ]
        );
    }

    #[test]
    fn test_dot_then_digit_is_number() {
        assert_eq!(
            tokens("a.5"),
            vec![Token::Identifier("a".to_string()), Token::Number(0.5)]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("== <> <= >= < > = | &"),
            vec![
                Token::EqualsEquals,
                Token::NotEquals,
                Token::LessEqual,
                Token::GreaterEqual,
                Token::Less,
                Token::Greater,
                Token::Equals,
                Token::Pipe,
                Token::Ampersand,
            ]
        );
    }

    #[test]
    fn test_spans_track_lines() {
        let spanned = Lexer::new("1\n  foo").tokenize_spanned().unwrap();
        assert_eq!(spanned[0].span.line, 1);
        assert_eq!(spanned[0].span.column, 1);
        assert_eq!(spanned[1].span.line, 2);
        assert_eq!(spanned[1].span.column, 3);
        assert_eq!(spanned[1].span.offset, 4);
        assert_eq!(spanned[1].span.len, 3);
    }

    #[test]
    fn test_unrecognized_character() {
        assert!(Lexer::new("1 @ 2").tokenize_spanned().is_err());
    }
}
