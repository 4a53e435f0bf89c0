//! Lexer module - character-level tokenization.
//!
//! Line structure is significant: each logical line ends in a `Newline`
//! token, and indentation changes produce `Indent`/`Dedent` pairs so the
//! parser can treat `if`/`else` bodies as blocks. Newlines inside
//! parentheses or brackets are not significant, which keeps multi-line
//! call argument lists working.

mod token;

pub use token::*;


use crate::error::{KelpieError, Result};

const TAB_WIDTH: usize = 4;

/// Tokenizes a whole source text. Fails on the first lexical error; a
/// partial token stream never reaches the parser.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    bracket_depth: usize,
    line_has_tokens: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            indents: vec![0],
            bracket_depth: 0,
            line_has_tokens: false,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        self.start_line()?;
        while let Some(c) = self.peek() {
            match c {
                '\n' => self.newline()?,
                '\r' => {
                    self.bump();
                }
                ' ' | '\t' => {
                    self.bump();
                }
                '/' if self.rest().starts_with("//") => self.skip_comment(),
                '"' | '\'' => self.string(c)?,
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
                _ => self.operator(c)?,
            }
        }
        self.finish()
    }

    // ----- cursor -----

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.source[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        self.col += 1;
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, line: usize, col: usize) {
        self.tokens.push(Token::new(kind, lexeme, line, col));
        self.line_has_tokens = true;
    }

    fn lex_error(&self, message: impl Into<String>) -> KelpieError {
        KelpieError::LexError {
            line: self.line,
            col: self.col,
            message: message.into(),
        }
    }

    // ----- line structure -----

    /// Consumes blank and comment-only lines, measures the indentation of
    /// the first line that carries tokens, and emits `Indent`/`Dedent`
    /// against the indentation stack. A `//@version=N` pragma counts as a
    /// token-carrying line and is lexed here.
    fn start_line(&mut self) -> Result<()> {
        loop {
            let mut width = 0usize;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => {
                        width += 1;
                        self.bump();
                    }
                    '\t' => {
                        width = width - width % TAB_WIDTH + TAB_WIDTH;
                        self.bump();
                    }
                    '\r' => {
                        self.bump();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                None => return Ok(()),
                Some('\n') => {
                    self.bump();
                    self.line += 1;
                    self.col = 1;
                }
                Some('/') if self.rest().starts_with("//") => {
                    if self.try_version_pragma(width)? {
                        return Ok(());
                    }
                    self.skip_comment();
                }
                Some(_) => {
                    self.apply_indent(width)?;
                    return Ok(());
                }
            }
        }
    }

    fn apply_indent(&mut self, width: usize) -> Result<()> {
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, "", self.line, 1);
        } else if width < current {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(TokenKind::Dedent, "", self.line, 1);
            }
            if width != *self.indents.last().unwrap_or(&0) {
                return Err(self.lex_error("inconsistent indentation"));
            }
        }
        Ok(())
    }

    /// Returns true when the comment at the cursor is a well-formed
    /// `//@version=N` pragma and has been lexed as a token. Malformed
    /// pragmas fall through as ordinary comments.
    fn try_version_pragma(&mut self, width: usize) -> Result<bool> {
        const PREFIX: &str = "//@version=";
        let rest = self.rest();
        if !rest.starts_with(PREFIX) {
            return Ok(false);
        }
        let digits: String = rest[PREFIX.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return Ok(false);
        }
        let after = rest[PREFIX.len() + digits.len()..].chars().next();
        if !matches!(after, None | Some('\n') | Some('\r') | Some(' ') | Some('\t')) {
            return Ok(false);
        }
        self.apply_indent(width)?;
        let line = self.line;
        let col = self.col;
        for _ in 0..PREFIX.len() + digits.len() {
            self.bump();
        }
        let version: u32 = digits
            .parse()
            .map_err(|_| self.lex_error(format!("invalid version number '{digits}'")))?;
        let lexeme = format!("{PREFIX}{digits}");
        self.push(TokenKind::Version(version), lexeme, line, col);
        // Anything after the digits is still comment text.
        self.skip_comment();
        Ok(true)
    }

    fn newline(&mut self) -> Result<()> {
        let line = self.line;
        let col = self.col;
        self.bump();
        if self.bracket_depth == 0 && self.line_has_tokens {
            self.tokens
                .push(Token::new(TokenKind::Newline, "\n", line, col));
        }
        self.line += 1;
        self.col = 1;
        self.line_has_tokens = false;
        if self.bracket_depth == 0 {
            self.start_line()?;
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn finish(mut self) -> Result<Vec<Token>> {
        if self.line_has_tokens {
            self.tokens
                .push(Token::new(TokenKind::Newline, "\n", self.line, self.col));
        }
        while *self.indents.last().unwrap_or(&0) > 0 {
            self.indents.pop();
            self.tokens
                .push(Token::new(TokenKind::Dedent, "", self.line, 1));
        }
        self.tokens
            .push(Token::new(TokenKind::Eof, "", self.line, self.col));
        Ok(self.tokens)
    }

    // ----- tokens -----

    fn string(&mut self, quote: char) -> Result<()> {
        let line = self.line;
        let col = self.col;
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(KelpieError::LexError {
                        line,
                        col,
                        message: "unterminated string literal".to_string(),
                    });
                }
                Some('\\') => {
                    self.bump();
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.lex_error("unterminated string literal"))?;
                    match escaped {
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        '\'' => value.push('\''),
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        other => {
                            return Err(
                                self.lex_error(format!("invalid escape sequence '\\{other}'"))
                            );
                        }
                    }
                    self.bump();
                }
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        let lexeme = self.source[start..self.pos].to_string();
        self.push(TokenKind::StringLiteral(value), lexeme, line, col);
        Ok(())
    }

    fn number(&mut self) -> Result<()> {
        let line = self.line;
        let col = self.col;
        let start = self.pos;
        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.lex_error("invalid number literal"));
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = self.source[start..self.pos].to_string();
        let kind = if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.lex_error(format!("invalid number literal '{text}'")))?;
            TokenKind::FloatLiteral(value)
        } else {
            match text.parse::<i64>() {
                Ok(value) => TokenKind::IntLiteral(value),
                // Digits only, so the text is a valid number beyond i64 range.
                Err(_) => TokenKind::FloatLiteral(text.parse::<f64>().unwrap_or(f64::MAX)),
            }
        };
        self.push(kind, text, line, col);
        Ok(())
    }

    fn ident(&mut self) {
        let line = self.line;
        let col = self.col;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let text = self.source[start..self.pos].to_string();
        let kind = match text.as_str() {
            "true" => TokenKind::BoolLiteral(true),
            "false" => TokenKind::BoolLiteral(false),
            other => match Keyword::from_ident(other) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(text.clone()),
            },
        };
        self.push(kind, text, line, col);
    }

    fn operator(&mut self, c: char) -> Result<()> {
        let line = self.line;
        let col = self.col;
        let (kind, lexeme) = match c {
            '+' => (TokenKind::Operator(Operator::Plus), "+"),
            '-' => (TokenKind::Operator(Operator::Minus), "-"),
            '*' => (TokenKind::Operator(Operator::Star), "*"),
            '/' => (TokenKind::Operator(Operator::Slash), "/"),
            '%' => (TokenKind::Operator(Operator::Percent), "%"),
            '=' if self.rest().starts_with("==") => (TokenKind::Operator(Operator::Eq), "=="),
            '=' if self.rest().starts_with("=>") => (TokenKind::Operator(Operator::Arrow), "=>"),
            '=' => (TokenKind::Operator(Operator::Assign), "="),
            '!' if self.rest().starts_with("!=") => (TokenKind::Operator(Operator::NotEq), "!="),
            '<' if self.rest().starts_with("<=") => (TokenKind::Operator(Operator::LtEq), "<="),
            '<' => (TokenKind::Operator(Operator::Lt), "<"),
            '>' if self.rest().starts_with(">=") => (TokenKind::Operator(Operator::GtEq), ">="),
            '>' => (TokenKind::Operator(Operator::Gt), ">"),
            ':' if self.rest().starts_with(":=") => {
                (TokenKind::Operator(Operator::ColonAssign), ":=")
            }
            ':' => (TokenKind::Operator(Operator::Colon), ":"),
            '?' => (TokenKind::Operator(Operator::Question), "?"),
            ',' => (TokenKind::Delimiter(Delimiter::Comma), ","),
            '.' => (TokenKind::Delimiter(Delimiter::Dot), "."),
            '(' => {
                self.bracket_depth += 1;
                (TokenKind::Delimiter(Delimiter::LParen), "(")
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                (TokenKind::Delimiter(Delimiter::RParen), ")")
            }
            '[' => {
                self.bracket_depth += 1;
                (TokenKind::Delimiter(Delimiter::LBracket), "[")
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                (TokenKind::Delimiter(Delimiter::RBracket), "]")
            }
            other => {
                return Err(self.lex_error(format!("unexpected character '{other}'")));
            }
        };
        for _ in 0..lexeme.len() {
            self.bump();
        }
        self.push(kind, lexeme, line, col);
        Ok(())
    }
}
