//! Parser module - recursive descent over the token stream.
//!
//! One statement per logical line; `if`/`else` bodies are indentation
//! blocks. The parser aborts on the first error so no partial tree
//! reaches later phases.

pub mod ast;

#[cfg(test)]
mod tests;

pub use ast::*;

use crate::error::{KelpieError, Result};
use crate::lexer::{self, Delimiter, Keyword, Operator, Token, TokenKind};

/// Parses source text into a `Program`.
pub fn parse(source: &str) -> Result<Program> {
    let tokens = lexer::tokenize(source)?;
    Parser::new(tokens).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: u32,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        // The cursor clamps to the last token; guarantee one exists.
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let (line, col) = tokens.last().map_or((1, 1), |t| (t.line, t.col));
            tokens.push(Token::new(TokenKind::Eof, "", line, col));
        }
        Self {
            tokens,
            pos: 0,
            next_node_id: 0,
        }
    }

    // ----- token cursor -----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_op(&self, op: Operator) -> bool {
        self.peek().kind == TokenKind::Operator(op)
    }

    fn at_delim(&self, delim: Delimiter) -> bool {
        self.peek().kind == TokenKind::Delimiter(delim)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(kw)
    }

    fn eat_op(&mut self, op: Operator) -> bool {
        if self.at_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_delim(&mut self, delim: Delimiter) -> bool {
        if self.at_delim(delim) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Operator, what: &str) -> Result<Token> {
        if self.at_op(op) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_delim(&mut self, delim: Delimiter, what: &str) -> Result<Token> {
        if self.at_delim(delim) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.bump();
                Ok((name, Span::new(token.line, token.col)))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        match self.peek().kind {
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    // ----- errors -----

    fn describe(token: &Token) -> String {
        match token.kind {
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Indent => "indented block".to_string(),
            TokenKind::Dedent => "end of block".to_string(),
            _ => format!("'{}'", token.lexeme),
        }
    }

    fn unexpected(&self, what: &str) -> KelpieError {
        let token = self.peek();
        KelpieError::ParseError {
            line: token.line,
            col: token.col,
            message: format!("expected {what}, found {}", Self::describe(token)),
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> KelpieError {
        let token = self.peek();
        KelpieError::ParseError {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    fn unsupported(&self, token: &Token, construct: impl Into<String>) -> KelpieError {
        KelpieError::UnsupportedConstruct {
            construct: construct.into(),
            line: token.line,
            col: token.col,
        }
    }

    fn new_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    // ----- program / statements -----

    pub fn parse_program(mut self) -> Result<Program> {
        let mut version = None;
        if let TokenKind::Version(v) = self.peek().kind {
            version = Some(v);
            self.bump();
            self.expect_newline()?;
        }
        let mut statements = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            statements.push(self.parse_statement()?);
        }
        Ok(Program {
            version,
            statements,
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::Export) => {
                self.bump();
                if !self.is_func_def_ahead() {
                    return Err(self.parse_error("expected a function declaration after 'export'"));
                }
                self.parse_func_def(true)
            }
            TokenKind::Keyword(Keyword::Var) => {
                Err(self.unsupported(&token, "'var' declaration mode"))
            }
            TokenKind::Keyword(Keyword::For) => Err(self.unsupported(&token, "'for' loop")),
            TokenKind::Keyword(Keyword::While) => Err(self.unsupported(&token, "'while' loop")),
            TokenKind::Keyword(Keyword::Switch) => {
                Err(self.unsupported(&token, "'switch' statement"))
            }
            TokenKind::Keyword(Keyword::Else) => {
                Err(self.parse_error("'else' without a matching 'if'"))
            }
            TokenKind::Version(_) => Err(self.parse_error("version pragma must be the first line")),
            TokenKind::Indent => Err(self.parse_error("unexpected indent")),
            TokenKind::Dedent => Err(self.parse_error("unexpected dedent")),
            TokenKind::Ident(_) if self.is_func_def_ahead() => self.parse_func_def(false),
            TokenKind::Ident(name) => match self.peek_ahead(1).map(|t| &t.kind) {
                Some(TokenKind::Operator(Operator::Assign)) => {
                    let name = name.clone();
                    let span = Span::new(token.line, token.col);
                    self.bump();
                    self.bump();
                    let value = self.parse_expr()?;
                    self.expect_newline()?;
                    Ok(Stmt::Assign { name, value, span })
                }
                Some(TokenKind::Operator(Operator::ColonAssign)) => {
                    let name = name.clone();
                    let span = Span::new(token.line, token.col);
                    self.bump();
                    self.bump();
                    let value = self.parse_expr()?;
                    self.expect_newline()?;
                    Ok(Stmt::Reassign { name, value, span })
                }
                _ => self.parse_expr_statement(),
            },
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt> {
        let expr = self.parse_expr()?;
        self.expect_newline()?;
        Ok(Stmt::Expr(expr))
    }

    /// Lookahead for `name(params) => ...`: an identifier, a balanced
    /// parenthesized list, then an arrow on the same line.
    fn is_func_def_ahead(&self) -> bool {
        if !matches!(self.peek().kind, TokenKind::Ident(_)) {
            return false;
        }
        if self.peek_ahead(1).map(|t| &t.kind) != Some(&TokenKind::Delimiter(Delimiter::LParen)) {
            return false;
        }
        let mut depth = 1usize;
        let mut i = self.pos + 2;
        while depth > 0 {
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::Delimiter(Delimiter::LParen))
                | Some(TokenKind::Delimiter(Delimiter::LBracket)) => depth += 1,
                Some(TokenKind::Delimiter(Delimiter::RParen))
                | Some(TokenKind::Delimiter(Delimiter::RBracket)) => depth -= 1,
                Some(TokenKind::Newline) | Some(TokenKind::Eof) | None => return false,
                _ => {}
            }
            i += 1;
        }
        self.tokens.get(i).map(|t| &t.kind) == Some(&TokenKind::Operator(Operator::Arrow))
    }

    fn parse_func_def(&mut self, exported: bool) -> Result<Stmt> {
        let (name, span) = self.expect_ident()?;
        self.expect_delim(Delimiter::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at_delim(Delimiter::RParen) {
            loop {
                let (param, _) = self.expect_ident()?;
                if params.contains(&param) {
                    return Err(self.parse_error(format!("duplicate parameter '{param}'")));
                }
                params.push(param);
                if !self.eat_delim(Delimiter::Comma) {
                    break;
                }
            }
        }
        self.expect_delim(Delimiter::RParen, "')'")?;
        self.expect_op(Operator::Arrow, "'=>'")?;
        if self.peek().kind == TokenKind::Newline {
            let token = self.peek().clone();
            return Err(self.unsupported(&token, "multi-line function body"));
        }
        let body = self.parse_expr()?;
        self.expect_newline()?;
        Ok(Stmt::FuncDef {
            name,
            params,
            body,
            exported,
            span,
        })
    }

    fn parse_import(&mut self) -> Result<Stmt> {
        let token = self.bump();
        let span = Span::new(token.line, token.col);
        let (owner, _) = self.expect_ident()?;
        self.expect_op(Operator::Slash, "'/'")?;
        let (name, _) = self.expect_ident()?;
        self.expect_op(Operator::Slash, "'/'")?;
        let version = match self.peek().kind {
            TokenKind::IntLiteral(v) if v >= 0 => {
                self.bump();
                v
            }
            _ => return Err(self.unexpected("a library version number")),
        };
        let alias = if self.at_keyword(Keyword::As) {
            self.bump();
            self.expect_ident()?.0
        } else {
            name.clone()
        };
        self.expect_newline()?;
        Ok(Stmt::Import {
            specifier: format!("{owner}/{name}/{version}"),
            alias,
            span,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let token = self.bump();
        let span = Span::new(token.line, token.col);
        let condition = self.parse_expr()?;
        self.expect_newline()?;
        if self.peek().kind != TokenKind::Indent {
            return Err(self.parse_error("expected an indented block after 'if'"));
        }
        self.bump();
        let then_body = self.parse_block()?;
        let else_body = if self.at_keyword(Keyword::Else) {
            self.bump();
            if self.at_keyword(Keyword::If) {
                Some(vec![self.parse_if()?])
            } else {
                self.expect_newline()?;
                if self.peek().kind != TokenKind::Indent {
                    return Err(self.parse_error("expected an indented block after 'else'"));
                }
                self.bump();
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_body,
            else_body,
            span,
        })
    }

    /// Conditional bodies may only reassign existing variables or nest
    /// further conditionals; anything else is a deliberate coverage gap.
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Dedent => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    return Err(self.parse_error("unexpected end of input in conditional block"));
                }
                TokenKind::Keyword(Keyword::If) => statements.push(self.parse_if()?),
                TokenKind::Ident(name)
                    if self.peek_ahead(1).map(|t| &t.kind)
                        == Some(&TokenKind::Operator(Operator::ColonAssign)) =>
                {
                    let name = name.clone();
                    let span = Span::new(token.line, token.col);
                    self.bump();
                    self.bump();
                    let value = self.parse_expr()?;
                    self.expect_newline()?;
                    statements.push(Stmt::Reassign { name, value, span });
                }
                _ => {
                    return Err(self.unsupported(
                        &token,
                        "only reassignments and nested conditionals inside a conditional block",
                    ));
                }
            }
        }
        if statements.is_empty() {
            return Err(self.parse_error("empty conditional block"));
        }
        Ok(statements)
    }

    // ----- expressions -----

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let condition = self.parse_or()?;
        if self.eat_op(Operator::Question) {
            let then_value = self.parse_ternary()?;
            self.expect_op(Operator::Colon, "':'")?;
            let else_value = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            });
        }
        Ok(condition)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.at_keyword(Keyword::Or) {
            self.bump();
            let right = self.parse_and()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op: BinOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.at_keyword(Keyword::And) {
            self.bump();
            let right = self.parse_equality()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op: BinOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.at_op(Operator::Eq) {
                BinOp::Eq
            } else if self.at_op(Operator::NotEq) {
                BinOp::NotEq
            } else {
                break;
            };
            self.bump();
            let right = self.parse_comparison()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.at_op(Operator::Lt) {
                BinOp::Lt
            } else if self.at_op(Operator::Gt) {
                BinOp::Gt
            } else if self.at_op(Operator::LtEq) {
                BinOp::LtEq
            } else if self.at_op(Operator::GtEq) {
                BinOp::GtEq
            } else {
                break;
            };
            self.bump();
            let right = self.parse_additive()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.at_op(Operator::Plus) {
                BinOp::Add
            } else if self.at_op(Operator::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.at_op(Operator::Star) {
                BinOp::Mul
            } else if self.at_op(Operator::Slash) {
                BinOp::Div
            } else if self.at_op(Operator::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = if self.at_op(Operator::Minus) {
            Some(UnaryOp::Neg)
        } else if self.at_op(Operator::Plus) {
            Some(UnaryOp::Pos)
        } else if self.at_keyword(Keyword::Not) {
            Some(UnaryOp::Not)
        } else {
            None
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at_delim(Delimiter::Dot) {
                let (object, span) = match &expr {
                    Expr::Ident { name, span } => (name.clone(), *span),
                    Expr::Member { .. } => {
                        return Err(self.parse_error("nested member access is not supported"));
                    }
                    _ => return Err(self.parse_error("unexpected '.'")),
                };
                self.bump();
                let (name, _) = self.expect_ident()?;
                expr = Expr::Member { object, name, span };
            } else if self.at_delim(Delimiter::LParen) {
                if !matches!(expr, Expr::Ident { .. } | Expr::Member { .. }) {
                    return Err(self.parse_error("only named functions can be called"));
                }
                let token = self.bump();
                let span = Span::new(token.line, token.col);
                let (args, kwargs) = self.parse_call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                    span,
                };
            } else if self.at_delim(Delimiter::LBracket) {
                let token = self.bump();
                let span = Span::new(token.line, token.col);
                let offset = self.parse_expr()?;
                self.expect_delim(Delimiter::RBracket, "']'")?;
                expr = Expr::History {
                    id: self.new_node_id(),
                    base: Box::new(expr),
                    offset: Box::new(offset),
                    span,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        if self.eat_delim(Delimiter::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            let named = matches!(self.peek().kind, TokenKind::Ident(_))
                && self.peek_ahead(1).map(|t| &t.kind)
                    == Some(&TokenKind::Operator(Operator::Assign));
            if named {
                let (name, _) = self.expect_ident()?;
                self.bump();
                if kwargs.iter().any(|(n, _)| *n == name) {
                    return Err(self.parse_error(format!("duplicate named argument '{name}'")));
                }
                let value = self.parse_expr()?;
                kwargs.push((name, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.parse_error("positional argument after named argument"));
                }
                args.push(self.parse_expr()?);
            }
            if self.eat_delim(Delimiter::Comma) {
                continue;
            }
            self.expect_delim(Delimiter::RParen, "')' or ','")?;
            break;
        }
        Ok((args, kwargs))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::IntLiteral(v) => {
                self.bump();
                Ok(Expr::IntLiteral(v))
            }
            TokenKind::FloatLiteral(v) => {
                self.bump();
                Ok(Expr::FloatLiteral(v))
            }
            TokenKind::StringLiteral(ref s) => {
                let value = s.clone();
                self.bump();
                Ok(Expr::StringLiteral(value))
            }
            TokenKind::BoolLiteral(v) => {
                self.bump();
                Ok(Expr::BoolLiteral(v))
            }
            TokenKind::Ident(ref name) => {
                let name = name.clone();
                self.bump();
                Ok(Expr::Ident {
                    name,
                    span: Span::new(token.line, token.col),
                })
            }
            TokenKind::Delimiter(Delimiter::LParen) => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect_delim(Delimiter::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}
