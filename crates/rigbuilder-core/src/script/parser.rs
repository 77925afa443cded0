//! # RigScript Parser
//!
//! Recursive descent over the token list produced by the lexer.
//!
//! ```text
//! program    := (statement sep)*
//! statement  := if | while | for | break | continue | pass | expr [assign-op expr]
//! block      := '{' (statement sep)* '}'
//! expr       := or
//! or         := and ('or' and)*
//! and        := not ('and' not)*
//! not        := 'not' not | comparison
//! comparison := additive (cmp-op additive)*
//! additive   := term (('+' | '-') term)*
//! term       := unary (('*' | '/' | '//' | '%') unary)*
//! unary      := ('-' | '+') unary | power
//! power      := postfix ['**' unary]
//! postfix    := primary (call | '.' name [call] | '[' expr ']')*
//! ```

use super::ScriptError;
use super::ast::{BinOp, Block, Expr, Line, LogicalOp, Stmt, UnaryOp};
use super::lexer::{Spanned, Token, tokenize};
use serde_json::{Value, json};

/// Parse a whole script into a block of statements.
pub fn parse(source: &str) -> Result<Block, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    // -------------------------------------------------------------------------
    // Token cursor
    // -------------------------------------------------------------------------

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: format!("expected {}, found {:?}", expected, self.current()),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.current(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.advance();
        }
    }

    /// Token after any run of newlines, without consuming anything.
    fn peek_past_newlines(&self) -> &Token {
        let mut i = self.pos;
        while let Some(s) = self.tokens.get(i) {
            if s.token != Token::Newline {
                return &s.token;
            }
            i += 1;
        }
        &Token::Eof
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn parse_program(&mut self) -> Result<Block, ScriptError> {
        let mut block = Vec::new();
        self.skip_separators();
        while !self.check(&Token::Eof) {
            block.push(self.parse_statement()?);
            self.end_of_statement(&Token::Eof)?;
            self.skip_separators();
        }
        Ok(block)
    }

    fn parse_block(&mut self) -> Result<Block, ScriptError> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut block = Vec::new();
        self.skip_separators();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            block.push(self.parse_statement()?);
            self.end_of_statement(&Token::RBrace)?;
            self.skip_separators();
        }
        self.advance();
        Ok(block)
    }

    fn end_of_statement(&self, closer: &Token) -> Result<(), ScriptError> {
        match self.current() {
            Token::Newline | Token::Semicolon => Ok(()),
            t if t == closer => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    fn parse_statement(&mut self) -> Result<Line, ScriptError> {
        let line = self.line();
        let stmt = match self.current() {
            Token::If => self.parse_if()?,
            Token::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Stmt::While { cond, body }
            }
            Token::For => {
                self.advance();
                let var = match self.advance() {
                    Token::Ident(name) => name,
                    _ => {
                        return Err(ScriptError::Syntax {
                            line,
                            message: "expected loop variable after 'for'".to_string(),
                        });
                    }
                };
                self.expect(&Token::In, "'in'")?;
                let iter = self.parse_expr()?;
                let body = self.parse_block()?;
                Stmt::For { var, iter, body }
            }
            Token::Break => {
                self.advance();
                Stmt::Break
            }
            Token::Continue => {
                self.advance();
                Stmt::Continue
            }
            Token::Pass => {
                self.advance();
                Stmt::Pass
            }
            _ => self.parse_expr_statement()?,
        };
        Ok(Line { line, stmt })
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        branches.push((cond, self.parse_block()?));
        let mut otherwise = Vec::new();

        loop {
            match self.peek_past_newlines() {
                Token::Elif => {
                    self.skip_newlines();
                    self.advance();
                    let cond = self.parse_expr()?;
                    branches.push((cond, self.parse_block()?));
                }
                Token::Else => {
                    self.skip_newlines();
                    self.advance();
                    if self.check(&Token::If) {
                        let line = self.line();
                        let nested = self.parse_if()?;
                        otherwise.push(Line { line, stmt: nested });
                    } else {
                        otherwise = self.parse_block()?;
                    }
                    break;
                }
                _ => break,
            }
        }

        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        let expr = self.parse_expr()?;

        let op = match self.current() {
            Token::Assign => None,
            Token::PlusAssign => Some(BinOp::Add),
            Token::MinusAssign => Some(BinOp::Sub),
            Token::StarAssign => Some(BinOp::Mul),
            Token::SlashAssign => Some(BinOp::Div),
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.advance();

        if !matches!(expr, Expr::Name(_) | Expr::Index(..) | Expr::Field(..)) {
            return Err(ScriptError::Syntax {
                line,
                message: "cannot assign to expression".to_string(),
            });
        }

        let value = self.parse_expr()?;
        Ok(Stmt::Assign {
            target: expr,
            op,
            value,
        })
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<BinOp> {
        let op = match self.current() {
            Token::EqEq => BinOp::Eq,
            Token::NotEq => BinOp::NotEq,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::In => BinOp::In,
            Token::Not if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::In) => {
                self.advance();
                BinOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// Chained comparisons (`a < b < c`) expand to `a < b and b < c`.
    fn parse_comparison(&mut self) -> Result<Expr, ScriptError> {
        let first = self.parse_additive()?;
        let mut operands = vec![first];
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            operands.push(self.parse_additive()?);
        }

        if ops.is_empty() {
            return Ok(operands.remove(0));
        }

        let mut result: Option<Expr> = None;
        for (i, op) in ops.into_iter().enumerate() {
            let cmp = Expr::Binary(
                op,
                Box::new(operands[i].clone()),
                Box::new(operands[i + 1].clone()),
            );
            result = Some(match result {
                Some(prev) => Expr::Logical(LogicalOp::And, Box::new(prev), Box::new(cmp)),
                None => cmp,
            });
        }
        result.ok_or_else(|| self.unexpected("comparison"))
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        match self.current() {
            Token::Minus => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            Token::Plus => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Pos, Box::new(inner)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(args)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current() {
                Token::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        _ => return Err(self.unexpected("name after '.'")),
                    };
                    if self.eat(&Token::LParen) {
                        let args = self.parse_args()?;
                        expr = Expr::MethodCall(Box::new(expr), name, args);
                    } else {
                        expr = Expr::Field(Box::new(expr), name);
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        let expr = match self.advance() {
            Token::Int(i) => Expr::Literal(json!(i)),
            Token::Float(f) => Expr::Literal(
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ScriptError::Syntax {
                        line,
                        message: format!("invalid float literal {}", f),
                    })?,
            ),
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::None => Expr::Literal(Value::Null),
            Token::Ident(name) => Expr::Name(name),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                inner
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.check(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                Expr::List(items)
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                self.skip_newlines();
                while !self.check(&Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&Token::Colon, "':'")?;
                    self.skip_newlines();
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    self.skip_newlines();
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                    self.skip_newlines();
                }
                self.expect(&Token::RBrace, "'}'")?;
                Expr::Map(entries)
            }
            other => {
                return Err(ScriptError::Syntax {
                    line,
                    message: format!("unexpected {:?}", other),
                });
            }
        };
        Ok(expr)
    }
}
