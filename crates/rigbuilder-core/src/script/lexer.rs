//! # RigScript Lexer
//!
//! Turns script text into a flat token list. Newlines are significant
//! (they end statements) except inside parentheses and brackets.

use super::ScriptError;

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Not,
    And,
    Or,
    Break,
    Continue,
    Pass,
    True,
    False,
    None,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Newline,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

/// A token and the line it starts on (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

fn keyword(ident: &str) -> Option<Token> {
    let token = match ident {
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "in" => Token::In,
        "not" => Token::Not,
        "and" => Token::And,
        "or" => Token::Or,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "pass" => Token::Pass,
        "True" | "true" => Token::True,
        "False" | "false" => Token::False,
        "None" | "null" => Token::None,
        _ => return None,
    };
    Some(token)
}

// =============================================================================
// LEXER
// =============================================================================

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    /// Open `(` and `[` count; newlines inside them are not significant.
    nesting: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            nesting: 0,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    /// Skip blanks and comments. Stops at a significant newline.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek_char() {
            match c {
                '\n' if self.nesting == 0 => break,
                '#' => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.next_char();
                    }
                }
                c if c.is_whitespace() => {
                    self.next_char();
                }
                _ => break,
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, ScriptError> {
        let start = self.pos;
        let mut is_float = false;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '_' {
                self.next_char();
            } else if c == '.' && !is_float {
                is_float = true;
                self.next_char();
            } else if (c == 'e' || c == 'E')
                && matches!(self.peek_second(), Some(d) if d.is_ascii_digit() || d == '-' || d == '+')
            {
                is_float = true;
                self.next_char();
                self.next_char();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        }
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.next_char();
            } else {
                break;
            }
        }
        let ident = &self.input[start..self.pos];
        keyword(ident).unwrap_or_else(|| Token::Ident(ident.to_string()))
    }

    fn read_string(&mut self, quote: char) -> Result<Token, ScriptError> {
        let start_line = self.line;
        self.next_char();
        let mut out = String::new();

        loop {
            let Some(c) = self.next_char() else {
                return Err(ScriptError::Syntax {
                    line: start_line,
                    message: "unterminated string".to_string(),
                });
            };
            match c {
                c if c == quote => break,
                '\n' => {
                    return Err(ScriptError::Syntax {
                        line: start_line,
                        message: "unterminated string".to_string(),
                    });
                }
                '\\' => {
                    let escaped = self.next_char().ok_or_else(|| self.error("bad escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => {}
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }

        Ok(Token::Str(out))
    }

    /// Consume `first`, then `second` if it follows, choosing between two tokens.
    fn one_or_two(&mut self, second: char, single: Token, double: Token) -> Token {
        self.next_char();
        if self.peek_char() == Some(second) {
            self.next_char();
            double
        } else {
            single
        }
    }

    fn next_token(&mut self) -> Result<Spanned, ScriptError> {
        self.skip_trivia();
        let line = self.line;

        let Some(c) = self.peek_char() else {
            return Ok(Spanned {
                token: Token::Eof,
                line,
            });
        };

        let token = match c {
            '\n' => {
                self.next_char();
                Token::Newline
            }
            '(' | '[' => {
                self.next_char();
                self.nesting += 1;
                if c == '(' {
                    Token::LParen
                } else {
                    Token::LBracket
                }
            }
            ')' | ']' => {
                self.next_char();
                self.nesting = self.nesting.saturating_sub(1);
                if c == ')' {
                    Token::RParen
                } else {
                    Token::RBracket
                }
            }
            '{' => {
                self.next_char();
                Token::LBrace
            }
            '}' => {
                self.next_char();
                Token::RBrace
            }
            ',' => {
                self.next_char();
                Token::Comma
            }
            ':' => {
                self.next_char();
                Token::Colon
            }
            ';' => {
                self.next_char();
                Token::Semicolon
            }
            '.' if matches!(self.peek_second(), Some(d) if d.is_ascii_digit()) => {
                self.read_number()?
            }
            '.' => {
                self.next_char();
                Token::Dot
            }
            '+' => self.one_or_two('=', Token::Plus, Token::PlusAssign),
            '-' => self.one_or_two('=', Token::Minus, Token::MinusAssign),
            '%' => {
                self.next_char();
                Token::Percent
            }
            '*' => {
                self.next_char();
                match self.peek_char() {
                    Some('*') => {
                        self.next_char();
                        Token::StarStar
                    }
                    Some('=') => {
                        self.next_char();
                        Token::StarAssign
                    }
                    _ => Token::Star,
                }
            }
            '/' => {
                self.next_char();
                match self.peek_char() {
                    Some('/') => {
                        self.next_char();
                        Token::SlashSlash
                    }
                    Some('=') => {
                        self.next_char();
                        Token::SlashAssign
                    }
                    _ => Token::Slash,
                }
            }
            '=' => self.one_or_two('=', Token::Assign, Token::EqEq),
            '<' => self.one_or_two('=', Token::Lt, Token::Le),
            '>' => self.one_or_two('=', Token::Gt, Token::Ge),
            '!' => {
                self.next_char();
                if self.peek_char() == Some('=') {
                    self.next_char();
                    Token::NotEq
                } else {
                    return Err(self.error("unexpected character '!'"));
                }
            }
            '"' | '\'' => self.read_string(c)?,
            c if c.is_ascii_digit() => self.read_number()?,
            c if c.is_alphabetic() || c == '_' => self.read_ident(),
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };

        Ok(Spanned { token, line })
    }
}

/// Tokenize a whole script. The last token is always [`Token::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}
