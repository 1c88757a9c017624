//! Single-pass tokenizer for the SQL + PL-Grizzly dialect.
//!
//! Recognizes numeric literals (integer vs. floating by the presence of a
//! `.`), single- or double-quoted strings (quotes stripped), identifiers,
//! punctuation, comparison/logical/arrow operators, and the reserved-word
//! table below. Keyword matching is ASCII case-insensitive; identifiers
//! keep whatever case the source used.

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select, From, Where, Group, By, Having, Order, Asc, Desc, Limit, Offset,
    As, With, Join, Inner, Left, Right, Full, Outer, On,
    Create, Table, View, Materialized, Model, Incremental, Partition, Date,
    Type, Enum, Struct, Function, Returns, Sync, Async, Schedule, For, Cron,
    Failure, Retry, Drop, Insert, Into, Values, Refresh, Show, Lineage,
    Column_, Dependencies, Schedules, Databases, Types, Describe,
    Save, Load, Attach, Detach, Database, To, Compression,
    And, Or, Not, In, Is, Null, Like, Between,
    True, False,
}

impl Keyword {
    fn from_str(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s.to_ascii_uppercase().as_str() {
            "SELECT" => Select, "FROM" => From, "WHERE" => Where, "GROUP" => Group,
            "BY" => By, "HAVING" => Having, "ORDER" => Order, "ASC" => Asc,
            "DESC" => Desc, "LIMIT" => Limit, "OFFSET" => Offset, "AS" => As,
            "WITH" => With, "JOIN" => Join, "INNER" => Inner, "LEFT" => Left,
            "RIGHT" => Right, "FULL" => Full, "OUTER" => Outer, "ON" => On,
            "CREATE" => Create, "TABLE" => Table, "VIEW" => View,
            "MATERIALIZED" => Materialized, "MODEL" => Model,
            "INCREMENTAL" => Incremental, "PARTITION" => Partition, "DATE" => Date,
            "TYPE" => Type, "ENUM" => Enum, "STRUCT" => Struct,
            "FUNCTION" => Function, "RETURNS" => Returns, "SYNC" => Sync,
            "ASYNC" => Async, "SCHEDULE" => Schedule, "FOR" => For, "CRON" => Cron,
            "FAILURE" => Failure, "RETRY" => Retry, "DROP" => Drop,
            "INSERT" => Insert, "INTO" => Into, "VALUES" => Values,
            "REFRESH" => Refresh, "SHOW" => Show, "LINEAGE" => Lineage,
            "COLUMN" => Column_, "DEPENDENCIES" => Dependencies,
            "SCHEDULES" => Schedules, "DATABASES" => Databases, "TYPES" => Types,
            "DESCRIBE" => Describe, "SAVE" => Save, "LOAD" => Load,
            "ATTACH" => Attach, "DETACH" => Detach, "DATABASE" => Database,
            "TO" => To, "COMPRESSION" => Compression,
            "AND" => And, "OR" => Or, "NOT" => Not, "IN" => In, "IS" => Is,
            "NULL" => Null, "LIKE" => Like, "BETWEEN" => Between,
            "TRUE" => True, "FALSE" => False,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    /// `=`, `<>`/`!=`, `<`, `>`, `<=`, `>=`
    Eq, Ne, Lt, Gt, Le, Ge,
    Plus, Minus, Star, Slash,
    LParen, RParen, Comma, Dot, Semicolon,
    /// Balance-matched opaque source text captured between `{` and `}`.
    FunctionBody(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

pub struct Tokenizer<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Tokenizer {
            chars: src.chars().collect(),
            pos: 0,
            src,
        }
    }

    /// Tokenize the entire input, terminating with a single `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
                self.pos += 1;
            }
            if self.peek_char() == Some('-') && self.peek_char_at(1) == Some('-') {
                while !matches!(self.peek_char(), None | Some('\n')) {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos: start,
            });
        };

        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == '\'' || c == '"' {
            return self.lex_string(start);
        }
        if c.is_alphabetic() || c == '_' {
            return self.lex_identifier(start);
        }
        if c == '{' {
            return self.lex_function_body(start);
        }

        self.advance();
        let kind = match c {
            '=' => TokenKind::Eq,
            '<' => match self.peek_char() {
                Some('>') => {
                    self.advance();
                    TokenKind::Ne
                }
                Some('=') => {
                    self.advance();
                    TokenKind::Le
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Ne
                } else {
                    return Err(ParseError::UnexpectedToken {
                        found: "!".to_string(),
                        pos: start,
                    });
                }
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            other => {
                return Err(ParseError::UnexpectedToken {
                    found: other.to_string(),
                    pos: start,
                })
            }
        };
        Ok(Token { kind, pos: start })
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut is_float = false;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.') && matches!(self.peek_char_at(1), Some(c) if c.is_ascii_digit())
        {
            is_float = true;
            self.advance();
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(|f| Token {
                    kind: TokenKind::Float(f),
                    pos: start,
                })
                .map_err(|_| ParseError::InvalidNumber { text, pos: start })
        } else {
            text.parse::<i64>()
                .map(|i| Token {
                    kind: TokenKind::Integer(i),
                    pos: start,
                })
                .map_err(|_| ParseError::InvalidNumber { text, pos: start })
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Token, ParseError> {
        let quote = self.advance().unwrap();
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::UnterminatedString { pos: start }),
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::String(s),
            pos: start,
        })
    }

    fn lex_identifier(&mut self, start: usize) -> Result<Token, ParseError> {
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = Keyword::from_str(&text)
            .map(TokenKind::Keyword)
            .unwrap_or(TokenKind::Identifier(text));
        Ok(Token { kind, pos: start })
    }

    /// Balance-matched `{ ... }` body, used by `CREATE FUNCTION`. Braces
    /// inside string literals are not special-cased further than the
    /// outermost string lexing, matching the source's "opaque text" intent.
    fn lex_function_body(&mut self, start: usize) -> Result<Token, ParseError> {
        self.advance(); // consume the opening '{'
        let body_start = self.pos;
        let mut depth = 1usize;
        loop {
            match self.advance() {
                None => return Err(ParseError::UnterminatedString { pos: start }),
                Some('{') => depth += 1,
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Some(_) => {}
            }
        }
        let body: String = self.chars[body_start..self.pos - 1].iter().collect();
        Ok(Token {
            kind: TokenKind::FunctionBody(body),
            pos: start,
        })
    }

    pub fn source(&self) -> &str {
        self.src
    }
}
