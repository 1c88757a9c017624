//! Recursive-descent parser over the tokenizer's output.
//!
//! `mod.rs` owns the token [`Cursor`] primitive (including the `peek()`
//! several productions need for one-token lookahead) and the top-level
//! [`Statement`] enum; [`expr_parser`] builds `WHERE`/`HAVING`/projection
//! expressions with the documented operator precedence, [`select`] builds
//! `SELECT` into a [`crate::plan::PlanNode`], and [`ddl`] covers every other
//! statement shape.

pub mod ddl;
pub mod expr_parser;
pub mod select;

use crate::error::ParseError;
use crate::plan::PlanNode;
use crate::tokenizer::{Keyword, Token, TokenKind, Tokenizer};
use crate::value::DataType;
use serde::{Deserialize, Serialize};

/// One `SELECT`, plus any CTEs introduced by a leading `WITH` clause. Each
/// CTE keeps its subquery as source text (re-parsed on first reference,
/// per the source's CTE scoping) rather than a pre-built plan.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub ctes: Vec<(String, String)>,
    pub plan: PlanNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlFunctionKind {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDef {
    Enum(Vec<String>),
    Struct(Vec<(String, DataType)>),
    Alias(DataType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Snappy,
    Gzip,
    Lz4,
    Zstd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTarget {
    MaterializedView(String),
    Model(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowTarget {
    LineageForModel(String),
    LineageForColumn { table: String, column: String },
    DependenciesForModel(String),
    Schedules,
    Databases,
    Types,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    CreateTable {
        name: String,
        schema: crate::schema::Schema,
    },
    CreateTableAsSelect {
        name: String,
        query: SelectQuery,
    },
    CreateView {
        name: String,
        materialized: bool,
        query_text: String,
    },
    CreateModel {
        name: String,
        sql_text: String,
        incremental: bool,
        partition_column: Option<String>,
    },
    CreateType {
        name: String,
        def: TypeDef,
    },
    CreateFunction {
        name: String,
        args: Vec<(String, DataType)>,
        returns: DataType,
        kind: PlFunctionKind,
        body: String,
    },
    CreateSchedule {
        id: String,
        model_name: String,
        cron_expression: String,
        max_retries: u32,
    },
    InsertInto {
        table: String,
        values: Vec<Vec<crate::value::Value>>,
    },
    DropSchedule {
        id: String,
    },
    Refresh(RefreshTarget),
    Show(ShowTarget),
    DescribeType {
        name: String,
    },
    Save {
        path: String,
        compression: CompressionKind,
    },
    Load {
        path: String,
    },
    Attach {
        path: String,
        alias: String,
    },
    Detach {
        alias: String,
    },
}

/// Parse the entire source as a sequence of `;`-terminated statements (the
/// trailing `;` on the last statement is optional).
pub fn parse(source: &str) -> Result<Vec<Statement>, ParseError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    let mut cursor = Cursor::new(tokens, source);
    let mut statements = Vec::new();
    while !cursor.at_eof() {
        while cursor.eat(&TokenKind::Semicolon) {}
        if cursor.at_eof() {
            break;
        }
        statements.push(cursor.parse_statement()?);
        while cursor.eat(&TokenKind::Semicolon) {}
    }
    Ok(statements)
}

/// Token cursor with one-token `peek()` lookahead, shared by every parser
/// submodule via `impl Cursor` blocks in their own files.
pub struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
    chars: Vec<char>,
}

impl Cursor {
    pub fn new(tokens: Vec<Token>, source: &str) -> Self {
        Cursor {
            tokens,
            pos: 0,
            chars: source.chars().collect(),
        }
    }

    pub fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if matches!(&self.peek().kind, TokenKind::Keyword(k) if *k == kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if *k == kw)
    }

    pub fn expect_keyword(&mut self, kw: Keyword) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                found: format!("{:?}", self.peek().kind),
                pos: self.peek().pos,
            })
        }
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                found: format!("{:?}", self.peek().kind),
                pos: self.peek().pos,
            })
        }
    }

    pub fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::ExpectedIdentifier {
                what: what.to_string(),
                pos: tok.pos,
            }),
        }
    }

    /// Current token's starting character offset into the original source.
    pub fn current_pos(&self) -> usize {
        self.peek().pos
    }

    /// Verbatim source text in `[start, current_pos)`, trimmed. Used to
    /// capture CTE subqueries, view/model bodies, and other spans the
    /// source intends to keep as re-parseable text rather than a pre-built
    /// plan.
    pub fn source_since(&self, start: usize) -> String {
        let end = self.current_pos().min(self.chars.len());
        let start = start.min(end);
        self.chars[start..end].iter().collect::<String>().trim().to_string()
    }

    /// Source text to the very end of input, trimmed.
    pub fn source_to_end(&self, start: usize) -> String {
        let start = start.min(self.chars.len());
        self.chars[start..].iter().collect::<String>().trim().to_string()
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.check_keyword(Keyword::With) || self.check_keyword(Keyword::Select) {
            return Ok(Statement::Select(select::parse_select_query(self)?));
        }
        if self.check_keyword(Keyword::Create) {
            return ddl::parse_create(self);
        }
        if self.check_keyword(Keyword::Insert) {
            return ddl::parse_insert(self);
        }
        if self.check_keyword(Keyword::Drop) {
            return ddl::parse_drop(self);
        }
        if self.check_keyword(Keyword::Refresh) {
            return ddl::parse_refresh(self);
        }
        if self.check_keyword(Keyword::Show) {
            return ddl::parse_show(self);
        }
        if self.check_keyword(Keyword::Describe) {
            return ddl::parse_describe(self);
        }
        if self.check_keyword(Keyword::Save) {
            return ddl::parse_save(self);
        }
        if self.check_keyword(Keyword::Load) {
            return ddl::parse_load(self);
        }
        if self.check_keyword(Keyword::Attach) {
            return ddl::parse_attach(self);
        }
        if self.check_keyword(Keyword::Detach) {
            return ddl::parse_detach(self);
        }
        Err(ParseError::UnexpectedToken {
            found: format!("{:?}", self.peek().kind),
            pos: self.peek().pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_statements_on_semicolon() {
        let stmts = parse("SELECT * FROM t; SELECT * FROM u").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn trailing_semicolon_is_optional() {
        let stmts = parse("SELECT * FROM t;").unwrap();
        assert_eq!(stmts.len(), 1);
    }
}
