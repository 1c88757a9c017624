//! Operator-precedence expression parsing for `WHERE`/`HAVING`/projection
//! items. Precedence, lowest to highest: `OR < AND < NOT < comparison <
//! additive < multiplicative`. Parentheses override precedence.

use super::Cursor;
use crate::error::ParseError;
use crate::expr::{ArithOp, CompareOp, Expr, LogicalOp};
use crate::tokenizer::{Keyword, TokenKind};
use crate::value::Value;

impl Cursor {
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword(Keyword::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        if self.eat_keyword(Keyword::Like) {
            let pattern = self.expect_string_literal("LIKE pattern")?;
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern,
            });
        }

        if self.eat_keyword(Keyword::Between) {
            let low = self.parse_additive()?;
            self.expect_keyword(Keyword::And)?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
            });
        }

        if self.eat_keyword(Keyword::In) {
            self.expect(TokenKind::LParen)?;
            let mut list = Vec::new();
            if !self.eat(&TokenKind::RParen) {
                loop {
                    list.push(self.parse_additive()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
            }
            return Ok(Expr::In {
                expr: Box::new(left),
                list,
            });
        }

        if self.eat_keyword(Keyword::Is) {
            let negated = self.eat_keyword(Keyword::Not);
            self.expect_keyword(Keyword::Null)?;
            return Ok(if negated {
                Expr::IsNotNull(Box::new(left))
            } else {
                Expr::IsNull(Box::new(left))
            });
        }

        let op = match &self.peek().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Ge => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer(i) => {
                self.advance();
                Ok(Expr::Literal(Value::Int64(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Float64(f)))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Value::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Value::Boolean(false)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                self.parse_identifier_tail(name, tok.pos)
            }
            _ => Err(ParseError::UnexpectedToken {
                found: format!("{:?}", tok.kind),
                pos: tok.pos,
            }),
        }
    }

    /// After consuming a leading identifier: it may continue as a
    /// qualified `table.column`, or be the start of a function call
    /// `name(args...)`.
    fn parse_identifier_tail(&mut self, name: String, pos: usize) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::LParen) {
            let mut args = Vec::new();
            if self.eat(&TokenKind::Star) {
                // COUNT(*): represented as a zero-arg call; the executor's
                // aggregate recognizer special-cases `COUNT` with no args.
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::FunctionCall { name, args });
            }
            if !self.eat(&TokenKind::RParen) {
                loop {
                    args.push(self.parse_or()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
            }
            return Ok(Expr::FunctionCall { name, args });
        }
        let mut qualified = name;
        if self.eat(&TokenKind::Dot) {
            let tail = self.expect_identifier("qualified column")?;
            qualified.push('.');
            qualified.push_str(&tail);
            let _ = pos;
        }
        Ok(Expr::Column(qualified))
    }

    fn expect_string_literal(&mut self, what: &str) -> Result<String, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::String(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(ParseError::ExpectedIdentifier {
                what: what.to_string(),
                pos: tok.pos,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn parse_expr(src: &str) -> Expr {
        let tokens = Tokenizer::new(src).tokenize().unwrap();
        let mut cursor = Cursor::new(tokens, src);
        cursor.parse_expr().unwrap()
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let expr = parse_expr("a = 1 OR b = 2 AND c = 3");
        match expr {
            Expr::Logical {
                op: LogicalOp::Or, ..
            } => {}
            _ => panic!("expected top-level OR, got {expr:?}"),
        }
    }

    #[test]
    fn between_and_in_and_like_parse() {
        parse_expr("a BETWEEN 1 AND 10");
        parse_expr("a IN (1, 2, 3)");
        parse_expr("name LIKE 'Al%'");
    }

    #[test]
    fn qualified_column_reference() {
        let expr = parse_expr("t.c");
        assert_eq!(expr, Expr::Column("t.c".to_string()));
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse_expr("a + b * 2");
        match expr {
            Expr::Arith {
                op: ArithOp::Add, ..
            } => {}
            _ => panic!("expected top-level +"),
        }
    }
}
