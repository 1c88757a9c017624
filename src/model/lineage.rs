//! `SHOW LINEAGE FOR COLUMN t.c` support: a shallow, token-level scan of a
//! model's defining `SELECT` that locates the projection item producing a
//! given output column and lists the identifiers that feed it. This is
//! intentionally not a full semantic analysis -- it does not resolve
//! subqueries or CTEs, matching the same token-level approach dependency
//! extraction uses in [`super::dag`].

use crate::tokenizer::{Keyword, Token, TokenKind, Tokenizer};

/// Returns the upstream column/identifier names that feed `column` in the
/// model's defining SQL, or `None` if no projection item produces it.
pub fn lineage_for_column(sql_text: &str, column: &str) -> Option<Vec<String>> {
    let tokens = Tokenizer::new(sql_text).tokenize().ok()?;
    let select_pos = tokens
        .iter()
        .position(|t| t.kind == TokenKind::Keyword(Keyword::Select))?;
    let from_pos = tokens
        .iter()
        .enumerate()
        .skip(select_pos)
        .find(|(_, t)| t.kind == TokenKind::Keyword(Keyword::From))
        .map(|(i, _)| i)?;

    let projection = &tokens[select_pos + 1..from_pos];
    let target_tail = column.rsplit('.').next().unwrap_or(column);

    for item in split_top_level(projection, &TokenKind::Comma) {
        if item_alias(item) == target_tail {
            return Some(upstream_identifiers(item));
        }
    }
    None
}

/// Splits a token slice on a separator that appears only at paren-depth 0.
fn split_top_level<'a>(tokens: &'a [Token], sep: &TokenKind) -> Vec<&'a [Token]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, tok) in tokens.iter().enumerate() {
        match &tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            k if depth == 0 && k == sep => {
                out.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start <= tokens.len() {
        out.push(&tokens[start..]);
    }
    out
}

/// The name this projection item is visible as: the identifier after a
/// top-level `AS`, or else the last dotted segment of a bare column
/// reference / function-call alias default.
fn item_alias(item: &[Token]) -> String {
    let mut depth = 0i32;
    for (i, tok) in item.iter().enumerate() {
        match &tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            TokenKind::Keyword(Keyword::As) if depth == 0 => {
                if let Some(Token {
                    kind: TokenKind::Identifier(name),
                    ..
                }) = item.get(i + 1)
                {
                    return name.clone();
                }
            }
            _ => {}
        }
    }
    item.iter()
        .rev()
        .find_map(|t| match &t.kind {
            TokenKind::Identifier(name) => Some(name.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Every identifier referenced by the item that is not itself a function
/// name (an identifier immediately followed by `(`).
fn upstream_identifiers(item: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    for (i, tok) in item.iter().enumerate() {
        if let TokenKind::Identifier(name) = &tok.kind {
            let is_function_name = matches!(item.get(i + 1), Some(t) if t.kind == TokenKind::LParen);
            let is_alias_name = i > 0
                && item[i - 1].kind == TokenKind::Keyword(Keyword::As);
            if !is_function_name && !is_alias_name && !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_plain_column_lineage() {
        let lineage = lineage_for_column("SELECT orders.total FROM orders", "total").unwrap();
        assert_eq!(lineage, vec!["orders".to_string(), "total".to_string()]);
    }

    #[test]
    fn finds_aliased_expression_lineage() {
        let lineage =
            lineage_for_column("SELECT SUM(amount) AS revenue FROM orders", "revenue").unwrap();
        assert_eq!(lineage, vec!["amount".to_string()]);
    }

    #[test]
    fn missing_column_returns_none() {
        assert!(lineage_for_column("SELECT a FROM t", "b").is_none());
    }
}
