//! `SELECT` parsing: builds a [`PlanNode`] tree directly out of clause
//! order, per the canonical shape `Scan/IndexScan -> Join? -> Filter? ->
//! Project?`, wrapped by `Aggregate? -> Sort? -> Limit?`.

use super::{Cursor, SelectQuery};
use crate::error::ParseError;
use crate::expr::Expr;
use crate::plan::{
    AggFunc, AggregateExpr, JoinCondition, JoinType, PlanNode, ProjectItem, ScanSource,
    SortDirection, SortKey,
};
use crate::tokenizer::{Keyword, TokenKind};

enum SelectItem {
    Star,
    Column(String),
    Aggregate(AggregateExpr),
}

pub fn parse_select_query(cursor: &mut Cursor) -> Result<SelectQuery, ParseError> {
    let ctes = if cursor.eat_keyword(Keyword::With) {
        parse_cte_list(cursor)?
    } else {
        Vec::new()
    };
    let plan = parse_select_core(cursor)?;
    Ok(SelectQuery { ctes, plan })
}

fn parse_cte_list(cursor: &mut Cursor) -> Result<Vec<(String, String)>, ParseError> {
    let mut ctes = Vec::new();
    loop {
        let name = cursor.expect_identifier("CTE name")?;
        cursor.expect_keyword(Keyword::As)?;
        cursor.expect(TokenKind::LParen)?;
        let start = cursor.current_pos();
        skip_balanced_parens(cursor)?;
        let text = cursor.source_since(start);
        cursor.expect(TokenKind::RParen)?;
        ctes.push((name, text));
        if !cursor.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(ctes)
}

/// Advance past tokens up to (not including) the `)` that closes the `(`
/// already consumed by the caller, tracking nested parens.
fn skip_balanced_parens(cursor: &mut Cursor) -> Result<(), ParseError> {
    let mut depth = 1usize;
    loop {
        match &cursor.peek().kind {
            TokenKind::Eof => {
                return Err(ParseError::UnexpectedEndOfQuery {
                    expected: ")".to_string(),
                })
            }
            TokenKind::LParen => {
                depth += 1;
                cursor.advance();
            }
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
                cursor.advance();
            }
            _ => {
                cursor.advance();
            }
        }
    }
}

fn parse_select_core(cursor: &mut Cursor) -> Result<PlanNode, ParseError> {
    cursor.expect_keyword(Keyword::Select)?;
    let items = parse_projection_list(cursor)?;

    cursor.expect_keyword(Keyword::From)?;
    let mut node = PlanNode::Scan {
        source: parse_scan_source(cursor)?,
        columns: None,
    };

    if let Some((join_type, right_source, condition)) = parse_optional_join(cursor)? {
        node = PlanNode::Join {
            left: Box::new(node),
            right: Box::new(PlanNode::Scan {
                source: right_source,
                columns: None,
            }),
            join_type,
            condition,
        };
    }

    if cursor.eat_keyword(Keyword::Where) {
        let predicate = cursor.parse_expr()?;
        node = PlanNode::Filter {
            input: Box::new(node),
            predicate,
        };
    }

    let group_by = if cursor.eat_keyword(Keyword::Group) {
        cursor.expect_keyword(Keyword::By)?;
        parse_column_list(cursor)?
    } else {
        Vec::new()
    };

    let aggregates: Vec<AggregateExpr> = items
        .iter()
        .filter_map(|item| match item {
            SelectItem::Aggregate(agg) => Some(agg.clone()),
            _ => None,
        })
        .collect();

    let having = if cursor.eat_keyword(Keyword::Having) {
        Some(cursor.parse_expr()?)
    } else {
        None
    };

    if !group_by.is_empty() || !aggregates.is_empty() {
        node = PlanNode::Aggregate {
            input: Box::new(node),
            group_by,
            aggregates,
            having,
        };
    } else {
        node = PlanNode::Project {
            input: Box::new(node),
            items: items
                .into_iter()
                .map(|item| match item {
                    SelectItem::Star => ProjectItem::Star,
                    SelectItem::Column(name) => ProjectItem::Column(name),
                    SelectItem::Aggregate(_) => unreachable!("filtered above"),
                })
                .collect(),
        };
    }

    if cursor.eat_keyword(Keyword::Order) {
        cursor.expect_keyword(Keyword::By)?;
        let keys = parse_sort_keys(cursor)?;
        node = PlanNode::Sort {
            input: Box::new(node),
            keys,
        };
    }

    let limit = if cursor.eat_keyword(Keyword::Limit) {
        Some(parse_usize_literal(cursor)?)
    } else {
        None
    };
    let offset = if cursor.eat_keyword(Keyword::Offset) {
        parse_usize_literal(cursor)?
    } else {
        0
    };
    if limit.is_some() || offset != 0 {
        node = PlanNode::Limit {
            input: Box::new(node),
            limit,
            offset,
        };
    }

    Ok(node)
}

fn parse_projection_list(cursor: &mut Cursor) -> Result<Vec<SelectItem>, ParseError> {
    let mut items = Vec::new();
    loop {
        items.push(parse_projection_item(cursor)?);
        if !cursor.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(items)
}

fn parse_projection_item(cursor: &mut Cursor) -> Result<SelectItem, ParseError> {
    if cursor.eat(&TokenKind::Star) {
        return Ok(SelectItem::Star);
    }
    let name = cursor.expect_identifier("projection item")?;
    if cursor.eat(&TokenKind::LParen) {
        let column = if cursor.eat(&TokenKind::Star) {
            None
        } else {
            Some(parse_qualified_name(cursor)?)
        };
        cursor.expect(TokenKind::RParen)?;
        let func = parse_agg_func(&name)?;
        let default_alias = match &column {
            Some(c) => format!("{}({})", name.to_ascii_lowercase(), c),
            None => format!("{}(*)", name.to_ascii_lowercase()),
        };
        let alias = if cursor.eat_keyword(Keyword::As) {
            cursor.expect_identifier("alias")?
        } else {
            default_alias
        };
        return Ok(SelectItem::Aggregate(AggregateExpr {
            func,
            column,
            alias,
        }));
    }
    let mut name = name;
    if cursor.eat(&TokenKind::Dot) {
        let tail = cursor.expect_identifier("qualified column")?;
        name.push('.');
        name.push_str(&tail);
    }
    Ok(SelectItem::Column(name))
}

fn parse_agg_func(name: &str) -> Result<AggFunc, ParseError> {
    match name.to_ascii_uppercase().as_str() {
        "COUNT" => Ok(AggFunc::Count),
        "SUM" => Ok(AggFunc::Sum),
        "AVG" => Ok(AggFunc::Avg),
        "MIN" => Ok(AggFunc::Min),
        "MAX" => Ok(AggFunc::Max),
        other => Err(ParseError::UnexpectedToken {
            found: other.to_string(),
            pos: 0,
        }),
    }
}

fn parse_qualified_name(cursor: &mut Cursor) -> Result<String, ParseError> {
    let mut name = cursor.expect_identifier("column")?;
    if cursor.eat(&TokenKind::Dot) {
        let tail = cursor.expect_identifier("qualified column")?;
        name.push('.');
        name.push_str(&tail);
    }
    Ok(name)
}

fn parse_scan_source(cursor: &mut Cursor) -> Result<ScanSource, ParseError> {
    let tok = cursor.peek().clone();
    match tok.kind {
        TokenKind::Identifier(name) => {
            cursor.advance();
            Ok(ScanSource::Table(name))
        }
        TokenKind::String(path) => {
            cursor.advance();
            Ok(ScanSource::FilePath(path))
        }
        _ => Err(ParseError::ExpectedIdentifier {
            what: "FROM source".to_string(),
            pos: tok.pos,
        }),
    }
}

fn parse_optional_join(
    cursor: &mut Cursor,
) -> Result<Option<(JoinType, ScanSource, JoinCondition)>, ParseError> {
    let join_type = if cursor.eat_keyword(Keyword::Inner) {
        cursor.expect_keyword(Keyword::Join)?;
        JoinType::Inner
    } else if cursor.eat_keyword(Keyword::Left) {
        cursor.eat_keyword(Keyword::Outer);
        cursor.expect_keyword(Keyword::Join)?;
        JoinType::Left
    } else if cursor.eat_keyword(Keyword::Right) {
        cursor.eat_keyword(Keyword::Outer);
        cursor.expect_keyword(Keyword::Join)?;
        JoinType::Right
    } else if cursor.eat_keyword(Keyword::Full) {
        cursor.eat_keyword(Keyword::Outer);
        cursor.expect_keyword(Keyword::Join)?;
        JoinType::Full
    } else if cursor.eat_keyword(Keyword::Join) {
        JoinType::Inner
    } else {
        return Ok(None);
    };

    let right_source = parse_scan_source(cursor)?;
    cursor.expect_keyword(Keyword::On)?;
    let left_column = parse_qualified_name(cursor)?;
    cursor.expect(TokenKind::Eq)?;
    let right_column = parse_qualified_name(cursor)?;
    Ok(Some((
        join_type,
        right_source,
        JoinCondition {
            left_column,
            right_column,
        },
    )))
}

fn parse_column_list(cursor: &mut Cursor) -> Result<Vec<String>, ParseError> {
    let mut cols = Vec::new();
    loop {
        cols.push(parse_qualified_name(cursor)?);
        if !cursor.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(cols)
}

fn parse_sort_keys(cursor: &mut Cursor) -> Result<Vec<SortKey>, ParseError> {
    let mut keys = Vec::new();
    loop {
        let column = parse_qualified_name(cursor)?;
        let direction = if cursor.eat_keyword(Keyword::Desc) {
            SortDirection::Desc
        } else {
            cursor.eat_keyword(Keyword::Asc);
            SortDirection::Asc
        };
        keys.push(SortKey { column, direction });
        if !cursor.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(keys)
}

fn parse_usize_literal(cursor: &mut Cursor) -> Result<usize, ParseError> {
    let tok = cursor.peek().clone();
    match tok.kind {
        TokenKind::Integer(i) if i >= 0 => {
            cursor.advance();
            Ok(i as usize)
        }
        _ => Err(ParseError::UnexpectedToken {
            found: format!("{:?}", tok.kind),
            pos: tok.pos,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn parse(src: &str) -> PlanNode {
        let tokens = Tokenizer::new(src).tokenize().unwrap();
        let mut cursor = Cursor::new(tokens, src);
        parse_select_core(&mut cursor).unwrap()
    }

    #[test]
    fn simple_select_builds_scan_and_project() {
        let plan = parse("SELECT age FROM users");
        match plan {
            PlanNode::Project { input, items } => {
                assert_eq!(items, vec![ProjectItem::Column("age".to_string())]);
                assert!(matches!(*input, PlanNode::Scan { .. }));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn where_wraps_scan_in_filter() {
        let plan = parse("SELECT age FROM users WHERE id = 2");
        match plan {
            PlanNode::Project { input, .. } => {
                assert!(matches!(*input, PlanNode::Filter { .. }));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn group_by_with_sum_builds_aggregate() {
        let plan = parse("SELECT k, SUM(v) AS total FROM t GROUP BY k");
        match plan {
            PlanNode::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                assert_eq!(group_by, vec!["k".to_string()]);
                assert_eq!(aggregates.len(), 1);
                assert_eq!(aggregates[0].func, AggFunc::Sum);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn join_builds_join_node() {
        let plan = parse("SELECT * FROM l LEFT JOIN r ON l.id = r.id");
        match plan {
            PlanNode::Project { input, .. } => {
                assert!(matches!(*input, PlanNode::Join { join_type: JoinType::Left, .. }));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn limit_and_offset() {
        let plan = parse("SELECT * FROM t LIMIT 5 OFFSET 10");
        match plan {
            PlanNode::Limit { limit, offset, .. } => {
                assert_eq!(limit, Some(5));
                assert_eq!(offset, 10);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
