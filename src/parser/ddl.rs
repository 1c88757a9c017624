//! DDL/DML statement parsing: everything that isn't a bare `SELECT`.

use super::{
    select, CompressionKind, Cursor, PlFunctionKind, RefreshTarget, ShowTarget, Statement,
    TypeDef,
};
use crate::error::ParseError;
use crate::schema::{Schema, SchemaField};
use crate::tokenizer::{Keyword, TokenKind};
use crate::value::{DataType, Value};

pub fn parse_create(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Create)?;

    if cursor.eat_keyword(Keyword::Table) {
        return parse_create_table(cursor);
    }
    if cursor.eat_keyword(Keyword::Materialized) {
        cursor.expect_keyword(Keyword::View)?;
        return parse_create_view(cursor, true);
    }
    if cursor.eat_keyword(Keyword::View) {
        return parse_create_view(cursor, false);
    }
    if cursor.eat_keyword(Keyword::Incremental) {
        cursor.expect_keyword(Keyword::Model)?;
        return parse_create_model(cursor, true);
    }
    if cursor.eat_keyword(Keyword::Model) {
        return parse_create_model(cursor, false);
    }
    if cursor.eat_keyword(Keyword::Type) {
        return parse_create_type(cursor);
    }
    if cursor.eat_keyword(Keyword::Function) {
        return parse_create_function(cursor);
    }
    if cursor.eat_keyword(Keyword::Schedule) {
        return parse_create_schedule(cursor);
    }
    Err(ParseError::UnexpectedToken {
        found: format!("{:?}", cursor.peek().kind),
        pos: cursor.peek().pos,
    })
}

fn parse_create_table(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    let name = cursor.expect_identifier("table name")?;
    if cursor.eat_keyword(Keyword::As) {
        let query = select::parse_select_query(cursor)?;
        return Ok(Statement::CreateTableAsSelect { name, query });
    }
    cursor.expect(TokenKind::LParen)?;
    let mut fields = Vec::new();
    loop {
        let col_name = cursor.expect_identifier("column name")?;
        let data_type = parse_data_type(cursor)?;
        fields.push(SchemaField::new(col_name, data_type));
        if !cursor.eat(&TokenKind::Comma) {
            break;
        }
    }
    cursor.expect(TokenKind::RParen)?;
    Ok(Statement::CreateTable {
        name,
        schema: Schema::new(fields),
    })
}

fn parse_create_view(cursor: &mut Cursor, materialized: bool) -> Result<Statement, ParseError> {
    let name = cursor.expect_identifier("view name")?;
    cursor.expect_keyword(Keyword::As)?;
    let query_text = capture_statement_tail(cursor);
    Ok(Statement::CreateView {
        name,
        materialized,
        query_text,
    })
}

fn parse_create_model(cursor: &mut Cursor, incremental: bool) -> Result<Statement, ParseError> {
    let name = cursor.expect_identifier("model name")?;
    let partition_column = if cursor.eat_keyword(Keyword::Partition) {
        cursor.expect_keyword(Keyword::By)?;
        cursor.expect_keyword(Keyword::Date)?;
        cursor.expect(TokenKind::LParen)?;
        let col = cursor.expect_identifier("partition column")?;
        cursor.expect(TokenKind::RParen)?;
        Some(col)
    } else {
        None
    };
    cursor.expect_keyword(Keyword::As)?;
    let sql_text = capture_statement_tail(cursor);
    Ok(Statement::CreateModel {
        name,
        sql_text,
        incremental,
        partition_column,
    })
}

fn parse_create_type(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    let name = cursor.expect_identifier("type name")?;
    cursor.expect_keyword(Keyword::As)?;
    let def = if cursor.eat_keyword(Keyword::Enum) {
        cursor.expect(TokenKind::LParen)?;
        let mut values = Vec::new();
        loop {
            values.push(expect_string_literal(cursor, "enum value")?);
            if !cursor.eat(&TokenKind::Comma) {
                break;
            }
        }
        cursor.expect(TokenKind::RParen)?;
        TypeDef::Enum(values)
    } else if cursor.eat_keyword(Keyword::Struct) {
        cursor.expect(TokenKind::LParen)?;
        let mut fields = Vec::new();
        loop {
            let field_name = cursor.expect_identifier("struct field")?;
            let data_type = parse_data_type(cursor)?;
            fields.push((field_name, data_type));
            if !cursor.eat(&TokenKind::Comma) {
                break;
            }
        }
        cursor.expect(TokenKind::RParen)?;
        TypeDef::Struct(fields)
    } else {
        TypeDef::Alias(parse_data_type(cursor)?)
    };
    Ok(Statement::CreateType { name, def })
}

fn parse_create_function(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    let name = cursor.expect_identifier("function name")?;
    cursor.expect(TokenKind::LParen)?;
    let mut args = Vec::new();
    if !cursor.eat(&TokenKind::RParen) {
        loop {
            let arg_name = cursor.expect_identifier("argument name")?;
            let data_type = parse_data_type(cursor)?;
            args.push((arg_name, data_type));
            if !cursor.eat(&TokenKind::Comma) {
                break;
            }
        }
        cursor.expect(TokenKind::RParen)?;
    }
    cursor.expect_keyword(Keyword::Returns)?;
    let returns = parse_data_type(cursor)?;
    let kind = if cursor.eat_keyword(Keyword::As) {
        if cursor.eat_keyword(Keyword::Async) {
            PlFunctionKind::Async
        } else {
            cursor.expect_keyword(Keyword::Sync)?;
            PlFunctionKind::Sync
        }
    } else {
        PlFunctionKind::Sync
    };
    let tok = cursor.peek().clone();
    let body = match tok.kind {
        TokenKind::FunctionBody(body) => {
            cursor.advance();
            body
        }
        _ => {
            return Err(ParseError::UnexpectedToken {
                found: format!("{:?}", tok.kind),
                pos: tok.pos,
            })
        }
    };
    Ok(Statement::CreateFunction {
        name,
        args,
        returns,
        kind,
        body,
    })
}

fn parse_create_schedule(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    let id = cursor.expect_identifier("schedule id")?;
    cursor.expect_keyword(Keyword::For)?;
    cursor.expect_keyword(Keyword::Model)?;
    let model_name = cursor.expect_identifier("model name")?;
    cursor.expect_keyword(Keyword::Cron)?;
    let cron_expression = expect_string_literal(cursor, "cron expression")?;
    let max_retries = if cursor.eat_keyword(Keyword::On) {
        cursor.expect_keyword(Keyword::Failure)?;
        cursor.expect_keyword(Keyword::Retry)?;
        expect_u32_literal(cursor)?
    } else {
        0
    };
    Ok(Statement::CreateSchedule {
        id,
        model_name,
        cron_expression,
        max_retries,
    })
}

pub fn parse_insert(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Insert)?;
    cursor.expect_keyword(Keyword::Into)?;
    let table = cursor.expect_identifier("table name")?;
    cursor.expect_keyword(Keyword::Values)?;
    let mut rows = Vec::new();
    loop {
        cursor.expect(TokenKind::LParen)?;
        let mut row = Vec::new();
        loop {
            row.push(parse_literal_value(cursor)?);
            if !cursor.eat(&TokenKind::Comma) {
                break;
            }
        }
        cursor.expect(TokenKind::RParen)?;
        rows.push(row);
        if !cursor.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(Statement::InsertInto {
        table,
        values: rows,
    })
}

pub fn parse_drop(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Drop)?;
    cursor.expect_keyword(Keyword::Schedule)?;
    let id = cursor.expect_identifier("schedule id")?;
    Ok(Statement::DropSchedule { id })
}

pub fn parse_refresh(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Refresh)?;
    if cursor.eat_keyword(Keyword::Materialized) {
        cursor.expect_keyword(Keyword::View)?;
        let name = cursor.expect_identifier("materialized view name")?;
        return Ok(Statement::Refresh(RefreshTarget::MaterializedView(name)));
    }
    cursor.expect_keyword(Keyword::Model)?;
    let name = cursor.expect_identifier("model name")?;
    Ok(Statement::Refresh(RefreshTarget::Model(name)))
}

pub fn parse_show(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Show)?;
    if cursor.eat_keyword(Keyword::Lineage) {
        cursor.expect_keyword(Keyword::For)?;
        if cursor.eat_keyword(Keyword::Model) {
            let name = cursor.expect_identifier("model name")?;
            return Ok(Statement::Show(ShowTarget::LineageForModel(name)));
        }
        cursor.expect_keyword(Keyword::Column_)?;
        let qualified = cursor.expect_identifier("table.column")?;
        cursor.expect(TokenKind::Dot)?;
        let column = cursor.expect_identifier("column")?;
        return Ok(Statement::Show(ShowTarget::LineageForColumn {
            table: qualified,
            column,
        }));
    }
    if cursor.eat_keyword(Keyword::Dependencies) {
        cursor.expect_keyword(Keyword::For)?;
        cursor.expect_keyword(Keyword::Model)?;
        let name = cursor.expect_identifier("model name")?;
        return Ok(Statement::Show(ShowTarget::DependenciesForModel(name)));
    }
    if cursor.eat_keyword(Keyword::Schedules) {
        return Ok(Statement::Show(ShowTarget::Schedules));
    }
    if cursor.eat_keyword(Keyword::Databases) {
        return Ok(Statement::Show(ShowTarget::Databases));
    }
    if cursor.eat_keyword(Keyword::Types) {
        return Ok(Statement::Show(ShowTarget::Types));
    }
    Err(ParseError::UnexpectedToken {
        found: format!("{:?}", cursor.peek().kind),
        pos: cursor.peek().pos,
    })
}

pub fn parse_describe(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Describe)?;
    cursor.expect_keyword(Keyword::Type)?;
    let name = cursor.expect_identifier("type name")?;
    Ok(Statement::DescribeType { name })
}

pub fn parse_save(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Save)?;
    cursor.expect_keyword(Keyword::Database)?;
    cursor.expect_keyword(Keyword::To)?;
    let path = expect_string_literal(cursor, "save path")?;
    let compression = if cursor.eat_keyword(Keyword::With) {
        cursor.expect_keyword(Keyword::Compression)?;
        parse_compression_kind(cursor)?
    } else {
        CompressionKind::None
    };
    Ok(Statement::Save { path, compression })
}

pub fn parse_load(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Load)?;
    cursor.expect_keyword(Keyword::Database)?;
    cursor.expect_keyword(Keyword::From)?;
    let path = expect_string_literal(cursor, "load path")?;
    Ok(Statement::Load { path })
}

pub fn parse_attach(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Attach)?;
    cursor.expect_keyword(Keyword::Database)?;
    let path = expect_string_literal(cursor, "attach path")?;
    cursor.expect_keyword(Keyword::As)?;
    let alias = cursor.expect_identifier("attach alias")?;
    Ok(Statement::Attach { path, alias })
}

pub fn parse_detach(cursor: &mut Cursor) -> Result<Statement, ParseError> {
    cursor.expect_keyword(Keyword::Detach)?;
    cursor.expect_keyword(Keyword::Database)?;
    let alias = cursor.expect_identifier("detach alias")?;
    Ok(Statement::Detach { alias })
}

fn parse_compression_kind(cursor: &mut Cursor) -> Result<CompressionKind, ParseError> {
    let name = cursor.expect_identifier("compression kind")?;
    match name.to_ascii_uppercase().as_str() {
        "NONE" => Ok(CompressionKind::None),
        "SNAPPY" => Ok(CompressionKind::Snappy),
        "GZIP" => Ok(CompressionKind::Gzip),
        "LZ4" => Ok(CompressionKind::Lz4),
        "ZSTD" => Ok(CompressionKind::Zstd),
        other => Err(ParseError::UnexpectedToken {
            found: other.to_string(),
            pos: 0,
        }),
    }
}

fn parse_data_type(cursor: &mut Cursor) -> Result<DataType, ParseError> {
    let name = cursor.expect_identifier("data type")?;
    match name.to_ascii_lowercase().as_str() {
        "int32" => Ok(DataType::Int32),
        "int64" => Ok(DataType::Int64),
        "float32" => Ok(DataType::Float32),
        "float64" => Ok(DataType::Float64),
        "boolean" | "bool" => Ok(DataType::Boolean),
        "string" | "text" => Ok(DataType::String),
        "timestamp" => Ok(DataType::Timestamp),
        "vector" => {
            if cursor.eat(&TokenKind::Lt) {
                let dim = expect_u32_literal(cursor)? as usize;
                cursor.expect(TokenKind::Gt)?;
                Ok(DataType::Vector(Some(dim)))
            } else {
                Ok(DataType::Vector(None))
            }
        }
        _ => Ok(DataType::Custom(name)),
    }
}

fn parse_literal_value(cursor: &mut Cursor) -> Result<Value, ParseError> {
    let tok = cursor.peek().clone();
    match tok.kind {
        TokenKind::Integer(i) => {
            cursor.advance();
            Ok(Value::Int64(i))
        }
        TokenKind::Float(f) => {
            cursor.advance();
            Ok(Value::Float64(f))
        }
        TokenKind::String(s) => {
            cursor.advance();
            Ok(Value::String(s))
        }
        TokenKind::Keyword(Keyword::True) => {
            cursor.advance();
            Ok(Value::Boolean(true))
        }
        TokenKind::Keyword(Keyword::False) => {
            cursor.advance();
            Ok(Value::Boolean(false))
        }
        TokenKind::Minus => {
            cursor.advance();
            match parse_literal_value(cursor)? {
                Value::Int64(i) => Ok(Value::Int64(-i)),
                Value::Float64(f) => Ok(Value::Float64(-f)),
                other => Err(ParseError::UnexpectedToken {
                    found: format!("{other:?}"),
                    pos: tok.pos,
                }),
            }
        }
        _ => Err(ParseError::UnexpectedToken {
            found: format!("{:?}", tok.kind),
            pos: tok.pos,
        }),
    }
}

fn expect_string_literal(cursor: &mut Cursor, what: &str) -> Result<String, ParseError> {
    let tok = cursor.peek().clone();
    match tok.kind {
        TokenKind::String(s) => {
            cursor.advance();
            Ok(s)
        }
        _ => Err(ParseError::ExpectedIdentifier {
            what: what.to_string(),
            pos: tok.pos,
        }),
    }
}

fn expect_u32_literal(cursor: &mut Cursor) -> Result<u32, ParseError> {
    let tok = cursor.peek().clone();
    match tok.kind {
        TokenKind::Integer(i) if i >= 0 => {
            cursor.advance();
            Ok(i as u32)
        }
        _ => Err(ParseError::UnexpectedToken {
            found: format!("{:?}", tok.kind),
            pos: tok.pos,
        }),
    }
}

/// Consume tokens up to (not including) the statement-terminating `;` or
/// end of input, returning the verbatim source span. Used for view/model
/// bodies, which are re-parsed as their own `SELECT` on first use.
fn capture_statement_tail(cursor: &mut Cursor) -> String {
    let start = cursor.current_pos();
    while !matches!(cursor.peek().kind, TokenKind::Semicolon | TokenKind::Eof) {
        cursor.advance();
    }
    cursor.source_since(start)
}
