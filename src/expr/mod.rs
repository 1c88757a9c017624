//! Expression AST and row-level predicate evaluator.
//!
//! Covers everything a `WHERE`/`HAVING` clause or a non-aggregate
//! projection item can contain: literals, column references, arithmetic,
//! comparisons, boolean logic, `IS [NOT] NULL`, `LIKE`, `IN`, `BETWEEN`, and
//! function calls (aggregates are recognized and evaluated by the executor's
//! `Aggregate` node, not here; `vector_search` is recognized here only to
//! reject it with a typed error, since it needs table-level context).
//!
//! Boolean evaluation short-circuits: `And`/`Or` never evaluate their right
//! operand once the left one decides the result.

use crate::error::ExecutionError;
use crate::schema::Schema;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// An expression tree node. Binary/unary nodes own their children outright
/// (one arena, the query's own `Box` tree; no sharing).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Unqualified or `table.column` qualified column reference.
    Column(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Like {
        expr: Box<Expr>,
        pattern: String,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Evaluate this expression against one row, resolving column
    /// references against `schema`. `row` and `schema` must agree in
    /// length and order (the executor's invariant for any row it produces).
    pub fn eval(&self, row: &[Value], schema: &Schema) -> Result<Value, ExecutionError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(name) => resolve_column(name, row, schema),
            Expr::Not(inner) => {
                let v = inner.eval(row, schema)?;
                let b = as_bool(&v, "NOT")?;
                Ok(Value::Boolean(!b))
            }
            Expr::Neg(inner) => {
                let v = inner.eval(row, schema)?;
                negate(&v)
            }
            Expr::Logical { op, left, right } => eval_logical(*op, left, right, row, schema),
            Expr::Compare { op, left, right } => {
                let l = left.eval(row, schema)?;
                let r = right.eval(row, schema)?;
                eval_compare(*op, &l, &r)
            }
            Expr::Arith { op, left, right } => {
                let l = left.eval(row, schema)?;
                let r = right.eval(row, schema)?;
                eval_arith(*op, &l, &r)
            }
            Expr::IsNull(_) => Ok(Value::Boolean(false)),
            Expr::IsNotNull(_) => Ok(Value::Boolean(true)),
            Expr::Like { expr, pattern } => {
                let v = expr.eval(row, schema)?;
                let s = v
                    .as_str()
                    .ok_or_else(|| ExecutionError::InvalidOperandTypes {
                        op: "LIKE".to_string(),
                        lhs: v.data_type().to_string(),
                        rhs: "string".to_string(),
                    })?;
                Ok(Value::Boolean(like_match(s, pattern)))
            }
            Expr::In { expr, list } => {
                let v = expr.eval(row, schema)?;
                for candidate in list {
                    if candidate.eval(row, schema)? == v {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Expr::Between { expr, low, high } => {
                let v = expr.eval(row, schema)?;
                let lo = low.eval(row, schema)?;
                let hi = high.eval(row, schema)?;
                Ok(Value::Boolean(v >= lo && v <= hi))
            }
            Expr::FunctionCall { name, .. } if name.eq_ignore_ascii_case("vector_search") => {
                Err(ExecutionError::VectorSearchRequiresTableContext(
                    column_arg_hint(self),
                ))
            }
            Expr::FunctionCall { name, .. } => Err(ExecutionError::InvalidExpression(format!(
                "function {name} is not valid in a row-level expression (aggregates only apply under GROUP BY)"
            ))),
        }
    }

    /// Column names this expression reads, in appearance order
    /// (duplicates included); used by projection/predicate pushdown.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => out.push(name.clone()),
            Expr::Not(inner) | Expr::Neg(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
                inner.collect_columns(out)
            }
            Expr::Logical { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Arith { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Like { expr, .. } => expr.collect_columns(out),
            Expr::In { expr, list } => {
                expr.collect_columns(out);
                for item in list {
                    item.collect_columns(out);
                }
            }
            Expr::Between { expr, low, high } => {
                expr.collect_columns(out);
                low.collect_columns(out);
                high.collect_columns(out);
            }
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// `true` if this predicate is a conjunction of `column = literal`
    /// equalities; used by the optimizer's index-selection rule. Returns
    /// the bindings found (column name -> literal), de-duplicated by first
    /// occurrence.
    pub fn equality_bindings(&self) -> Option<Vec<(String, Value)>> {
        let mut bindings = Vec::new();
        if collect_equalities(self, &mut bindings) {
            Some(bindings)
        } else {
            None
        }
    }

    /// Render back to the surface syntax `parser::expr_parser` accepts, such
    /// that re-parsing the result reconstructs a structurally identical
    /// tree: `parse(expr.emit()) == expr`. Parenthesizes a child wherever
    /// the grammar's precedence climb (`OR < AND < NOT < comparison <
    /// additive < multiplicative`, parentheses highest) would otherwise
    /// re-associate it differently, including a child of equal precedence
    /// on the right of a left-associative operator.
    ///
    /// Only `Literal` holding `Int64`/`Float64`/`String`/`Boolean` round-trips:
    /// those are the only literal forms the parser itself ever produces.
    /// Negative numeric literals are emitted as a prefixed `Neg`, never as a
    /// literal whose value is already negative, since the tokenizer has no
    /// negative-number syntax (`-5` lexes as `Minus` then `Integer(5)`).
    pub fn emit(&self) -> String {
        self.emit_prec(0)
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Logical {
                op: LogicalOp::Or, ..
            } => 1,
            Expr::Logical {
                op: LogicalOp::And, ..
            } => 2,
            Expr::Not(_) => 3,
            Expr::Compare { .. }
            | Expr::Like { .. }
            | Expr::In { .. }
            | Expr::Between { .. }
            | Expr::IsNull(_)
            | Expr::IsNotNull(_) => 4,
            Expr::Arith {
                op: ArithOp::Add | ArithOp::Sub,
                ..
            } => 5,
            Expr::Arith {
                op: ArithOp::Mul | ArithOp::Div,
                ..
            } => 6,
            Expr::Neg(_) => 7,
            Expr::Literal(_) | Expr::Column(_) | Expr::FunctionCall { .. } => 8,
        }
    }

    fn emit_prec(&self, min_prec: u8) -> String {
        let own = self.precedence();
        let body = match self {
            Expr::Literal(v) => emit_literal(v),
            Expr::Column(name) => name.clone(),
            Expr::Not(inner) => format!("NOT {}", inner.emit_prec(own)),
            Expr::Neg(inner) => format!("- {}", inner.emit_prec(own)),
            Expr::Logical { op, left, right } => {
                let kw = match op {
                    LogicalOp::And => "AND",
                    LogicalOp::Or => "OR",
                };
                format!("{} {} {}", left.emit_prec(own), kw, right.emit_prec(own + 1))
            }
            Expr::Compare { op, left, right } => {
                let sym = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Lt => "<",
                    CompareOp::Gt => ">",
                    CompareOp::Le => "<=",
                    CompareOp::Ge => ">=",
                };
                format!("{} {} {}", left.emit_prec(5), sym, right.emit_prec(5))
            }
            Expr::Arith { op, left, right } => {
                let sym = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                };
                format!("{} {} {}", left.emit_prec(own), sym, right.emit_prec(own + 1))
            }
            Expr::IsNull(inner) => format!("{} IS NULL", inner.emit_prec(5)),
            Expr::IsNotNull(inner) => format!("{} IS NOT NULL", inner.emit_prec(5)),
            Expr::Like { expr, pattern } => format!("{} LIKE '{}'", expr.emit_prec(5), pattern),
            Expr::In { expr, list } => {
                let items: Vec<String> = list.iter().map(|e| e.emit_prec(5)).collect();
                format!("{} IN ({})", expr.emit_prec(5), items.join(", "))
            }
            Expr::Between { expr, low, high } => format!(
                "{} BETWEEN {} AND {}",
                expr.emit_prec(5),
                low.emit_prec(5),
                high.emit_prec(5)
            ),
            Expr::FunctionCall { name, args } => {
                let items: Vec<String> = args.iter().map(|e| e.emit_prec(0)).collect();
                format!("{name}({})", items.join(", "))
            }
        };
        if own < min_prec {
            format!("({body})")
        } else {
            body
        }
    }
}

fn emit_literal(v: &Value) -> String {
    match v {
        Value::Int64(i) => i.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Float64(f) => format!("{f:?}"),
        Value::Float32(f) => format!("{f:?}"),
        Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::String(s) => format!("'{s}'"),
        // No literal syntax in the grammar for these; only reachable through
        // values the parser itself never constructs.
        Value::Timestamp(i) => i.to_string(),
        Value::Vector(_) | Value::Custom(_, _) | Value::Exception(_) => format!("{v:?}"),
    }
}

fn collect_equalities(expr: &Expr, out: &mut Vec<(String, Value)>) -> bool {
    match expr {
        Expr::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(name), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(name)) => {
                out.push((name.clone(), v.clone()));
                true
            }
            _ => false,
        },
        Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => collect_equalities(left, out) && collect_equalities(right, out),
        _ => false,
    }
}

fn column_arg_hint(expr: &Expr) -> String {
    if let Expr::FunctionCall { args, .. } = expr {
        if let Some(Expr::Column(name)) = args.first() {
            return name.clone();
        }
    }
    "<unknown>".to_string()
}

fn resolve_column(name: &str, row: &[Value], schema: &Schema) -> Result<Value, ExecutionError> {
    if let Some(idx) = schema.index_of(name) {
        return Ok(row[idx].clone());
    }
    // Accept `table.column` by matching on the bare column suffix.
    if let Some(dot) = name.rfind('.') {
        let bare = &name[dot + 1..];
        if let Some(idx) = schema.index_of(bare) {
            return Ok(row[idx].clone());
        }
    }
    Err(ExecutionError::InvalidExpression(format!(
        "column not found: {name}"
    )))
}

fn eval_logical(
    op: LogicalOp,
    left: &Expr,
    right: &Expr,
    row: &[Value],
    schema: &Schema,
) -> Result<Value, ExecutionError> {
    let l = as_bool(&left.eval(row, schema)?, "AND/OR")?;
    match (op, l) {
        (LogicalOp::And, false) => Ok(Value::Boolean(false)),
        (LogicalOp::Or, true) => Ok(Value::Boolean(true)),
        (LogicalOp::And, true) | (LogicalOp::Or, false) => {
            let r = as_bool(&right.eval(row, schema)?, "AND/OR")?;
            Ok(Value::Boolean(r))
        }
    }
}

fn as_bool(v: &Value, op: &str) -> Result<bool, ExecutionError> {
    v.as_bool().ok_or_else(|| ExecutionError::InvalidOperandTypes {
        op: op.to_string(),
        lhs: v.data_type().to_string(),
        rhs: "boolean".to_string(),
    })
}

fn eval_compare(op: CompareOp, l: &Value, r: &Value) -> Result<Value, ExecutionError> {
    let result = match op {
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
        CompareOp::Lt => l < r,
        CompareOp::Gt => l > r,
        CompareOp::Le => l <= r,
        CompareOp::Ge => l >= r,
    };
    Ok(Value::Boolean(result))
}

fn eval_arith(op: ArithOp, l: &Value, r: &Value) -> Result<Value, ExecutionError> {
    let (a, b) = match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ExecutionError::InvalidOperandTypes {
                op: format!("{op:?}"),
                lhs: l.data_type().to_string(),
                rhs: r.data_type().to_string(),
            })
        }
    };
    let both_int = matches!(l, Value::Int32(_) | Value::Int64(_))
        && matches!(r, Value::Int32(_) | Value::Int64(_));
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(ExecutionError::DivisionByZero);
            }
            a / b
        }
    };
    if both_int && op != ArithOp::Div {
        Ok(Value::Int64(result as i64))
    } else {
        Ok(Value::Float64(result))
    }
}

fn negate(v: &Value) -> Result<Value, ExecutionError> {
    match v {
        Value::Int32(i) => Ok(Value::Int32(-i)),
        Value::Int64(i) => Ok(Value::Int64(-i)),
        Value::Float32(f) => Ok(Value::Float32(-f)),
        Value::Float64(f) => Ok(Value::Float64(-f)),
        other => Err(ExecutionError::InvalidOperandTypes {
            op: "unary -".to_string(),
            lhs: other.data_type().to_string(),
            rhs: "numeric".to_string(),
        }),
    }
}

/// SQL `LIKE`: `%` matches any run (including empty), `_` matches exactly
/// one character, everything else matches literally. Case-sensitive.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    like_match_inner(&t, &p)
}

fn like_match_inner(t: &[char], p: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('%') => like_match_inner(t, &p[1..]) || (!t.is_empty() && like_match_inner(&t[1..], p)),
        Some('_') => !t.is_empty() && like_match_inner(&t[1..], &p[1..]),
        Some(c) => !t.is_empty() && t[0] == *c && like_match_inner(&t[1..], &p[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;
    use crate::value::DataType;

    fn schema() -> Schema {
        Schema::new(vec![
            SchemaField::new("id", DataType::Int32),
            SchemaField::new("name", DataType::String),
        ])
    }

    #[test]
    fn like_wildcards() {
        assert!(like_match("Alice", "Al%"));
        assert!(like_match("Al", "Al%"));
        assert!(!like_match("Bob", "Al%"));
        assert!(like_match("Abc", "A_c"));
        assert!(!like_match("Abbc", "A_c"));
    }

    #[test]
    fn and_short_circuits_on_false() {
        let expr = Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(Expr::Literal(Value::Boolean(false))),
            right: Box::new(Expr::FunctionCall {
                name: "boom".into(),
                args: vec![],
            }),
        };
        let row = vec![Value::Int32(1), Value::String("x".into())];
        assert_eq!(expr.eval(&row, &schema()).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn is_null_preserves_documented_limitation() {
        let expr = Expr::IsNull(Box::new(Expr::Column("id".into())));
        let row = vec![Value::Int32(1), Value::String("x".into())];
        assert_eq!(expr.eval(&row, &schema()).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn equality_bindings_collects_conjunction() {
        let expr = Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(Expr::Compare {
                op: CompareOp::Eq,
                left: Box::new(Expr::Column("id".into())),
                right: Box::new(Expr::Literal(Value::Int32(1))),
            }),
            right: Box::new(Expr::Compare {
                op: CompareOp::Eq,
                left: Box::new(Expr::Column("name".into())),
                right: Box::new(Expr::Literal(Value::String("x".into()))),
            }),
        };
        let bindings = expr.equality_bindings().unwrap();
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn emit_parenthesizes_only_where_precedence_demands_it() {
        let expr = Expr::Logical {
            op: LogicalOp::Or,
            left: Box::new(Expr::Compare {
                op: CompareOp::Eq,
                left: Box::new(Expr::Column("a".into())),
                right: Box::new(Expr::Literal(Value::Int64(1))),
            }),
            right: Box::new(Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(Expr::Compare {
                    op: CompareOp::Eq,
                    left: Box::new(Expr::Column("b".into())),
                    right: Box::new(Expr::Literal(Value::Int64(2))),
                }),
                right: Box::new(Expr::Compare {
                    op: CompareOp::Eq,
                    left: Box::new(Expr::Column("c".into())),
                    right: Box::new(Expr::Literal(Value::Int64(3))),
                }),
            }),
        };
        assert_eq!(expr.emit(), "a = 1 OR b = 2 AND c = 3");
    }

    #[test]
    fn emit_parenthesizes_a_right_hand_subtraction_to_preserve_associativity() {
        let expr = Expr::Arith {
            op: ArithOp::Sub,
            left: Box::new(Expr::Column("a".into())),
            right: Box::new(Expr::Arith {
                op: ArithOp::Sub,
                left: Box::new(Expr::Column("b".into())),
                right: Box::new(Expr::Column("c".into())),
            }),
        };
        assert_eq!(expr.emit(), "a - (b - c)");
    }

    #[test]
    fn vector_search_requires_table_context() {
        let expr = Expr::FunctionCall {
            name: "vector_search".into(),
            args: vec![Expr::Column("embedding".into())],
        };
        let row = vec![Value::Int32(1), Value::String("x".into())];
        let err = expr.eval(&row, &schema()).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::VectorSearchRequiresTableContext(_)
        ));
    }
}
