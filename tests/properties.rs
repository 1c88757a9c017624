//! Universally-quantified invariants, round-trip laws, and boundary
//! behaviors, checked with proptest where the property is over arbitrary
//! input sequences rather than one literal example.

use grizzly::executor::{self, CancellationToken, Catalog};
use grizzly::expr::{ArithOp, CompareOp, Expr, LogicalOp};
use grizzly::parser::Cursor;
use grizzly::tokenizer::Tokenizer;
use grizzly::value::{DataType, Value};
use grizzly::{Config, Database, Schema, SchemaField, StatementOutcome, Table};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;

fn db() -> Database {
    Database::new("props", Config::default())
}

struct SingleTableCatalog(Table);

impl Catalog for SingleTableCatalog {
    fn table(&self, name: &str) -> Option<&Table> {
        (name == self.0.name()).then(|| &self.0)
    }
    fn load_file(&self, _path: &str) -> Result<Table, grizzly::error::ExecutionError> {
        Err(grizzly::error::ExecutionError::InvalidExpression("no files here".to_string()))
    }
}

fn int_table(name: &str, values: &[i64]) -> Table {
    let schema = Schema::new(vec![SchemaField::new("k", DataType::Int64)]);
    let mut table = Table::new(name, schema);
    for v in values {
        table.insert_row(vec![Value::Int64(*v)]).unwrap();
    }
    table
}

proptest! {
    /// Every column's length tracks `row_count` through an arbitrary
    /// sequence of inserts (and the deletes interleaved with them).
    #[test]
    fn table_column_length_always_matches_row_count(
        inserts in prop::collection::vec(any::<i64>(), 0..40),
        delete_every in 1usize..5,
    ) {
        let mut table = int_table("t", &[]);
        for (i, v) in inserts.iter().enumerate() {
            table.insert_row(vec![Value::Int64(*v)]).unwrap();
            if i % delete_every == 0 && table.row_count() > 0 {
                table.delete_row(0).unwrap();
            }
        }
        prop_assert_eq!(table.column(0).unwrap().len(), table.row_count());
    }

    /// A B+Tree index's full range scan returns keys in non-decreasing
    /// order no matter the insertion order.
    #[test]
    fn btree_range_scan_is_sorted_after_arbitrary_inserts(
        values in prop::collection::vec(any::<i32>(), 0..60),
    ) {
        let schema = Schema::new(vec![SchemaField::new("k", DataType::Int32)]);
        let mut table = Table::new("t", schema);
        for v in &values {
            table.insert_row(vec![Value::Int32(*v)]).unwrap();
        }
        table.create_btree_index("t_k_idx".to_string(), vec!["k".to_string()]).unwrap();

        let index = table.indexes().get("t_k_idx").unwrap();
        let row_ids = index.range_scan(None, None).unwrap();
        let scanned_keys: Vec<i32> = row_ids
            .iter()
            .map(|&rid| match table.row(rid).unwrap()[0] {
                Value::Int32(i) => i,
                _ => unreachable!(),
            })
            .collect();

        let mut expected = values.clone();
        expected.sort();
        prop_assert_eq!(&scanned_keys, &expected);
        for pair in scanned_keys.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }
}

/// Bounded, depth-limited `Expr` generator for the round-trip law below.
/// Literals stay non-negative: the tokenizer has no negative-number syntax
/// (`-5` lexes as `Minus` then `Integer(5)`), so a literal already holding a
/// negative value could never come out of `parse`, only `Neg` wrapping a
/// positive one. String literals avoid quote characters since the
/// tokenizer's string lexer has no escaping.
fn arb_expr(depth: u32) -> BoxedStrategy<Expr> {
    let atom = prop_oneof![
        (0i64..1000).prop_map(|i| Expr::Literal(Value::Int64(i))),
        (0.0f64..1000.0).prop_map(|f| Expr::Literal(Value::Float64(f))),
        "[a-z]{0,6}".prop_map(|s| Expr::Literal(Value::String(s))),
        any::<bool>().prop_map(|b| Expr::Literal(Value::Boolean(b))),
        prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(|n| Expr::Column(n.to_string())),
    ];
    if depth == 0 {
        return atom.boxed();
    }
    let sub = arb_expr(depth - 1);
    let compare_op = prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Gt),
        Just(CompareOp::Le),
        Just(CompareOp::Ge),
    ];
    let arith_op = prop_oneof![
        Just(ArithOp::Add),
        Just(ArithOp::Sub),
        Just(ArithOp::Mul),
        Just(ArithOp::Div),
    ];
    let branches: Vec<(u32, BoxedStrategy<Expr>)> = vec![
        (4, atom.boxed()),
        (
            2,
            (sub.clone(), sub.clone())
                .prop_map(|(l, r)| Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(l),
                    right: Box::new(r),
                })
                .boxed(),
        ),
        (
            2,
            (sub.clone(), sub.clone())
                .prop_map(|(l, r)| Expr::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(l),
                    right: Box::new(r),
                })
                .boxed(),
        ),
        (1, sub.clone().prop_map(|e| Expr::Not(Box::new(e))).boxed()),
        (1, sub.clone().prop_map(|e| Expr::Neg(Box::new(e))).boxed()),
        (
            2,
            (sub.clone(), compare_op, sub.clone())
                .prop_map(|(l, op, r)| Expr::Compare {
                    op,
                    left: Box::new(l),
                    right: Box::new(r),
                })
                .boxed(),
        ),
        (
            2,
            (sub.clone(), arith_op, sub.clone())
                .prop_map(|(l, op, r)| Expr::Arith {
                    op,
                    left: Box::new(l),
                    right: Box::new(r),
                })
                .boxed(),
        ),
        (1, sub.clone().prop_map(|e| Expr::IsNull(Box::new(e))).boxed()),
        (1, sub.clone().prop_map(|e| Expr::IsNotNull(Box::new(e))).boxed()),
        (
            1,
            (sub.clone(), "[a-zA-Z%_]{0,6}")
                .prop_map(|(e, pattern)| Expr::Like {
                    expr: Box::new(e),
                    pattern,
                })
                .boxed(),
        ),
        (
            1,
            (sub.clone(), prop::collection::vec(sub.clone(), 1..3))
                .prop_map(|(e, list)| Expr::In {
                    expr: Box::new(e),
                    list,
                })
                .boxed(),
        ),
        (
            1,
            (sub.clone(), sub.clone(), sub.clone())
                .prop_map(|(e, low, high)| Expr::Between {
                    expr: Box::new(e),
                    low: Box::new(low),
                    high: Box::new(high),
                })
                .boxed(),
        ),
        (
            1,
            (
                prop_oneof![Just("f"), Just("g")],
                prop::collection::vec(sub.clone(), 0..3),
            )
                .prop_map(|(name, args)| Expr::FunctionCall {
                    name: name.to_string(),
                    args,
                })
                .boxed(),
        ),
    ];
    proptest::strategy::Union::new_weighted(branches).boxed()
}

fn reparse_expr(src: &str) -> Expr {
    let tokens = Tokenizer::new(src).tokenize().unwrap();
    let mut cursor = Cursor::new(tokens, src);
    cursor.parse_expr().unwrap()
}

proptest! {
    /// `parse(expr.emit()) == expr` for any expression tree `arb_expr` can
    /// build: the emitter parenthesizes a child wherever the grammar's
    /// precedence climb would otherwise re-associate it, so every generated
    /// tree survives an emit/re-parse round trip unchanged.
    #[test]
    fn expr_round_trips_through_emit_and_parse(expr in arb_expr(3)) {
        let emitted = expr.emit();
        let reparsed = reparse_expr(&emitted);
        prop_assert_eq!(reparsed, expr);
    }
}

#[test]
fn empty_table_scan_returns_zero_rows_without_error() {
    let mut db = db();
    db.execute_sql("CREATE TABLE t (a int64)").unwrap();
    let outcomes = db.execute_sql("SELECT a FROM t").unwrap();
    match &outcomes[0] {
        StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 0),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn limit_zero_and_offset_past_end_both_return_zero_rows() {
    let mut db = db();
    db.execute_sql("CREATE TABLE t (a int64)").unwrap();
    db.execute_sql("INSERT INTO t VALUES (1), (2), (3)").unwrap();

    let limited = db.execute_sql("SELECT a FROM t LIMIT 0").unwrap();
    match &limited[0] {
        StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 0),
        other => panic!("expected rows, got {other:?}"),
    }

    let offset = db.execute_sql("SELECT a FROM t LIMIT 10 OFFSET 100").unwrap();
    match &offset[0] {
        StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 0),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn left_join_against_an_empty_right_side_pads_every_left_row() {
    let left = int_table("l", &[1, 2, 3]);
    let right = Schema::new(vec![SchemaField::new("tag", DataType::String)]);
    let right = Table::new("r", right);

    let plan = grizzly::plan::PlanNode::Join {
        left: Box::new(grizzly::plan::PlanNode::Scan {
            source: grizzly::plan::ScanSource::Table("l".to_string()),
            columns: None,
        }),
        right: Box::new(grizzly::plan::PlanNode::Scan {
            source: grizzly::plan::ScanSource::Table("r".to_string()),
            columns: None,
        }),
        condition: grizzly::plan::JoinCondition {
            left_column: "k".to_string(),
            right_column: "tag".to_string(),
        },
        join_type: grizzly::plan::JoinType::Left,
    };

    struct TwoTableCatalog(Table, Table);
    impl Catalog for TwoTableCatalog {
        fn table(&self, name: &str) -> Option<&Table> {
            if name == self.0.name() {
                Some(&self.0)
            } else if name == self.1.name() {
                Some(&self.1)
            } else {
                None
            }
        }
        fn load_file(&self, _path: &str) -> Result<Table, grizzly::error::ExecutionError> {
            Err(grizzly::error::ExecutionError::InvalidExpression("no files here".to_string()))
        }
    }
    let catalog = TwoTableCatalog(left, right);
    let result = executor::execute(&plan, &catalog, &CancellationToken::new()).unwrap();
    assert_eq!(result.row_count(), 3);
    for row in result.rows() {
        assert_eq!(row[1], Value::String(String::new()));
    }
}

#[test]
fn save_then_load_preserves_schema_and_row_content() {
    let mut original = db();
    original.execute_sql("CREATE TABLE t (a int64, b string)").unwrap();
    original
        .execute_sql("INSERT INTO t VALUES (1, 'x'), (2, 'y'), (3, 'z')")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.grizzly");
    original
        .execute_sql(&format!("SAVE DATABASE TO '{}'", path.display()))
        .unwrap();

    let mut reloaded = db();
    reloaded
        .execute_sql(&format!("LOAD DATABASE FROM '{}'", path.display()))
        .unwrap();

    let before = rows_of(&mut original, "SELECT a, b FROM t ORDER BY a");
    let after = rows_of(&mut reloaded, "SELECT a, b FROM t ORDER BY a");
    assert_eq!(before, after);
}

fn rows_of(db: &mut Database, sql: &str) -> Vec<Vec<Value>> {
    match db.execute_sql(sql).unwrap().into_iter().next().unwrap() {
        StatementOutcome::Rows(table) => table.rows().collect(),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn two_consecutive_refreshes_of_a_non_incremental_model_are_identical() {
    let mut db = db();
    db.execute_sql("CREATE TABLE t (a int64)").unwrap();
    db.execute_sql("INSERT INTO t VALUES (1), (2), (3)").unwrap();
    db.execute_sql("CREATE MODEL m AS SELECT a FROM t").unwrap();

    db.execute_sql("REFRESH MODEL m").unwrap();
    let first = db.model("m").unwrap().row_count;
    db.execute_sql("REFRESH MODEL m").unwrap();
    let second = db.model("m").unwrap().row_count;
    assert_eq!(first, second);
}
