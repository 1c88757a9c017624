//! End-to-end scenarios: SQL source -> `Database` -> rows.

use grizzly::executor::{self, CancellationToken, Catalog};
use grizzly::optimizer::{self, StatisticsRegistry};
use grizzly::{Config, Database, GrizzlyError, StatementOutcome};

fn db() -> Database {
    Database::new("e2e", Config::default())
}

fn rows(outcomes: Vec<StatementOutcome>) -> grizzly::Table {
    match outcomes.into_iter().next().unwrap() {
        StatementOutcome::Rows(table) => table,
        other => panic!("expected rows, got a statement outcome without rows: {other:?}"),
    }
}

struct SingleTableCatalog(grizzly::Table);

impl Catalog for SingleTableCatalog {
    fn table(&self, name: &str) -> Option<&grizzly::Table> {
        (name == self.0.name()).then(|| &self.0)
    }
    fn load_file(&self, _path: &str) -> Result<grizzly::Table, grizzly::error::ExecutionError> {
        Err(grizzly::error::ExecutionError::InvalidExpression("no files here".to_string()))
    }
}

/// Database has no SQL-level `CREATE INDEX`; a B+Tree index is built
/// directly on a `Table` (the same way the optimizer's own index-selection
/// tests build one) and carried through the tokenizer/parser/optimizer/
/// executor pipeline by hand, bypassing `Database`.
#[test]
fn index_backed_equality_scan_uses_the_index() {
    let schema = grizzly::Schema::new(vec![
        grizzly::SchemaField::new("id", grizzly::DataType::Int32),
        grizzly::SchemaField::new("age", grizzly::DataType::Int32),
    ]);
    let mut table = grizzly::Table::new("users", schema);
    for (id, age) in [(1, 30), (2, 25), (3, 40)] {
        table
            .insert_row(vec![grizzly::Value::Int32(id), grizzly::Value::Int32(age)])
            .unwrap();
    }
    table
        .create_btree_index("users_id_idx".to_string(), vec!["id".to_string()])
        .unwrap();

    let stats = StatisticsRegistry::new();
    stats.refresh_from_table(&table);

    let statements = grizzly::parse("SELECT age FROM users WHERE id = 2").unwrap();
    let query = match statements.into_iter().next().unwrap() {
        grizzly::Statement::Select(q) => q,
        _ => unreachable!(),
    };
    let (plan, cost) = optimizer::optimize(query.plan, &stats);
    assert!(
        cost.contains_label("index_scan"),
        "expected the equality filter over an indexed column to become an index scan"
    );

    let catalog = SingleTableCatalog(table);
    let result = executor::execute(&plan.root, &catalog, &CancellationToken::new()).unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.row(0).unwrap()[0], grizzly::Value::Int32(25));
}

#[test]
fn index_backed_equality_scan_falls_back_to_full_scan_without_an_index() {
    let mut db = db();
    db.execute_sql("CREATE TABLE users (id int32, age int32)").unwrap();
    db.execute_sql("INSERT INTO users VALUES (1, 30), (2, 25), (3, 40)").unwrap();

    let statements = grizzly::parse("SELECT age FROM users WHERE id = 2").unwrap();
    let query = match statements.into_iter().next().unwrap() {
        grizzly::Statement::Select(q) => q,
        _ => unreachable!(),
    };
    let explained = db.explain(query).unwrap();
    assert!(!explained.text.contains("index_scan"));

    let outcomes = db.execute_sql("SELECT age FROM users WHERE id = 2").unwrap();
    let table = rows(outcomes);
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.row(0).unwrap()[0], grizzly::Value::Int32(25));
}

#[test]
fn aggregate_with_group_by_sums_per_group_as_float64() {
    let mut db = db();
    db.execute_sql("CREATE TABLE t (k string, v int32)").unwrap();
    db.execute_sql("INSERT INTO t VALUES ('a', 10), ('a', 20), ('b', 5)").unwrap();

    let outcomes = db.execute_sql("SELECT k, SUM(v) FROM t GROUP BY k").unwrap();
    let table = rows(outcomes);
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.schema().data_type_of("sum(v)"), Some(&grizzly::DataType::Float64));

    let mut totals: Vec<(String, f64)> = table
        .rows()
        .map(|row| {
            let grizzly::Value::String(k) = row[0].clone() else { panic!("expected string") };
            let grizzly::Value::Float64(v) = row[1] else { panic!("expected float64") };
            (k, v)
        })
        .collect();
    totals.sort();
    assert_eq!(totals, vec![("a".to_string(), 30.0), ("b".to_string(), 5.0)]);
}

#[test]
fn like_prefix_pattern_matches_expected_rows() {
    let mut db = db();
    db.execute_sql("CREATE TABLE users (name string)").unwrap();
    db.execute_sql("INSERT INTO users VALUES ('Alice'), ('Bob'), ('Al')").unwrap();

    let outcomes = db.execute_sql("SELECT name FROM users WHERE name LIKE 'Al%'").unwrap();
    let table = rows(outcomes);
    let mut names: Vec<String> = table
        .rows()
        .map(|row| match row[0].clone() {
            grizzly::Value::String(s) => s,
            _ => panic!("expected string"),
        })
        .collect();
    names.sort();
    assert_eq!(names, vec!["Al".to_string(), "Alice".to_string()]);
}

#[test]
fn left_outer_join_pads_unmatched_right_side_with_zero_values() {
    let mut db = db();
    db.execute_sql("CREATE TABLE l (id int64)").unwrap();
    db.execute_sql("INSERT INTO l VALUES (1), (2)").unwrap();
    db.execute_sql("CREATE TABLE r (id int64, tag string)").unwrap();
    db.execute_sql("INSERT INTO r VALUES (1, 'x')").unwrap();

    let outcomes = db
        .execute_sql("SELECT * FROM l LEFT JOIN r ON l.id = r.id")
        .unwrap();
    let table = rows(outcomes);
    assert_eq!(table.row_count(), 2);

    let mut by_left_id: Vec<Vec<grizzly::Value>> = table.rows().collect();
    by_left_id.sort_by_key(|row| match row[0] {
        grizzly::Value::Int64(i) => i,
        _ => panic!("expected int64"),
    });
    assert_eq!(
        by_left_id[0],
        vec![
            grizzly::Value::Int64(1),
            grizzly::Value::Int64(1),
            grizzly::Value::String("x".to_string())
        ]
    );
    assert_eq!(
        by_left_id[1],
        vec![
            grizzly::Value::Int64(2),
            grizzly::Value::Int64(0),
            grizzly::Value::String(String::new())
        ]
    );
}

#[test]
fn model_dag_lineage_lists_transitive_upstream_models() {
    let mut db = db();
    db.execute_sql("CREATE TABLE base (x int64)").unwrap();
    db.execute_sql("CREATE MODEL a AS SELECT x FROM base").unwrap();
    db.execute_sql("CREATE MODEL b AS SELECT x FROM a").unwrap();
    db.execute_sql("CREATE MODEL c AS SELECT x FROM b").unwrap();

    let outcomes = db.execute_sql("SHOW LINEAGE FOR MODEL c").unwrap();
    match &outcomes[0] {
        StatementOutcome::Message(msg) => {
            assert!(msg.contains('a'));
            assert!(msg.contains('b'));
        }
        other => panic!("expected a message, got {other:?}"),
    }
}

#[test]
fn refresh_model_runs_dependencies_before_dependents() {
    let mut db = db();
    db.execute_sql("CREATE TABLE base (x int64)").unwrap();
    db.execute_sql("INSERT INTO base VALUES (1)").unwrap();
    db.execute_sql("CREATE MODEL a AS SELECT x FROM base").unwrap();
    db.execute_sql("CREATE MODEL b AS SELECT x FROM a").unwrap();
    db.execute_sql("CREATE MODEL c AS SELECT x FROM b").unwrap();

    db.execute_sql("REFRESH MODEL a").unwrap();
    db.execute_sql("REFRESH MODEL b").unwrap();
    db.execute_sql("REFRESH MODEL c").unwrap();

    assert_eq!(db.model("a").unwrap().row_count, 1);
    assert_eq!(db.model("b").unwrap().row_count, 1);
    assert_eq!(db.model("c").unwrap().row_count, 1);
}

#[test]
fn cyclic_model_dependency_is_rejected_and_leaves_the_first_model_in_place() {
    let mut db = db();
    db.execute_sql("CREATE MODEL d AS SELECT x FROM e").unwrap();
    let err = db.execute_sql("CREATE MODEL e AS SELECT x FROM d").unwrap_err();
    assert!(matches!(
        err,
        GrizzlyError::Model(grizzly::error::ModelError::CircularModelDependency(_))
    ));
    assert!(db.model("d").is_some());
    assert!(db.model("e").is_none());
}
