//! # Grizzly
//!
//! Grizzly is an embedded analytical data engine: a SQL-like query
//! compiler/optimizer/executor over in-process columnar tables, plus a
//! lineage-tracked model graph for building and incrementally refreshing
//! derived datasets.
//!
//! ## Pipeline
//!
//! ```text
//! SQL source
//!     ↓
//! [tokenizer]        → Token stream
//!     ↓
//! [parser]           → Statement (Select / CreateTable / CreateModel / ...)
//!     ↓
//! [database]         → resolves CTEs/views, refreshes optimizer statistics
//!     ↓
//! [optimizer]        → QueryPlan (cost-annotated PlanNode tree)
//!     ↓
//! [executor]         → Table
//! ```
//!
//! Models (`CREATE [INCREMENTAL] MODEL`) sit alongside tables and views in
//! the same [`Database`], tracked in a [`model::ModelRegistry`] dependency
//! graph; `REFRESH MODEL` and `REFRESH ALL MODELS` walk that graph through
//! [`incremental::refresh`]. `CREATE SCHEDULE` hands a model's refresh to a
//! background [`scheduler::Scheduler`] thread driven by cron expressions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grizzly::{Config, Database};
//!
//! let mut db = Database::new("analytics", Config::load()?);
//! db.execute_sql("CREATE TABLE orders (id int64, amount float64, region string)")?;
//! db.execute_sql("INSERT INTO orders VALUES (1, 42.5, 'west')")?;
//! let outcomes = db.execute_sql("SELECT region, amount FROM orders WHERE amount > 10")?;
//! ```
//!
//! ## Module organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | Scalar value and data type representation, coercion |
//! | [`schema`] | Column/table schema, cardinality estimation |
//! | [`table`] | In-memory row storage plus its secondary indexes |
//! | [`index`] | B+Tree, composite-hash, and (feature-gated) HNSW indexes |
//! | [`expr`] | Scalar expression AST and evaluation |
//! | [`tokenizer`] | SQL source → token stream |
//! | [`parser`] | Token stream → [`parser::Statement`] |
//! | [`plan`] | Logical query plan tree and its explain renderings |
//! | [`optimizer`] | Statistics-driven cost estimation and plan rewriting |
//! | [`executor`] | Plan execution against a [`executor::Catalog`] |
//! | [`model`] | Model catalog, dependency DAG, lineage |
//! | [`incremental`] | Incremental (partition-aware) model refresh |
//! | [`scheduler`] | Cron-driven background refresh scheduling |
//! | [`audit`] | In-memory ring buffer of mutating-operation events |
//! | [`config`] | Layered configuration and tracing setup |
//! | [`artifact`] | SAVE/LOAD/ATTACH binary wire format |
//! | [`format`] | CSV/JSON file ingestion |
//! | [`database`] | [`Database`]: ties every module above into one engine |

pub mod error;

pub mod value;
pub mod schema;
pub mod table;
pub mod index;
pub mod expr;

pub mod tokenizer;
pub mod parser;
pub mod plan;
pub mod optimizer;
pub mod executor;

pub mod model;
pub mod incremental;
pub mod scheduler;

pub mod audit;
pub mod config;
pub mod artifact;
pub mod format;

pub mod database;

pub use config::Config;
pub use database::{Database, ExplainOutput, StatementOutcome, ViewDefinition};
pub use error::{GrizzlyError, Result};
pub use executor::{CancellationToken, Catalog};
pub use model::{Model, ModelRegistry};
pub use parser::{Statement, parse};
pub use plan::{PlanNode, QueryPlan};
pub use schema::{Schema, SchemaField};
pub use table::Table;
pub use value::{DataType, Value};
