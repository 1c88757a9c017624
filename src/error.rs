//! Typed errors for every layer of the engine.
//!
//! Each layer gets its own enum: one `thiserror` type per subsystem,
//! aggregated by a top-level error for anything that crosses layers. Parse
//! errors carry a textual position so the caller can point at the offending
//! token; everything else carries enough structure to be matched on, not
//! just displayed.

use thiserror::Error;

/// Errors produced while tokenizing or parsing SQL / PL-Grizzly source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected token {found:?} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of query (expected {expected})")]
    UnexpectedEndOfQuery { expected: String },

    #[error("expected identifier for {what} at position {pos}")]
    ExpectedIdentifier { what: String, pos: usize },

    #[error("invalid number literal {text:?} at position {pos}")]
    InvalidNumber { text: String, pos: usize },

    #[error("unterminated string literal starting at position {pos}")]
    UnterminatedString { pos: usize },
}

/// Errors raised while resolving or validating schema.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("column count mismatch: expected {expected}, found {found}")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// Errors raised by the index layer (B+Tree and composite-hash indexes).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexError {
    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index column missing from table: {0}")]
    IndexColumnMissing(String),

    #[error("index key missing for lookup on {0}")]
    IndexKeyMissing(String),

    #[error("index values missing: expected {expected} key columns, found {found}")]
    IndexValuesMissing { expected: usize, found: usize },
}

/// Errors raised while evaluating an expression or walking a plan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid operand types for {op}: {lhs} and {rhs}")]
    InvalidOperandTypes {
        op: String,
        lhs: String,
        rhs: String,
    },

    #[error("LIKE pattern did not match any evaluation branch for {0}")]
    NoPatternMatched(String),

    #[error("vector_search requires table-level execution context on column {0}")]
    VectorSearchRequiresTableContext(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised by the model registry and dependency graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model already exists: {0}")]
    ModelAlreadyExists(String),

    #[error("circular reference among CTEs: {0}")]
    CircularCTEReference(String),

    #[error("circular model dependency detected introducing {0}")]
    CircularModelDependency(String),
}

/// Errors raised by file I/O, format detection, and artifact boundaries.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    #[error("failed to load file {path}: {source}")]
    FailedToLoadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file format for {0}")]
    InvalidFileFormat(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("artifact error: {0}")]
    Artifact(String),
}

/// Errors raised by the scheduler.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    #[error("invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("max retries exceeded for schedule {0}")]
    MaxRetriesExceeded(String),
}

/// The aggregate error type returned by every top-level `Database` call.
#[derive(Debug, Error)]
pub enum GrizzlyError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GrizzlyError>;
