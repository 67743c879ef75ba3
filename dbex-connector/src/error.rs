//! The error taxonomy shared by every DbEx component.
//!
//! Only connection-initialization failures are retried (by the orchestrator,
//! see `dbex-core`); everything else here is surfaced to the caller as-is.

use thiserror::Error;

/// A single failure kind from the taxonomy DbEx surfaces to callers.
///
/// Each variant documents which component raises it and how the caller
/// should expect it to be handled; the orchestrator does not inspect
/// variants by string matching, only by type.
#[derive(Debug, Error)]
pub enum DbExError {
    /// Raised by the `Database` capability when a connection could not be
    /// opened or a round-trip failed. Retried by the orchestrator for
    /// connection-initialization only.
    #[error("connection failure: {0}")]
    ConnectionFailure(#[source] anyhow::Error),

    /// Raised by the tokenizer/splitter (C1) on an unterminated string or
    /// comment, or any other batch that cannot be split.
    #[error("syntax error in script `{script}` near offset {offset}: {message}")]
    ScriptSyntax {
        script: String,
        offset: usize,
        message: String,
    },

    /// Raised by the schema-object reconciler (C5) when the first token
    /// after whitespace/comments is not `CREATE` (or a supported variant).
    #[error("script `{script}` does not start with a CREATE statement")]
    NotACreateStatement { script: String },

    /// Raised by the schema-object reconciler (C5) when the `CREATE`
    /// object type is not in the dialect's supported list.
    #[error("script `{script}` creates unsupported object type `{object_type}`")]
    UnsupportedObjectType { script: String, object_type: String },

    /// Raised by the data parser (C4) when the same column name appears
    /// twice in one row.
    #[error("duplicate column `{column}` in table `{schema}.{table}`")]
    DuplicateColumn {
        schema: String,
        table: String,
        column: String,
    },

    /// Raised by the data parser (C4) when a value is a nested object where
    /// only a scalar or a child-table array is legal.
    #[error("invalid structure for column `{column}` in table `{schema}.{table}`: nested objects are not permitted")]
    InvalidStructure {
        schema: String,
        table: String,
        column: String,
    },

    /// Raised by the data parser (C4) when a parsed table name does not
    /// resolve to an introspected `TableSchema`.
    #[error("table `{schema}.{table}` was not found in the introspected schema")]
    TableNotFound { schema: String, table: String },

    /// Raised by runtime-parameter evaluation (`^(expr)`) when neither a
    /// well-known name, the runtime-parameters map, nor the extension-
    /// function registry resolves `expr`.
    #[error("runtime parameter `{expr}` could not be resolved")]
    ParameterUnresolved { expr: String },

    /// Raised by the data parser (C4) when a scalar cannot be coerced into
    /// the target column's semantic type.
    #[error("value `{value}` could not be coerced to column `{schema}.{table}.{column}` ({expected_type})")]
    ValueCoercion {
        schema: String,
        table: String,
        column: String,
        value: String,
        expected_type: String,
    },

    /// Raised at SQL-emission time when `DataTable`s cannot be totally
    /// ordered by foreign-key dependency.
    #[error("dependency cycle detected among data tables: {cycle}")]
    DataDependencyCycle { cycle: String },

    /// Raised by the orchestrator when `Drop` or `Reset` is requested
    /// without `--accept-prompts` in a non-interactive run.
    #[error("destructive action `{action}` was not confirmed (pass --accept-prompts or confirm interactively)")]
    DestructiveActionNotConfirmed { action: String },

    /// Raised by the schema introspector (C3) for any driver error
    /// encountered while building the table/column model.
    #[error("introspection failed: {0}")]
    IntrospectionError(#[source] anyhow::Error),

    /// Raised when a script source, data file, or other named resource
    /// cannot be located in the configured probe list.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A previously-journalled script's checksum no longer matches its
    /// current content.
    #[error("script `{script}` has already been applied but its content has changed (checksum mismatch)")]
    ChecksumMismatch { script: String },

    /// Raised when a data file's top-level structure does not match the
    /// expected `<schema or "*"> -> [ <prefix><table>: [rows] ]` shape:
    /// malformed YAML/JSON, a non-mapping root, a schema value that isn't a
    /// list, or a table entry that isn't a mapping.
    #[error("invalid data document structure: {0}")]
    InvalidDataDocument(String),

    /// Raised when a phase is abandoned via the cooperative cancellation
    /// token. The current script is not journalled.
    #[error("operation cancelled")]
    Cancelled,
}

pub type DbExResult<T> = Result<T, DbExError>;
