//! SQL-engine collaborators: tokenizer, script source, introspector, data
//! parser, schema-object reconciler, and the SQL Server / MySQL /
//! PostgreSQL dialect adapters.

pub mod data_parser;
pub mod dialect;
pub mod introspector;
pub mod reconciler;
pub mod script_source;
pub mod tokenizer;

pub use dialect::{dialect_for, Engine, MssqlDialect, MysqlDialect, PostgresDialect};
pub use reconciler::SchemaObject;
pub use script_source::{DirBundle, MemoryBundle, ResourceBundle, ScriptSource};
