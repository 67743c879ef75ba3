//! The agnostic data model shared by every collaborator.
//!
//! Types here carry no database-handle state; they are pure values produced
//! by one component and consumed by another: script discovery produces
//! `MigrationScript`, introspection produces `TableSchema`, the data parser
//! produces `DataTable`, and the journal produces/consumes `JournalEntry`.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What phase a `MigrationScript` belongs to; drives the orchestrator's
/// fixed phase ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    Migrate,
    Schema,
    Data,
    PreDeploy,
    PostDeploy,
    PostDatabaseCreate,
    Reset,
    Execute,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptKind::Migrate => "Migrate",
            ScriptKind::Schema => "Schema",
            ScriptKind::Data => "Data",
            ScriptKind::PreDeploy => "PreDeploy",
            ScriptKind::PostDeploy => "PostDeploy",
            ScriptKind::PostDatabaseCreate => "PostDatabaseCreate",
            ScriptKind::Reset => "Reset",
            ScriptKind::Execute => "Execute",
        };
        f.write_str(s)
    }
}

/// A trait object for lazily reading a script's bytes, so discovery (C2)
/// never has to hold the whole embedded bundle in memory at once.
pub trait ScriptReader: Send + Sync {
    fn read_to_string(&self) -> std::io::Result<String>;
}

/// The simplest possible reader: content already resident in memory. Used
/// by tests and by in-memory script sources.
#[derive(Clone)]
pub struct InMemoryReader(pub Arc<str>);

impl ScriptReader for InMemoryReader {
    fn read_to_string(&self) -> std::io::Result<String> {
        Ok(self.0.to_string())
    }
}

/// A reader backed by an open file handle, cloning the path on each read so
/// repeated reads (e.g. retried phases) see up-to-date content.
#[derive(Clone)]
pub struct FileReader(pub std::path::PathBuf);

impl ScriptReader for FileReader {
    fn read_to_string(&self) -> std::io::Result<String> {
        let mut buf = String::new();
        std::fs::File::open(&self.0)?.read_to_string(&mut buf)?;
        Ok(buf)
    }
}

/// An immutable artefact discovered by the script source. Never mutated
/// after creation; destroyed with the migration session.
#[derive(Clone)]
pub struct MigrationScript {
    pub name: String,
    pub kind: ScriptKind,
    pub content: Arc<dyn ScriptReader>,
    pub group_order: i64,
    pub run_always: bool,
}

impl fmt::Debug for MigrationScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationScript")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("group_order", &self.group_order)
            .field("run_always", &self.run_always)
            .finish()
    }
}

impl MigrationScript {
    pub fn read(&self) -> std::io::Result<String> {
        self.content.read_to_string()
    }
}

/// `(scriptName, appliedAt)`, unique by `scriptName`. The `checksum` field
/// lets the journal detect that an already-applied, non-`runAlways` script
/// was edited after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub script_name: String,
    pub applied_at: DateTime<Utc>,
    pub checksum: String,
}

impl JournalEntry {
    pub fn checksum_of(content: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Flags computed by the introspector's inference pass that identify a
/// column's role rather than its storage type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticFlags {
    pub is_created_audit: bool,
    pub is_updated_audit: bool,
    pub is_tenant_id: bool,
    pub is_row_version: bool,
    pub is_is_deleted: bool,
    pub is_ref_data: bool,
    pub is_json_content: bool,
}

/// The semantic, engine-independent value type a column's scalar is coerced
/// into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DotNetType {
    Int,
    Long,
    Decimal,
    Bool,
    DateTime,
    DateOnly,
    TimeOnly,
    String,
    Binary,
    Guid,
}

/// `(schema, name, isView, isRefData, columns[], primaryKeyColumns[],
/// refDataCodeColumn?)`. Invariant: every element of `primary_key_columns`
/// names a column present in `columns`, checked by [`TableSchema::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub schema: String,
    pub name: String,
    pub is_view: bool,
    pub is_ref_data: bool,
    pub columns: Vec<ColumnSchema>,
    pub primary_key_columns: Vec<String>,
    pub ref_data_code_column: Option<String>,
}

impl TableSchema {
    pub fn validate(&self) -> Result<(), String> {
        for pk in &self.primary_key_columns {
            if !self.columns.iter().any(|c| &c.name == pk) {
                return Err(format!(
                    "primary key column `{pk}` is not present in table `{}.{}`",
                    self.schema, self.name
                ));
            }
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn single_primary_key(&self) -> Option<&ColumnSchema> {
        if self.primary_key_columns.len() == 1 {
            self.column(&self.primary_key_columns[0])
        } else {
            None
        }
    }
}

/// One column of a `TableSchema`. `foreign_table == None` implies
/// `is_foreign_ref_data == false`; a ref-data table's code column must be
/// `dotnet_type == String` — both checked by [`ColumnSchema::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dotnet_type: DotNetType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub is_unique: bool,
    pub is_computed: bool,
    pub default_value: Option<String>,
    pub foreign_schema: Option<String>,
    pub foreign_table: Option<String>,
    pub foreign_column: Option<String>,
    pub is_foreign_ref_data: bool,
    pub foreign_ref_data_code_column: Option<String>,
    pub semantic_flags: SemanticFlags,
}

impl ColumnSchema {
    pub fn validate(&self) -> Result<(), String> {
        if self.foreign_table.is_none() && self.is_foreign_ref_data {
            return Err(format!(
                "column `{}` is flagged is_foreign_ref_data without a foreign_table",
                self.name
            ));
        }
        Ok(())
    }

    /// True when this column carries a usable default from the storage
    /// engine itself (identity or computed), i.e. the data parser must not
    /// synthesize one. At most one of `is_identity`/`is_computed` ever
    /// contributes a default.
    pub fn has_engine_default(&self) -> bool {
        self.is_identity || self.is_computed
    }
}

/// A single `column: value` pair within a [`DataRow`]. `value` is the raw
/// scalar as parsed from YAML/JSON, before type coercion;
/// `use_foreign_key_query_for_id` is set by the data parser when the value
/// must render as a ref-data subquery rather than a literal.
#[derive(Debug, Clone)]
pub struct DataColumn {
    pub name: String,
    pub value: DataValue,
    pub db_column: ColumnSchema,
    pub use_foreign_key_query_for_id: bool,
}

/// A coerced scalar value, ready for dialect-specific SQL-literal formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Int(i64),
    Decimal(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
    DateOnly(chrono::NaiveDate),
    TimeOnly(chrono::NaiveTime),
    String(String),
    Binary(Vec<u8>),
    Guid(uuid::Uuid),
    /// The value is a ref-data code string to be resolved by subquery at
    /// emission time, not a literal.
    RefDataCode(String),
}

/// An ordered list of `DataColumn`s. Every row in a table projects onto the
/// same column set at emission time; missing audit/default columns are
/// filled in by the data parser's default-application pass.
#[derive(Debug, Clone, Default)]
pub struct DataRow {
    pub columns: Vec<DataColumn>,
}

impl DataRow {
    pub fn get(&self, name: &str) -> Option<&DataColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn set(&mut self, column: DataColumn) {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
    }
}

/// A parsed, not-yet-emitted table of seed/reference data. A `$`-prefixed
/// source name sets `is_merge`; a `^`-prefixed one sets
/// `use_identifier_generator`; both may combine as `$^Name`.
#[derive(Debug, Clone)]
pub struct DataTable {
    pub schema: String,
    pub name: String,
    pub db_table: TableSchema,
    pub is_merge: bool,
    pub use_identifier_generator: bool,
    pub identifier_kind: Option<DotNetType>,
    pub rows: Vec<DataRow>,
    pub pre_condition_sql: Option<String>,
    pub pre_sql: Option<String>,
    pub post_sql: Option<String>,
    pub column_name_mappings: indexmap::IndexMap<String, String>,
}

impl DataTable {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Table-agnostic configuration attached to the `"*"` schema key in a data
/// file.
#[derive(Debug, Clone, Default)]
pub struct DataConfig {
    pub pre_condition_sql: Option<String>,
    pub pre_sql: Option<String>,
    pub post_sql: Option<String>,
}
