//! The `Dialect` capability: one trait covering quoting, the `CREATE`-type
//! ordinal list, journal location, type mapping, value formatting and the
//! data-reset predicate. Concrete SQL Server / MySQL / PostgreSQL
//! implementations live in `dbex-sql::dialect`; this crate only defines
//! the contract and the engine-independent config value object.

use crate::model::DataValue;

/// An idempotent schema-object type a `CREATE` script may declare.
/// Ordinality within a dialect is given by
/// [`Dialect::object_type_precedence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateObjectType {
    Type,
    Function,
    View,
    Procedure,
}

impl CreateObjectType {
    pub fn keyword(self) -> &'static str {
        match self {
            CreateObjectType::Type => "TYPE",
            CreateObjectType::Function => "FUNCTION",
            CreateObjectType::View => "VIEW",
            CreateObjectType::Procedure => "PROCEDURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TYPE" => Some(CreateObjectType::Type),
            "FUNCTION" => Some(CreateObjectType::Function),
            "VIEW" => Some(CreateObjectType::View),
            "PROCEDURE" | "PROC" => Some(CreateObjectType::Procedure),
            _ => None,
        }
    }
}

/// Per-engine overrides threaded through the whole pipeline.
#[derive(Debug, Clone)]
pub struct DialectConfig {
    pub default_schema: String,
    pub supports_default_schema: bool,
    pub journal_schema: String,
    pub journal_table: String,
    pub id_suffix: String,
    /// Column names the introspector treats as ref-data conventions, e.g.
    /// `("Code", "Text")`.
    pub ref_data_code_column: String,
    pub ref_data_text_column: String,
    pub created_date_column: String,
    pub created_by_column: String,
    pub updated_date_column: String,
    pub updated_by_column: String,
    pub tenant_id_column: String,
    pub row_version_column: String,
    pub is_deleted_column: String,
    pub schema_order: Vec<String>,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            default_schema: "dbo".to_string(),
            supports_default_schema: true,
            journal_schema: "dbo".to_string(),
            journal_table: "SchemaVersions".to_string(),
            id_suffix: "Id".to_string(),
            ref_data_code_column: "Code".to_string(),
            ref_data_text_column: "Text".to_string(),
            created_date_column: "CreatedDate".to_string(),
            created_by_column: "CreatedBy".to_string(),
            updated_date_column: "UpdatedDate".to_string(),
            updated_by_column: "UpdatedBy".to_string(),
            tenant_id_column: "TenantId".to_string(),
            row_version_column: "RowVersion".to_string(),
            is_deleted_column: "IsDeleted".to_string(),
            schema_order: Vec::new(),
        }
    }
}

/// The engine-specific behaviour set. Implementations live in
/// `dbex-sql::dialect::{mssql, mysql, postgres}`.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn config(&self) -> &DialectConfig;

    /// Quote an identifier (table, column, schema name) per engine
    /// convention (`[x]`, `` `x` ``, `"x"`).
    fn quote_ident(&self, ident: &str) -> String;

    fn quote_qualified(&self, schema: &str, name: &str) -> String {
        if self.config().supports_default_schema {
            format!("{}.{}", self.quote_ident(schema), self.quote_ident(name))
        } else {
            self.quote_ident(name)
        }
    }

    /// Whether a line, trimmed, is a batch separator (SQL Server `GO`).
    /// MySQL/PostgreSQL return `false`: they split on semicolons instead.
    fn is_batch_separator_line(&self, trimmed_line: &str) -> bool;

    /// Bracket pair(s) this dialect treats as a quoted-identifier
    /// delimiter, beyond the universal `"..."`.
    fn identifier_quote_chars(&self) -> &'static [(char, char)];

    /// The dialect's supported `CREATE` object types, most dependent last
    /// (e.g. SQL Server: TYPE < FUNCTION < VIEW < PROCEDURE).
    fn supported_object_types(&self) -> &'static [CreateObjectType];

    fn object_type_precedence(&self, ty: CreateObjectType) -> usize {
        self.supported_object_types().iter().position(|t| *t == ty).unwrap_or(usize::MAX)
    }

    /// Whether `CREATE OR REPLACE` / `CREATE OR ALTER` is accepted as an
    /// equivalent `CREATE` head.
    fn supports_create_or_replace(&self) -> bool {
        false
    }

    /// Render a coerced value as a SQL literal, formatted per dialect.
    fn format_value(&self, value: &DataValue) -> String;

    /// `(SELECT pk FROM fk_table WHERE code_column = '<value>')` rendering
    /// for a ref-data foreign key resolved by code.
    fn format_fk_subquery(&self, fk_schema: &str, fk_table: &str, pk_column: &str, code_column: &str, code: &str) -> String {
        format!(
            "(SELECT {pk} FROM {table} WHERE {code_col} = {code_lit})",
            pk = self.quote_ident(pk_column),
            table = self.quote_qualified(fk_schema, fk_table),
            code_col = self.quote_ident(code_column),
            code_lit = self.format_value(&DataValue::String(code.to_string())),
        )
    }

    /// A dialect's administrative/master database name, used to build the
    /// master connection.
    fn administrative_database(&self) -> &'static str;

    /// Predicate identifying schemas excluded from `Reset`'s delete script
    /// (e.g. excluding `dbo`/`cdc` on SQL Server, `pg_*` on PostgreSQL).
    /// Returning `true` means the schema is *kept* (not reset).
    fn reset_bypass_schema(&self, schema: &str) -> bool;

    /// The `information_schema` (+ engine extras) query the introspector
    /// runs to produce one row per (table, column).
    fn information_schema_query(&self) -> &'static str;

    /// An optional advisory-lock statement run before the Migrate phase,
    /// e.g. SQL Server's `sp_getapplock`. `None` means no locking is done.
    fn advisory_lock_statement(&self) -> Option<&'static str> {
        None
    }
}
