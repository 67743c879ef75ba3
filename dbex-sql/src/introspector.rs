//! Schema Introspector.
//!
//! Executes the dialect's `information_schema` query once, builds a
//! normalized `TableSchema`/`ColumnSchema` model, then runs the inference
//! pass (ref-data detection, foreign-ref-data-by-convention, semantic
//! flags). The query execution is a thin wrapper around the pure model
//! builder so the inference logic is unit-testable without a live
//! `Database`.

use std::collections::HashMap;

use dbex_connector::database::Database;
use dbex_connector::dialect::Dialect;
use dbex_connector::error::{DbExError, DbExResult};
use dbex_connector::model::{ColumnSchema, DotNetType, SemanticFlags, TableSchema};

/// One row of the `information_schema` query result — one row per (table,
/// column) — already coerced out of driver-native types.
#[derive(Debug, Clone)]
pub struct RawColumnRow {
    pub schema: String,
    pub table: String,
    pub is_view: bool,
    pub column: String,
    pub dotnet_type: DotNetType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub is_unique: bool,
    pub is_computed: bool,
    pub is_always_generated: bool,
    pub default_value: Option<String>,
    pub foreign_schema: Option<String>,
    pub foreign_table: Option<String>,
    pub foreign_column: Option<String>,
}

/// Run the dialect's `information_schema` query and build the inferred
/// model. Any driver error is surfaced as `IntrospectionError`. The row
/// decoding from `DbRow` into `RawColumnRow` is left to the caller via
/// `decode`, since the column vocabulary used by a real driver is
/// engine-specific; see `dbex-sql::dialect` for concrete decoders.
pub async fn introspect(
    db: &dyn Database,
    dialect: &dyn Dialect,
    decode: impl Fn(&dbex_connector::database::DbRow) -> DbExResult<RawColumnRow>,
) -> DbExResult<Vec<TableSchema>> {
    let rows = db
        .execute_query(dialect.information_schema_query())
        .await
        .map_err(|e| DbExError::IntrospectionError(anyhow::anyhow!("{e}")))?;
    let mut raw = Vec::with_capacity(rows.len());
    for row in &rows {
        raw.push(decode(row)?);
    }
    Ok(build_model(raw, dialect))
}

/// Pure assembly of raw rows into the inferred `TableSchema` model.
/// Exposed directly so tests and embedders with a pre-fetched row set can
/// skip the `Database` round-trip.
pub fn build_model(raw: Vec<RawColumnRow>, dialect: &dyn Dialect) -> Vec<TableSchema> {
    let mut tables: indexmap::IndexMap<(String, String), TableSchema> = indexmap::IndexMap::new();

    for row in raw {
        if row.is_always_generated {
            // Always-generated columns are removed from the model entirely.
            continue;
        }
        let key = (row.schema.clone(), row.table.clone());
        let table = tables.entry(key).or_insert_with(|| TableSchema {
            schema: row.schema.clone(),
            name: row.table.clone(),
            is_view: row.is_view,
            is_ref_data: false,
            columns: Vec::new(),
            primary_key_columns: Vec::new(),
            ref_data_code_column: None,
        });

        if row.is_primary_key {
            table.primary_key_columns.push(row.column.clone());
        }

        table.columns.push(ColumnSchema {
            name: row.column,
            dotnet_type: row.dotnet_type,
            length: row.length,
            precision: row.precision,
            scale: row.scale,
            is_nullable: row.is_nullable,
            is_primary_key: row.is_primary_key,
            is_identity: row.is_identity,
            is_unique: row.is_unique,
            is_computed: row.is_computed,
            default_value: row.default_value,
            foreign_schema: row.foreign_schema,
            foreign_table: row.foreign_table,
            foreign_column: row.foreign_column,
            is_foreign_ref_data: false,
            foreign_ref_data_code_column: None,
            semantic_flags: SemanticFlags::default(),
        });
    }

    let mut tables: Vec<TableSchema> = tables.into_values().collect();
    infer_ref_data(&mut tables, dialect);
    infer_foreign_ref_data(&mut tables, dialect);
    infer_semantic_flags(&mut tables, dialect);
    tables
}

/// Marks `is_ref_data` if a table contains non-PK string columns matching
/// the dialect's reference-code and reference-text conventions.
fn infer_ref_data(tables: &mut [TableSchema], dialect: &dyn Dialect) {
    let cfg = dialect.config();
    for table in tables.iter_mut() {
        let code_col = table
            .columns
            .iter()
            .find(|c| !c.is_primary_key && c.name.eq_ignore_ascii_case(&cfg.ref_data_code_column) && c.dotnet_type == DotNetType::String);
        let has_text_col = table
            .columns
            .iter()
            .any(|c| !c.is_primary_key && c.name.eq_ignore_ascii_case(&cfg.ref_data_text_column));
        if let (Some(code_col), true) = (code_col, has_text_col) {
            table.is_ref_data = true;
            table.ref_data_code_column = Some(code_col.name.clone());
        }
    }
}

/// For a non-PK column named `<X><IdSuffix>`, if a ref-data table named
/// `<X>` exists in the same schema, records a foreign-ref-data link even
/// if no physical FK exists.
fn infer_foreign_ref_data(tables: &mut [TableSchema], dialect: &dyn Dialect) {
    let cfg = dialect.config();
    let ref_data_tables: HashMap<(String, String), Option<String>> = tables
        .iter()
        .filter(|t| t.is_ref_data)
        .map(|t| ((t.schema.clone(), t.name.clone()), t.ref_data_code_column.clone()))
        .collect();

    // Collect the column edits first to avoid holding an immutable borrow
    // of `tables` (for the ref_data_tables lookup) across a mutable one.
    let mut edits: Vec<(usize, usize, String, String, String)> = Vec::new();
    for (ti, table) in tables.iter().enumerate() {
        for (ci, column) in table.columns.iter().enumerate() {
            if column.is_primary_key {
                continue;
            }
            let Some(entity) = column.name.strip_suffix(cfg.id_suffix.as_str()) else {
                continue;
            };
            if entity.is_empty() {
                continue;
            }
            let key = (table.schema.clone(), entity.to_string());
            if let Some(Some(code_col)) = ref_data_tables.get(&key) {
                edits.push((ti, ci, table.schema.clone(), entity.to_string(), code_col.clone()));
            }
        }
    }
    for (ti, ci, schema, entity, code_col) in edits {
        let column = &mut tables[ti].columns[ci];
        column.is_foreign_ref_data = true;
        column.foreign_ref_data_code_column = Some(code_col);
        if column.foreign_table.is_none() {
            column.foreign_table = Some(entity);
            column.foreign_schema = Some(schema);
        }
    }
}

/// Flags semantic audit/tenant/row-version/soft-delete columns by
/// configured name.
fn infer_semantic_flags(tables: &mut [TableSchema], dialect: &dyn Dialect) {
    let cfg = dialect.config();
    for table in tables.iter_mut() {
        for column in table.columns.iter_mut() {
            let name = &column.name;
            column.semantic_flags = SemanticFlags {
                is_created_audit: name.eq_ignore_ascii_case(&cfg.created_date_column) || name.eq_ignore_ascii_case(&cfg.created_by_column),
                is_updated_audit: name.eq_ignore_ascii_case(&cfg.updated_date_column) || name.eq_ignore_ascii_case(&cfg.updated_by_column),
                is_tenant_id: name.eq_ignore_ascii_case(&cfg.tenant_id_column),
                is_row_version: name.eq_ignore_ascii_case(&cfg.row_version_column),
                is_is_deleted: name.eq_ignore_ascii_case(&cfg.is_deleted_column),
                is_ref_data: table.is_ref_data,
                is_json_content: false,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::mssql::MssqlDialect;

    fn col(table: &str, column: &str, ty: DotNetType, pk: bool) -> RawColumnRow {
        RawColumnRow {
            schema: "dbo".into(),
            table: table.into(),
            is_view: false,
            column: column.into(),
            dotnet_type: ty,
            length: None,
            precision: None,
            scale: None,
            is_nullable: !pk,
            is_primary_key: pk,
            is_identity: pk,
            is_unique: false,
            is_computed: false,
            is_always_generated: false,
            default_value: None,
            foreign_schema: None,
            foreign_table: None,
            foreign_column: None,
        }
    }

    #[test]
    fn infers_ref_data_and_foreign_ref_data_by_convention() {
        let dialect = MssqlDialect::default();
        let raw = vec![
            col("Gender", "GenderId", DotNetType::Int, true),
            col("Gender", "Code", DotNetType::String, false),
            col("Gender", "Text", DotNetType::String, false),
            col("Person", "PersonId", DotNetType::Int, true),
            col("Person", "GenderId", DotNetType::Int, false),
        ];
        let tables = build_model(raw, &dialect);
        let gender = tables.iter().find(|t| t.name == "Gender").unwrap();
        assert!(gender.is_ref_data);
        assert_eq!(gender.ref_data_code_column.as_deref(), Some("Code"));

        let person = tables.iter().find(|t| t.name == "Person").unwrap();
        let gender_id = person.column("GenderId").unwrap();
        assert!(gender_id.is_foreign_ref_data);
        assert_eq!(gender_id.foreign_table.as_deref(), Some("Gender"));
        assert_eq!(gender_id.foreign_ref_data_code_column.as_deref(), Some("Code"));
    }

    #[test]
    fn always_generated_columns_are_dropped() {
        let mut row = col("T", "Computed", DotNetType::Int, false);
        row.is_always_generated = true;
        let dialect = MssqlDialect::default();
        let tables = build_model(vec![row], &dialect);
        assert!(tables[0].columns.is_empty());
    }
}
