//! Dialect Adapters.
//!
//! Each submodule is one `Dialect` implementation. They share no state and
//! differ only in the capability methods the `Dialect` trait defines;
//! selection happens once, at session start, from a connection string
//! (`dbex-core`'s job) or explicit engine flag.

pub mod mssql;
pub mod mysql;
pub mod postgres;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;

use dbex_connector::database::DbRow;
use dbex_connector::error::{DbExError, DbExResult};
use dbex_connector::model::DataValue;

use crate::introspector::RawColumnRow;

/// The supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    SqlServer,
    MySql,
    PostgreSql,
}

pub fn dialect_for(engine: Engine) -> Box<dyn dbex_connector::dialect::Dialect> {
    match engine {
        Engine::SqlServer => Box::new(MssqlDialect::default()),
        Engine::MySql => Box::new(MysqlDialect::default()),
        Engine::PostgreSql => Box::new(PostgresDialect::default()),
    }
}

/// Decode one row of any of the three `*_columns.sql` queries into a
/// `RawColumnRow`. The three queries alias their columns identically
/// (`table_schema`, `column_name`, `data_type`, ...), so one decoder
/// serves all engines; `is_always_generated` is MySQL/PostgreSQL only and
/// defaults to `false` where the query (MSSQL) omits it.
pub fn decode_column_row(row: &DbRow) -> DbExResult<RawColumnRow> {
    Ok(RawColumnRow {
        schema: string(row, "table_schema")?,
        table: string(row, "table_name")?,
        is_view: bool_field(row, "is_view")?,
        column: string(row, "column_name")?,
        dotnet_type: dotnet_type_of(&string(row, "data_type")?),
        length: opt_u32(row, "character_maximum_length"),
        precision: opt_u32(row, "numeric_precision"),
        scale: opt_u32(row, "numeric_scale"),
        is_nullable: bool_field(row, "is_nullable")?,
        is_primary_key: bool_field(row, "is_primary_key")?,
        is_identity: bool_field(row, "is_identity")?,
        is_unique: bool_field(row, "is_unique")?,
        is_computed: bool_field(row, "is_computed")?,
        is_always_generated: row.get("is_always_generated").is_some() && bool_field(row, "is_always_generated")?,
        default_value: opt_string(row, "column_default"),
        foreign_schema: opt_string(row, "foreign_table_schema"),
        foreign_table: opt_string(row, "foreign_table_name"),
        foreign_column: opt_string(row, "foreign_column_name"),
    })
}

fn missing(name: &str) -> DbExError {
    DbExError::IntrospectionError(anyhow::anyhow!("introspection row is missing column `{name}`"))
}

fn string(row: &DbRow, name: &str) -> DbExResult<String> {
    match row.get(name) {
        Some(DataValue::String(s)) => Ok(s.clone()),
        Some(other) => Ok(format!("{other:?}")),
        None => Err(missing(name)),
    }
}

fn opt_string(row: &DbRow, name: &str) -> Option<String> {
    match row.get(name) {
        Some(DataValue::Null) | None => None,
        Some(DataValue::String(s)) => Some(s.clone()),
        Some(other) => Some(format!("{other:?}")),
    }
}

fn bool_field(row: &DbRow, name: &str) -> DbExResult<bool> {
    match row.get(name) {
        Some(DataValue::Bool(b)) => Ok(*b),
        Some(DataValue::Int(i)) => Ok(*i != 0),
        Some(DataValue::Null) | None => Ok(false),
        Some(other) => Err(DbExError::IntrospectionError(anyhow::anyhow!(
            "column `{name}` has non-boolean value {other:?}"
        ))),
    }
}

fn opt_u32(row: &DbRow, name: &str) -> Option<u32> {
    match row.get(name) {
        Some(DataValue::Int(i)) if *i >= 0 => Some(*i as u32),
        _ => None,
    }
}

/// Maps a driver-reported type name to the coarse `DotNetType` vocabulary.
/// Unrecognized type names fall back to `String`, matching the
/// introspector's permissive stance on unknown native types.
fn dotnet_type_of(sql_type: &str) -> dbex_connector::model::DotNetType {
    use dbex_connector::model::DotNetType;
    match sql_type.to_ascii_lowercase().as_str() {
        "int" | "integer" | "smallint" | "tinyint" | "mediumint" | "smallserial" | "serial" => DotNetType::Int,
        "bigint" | "bigserial" => DotNetType::Long,
        "decimal" | "numeric" | "money" | "smallmoney" | "real" | "float" | "double" | "double precision" => {
            DotNetType::Decimal
        }
        "bit" | "boolean" | "bool" | "tinyint(1)" => DotNetType::Bool,
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" | "timestamp without time zone"
        | "timestamp with time zone" | "datetimeoffset" => DotNetType::DateTime,
        "date" => DotNetType::DateOnly,
        "time" => DotNetType::TimeOnly,
        "uniqueidentifier" | "uuid" => DotNetType::Guid,
        "binary" | "varbinary" | "image" | "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            DotNetType::Binary
        }
        _ => DotNetType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(fields: &[(&str, DataValue)]) -> DbRow {
        DbRow {
            columns: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn decodes_a_full_mssql_style_row() {
        let r = row(&[
            ("table_schema", DataValue::String("dbo".into())),
            ("table_name", DataValue::String("Widget".into())),
            ("is_view", DataValue::Bool(false)),
            ("column_name", DataValue::String("Id".into())),
            ("data_type", DataValue::String("int".into())),
            ("character_maximum_length", DataValue::Null),
            ("numeric_precision", DataValue::Null),
            ("numeric_scale", DataValue::Null),
            ("is_nullable", DataValue::Bool(false)),
            ("is_primary_key", DataValue::Bool(true)),
            ("is_identity", DataValue::Bool(true)),
            ("is_unique", DataValue::Bool(false)),
            ("is_computed", DataValue::Bool(false)),
            ("column_default", DataValue::Null),
            ("foreign_table_schema", DataValue::Null),
            ("foreign_table_name", DataValue::Null),
            ("foreign_column_name", DataValue::Null),
        ]);
        let decoded = decode_column_row(&row).unwrap();
        assert_eq!(decoded.schema, "dbo");
        assert_eq!(decoded.table, "Widget");
        assert_eq!(decoded.column, "Id");
        assert_eq!(decoded.dotnet_type, dbex_connector::model::DotNetType::Int);
        assert!(decoded.is_primary_key);
        assert!(decoded.is_identity);
        assert!(!decoded.is_always_generated);
    }

    #[test]
    fn missing_required_column_is_an_introspection_error() {
        let row = row(&[("table_schema", DataValue::String("dbo".into()))]);
        let err = decode_column_row(&row).unwrap_err();
        assert!(matches!(err, DbExError::IntrospectionError(_)));
    }

    #[test]
    fn is_always_generated_defaults_false_when_query_omits_it() {
        let r = row(&[
            ("table_schema", DataValue::String("dbo".into())),
            ("table_name", DataValue::String("T".into())),
            ("is_view", DataValue::Bool(false)),
            ("column_name", DataValue::String("C".into())),
            ("data_type", DataValue::String("nvarchar".into())),
            ("is_nullable", DataValue::Bool(true)),
            ("is_primary_key", DataValue::Bool(false)),
            ("is_identity", DataValue::Bool(false)),
            ("is_unique", DataValue::Bool(false)),
            ("is_computed", DataValue::Bool(false)),
        ]);
        let decoded = decode_column_row(&r).unwrap();
        assert!(!decoded.is_always_generated);
        assert_eq!(decoded.dotnet_type, dbex_connector::model::DotNetType::String);
    }

    #[test]
    fn maps_common_type_names_across_engines() {
        assert_eq!(dotnet_type_of("bigint"), dbex_connector::model::DotNetType::Long);
        assert_eq!(dotnet_type_of("VARCHAR"), dbex_connector::model::DotNetType::String);
        assert_eq!(dotnet_type_of("uuid"), dbex_connector::model::DotNetType::Guid);
        assert_eq!(dotnet_type_of("datetime2"), dbex_connector::model::DotNetType::DateTime);
        assert_eq!(dotnet_type_of("bytea"), dbex_connector::model::DotNetType::Binary);
    }
}
