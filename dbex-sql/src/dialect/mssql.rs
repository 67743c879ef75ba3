//! SQL Server dialect. Batch separator is a `GO` line; quoting uses
//! `[brackets]`; the `CREATE` ordinal follows SQL Server's own documented
//! precedence for this engine: TYPE < FUNCTION < VIEW < PROCEDURE.

use dbex_connector::dialect::{CreateObjectType, Dialect, DialectConfig};
use dbex_connector::model::DataValue;

pub struct MssqlDialect {
    config: DialectConfig,
}

impl Default for MssqlDialect {
    fn default() -> Self {
        Self {
            config: DialectConfig {
                default_schema: "dbo".to_string(),
                supports_default_schema: true,
                journal_schema: "dbo".to_string(),
                journal_table: "SchemaVersions".to_string(),
                ..DialectConfig::default()
            },
        }
    }
}

const OBJECT_TYPES: [CreateObjectType; 4] = [
    CreateObjectType::Type,
    CreateObjectType::Function,
    CreateObjectType::View,
    CreateObjectType::Procedure,
];

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn config(&self) -> &DialectConfig {
        &self.config
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn is_batch_separator_line(&self, trimmed_line: &str) -> bool {
        trimmed_line.eq_ignore_ascii_case("go")
    }

    fn identifier_quote_chars(&self) -> &'static [(char, char)] {
        &[('[', ']')]
    }

    fn supported_object_types(&self) -> &'static [CreateObjectType] {
        &OBJECT_TYPES
    }

    fn supports_create_or_replace(&self) -> bool {
        // `CREATE OR ALTER` (SQL Server 2016 SP1+), not `CREATE OR REPLACE`.
        true
    }

    fn format_value(&self, value: &DataValue) -> String {
        match value {
            DataValue::Null => "NULL".to_string(),
            DataValue::Int(i) => i.to_string(),
            DataValue::Decimal(d) => d.clone(),
            DataValue::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            DataValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
            DataValue::DateOnly(d) => format!("'{}'", d.format("%Y-%m-%d")),
            DataValue::TimeOnly(t) => format!("'{}'", t.format("%H:%M:%S")),
            DataValue::String(s) => format!("N'{}'", s.replace('\'', "''")),
            DataValue::Binary(b) => format!("0x{}", hex_encode(b)),
            DataValue::Guid(g) => format!("'{g}'"),
            DataValue::RefDataCode(_) => unreachable!("ref-data codes are resolved to subqueries before formatting"),
        }
    }

    fn administrative_database(&self) -> &'static str {
        "master"
    }

    fn reset_bypass_schema(&self, schema: &str) -> bool {
        matches!(schema, "dbo" | "cdc" | "sys" | "INFORMATION_SCHEMA")
    }

    fn advisory_lock_statement(&self) -> Option<&'static str> {
        Some("EXEC sp_getapplock @Resource = 'dbex_migrate', @LockMode = 'Exclusive', @LockOwner = 'Session'")
    }

    fn information_schema_query(&self) -> &'static str {
        include_str!("queries/mssql_columns.sql")
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_escapes_brackets() {
        let dialect = MssqlDialect::default();
        assert_eq!(dialect.quote_ident("My]Table"), "[My]]Table]");
    }

    #[test]
    fn object_type_precedence_is_type_function_view_procedure() {
        let dialect = MssqlDialect::default();
        assert!(dialect.object_type_precedence(CreateObjectType::Type) < dialect.object_type_precedence(CreateObjectType::Function));
        assert!(dialect.object_type_precedence(CreateObjectType::Function) < dialect.object_type_precedence(CreateObjectType::View));
        assert!(dialect.object_type_precedence(CreateObjectType::View) < dialect.object_type_precedence(CreateObjectType::Procedure));
    }
}
