//! PostgreSQL dialect. Double-quoted identifiers; `public` is the default
//! schema; the reset predicate excludes the `pg_*`/`information_schema`
//! namespaces.

use dbex_connector::dialect::{CreateObjectType, Dialect, DialectConfig};
use dbex_connector::model::DataValue;

pub struct PostgresDialect {
    config: DialectConfig,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self {
            config: DialectConfig {
                default_schema: "public".to_string(),
                supports_default_schema: true,
                journal_schema: "public".to_string(),
                journal_table: "schemaversions".to_string(),
                ..DialectConfig::default()
            },
        }
    }
}

const OBJECT_TYPES: [CreateObjectType; 3] = [CreateObjectType::Type, CreateObjectType::View, CreateObjectType::Function];

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn config(&self) -> &DialectConfig {
        &self.config
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn is_batch_separator_line(&self, _trimmed_line: &str) -> bool {
        false
    }

    fn identifier_quote_chars(&self) -> &'static [(char, char)] {
        &[('"', '"')]
    }

    fn supported_object_types(&self) -> &'static [CreateObjectType] {
        &OBJECT_TYPES
    }

    fn supports_create_or_replace(&self) -> bool {
        true
    }

    fn format_value(&self, value: &DataValue) -> String {
        match value {
            DataValue::Null => "NULL".to_string(),
            DataValue::Int(i) => i.to_string(),
            DataValue::Decimal(d) => d.clone(),
            DataValue::Bool(b) => if *b { "true".to_string() } else { "false".to_string() },
            DataValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.6f%:z")),
            DataValue::DateOnly(d) => format!("'{}'", d.format("%Y-%m-%d")),
            DataValue::TimeOnly(t) => format!("'{}'", t.format("%H:%M:%S")),
            DataValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DataValue::Binary(b) => format!("'\\x{}'", hex_encode(b)),
            DataValue::Guid(g) => format!("'{g}'"),
            DataValue::RefDataCode(_) => unreachable!("ref-data codes are resolved to subqueries before formatting"),
        }
    }

    fn administrative_database(&self) -> &'static str {
        "postgres"
    }

    fn reset_bypass_schema(&self, schema: &str) -> bool {
        schema.starts_with("pg_") || schema == "information_schema"
    }

    fn information_schema_query(&self) -> &'static str {
        include_str!("queries/postgres_columns.sql")
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_with_double_quotes_and_escapes() {
        let dialect = PostgresDialect::default();
        assert_eq!(dialect.quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn bypasses_pg_catalog_schemas_on_reset() {
        let dialect = PostgresDialect::default();
        assert!(dialect.reset_bypass_schema("pg_catalog"));
        assert!(dialect.reset_bypass_schema("information_schema"));
        assert!(!dialect.reset_bypass_schema("public"));
    }
}
