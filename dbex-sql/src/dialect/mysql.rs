//! MySQL/MariaDB dialect. No separate batch-separator line — statements
//! are split purely on semicolons; identifiers are backtick-quoted; MySQL
//! has no schema/database distinction usable by DbEx the way SQL Server
//! does, so `supports_default_schema` is `false`.

use dbex_connector::dialect::{CreateObjectType, Dialect, DialectConfig};
use dbex_connector::model::DataValue;

pub struct MysqlDialect {
    config: DialectConfig,
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self {
            config: DialectConfig {
                default_schema: String::new(),
                supports_default_schema: false,
                journal_schema: String::new(),
                journal_table: "schemaversions".to_string(),
                ..DialectConfig::default()
            },
        }
    }
}

const OBJECT_TYPES: [CreateObjectType; 2] = [CreateObjectType::View, CreateObjectType::Procedure];

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn config(&self) -> &DialectConfig {
        &self.config
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn is_batch_separator_line(&self, _trimmed_line: &str) -> bool {
        false
    }

    fn identifier_quote_chars(&self) -> &'static [(char, char)] {
        &[('`', '`')]
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
            DataValue::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            DataValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            DataValue::DateOnly(d) => format!("'{}'", d.format("%Y-%m-%d")),
            DataValue::TimeOnly(t) => format!("'{}'", t.format("%H:%M:%S")),
            DataValue::String(s) => format!("'{}'", s.replace('\'', "''").replace('\\', "\\\\")),
            DataValue::Binary(b) => format!("X'{}'", hex_encode(b)),
            DataValue::Guid(g) => format!("'{g}'"),
            DataValue::RefDataCode(_) => unreachable!("ref-data codes are resolved to subqueries before formatting"),
        }
    }

    fn administrative_database(&self) -> &'static str {
        "information_schema"
    }

    fn reset_bypass_schema(&self, schema: &str) -> bool {
        matches!(schema, "mysql" | "information_schema" | "performance_schema" | "sys")
    }

    fn information_schema_query(&self) -> &'static str {
        include_str!("queries/mysql_columns.sql")
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_with_backticks_and_escapes() {
        let dialect = MysqlDialect::default();
        assert_eq!(dialect.quote_ident("weird`name"), "`weird``name`");
    }

    #[test]
    fn has_no_default_schema_support() {
        assert!(!MysqlDialect::default().config().supports_default_schema);
    }
}
