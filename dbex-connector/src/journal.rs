//! The journal capability: a persisted ledger of executed migration-script
//! names. The journal table itself is owned by the target database, not
//! by the tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::database::{BoundParam, Database};
use crate::dialect::Dialect;
use crate::error::{DbExError, DbExResult};
use crate::model::{DataValue, JournalEntry};
use crate::parameters::{well_known, Parameters};

#[async_trait]
pub trait Journal: Send + Sync {
    /// Create the journal table idempotently.
    async fn ensure_exists(&self, db: &dyn Database) -> DbExResult<()>;

    /// All entries currently recorded, keyed by script name.
    async fn get_executed(&self, db: &dyn Database) -> DbExResult<HashMap<String, JournalEntry>>;

    /// Append an entry after a script executed successfully.
    async fn audit(&self, db: &dyn Database, entry: &JournalEntry) -> DbExResult<()>;
}

/// The default journal implementation: a single table, located per
/// `Dialect::config().journal_schema`/`journal_table`, overridable via the
/// `JournalSchema`/`JournalTable` parameters.
pub struct SqlJournal<'d, 'p> {
    dialect: &'d dyn Dialect,
    parameters: &'p Parameters,
}

impl<'d, 'p> SqlJournal<'d, 'p> {
    pub fn new(dialect: &'d dyn Dialect, parameters: &'p Parameters) -> Self {
        Self { dialect, parameters }
    }

    fn qualified_table(&self) -> String {
        let cfg = self.dialect.config();
        let schema = self.parameters.get(well_known::JOURNAL_SCHEMA).unwrap_or(cfg.journal_schema.as_str());
        let table = self.parameters.get(well_known::JOURNAL_TABLE).unwrap_or(cfg.journal_table.as_str());
        self.dialect.quote_qualified(schema, table)
    }
}

#[async_trait]
impl<'d, 'p> Journal for SqlJournal<'d, 'p> {
    async fn ensure_exists(&self, db: &dyn Database) -> DbExResult<()> {
        let table = self.qualified_table();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n\
             {id} INTEGER PRIMARY KEY,\n\
             {script_name} VARCHAR(255) NOT NULL UNIQUE,\n\
             {checksum} VARCHAR(64) NOT NULL,\n\
             {applied} TIMESTAMP NOT NULL\n\
             )",
            table = table,
            id = self.dialect.quote_ident("Id"),
            script_name = self.dialect.quote_ident("ScriptName"),
            checksum = self.dialect.quote_ident("Checksum"),
            applied = self.dialect.quote_ident("Applied"),
        );
        db.execute_batch(&ddl).await
    }

    async fn get_executed(&self, db: &dyn Database) -> DbExResult<HashMap<String, JournalEntry>> {
        let table = self.qualified_table();
        let sql = format!(
            "SELECT {script_name}, {checksum}, {applied} FROM {table}",
            script_name = self.dialect.quote_ident("ScriptName"),
            checksum = self.dialect.quote_ident("Checksum"),
            applied = self.dialect.quote_ident("Applied"),
            table = table,
        );
        let rows = db.execute_query(&sql).await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let script_name = match row.get("ScriptName") {
                Some(DataValue::String(s)) => s.clone(),
                _ => continue,
            };
            let checksum = match row.get("Checksum") {
                Some(DataValue::String(s)) => s.clone(),
                _ => String::new(),
            };
            let applied_at = match row.get("Applied") {
                Some(DataValue::DateTime(dt)) => *dt,
                _ => Utc::now(),
            };
            out.insert(
                script_name.clone(),
                JournalEntry {
                    script_name,
                    applied_at,
                    checksum,
                },
            );
        }
        Ok(out)
    }

    async fn audit(&self, db: &dyn Database, entry: &JournalEntry) -> DbExResult<()> {
        let table = self.qualified_table();
        let sql = format!(
            "INSERT INTO {table} ({script_name}, {checksum}, {applied}) VALUES (@scriptName, @checksum, @applied)",
            table = table,
            script_name = self.dialect.quote_ident("ScriptName"),
            checksum = self.dialect.quote_ident("Checksum"),
            applied = self.dialect.quote_ident("Applied"),
        );
        let params = vec![
            BoundParam {
                name: "scriptName".to_string(),
                value: DataValue::String(entry.script_name.clone()),
            },
            BoundParam {
                name: "checksum".to_string(),
                value: DataValue::String(entry.checksum.clone()),
            },
            BoundParam {
                name: "applied".to_string(),
                value: DataValue::DateTime(entry.applied_at),
            },
        ];
        db.execute_parameterized(&sql, &params).await
    }
}

/// Resolve whether a script should run, applying the exactly-once and
/// checksum-mismatch rules.
pub fn should_run(
    existing: &HashMap<String, JournalEntry>,
    script_name: &str,
    content_checksum: &str,
    run_always: bool,
) -> DbExResult<bool> {
    match existing.get(script_name) {
        None => Ok(true),
        Some(_) if run_always => Ok(true),
        Some(entry) if entry.checksum != content_checksum => Err(DbExError::ChecksumMismatch {
            script: script_name.to_string(),
        }),
        Some(_) => Ok(false),
    }
}

pub fn entry_for(script_name: &str, content: &str, applied_at: DateTime<Utc>) -> JournalEntry {
    JournalEntry {
        script_name: script_name.to_string(),
        applied_at,
        checksum: JournalEntry::checksum_of(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{CreateObjectType, DialectConfig};

    struct FixtureDialect {
        config: DialectConfig,
    }

    impl Dialect for FixtureDialect {
        fn name(&self) -> &'static str {
            "fixture"
        }

        fn config(&self) -> &DialectConfig {
            &self.config
        }

        fn quote_ident(&self, ident: &str) -> String {
            format!("[{ident}]")
        }

        fn is_batch_separator_line(&self, _trimmed_line: &str) -> bool {
            false
        }

        fn identifier_quote_chars(&self) -> &'static [(char, char)] {
            &[('[', ']')]
        }

        fn supported_object_types(&self) -> &'static [CreateObjectType] {
            &[CreateObjectType::View]
        }

        fn format_value(&self, _value: &DataValue) -> String {
            String::new()
        }

        fn administrative_database(&self) -> &'static str {
            "master"
        }

        fn reset_bypass_schema(&self, _schema: &str) -> bool {
            false
        }

        fn information_schema_query(&self) -> &'static str {
            ""
        }
    }

    #[test]
    fn qualified_table_defaults_to_dialect_config() {
        let dialect = FixtureDialect { config: DialectConfig::default() };
        let params = Parameters::new();
        let journal = SqlJournal::new(&dialect, &params);
        assert_eq!(journal.qualified_table(), "[dbo].[SchemaVersions]");
    }

    #[test]
    fn journal_schema_and_table_parameters_override_dialect_defaults() {
        let dialect = FixtureDialect { config: DialectConfig::default() };
        let mut params = Parameters::new();
        params.set(well_known::JOURNAL_SCHEMA, "audit");
        params.set(well_known::JOURNAL_TABLE, "__DbExJournal");
        let journal = SqlJournal::new(&dialect, &params);
        assert_eq!(journal.qualified_table(), "[audit].[__DbExJournal]");
    }

    fn entry(name: &str, checksum: &str) -> JournalEntry {
        JournalEntry {
            script_name: name.to_string(),
            applied_at: Utc::now(),
            checksum: checksum.to_string(),
        }
    }

    #[test]
    fn unjournalled_script_runs() {
        let existing = HashMap::new();
        assert!(should_run(&existing, "a.sql", "abc", false).unwrap());
    }

    #[test]
    fn journalled_non_run_always_script_is_skipped() {
        let mut existing = HashMap::new();
        existing.insert("a.sql".to_string(), entry("a.sql", "abc"));
        assert!(!should_run(&existing, "a.sql", "abc", false).unwrap());
    }

    #[test]
    fn run_always_script_always_runs() {
        let mut existing = HashMap::new();
        existing.insert("a.sql".to_string(), entry("a.sql", "abc"));
        assert!(should_run(&existing, "a.sql", "xyz", true).unwrap());
    }

    #[test]
    fn changed_checksum_on_non_run_always_script_errors() {
        let mut existing = HashMap::new();
        existing.insert("a.sql".to_string(), entry("a.sql", "abc"));
        let err = should_run(&existing, "a.sql", "different", false).unwrap_err();
        assert!(matches!(err, DbExError::ChecksumMismatch { .. }));
    }
}
