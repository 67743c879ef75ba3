//! Migration Orchestrator.
//!
//! Drives the fixed phase pipeline Drop → Create → Migrate (PreDeploy →
//! Migrations → PostDatabaseCreate-once → PostDeploy) → Schema → Reset →
//! Data, plus the standalone `Execute` escape hatch. Single-threaded
//! cooperative: every database round-trip is an `.await` point, there is
//! no intra-phase parallelism, and script ordering is part of the
//! contract.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dbex_connector::database::{Database, DbRow};
use dbex_connector::dialect::Dialect;
use dbex_connector::error::{DbExError, DbExResult};
use dbex_connector::journal::{self, Journal, SqlJournal};
use dbex_connector::model::{MigrationScript, ScriptKind, TableSchema};
use dbex_connector::parameters::{self, Parameters};
use dbex_sql::data_parser::{self, DataParserConfig, SchemaCatalog};
use dbex_sql::introspector::{self, RawColumnRow};
use dbex_sql::reconciler;
use dbex_sql::script_source::ScriptSource;
use dbex_sql::tokenizer;

use crate::cancellation::CancellationToken;
use crate::confirm::Confirmer;
use crate::report::{ExecutionReport, PhaseReport};
use crate::CommandSet;

/// Decode one row of the dialect's `information_schema` query result into
/// the introspector's driver-independent shape. Engine-specific (column
/// names vary by driver), so the embedder supplies it — `Database` itself
/// is opaque to column-name conventions.
pub type RowDecoder = Arc<dyn Fn(&DbRow) -> DbExResult<RawColumnRow> + Send + Sync>;

pub struct OrchestratorConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub accept_prompts: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
            accept_prompts: false,
        }
    }
}

pub struct Orchestrator<'d> {
    target: Arc<dyn Database>,
    master: Arc<dyn Database>,
    dialect: &'d dyn Dialect,
    scripts: ScriptSource,
    parameters: Parameters,
    confirmer: Arc<dyn Confirmer>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    decode_row: RowDecoder,
    introspected: Option<Vec<TableSchema>>,
}

impl<'d> Orchestrator<'d> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: Arc<dyn Database>,
        master: Arc<dyn Database>,
        dialect: &'d dyn Dialect,
        scripts: ScriptSource,
        parameters: Parameters,
        confirmer: Arc<dyn Confirmer>,
        config: OrchestratorConfig,
        cancel: CancellationToken,
        decode_row: RowDecoder,
    ) -> Self {
        Self {
            target,
            master,
            dialect,
            scripts,
            parameters,
            confirmer,
            config,
            cancel,
            decode_row,
            introspected: None,
        }
    }

    /// Run every phase named by `commands`, in the fixed order, regardless
    /// of the order the bits were set. `Execute`/`Script` bits are ignored
    /// here; call [`Orchestrator::execute_sql`] directly for those.
    pub async fn run(&mut self, commands: CommandSet) -> DbExResult<ExecutionReport> {
        use crate::command_set::Command;

        let mut report = ExecutionReport::default();

        if commands.contains(Command::Drop) {
            report.phases.push(self.run_drop().await?);
        }
        if commands.contains(Command::Create) {
            report.phases.push(self.run_create().await?);
        }
        if commands.contains(Command::Migrate) {
            report.phases.push(self.run_migrate().await?);
        }
        if commands.contains(Command::Schema) {
            report.phases.push(self.run_schema().await?);
        }
        if commands.contains(Command::Reset) {
            report.phases.push(self.run_reset().await?);
        }
        if commands.contains(Command::Data) {
            report.phases.push(self.run_data().await?);
        }

        Ok(report)
    }

    async fn run_drop(&mut self) -> DbExResult<PhaseReport> {
        self.cancel.check()?;
        self.gate_destructive("Drop").await?;
        let started = Instant::now();
        let sql = self.parameters.substitute_sql("DROP DATABASE IF EXISTS {{DatabaseName}}");
        let master = Arc::clone(&self.master);
        with_retry(self.config.max_retries, self.config.retry_delay, || {
            let master = Arc::clone(&master);
            let sql = sql.clone();
            async move { master.execute_batch(&sql).await }
        })
        .await?;
        tracing::info!(phase = "Drop", "dropped target database");
        Ok(PhaseReport {
            phase: "Drop".to_string(),
            scripts_applied: Vec::new(),
            duration_ms: started.elapsed().as_millis(),
        })
    }

    async fn run_create(&mut self) -> DbExResult<PhaseReport> {
        self.cancel.check()?;
        let started = Instant::now();
        let sql = self.parameters.substitute_sql("CREATE DATABASE {{DatabaseName}}");
        let master = Arc::clone(&self.master);
        with_retry(self.config.max_retries, self.config.retry_delay, || {
            let master = Arc::clone(&master);
            let sql = sql.clone();
            async move { master.execute_batch(&sql).await }
        })
        .await?;
        tracing::info!(phase = "Create", "created target database");
        Ok(PhaseReport {
            phase: "Create".to_string(),
            scripts_applied: Vec::new(),
            duration_ms: started.elapsed().as_millis(),
        })
    }

    async fn run_migrate(&mut self) -> DbExResult<PhaseReport> {
        self.cancel.check()?;
        let started = Instant::now();
        let journal = SqlJournal::new(self.dialect, &self.parameters);
        journal.ensure_exists(self.target.as_ref()).await?;

        if let Some(lock_sql) = self.dialect.advisory_lock_statement() {
            self.target.execute_batch(lock_sql).await?;
        }

        let mut executed = journal.get_executed(self.target.as_ref()).await?;
        let all_scripts = self.scripts.discover()?;

        // Sub-phase order within Migrate: PreDeploy, then Migrations
        // (grouped, then by name), then the once-only PostDatabaseCreate
        // batch, then PostDeploy.
        let mut pre_deploy: Vec<&MigrationScript> = all_scripts.iter().filter(|s| s.kind == ScriptKind::PreDeploy).collect();
        pre_deploy.sort_by(|a, b| a.name.cmp(&b.name));
        let mut migrate: Vec<&MigrationScript> = all_scripts.iter().filter(|s| s.kind == ScriptKind::Migrate).collect();
        migrate.sort_by(|a, b| (a.group_order, &a.name).cmp(&(b.group_order, &b.name)));
        let mut post_db_create: Vec<&MigrationScript> = all_scripts.iter().filter(|s| s.kind == ScriptKind::PostDatabaseCreate).collect();
        post_db_create.sort_by(|a, b| a.name.cmp(&b.name));
        let mut post_deploy: Vec<&MigrationScript> = all_scripts.iter().filter(|s| s.kind == ScriptKind::PostDeploy).collect();
        post_deploy.sort_by(|a, b| a.name.cmp(&b.name));

        let phase_order: Vec<&MigrationScript> = pre_deploy
            .into_iter()
            .chain(migrate)
            .chain(post_db_create)
            .chain(post_deploy)
            .collect();

        let mut applied = Vec::new();
        for script in phase_order {
            self.cancel.check()?;
            let content = script.read().map_err(|e| DbExError::ResourceNotFound(format!("{}: {e}", script.name)))?;
            let checksum = dbex_connector::model::JournalEntry::checksum_of(&content);
            if !journal::should_run(&executed, &script.name, &checksum, script.run_always)? {
                continue;
            }
            self.run_script_body(&script.name, &content).await?;
            let entry = journal::entry_for(&script.name, &content, Utc::now());
            journal.audit(self.target.as_ref(), &entry).await?;
            executed.insert(script.name.clone(), entry);
            applied.push(script.name.clone());
        }

        Ok(PhaseReport {
            phase: "Migrate".to_string(),
            scripts_applied: applied,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    async fn run_schema(&mut self) -> DbExResult<PhaseReport> {
        self.cancel.check()?;
        let started = Instant::now();
        let all_scripts = self.scripts.discover()?;
        let schema_scripts: Vec<&MigrationScript> = all_scripts.iter().filter(|s| s.kind == ScriptKind::Schema).collect();

        let mut objects = Vec::with_capacity(schema_scripts.len());
        for script in &schema_scripts {
            let content = script.read().map_err(|e| DbExError::ResourceNotFound(format!("{}: {e}", script.name)))?;
            objects.push(reconciler::parse_head(&script.name, &content, self.dialect)?);
        }

        let drop_order = reconciler::drop_order(&objects, self.dialect);
        for idx in drop_order {
            self.cancel.check()?;
            self.target.execute_batch(&objects[idx].drop_statement(self.dialect)).await?;
        }

        let create_order = reconciler::create_order(&objects, self.dialect);
        let mut applied = Vec::with_capacity(create_order.len());
        for idx in create_order {
            self.cancel.check()?;
            let obj = &objects[idx];
            self.run_script_body(&obj.script_name, &obj.body).await?;
            applied.push(obj.script_name.clone());
        }

        Ok(PhaseReport {
            phase: "Schema".to_string(),
            scripts_applied: applied,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    async fn run_reset(&mut self) -> DbExResult<PhaseReport> {
        self.cancel.check()?;
        self.gate_destructive("Reset").await?;
        let started = Instant::now();
        let tables = self.ensure_introspected().await?.to_vec();
        let cfg = self.dialect.config();

        let resettable: Vec<&TableSchema> = tables
            .iter()
            .filter(|t| !t.is_view)
            .filter(|t| !self.dialect.reset_bypass_schema(&t.schema))
            .filter(|t| !(t.schema.eq_ignore_ascii_case(&cfg.journal_schema) && t.name.eq_ignore_ascii_case(&cfg.journal_table)))
            .collect();

        let order = reverse_dependency_order(&resettable);
        let mut statements = Vec::with_capacity(order.len());
        for &i in &order {
            let t = resettable[i];
            statements.push(format!("DELETE FROM {};", self.dialect.quote_qualified(&t.schema, &t.name)));
        }
        if !statements.is_empty() {
            self.target.execute_batch(&statements.join("\n")).await?;
        }

        Ok(PhaseReport {
            phase: "Reset".to_string(),
            scripts_applied: Vec::new(),
            duration_ms: started.elapsed().as_millis(),
        })
    }

    async fn run_data(&mut self) -> DbExResult<PhaseReport> {
        self.cancel.check()?;
        let started = Instant::now();
        let tables = self.ensure_introspected().await?.to_vec();
        let catalog = SchemaCatalog::new(&tables);

        let all_scripts = self.scripts.discover()?;
        let mut data_scripts: Vec<&MigrationScript> = all_scripts.iter().filter(|s| s.kind == ScriptKind::Data).collect();
        data_scripts.sort_by(|a, b| a.name.cmp(&b.name));

        let parser_config = DataParserConfig {
            id_suffix: self.dialect.config().id_suffix.clone(),
            ref_data_code_column: self.dialect.config().ref_data_code_column.clone(),
            ref_data_text_column: self.dialect.config().ref_data_text_column.clone(),
            ref_data_defaults: data_parser::RefDataDefaults::default(),
            table_defaults: Vec::new(),
            user_name: self.parameters.get(parameters::well_known::USER_NAME).unwrap_or("dbex").to_string(),
            date_time_now: Utc::now(),
            runtime_parameters: self.parameters.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            extension_functions: std::collections::HashMap::new(),
            replace_shorthand_guids: true,
        };

        let mut all_tables = Vec::new();
        let generator = data_parser::GuidIdentifierGenerator;
        for script in &data_scripts {
            self.cancel.check()?;
            let content = script.read().map_err(|e| DbExError::ResourceNotFound(format!("{}: {e}", script.name)))?;
            let (mut parsed, _config) = data_parser::parse(&content, &catalog, &generator, &parser_config)?;
            all_tables.append(&mut parsed);
        }

        // `emit_sql` orders its statements by foreign-key dependency, so the
        // same `topological_order` is recomputed here to label each
        // statement with the right table name.
        let order = data_parser::topological_order(&all_tables)?;
        let statements = data_parser::emit_sql(&all_tables, self.dialect)?;
        let mut applied = Vec::with_capacity(statements.len());
        for (&idx, statement) in order.iter().zip(statements.iter()) {
            self.cancel.check()?;
            self.target.execute_batch(statement).await?;
            applied.push(all_tables[idx].qualified_name());
        }

        Ok(PhaseReport {
            phase: "Data".to_string(),
            scripts_applied: applied,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    /// `Execute <sql>...` admin escape hatch. Not journalled, not part of
    /// the fixed pipeline. `dry_run` renders the would-be commands without
    /// touching the target connection.
    pub async fn execute_sql(&mut self, sql: &str, dry_run: bool) -> DbExResult<ExecutionReport> {
        self.cancel.check()?;
        let started = Instant::now();
        let substituted = self.parameters.substitute_sql(sql);
        let commands = split_statements(self.dialect, "<execute>", &substituted)?;
        if !dry_run {
            for command in &commands {
                self.cancel.check()?;
                self.target.execute_batch(command).await?;
            }
        }
        Ok(ExecutionReport {
            phases: vec![PhaseReport {
                phase: "Execute".to_string(),
                scripts_applied: commands,
                duration_ms: started.elapsed().as_millis(),
            }],
        })
    }

    async fn run_script_body(&self, name: &str, content: &str) -> DbExResult<()> {
        let substituted = self.parameters.substitute_sql(content);
        let commands = split_statements(self.dialect, name, &substituted)?;
        for (index, command) in commands.iter().enumerate() {
            self.cancel.check()?;
            self.target.execute_batch(command).await.map_err(|e| {
                tracing::error!(script = name, command_index = index, error = %e, "script execution failed");
                e
            })?;
        }
        Ok(())
    }

    async fn ensure_introspected(&mut self) -> DbExResult<&[TableSchema]> {
        if self.introspected.is_none() {
            let decode = Arc::clone(&self.decode_row);
            let tables = introspector::introspect(self.target.as_ref(), self.dialect, move |row| decode(row)).await?;
            self.introspected = Some(tables);
        }
        Ok(self.introspected.as_deref().unwrap())
    }

    async fn gate_destructive(&self, action: &str) -> DbExResult<()> {
        if self.config.accept_prompts {
            return Ok(());
        }
        if self.confirmer.confirm(action).await {
            return Ok(());
        }
        Err(DbExError::DestructiveActionNotConfirmed { action: action.to_string() })
    }
}

/// Reverse-dependency table order for `Reset`'s delete script: a table
/// with a foreign key to another resettable table is deleted first.
fn reverse_dependency_order(tables: &[&TableSchema]) -> Vec<usize> {
    let n = tables.len();
    let index_of = |schema: &str, name: &str| tables.iter().position(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name));
    let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, table) in tables.iter().enumerate() {
        for column in &table.columns {
            if let Some(fk_table) = &column.foreign_table {
                let fk_schema = column.foreign_schema.as_deref().unwrap_or(&table.schema);
                if let Some(j) = index_of(fk_schema, fk_table) {
                    if j != i {
                        prerequisites[i].push(j);
                    }
                }
            }
        }
    }
    // Children (tables with FKs) are deleted before the tables they
    // reference, i.e. the reverse of the data-load order.
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut removed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| (0..n).filter(|&k| prerequisites[k].contains(&i)).all(|k| removed[k] || k == i))
            .collect();
        let ready = if ready.is_empty() { remaining.clone() } else { ready };
        let next = *ready.first().unwrap();
        removed[next] = true;
        order.push(next);
        remaining.retain(|&i| i != next);
    }
    order
}

fn split_statements(dialect: &dyn Dialect, name: &str, sql: &str) -> DbExResult<Vec<String>> {
    if dialect.is_batch_separator_line("GO") {
        tokenizer::split_on_go(sql, name)
    } else {
        tokenizer::split_on_semicolons(sql, name, dialect.identifier_quote_chars())
    }
}

async fn with_retry<F, Fut, T>(max_retries: u32, delay: Duration, mut f: F) -> DbExResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbExResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(DbExError::ConnectionFailure(e)) if attempt + 1 < max_retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "connection initialization failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbex_connector::database::FakeDatabase;
    use dbex_connector::model::DotNetType;
    use dbex_sql::dialect::MssqlDialect;
    use dbex_sql::script_source::MemoryBundle;
    use std::sync::Arc as StdArc;

    fn decode_noop(_row: &DbRow) -> DbExResult<RawColumnRow> {
        Ok(RawColumnRow {
            schema: "dbo".into(),
            table: "T".into(),
            is_view: false,
            column: "Id".into(),
            dotnet_type: DotNetType::Int,
            length: None,
            precision: None,
            scale: None,
            is_nullable: false,
            is_primary_key: true,
            is_identity: true,
            is_unique: false,
            is_computed: false,
            is_always_generated: false,
            default_value: None,
            foreign_schema: None,
            foreign_table: None,
            foreign_column: None,
        })
    }

    fn orchestrator(dialect: &MssqlDialect) -> Orchestrator<'_> {
        let target = StdArc::new(FakeDatabase::new());
        let master = StdArc::new(FakeDatabase::new());
        let bundle = MemoryBundle::new().with_file("Migrations/20200101-000000-a.sql", "CREATE TABLE T(Id INT);");
        let source = ScriptSource::new(vec![Box::new(bundle)]);
        let mut params = Parameters::new();
        params.set("DatabaseName", "widgets");
        Orchestrator::new(
            target,
            master,
            dialect,
            source,
            params,
            StdArc::new(crate::confirm::AcceptAll),
            OrchestratorConfig::default(),
            CancellationToken::new(),
            StdArc::new(decode_noop),
        )
    }

    #[tokio::test]
    async fn migrate_journals_each_script_exactly_once() {
        use dbex_connector::model::{DataValue, JournalEntry};

        let dialect = MssqlDialect::default();
        let target = StdArc::new(FakeDatabase::new());
        let master = StdArc::new(FakeDatabase::new());
        let script_content = "CREATE TABLE T(Id INT);";
        let bundle = MemoryBundle::new().with_file("Migrations/20200101-000000-a.sql", script_content);
        let source = ScriptSource::new(vec![Box::new(bundle)]);
        let mut params = Parameters::new();
        params.set("DatabaseName", "widgets");
        let mut orch = Orchestrator::new(
            StdArc::clone(&target) as StdArc<dyn Database>,
            master,
            &dialect,
            source,
            params,
            StdArc::new(crate::confirm::AcceptAll),
            OrchestratorConfig::default(),
            CancellationToken::new(),
            StdArc::new(decode_noop),
        );

        let report = orch.run(crate::command_set::Command::Migrate.into()).await.unwrap();
        assert_eq!(report.phases[0].scripts_applied, vec!["20200101-000000-a.sql".to_string()]);

        // A real database would reflect the just-inserted journal row on the
        // next SELECT; stage that here since `FakeDatabase` keeps no state
        // of its own between calls.
        let select_sql = format!(
            "SELECT {sn}, {cs}, {ap} FROM {tbl}",
            sn = dialect.quote_ident("ScriptName"),
            cs = dialect.quote_ident("Checksum"),
            ap = dialect.quote_ident("Applied"),
            tbl = dialect.quote_qualified(&dialect.config().journal_schema, &dialect.config().journal_table),
        );
        let mut row = DbRow::default();
        row.columns.insert("ScriptName".to_string(), DataValue::String("20200101-000000-a.sql".to_string()));
        row.columns.insert("Checksum".to_string(), DataValue::String(JournalEntry::checksum_of(script_content)));
        row.columns.insert("Applied".to_string(), DataValue::DateTime(Utc::now()));
        target.stage_query(&select_sql, vec![row]);

        let report2 = orch.run(crate::command_set::Command::Migrate.into()).await.unwrap();
        assert!(report2.phases[0].scripts_applied.is_empty());
    }

    #[tokio::test]
    async fn drop_without_accept_prompts_is_refused() {
        let dialect = MssqlDialect::default();
        let target = StdArc::new(FakeDatabase::new());
        let master = StdArc::new(FakeDatabase::new());
        let source = ScriptSource::new(vec![]);
        let mut params = Parameters::new();
        params.set("DatabaseName", "widgets");
        let mut orch = Orchestrator::new(
            target,
            master,
            &dialect,
            source,
            params,
            StdArc::new(crate::confirm::NonInteractive),
            OrchestratorConfig { accept_prompts: false, ..OrchestratorConfig::default() },
            CancellationToken::new(),
            StdArc::new(decode_noop),
        );
        let err = orch.run(crate::command_set::Command::Drop.into()).await.unwrap_err();
        assert!(matches!(err, DbExError::DestructiveActionNotConfirmed { .. }));
    }

    #[tokio::test]
    async fn cancellation_halts_before_any_phase() {
        let dialect = MssqlDialect::default();
        let mut orch = orchestrator(&dialect);
        orch.cancel.cancel();
        let err = orch.run(crate::command_set::Command::Migrate.into()).await.unwrap_err();
        assert!(matches!(err, DbExError::Cancelled));
    }
}
