//! `dbex` — the CLI surface over `dbex-core`'s migration orchestrator.
//! A thin binary: parse args, assemble `CommandSet` and `Parameters`,
//! discover scripts, and hand off to `Orchestrator::run`.

mod cli;
mod confirm;
mod connection;
mod dry_run;
mod exit_code;
mod script_new;

use std::io::Write as _;
use std::sync::Arc;

use clap::Parser;
use dbex_connector::database::DbRow;
use dbex_connector::error::DbExResult;
use dbex_connector::parameters::{well_known, Parameters};
use dbex_core::{aggregates, AcceptAll, Command as Phase, Orchestrator, OrchestratorConfig};
use dbex_sql::introspector::RawColumnRow;
use dbex_sql::script_source::{DirBundle, ScriptSource};

use cli::{Cli, Command, ScriptCommand};
use confirm::StdinConfirmer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(Failure::Error(err)) => {
            eprintln!("error: {err}");
            exit_code::for_error(&err)
        }
        Err(Failure::Other(msg)) => {
            eprintln!("error: {msg}");
            1
        }
    };
    std::process::exit(code);
}

enum Failure {
    Error(dbex_connector::error::DbExError),
    Other(anyhow::Error),
}

impl From<dbex_connector::error::DbExError> for Failure {
    fn from(e: dbex_connector::error::DbExError) -> Self {
        Failure::Error(e)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Failure::Other(e)
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    if let Command::Script { command: ScriptCommand::New { kind, name, into } } = &cli.command {
        let path = script_new::run(kind, name, into.as_deref())?;
        println!("created {}", path.display());
        return Ok(());
    }

    let source = build_script_source(&cli.global)?;
    let params = build_parameters(&cli.global)?;

    let raw_connection_string = cli
        .global
        .connection_string
        .clone()
        .or_else(|| {
            cli.global
                .connection_varname
                .as_ref()
                .and_then(|name| std::env::var(name).ok())
        })
        .ok_or_else(|| anyhow::anyhow!("either --connection-string or --connection-varname is required"))?;
    let resolved = connection::resolve(&raw_connection_string)?;
    let dialect = connection::dialect(resolved.engine);

    if cli.global.dry_run {
        return run_dry(&cli.command, &source, dialect.as_ref(), &params);
    }

    let target = connection::connect(&resolved).await?;
    let master = connection::connect(&resolved).await?;

    let confirmer: Arc<dyn dbex_core::Confirmer> =
        if cli.global.accept_prompts { Arc::new(AcceptAll) } else { Arc::new(StdinConfirmer) };
    let config = OrchestratorConfig { accept_prompts: cli.global.accept_prompts, ..Default::default() };

    let mut orchestrator = Orchestrator::new(
        target,
        master,
        dialect.as_ref(),
        source,
        params,
        confirmer,
        config,
        dbex_core::CancellationToken::new(),
        Arc::new(decode_row),
    );

    let commands = match &cli.command {
        Command::Drop => Phase::Drop.into(),
        Command::Create => Phase::Create.into(),
        Command::Migrate => Phase::Migrate.into(),
        Command::Schema => Phase::Schema.into(),
        Command::Reset => Phase::Reset.into(),
        Command::Data => Phase::Data.into(),
        Command::Deploy => aggregates::deploy(),
        Command::DeployWithData => aggregates::deploy_with_data(),
        Command::All => aggregates::all(),
        Command::DropAndAll => aggregates::drop_and_all(),
        Command::ResetAndAll => aggregates::reset_and_all(),
        Command::ResetAndData => aggregates::reset_and_data(),
        Command::Execute { sql } => {
            let report = orchestrator.execute_sql(&sql.join("\n"), false).await?;
            return write_report(&cli.global.output, &report);
        }
        Command::Script { .. } => unreachable!("handled above"),
    };

    let report = orchestrator.run(commands).await?;
    write_report(&cli.global.output, &report)
}

fn run_dry(
    command: &Command,
    source: &ScriptSource,
    dialect: &dyn dbex_connector::dialect::Dialect,
    params: &Parameters,
) -> Result<(), Failure> {
    let rendered = match command {
        Command::Migrate | Command::Deploy | Command::DeployWithData | Command::All => {
            dry_run::render_migrate(source, dialect, params)?
        }
        Command::Schema => dry_run::render_schema(source, dialect)?,
        Command::Execute { sql } => vec![dry_run::render_execute(dialect, params, &sql.join("\n"))?],
        Command::Drop | Command::Create | Command::Reset | Command::Data | Command::DropAndAll
        | Command::ResetAndAll | Command::ResetAndData => {
            return Err(anyhow::anyhow!(
                "--dry-run is not supported for this command: it needs a live introspected schema"
            )
            .into())
        }
        Command::Script { .. } => unreachable!("handled above"),
    };

    for script in rendered {
        println!("-- {}", script.name);
        for statement in script.statements {
            println!("{statement};");
        }
    }
    Ok(())
}

fn build_script_source(global: &cli::GlobalArgs) -> Result<ScriptSource, Failure> {
    let mut bundles: Vec<Box<dyn dbex_sql::script_source::ResourceBundle>> = Vec::new();
    for dir in &global.schema_order {
        bundles.push(Box::new(DirBundle::new(dir)));
    }
    let assemblies = if global.entry_assembly_only {
        global.assembly.iter().take(1)
    } else {
        global.assembly.iter().take(usize::MAX)
    };
    for dir in assemblies {
        bundles.push(Box::new(DirBundle::new(dir)));
    }
    if bundles.is_empty() {
        return Err(anyhow::anyhow!("at least one --assembly directory is required").into());
    }
    Ok(ScriptSource::new(bundles))
}

fn build_parameters(global: &cli::GlobalArgs) -> Result<Parameters, Failure> {
    let defaults = [
        (well_known::JOURNAL_SCHEMA.to_string(), "dbo".to_string()),
        (well_known::JOURNAL_TABLE.to_string(), "__DbExJournal".to_string()),
        (well_known::USER_NAME.to_string(), whoami()),
        (well_known::DATE_TIME_NOW.to_string(), chrono::Utc::now().to_rfc3339()),
    ];
    let mut overrides = Vec::with_capacity(global.param.len());
    for entry in &global.param {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("--param must be `name=value`, got `{entry}`"))?;
        overrides.push((name.to_string(), value.to_string()));
    }
    Ok(Parameters::with_defaults_and_overrides(defaults, overrides))
}

fn whoami() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "dbex".to_string())
}

fn write_report(output: &Option<String>, report: &dbex_core::ExecutionReport) -> Result<(), Failure> {
    for phase in &report.phases {
        eprintln!(
            "{}: {} script(s) applied in {}ms",
            phase.phase,
            phase.scripts_applied.len(),
            phase.duration_ms
        );
    }
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| anyhow::anyhow!("serializing execution report: {e}"))?;
        let mut file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("opening --output {path}: {e}"))?;
        file.write_all(json.as_bytes())
            .map_err(|e| anyhow::anyhow!("writing --output {path}: {e}"))?;
    }
    Ok(())
}

fn decode_row(row: &DbRow) -> DbExResult<RawColumnRow> {
    dbex_sql::dialect::decode_column_row(row)
}
