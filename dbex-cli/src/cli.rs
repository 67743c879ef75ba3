//! Clap CLI definitions for the `dbex` binary.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dbex", about = "Database migration and seed-data engine", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every phase command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Connection string for the target database.
    #[arg(long = "connection-string", alias = "cs")]
    pub connection_string: Option<String>,

    /// Name of an environment variable holding the connection string.
    #[arg(long = "connection-varname", alias = "cv")]
    pub connection_varname: Option<String>,

    /// Additional schema-script probe directories, highest priority first.
    #[arg(long = "schema-order", alias = "so")]
    pub schema_order: Vec<String>,

    /// Write the execution report (JSON) to this path.
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// A probe-list directory bundling migration/schema/data scripts.
    /// Repeatable; earlier entries win on a duplicate relative path.
    #[arg(short = 'a', long = "assembly")]
    pub assembly: Vec<String>,

    /// Only probe the first `--assembly` directory given.
    #[arg(long = "entry-assembly-only", alias = "eo")]
    pub entry_assembly_only: bool,

    /// A `name=value` parameter override, repeatable.
    #[arg(short = 'p', long = "param")]
    pub param: Vec<String>,

    /// Skip interactive confirmation for destructive phases (Drop, Reset).
    #[arg(long = "accept-prompts")]
    pub accept_prompts: bool,

    /// Render the SQL a phase would run without opening the target connection.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drop the target database.
    Drop,
    /// Create the target database.
    Create,
    /// Run pre/post-deploy and versioned migration scripts.
    Migrate,
    /// Reconcile idempotent schema objects (views, functions, procedures, types).
    Schema,
    /// Delete all application data, preserving the journal.
    Reset,
    /// Load declarative seed/reference data.
    Data,
    /// Create + Migrate + Schema.
    Deploy,
    /// Deploy + Data.
    DeployWithData,
    /// Same as DeployWithData.
    All,
    /// Drop + All.
    DropAndAll,
    /// Reset + All.
    ResetAndAll,
    /// Reset + Data.
    ResetAndData,
    /// Run arbitrary SQL against the target database.
    Execute {
        /// One or more SQL statements/scripts.
        sql: Vec<String>,
    },
    /// Scaffolding and source-control helpers for script authors.
    Script {
        #[command(subcommand)]
        command: ScriptCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScriptCommand {
    /// Scaffold a new, correctly named, empty script file.
    New {
        /// One of: migrate, schema, data, pre-deploy, post-deploy,
        /// post-database-create.
        kind: String,
        /// Script name (without the generated timestamp prefix for `migrate`).
        name: String,
        /// Directory to write the file into (defaults to the entry assembly).
        #[arg(long)]
        into: Option<String>,
    },
}
