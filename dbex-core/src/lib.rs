//! Migration Orchestrator crate.
//!
//! Drives `dbex-connector`'s capabilities (`Database`, `Dialect`, `Journal`)
//! and `dbex-sql`'s pure components (tokenizer, reconciler, introspector,
//! data parser) through the fixed Drop→Create→Migrate→Schema→Reset→Data
//! pipeline: one crate that knows the command set and phase order, with
//! everything else injected.

pub mod cancellation;
pub mod command_set;
pub mod confirm;
pub mod orchestrator;
pub mod report;

pub use cancellation::CancellationToken;
pub use command_set::{aggregates, Command, CommandSet};
pub use confirm::{AcceptAll, Confirmer, NonInteractive};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RowDecoder};
pub use report::{ExecutionReport, PhaseReport};
