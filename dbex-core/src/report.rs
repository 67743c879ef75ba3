//! `ExecutionReport`: a structured result per command-set run, a rich
//! result type instead of bare success/failure.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: String,
    pub scripts_applied: Vec<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub phases: Vec<PhaseReport>,
}

impl ExecutionReport {
    pub fn total_duration_ms(&self) -> u128 {
        self.phases.iter().map(|p| p.duration_ms).sum()
    }

    pub fn scripts_applied(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().flat_map(|p| p.scripts_applied.iter().map(String::as_str))
    }
}
