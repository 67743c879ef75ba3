//! Interactive confirmation for destructive phases, backing `dbex_core::Confirmer`
//! when `--accept-prompts` was not passed.

use std::io::{self, Write};

use async_trait::async_trait;
use dbex_core::Confirmer;

pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, action: &str) -> bool {
        eprint!("{action} will modify the target database. Continue? [y/N] ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
