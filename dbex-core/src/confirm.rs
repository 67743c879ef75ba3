//! Destructive-action confirmation. The orchestrator never reads stdin
//! itself — that's `dbex-cli`'s job, an external collaborator — it only
//! calls whatever `Confirmer` the embedder supplies.

use async_trait::async_trait;

#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, action: &str) -> bool;
}

/// Always approves; used when `--accept-prompts` was passed.
pub struct AcceptAll;

#[async_trait]
impl Confirmer for AcceptAll {
    async fn confirm(&self, _action: &str) -> bool {
        true
    }
}

/// Always refuses; the correct default for a non-interactive run without
/// `--accept-prompts`. Rejection surfaces as `DestructiveActionNotConfirmed`.
pub struct NonInteractive;

#[async_trait]
impl Confirmer for NonInteractive {
    async fn confirm(&self, _action: &str) -> bool {
        false
    }
}
