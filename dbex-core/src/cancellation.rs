//! Cooperative cancellation: a token propagated to every suspension point.
//! On cancellation the current statement is abandoned, the current script
//! is not journalled, and the phase exits with `Cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dbex_connector::error::{DbExError, DbExResult};

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Check-and-fail convenience for the top of every suspension point.
    pub fn check(&self) -> DbExResult<()> {
        if self.is_cancelled() {
            Err(DbExError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_fails_the_check() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(DbExError::Cancelled)));
    }
}
