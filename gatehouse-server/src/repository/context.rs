//! Per-call unit-of-work context
//!
//! A `Ctx` is owned by the call chain and passed explicitly to every
//! repository call. It may carry one bound transaction; while it does, all
//! database access made with it runs on that transaction's connection.

use std::fmt;
use std::time::Duration;

use sqlx::any::Any;
use tokio::time::Instant;

pub struct Ctx {
    pub(crate) tx: Option<sqlx::Transaction<'static, Any>>,
    pub(crate) savepoints: u32,
    deadline: Option<Instant>,
}

impl Ctx {
    /// A context with no deadline and no transaction.
    pub fn background() -> Self {
        Self {
            tx: None,
            savepoints: 0,
            deadline: None,
        }
    }

    /// A context whose database calls fail once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::background()
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a transaction is bound to this context.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of open savepoints on the bound transaction.
    pub fn savepoint_depth(&self) -> u32 {
        self.savepoints
    }

    /// Derive a context that carries `tx` and inherits this context's deadline.
    pub(crate) fn derive(&self, tx: sqlx::Transaction<'static, Any>) -> Self {
        Self {
            tx: Some(tx),
            savepoints: 0,
            deadline: self.deadline,
        }
    }
}

impl Default for Ctx {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("in_transaction", &self.in_transaction())
            .field("savepoints", &self.savepoints)
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_has_nothing_bound() {
        let ctx = Ctx::background();
        assert!(!ctx.in_transaction());
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.savepoint_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_sets_deadline() {
        let start = Instant::now();
        let ctx = Ctx::with_timeout(Duration::from_secs(3));
        assert_eq!(ctx.deadline(), Some(start + Duration::from_secs(3)));
    }
}
