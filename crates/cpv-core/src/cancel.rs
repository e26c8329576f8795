//! Cooperative cancellation for long-running verification.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{VerifyError, VerifyResult};

/// A cloneable cancellation flag.
///
/// Chain walks, completeness sums and Merkle builds poll the token between
/// units of work and stop with [`VerifyError::Cancelled`] once it trips.
/// [`CancellationToken::none`] never trips and costs nothing to poll.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    /// A token that can be cancelled through any of its clones.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token that is never cancelled.
    #[must_use]
    pub const fn none() -> Self {
        Self { flag: None }
    }

    /// Requests cancellation. No-op for [`CancellationToken::none`].
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Release);
        }
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Returns `Err(Cancelled)` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Cancelled`] once the token has tripped.
    pub fn check(&self) -> VerifyResult<()> {
        if self.is_cancelled() {
            Err(VerifyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(VerifyError::Cancelled));
    }

    #[test]
    fn none_never_trips() {
        let token = CancellationToken::none();
        token.cancel();
        assert!(!token.is_cancelled());
    }
}
