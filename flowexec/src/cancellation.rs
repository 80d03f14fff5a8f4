//! Cooperative cancellation for branch walkers and poll loops.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent: only the first reason is kept. Waiters
/// blocked in [`CancellationToken::cancelled`] are woken promptly, which
/// is what lets a superseded branch abandon an in-flight poll sleep.
///
/// Tokens form a chain: a child created with [`CancellationToken::child`]
/// observes its ancestors' cancellation as well as its own, so cancelling
/// a fork's parent stops every branch below it.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    /// Creates a new root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new root token behind an `Arc`, the shape walkers share.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Creates a child token that also observes this token's cancellation.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            reason: RwLock::new(None),
            notify: Notify::new(),
            parent: Some(self.clone()),
        })
    }

    /// Requests cancellation with a reason. First reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
            self.notify.notify_waiters();
        }
    }

    /// Returns whether this token or any ancestor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(token) = current {
            if token.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            current = token.parent.as_deref();
        }
        false
    }

    /// Returns the cancellation reason from this token or the nearest
    /// cancelled ancestor.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        let mut current = Some(self);
        while let Some(token) = current {
            if token.cancelled.load(Ordering::SeqCst) {
                return token.reason.read().clone();
            }
            current = token.parent.as_deref();
        }
        None
    }

    /// Waits until this token or any ancestor is cancelled.
    pub async fn cancelled(&self) {
        let mut chain: Vec<&Self> = Vec::new();
        let mut current = Some(self);
        while let Some(token) = current {
            chain.push(token);
            current = token.parent.as_deref();
        }
        let waits = chain
            .into_iter()
            .map(|token| Box::pin(token.cancelled_local()));
        futures::future::select_all(waits).await;
    }

    /// Waits for this token alone, ignoring ancestors.
    async fn cancelled_local(&self) {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering to avoid a lost wakeup.
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
