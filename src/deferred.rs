//! Single-resolution future shared across tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A value that is settled at most once and can be awaited by any number of readers.
///
/// Clones share the same slot. The first `resolve`/`reject` wins; later calls
/// return `false` and leave the outcome untouched.
pub struct Deferred<T, E> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    outcome: Mutex<Option<Result<T, E>>>,
    settled: Notify,
}

impl<T, E> Deferred<T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                outcome: Mutex::new(None),
                settled: Notify::new(),
            }),
        }
    }

    /// Settles with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles with an error. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.outcome.lock().is_some()
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        {
            let mut slot = self.inner.outcome.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.inner.settled.notify_waiters();
        true
    }
}

impl<T: Clone, E: Clone> Deferred<T, E> {
    /// Waits until the deferred is settled and returns a copy of the outcome.
    pub async fn wait(&self) -> Result<T, E> {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle between the check and the
            // await is not missed.
            notified.as_mut().enable();

            if let Some(outcome) = self.inner.outcome.lock().as_ref() {
                return outcome.clone();
            }
            notified.await;
        }
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}
