//! Mutex-guarded registry handle for hosts that call producers and the poller from
//! different threads.
//!
//! One lock covers the pending buckets and the tracked set. It is held for a single
//! mutation call or for a whole reconcile pass, never across I/O.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Cloneable handle to a registry (or a whole session) behind one mutex.
pub struct SharedRegistry<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> SharedRegistry<R> {
    pub fn new(registry: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Runs `f` with exclusive access. A lock poisoned by a panicking holder is recovered.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut guard = self.lock();
        f(&mut guard)
    }

    fn lock(&self) -> MutexGuard<'_, R> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl<R> Clone for SharedRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Default> Default for SharedRegistry<R> {
    fn default() -> Self {
        Self::new(R::default())
    }
}
