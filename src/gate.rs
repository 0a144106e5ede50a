//! Process-wide request serialization.
//!
//! [`RequestGate`] owns the state it protects. The only way to reach that
//! state is through [`ExclusiveAccess`], a scoped token released on drop, so
//! every exit path (early return, `?`, panic unwinding) gives the gate back.
//!
//! Waiters are served in FIFO order. There is no timeout: a computation that
//! never finishes holds the gate forever, and throughput is one computation
//! at a time.

use std::ops::{Deref, DerefMut};

use tokio::sync::{Mutex, MutexGuard};

/// Admits one request at a time to the state it owns.
pub struct RequestGate<T> {
    inner: Mutex<T>,
}

impl<T> RequestGate<T> {
    pub fn new(state: T) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Wait for exclusive access.
    pub async fn enter(&self) -> ExclusiveAccess<'_, T> {
        ExclusiveAccess {
            guard: self.inner.lock().await,
        }
    }

    /// Take exclusive access only if nobody holds it right now.
    pub fn try_enter(&self) -> Option<ExclusiveAccess<'_, T>> {
        self.inner
            .try_lock()
            .ok()
            .map(|guard| ExclusiveAccess { guard })
    }

    /// Run `f` with exclusive access and release afterwards.
    pub async fn with_exclusive_access<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut access = self.enter().await;
        f(&mut access)
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Proof of holding the gate. Dereferences to the protected state.
pub struct ExclusiveAccess<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for ExclusiveAccess<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for ExclusiveAccess<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
