//! Single-flight guard for keyed async operations.
//!
//! The first caller for a key starts the operation on its own tokio task and
//! registers a shared handle to it; every caller that arrives before it settles
//! gets a clone of that handle. The registration is removed by the task itself,
//! before its result becomes visible, so the next caller after settlement always
//! starts a fresh operation.
//!
//! Because the operation runs on a spawned task, a caller that stops awaiting
//! its handle does not cancel it. The task still runs to completion and still
//! clears its registration.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use thiserror::Error;

/// Shared handle to an in-flight operation.
pub type InFlight<T> = Shared<BoxFuture<'static, Result<T, GuardError>>>;

/// Failures of the guarded task itself, not of the operation it ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The operation panicked.
    #[error("in-flight operation '{key}' panicked")]
    Panicked { key: String },

    /// The task was cancelled before producing a result (runtime shutdown).
    #[error("in-flight operation '{key}' was aborted")]
    Aborted { key: String },
}

type Slot = (String, TypeId);
type Registry = Arc<Mutex<HashMap<Slot, Box<dyn Any + Send + Sync>>>>;

/// Removes its slot from the registry when the owning task finishes or is dropped.
struct Registration {
    registry: Registry,
    slot: Slot,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.remove(&self.slot);
        tracing::debug!(key = %self.slot.0, "in-flight operation cleared");
    }
}

/// Registry of in-flight operations, keyed by name.
///
/// Cloning is cheap and clones share the registry.
#[derive(Clone, Default)]
pub struct ConcurrencyGuard {
    registry: Registry,
}

impl std::fmt::Debug for ConcurrencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Slot, Box<dyn Any + Send + Sync>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the operation in flight under `key`, or starts one with `factory`.
    ///
    /// Registration happens synchronously inside this call, so of several
    /// callers issued before the first one settles, exactly one invokes
    /// `factory`. Keys are scoped by output type: the same name used with two
    /// different `T`s names two independent operations.
    ///
    /// If `factory` itself panics, the returned handle resolves to
    /// [`GuardError::Panicked`] and the key stays free.
    ///
    /// Must be called from within a tokio runtime. `factory` must not call back
    /// into this guard.
    pub fn acquire_or_join<T, F, Fut>(&self, key: &str, factory: F) -> InFlight<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let slot: Slot = (key.to_string(), TypeId::of::<T>());
        let mut registry = self.lock();

        if let Some(existing) = registry
            .get(&slot)
            .and_then(|entry| entry.downcast_ref::<InFlight<T>>())
        {
            tracing::debug!(key, "joining in-flight operation");
            return existing.clone();
        }

        // A factory that panics before producing its future is reported like a
        // panicking operation. Nothing is registered for it.
        let operation = match panic::catch_unwind(AssertUnwindSafe(factory)) {
            Ok(operation) => operation,
            Err(_) => {
                tracing::warn!(key, "in-flight operation panicked while starting");
                let failed: InFlight<T> = future::ready(Err(GuardError::Panicked {
                    key: key.to_string(),
                }))
                .boxed()
                .shared();
                return failed;
            }
        };

        let registration = Registration {
            registry: Arc::clone(&self.registry),
            slot: slot.clone(),
        };
        // The registry lock is held until the handle is inserted, so the task
        // cannot clear its slot before it exists.
        let task = tokio::spawn(async move {
            let _registration = registration;
            operation.await
        });

        let owned_key = key.to_string();
        let handle: InFlight<T> = async move {
            task.await.map_err(|error| {
                if error.is_panic() {
                    GuardError::Panicked { key: owned_key }
                } else {
                    GuardError::Aborted { key: owned_key }
                }
            })
        }
        .boxed()
        .shared();

        registry.insert(slot, Box::new(handle.clone()));
        tracing::debug!(key, "started in-flight operation");
        handle
    }

    /// True if any operation is registered under `key`.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock().keys().any(|(name, _)| name == key)
    }

    /// Number of registered operations.
    pub fn in_flight_count(&self) -> usize {
        self.lock().len()
    }
}
