//! Listeners which are told about every change to the device snapshot.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::warn;

use crate::{error::Error, state::DeviceState};

/// What a listener returns. Errors are logged and otherwise ignored.
pub type ObserverResult = core::result::Result<(), Error>;

type Listener = Arc<dyn Fn(&DeviceState) -> ObserverResult + Send + Sync>;

/// Handle returned by [`ObserverRegistry::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// The set of registered listeners.
///
/// Each listener runs in isolation: an error or a panic in one never stops the others from
/// being called.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ObserverId, Listener)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, which receives the full snapshot after every change.
    pub fn subscribe<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(&DeviceState) -> ObserverResult + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `state`. Returns how many failed.
    pub fn notify(&self, state: &DeviceState) -> usize {
        // Listeners may (un)subscribe from inside a callback, so call them unlocked.
        let listeners: Vec<(ObserverId, Listener)> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(state))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(observer = id.0, error = %err, "observer failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(observer = id.0, "observer panicked");
                }
            }
        }
        failures
    }
}
