//! Active-profile change observers.
//!
//! The [`Context`](crate::context::Context) notifies observers after every successful
//! activation and every deactivation. Notifications carry no payload; observers query
//! the context for the current active profile.
//!
//! Observers run synchronously, in registration order. An observer that returns an error
//! or panics is logged and skipped; the remaining observers still run.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// Error type observers may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Result type observers return.
pub type ObserverResult = Result<(), ObserverError>;

/// Handle returned by [`ObserverRegistry::add`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

type Handler = Box<dyn FnMut() -> ObserverResult + Send>;

/// Ordered set of change handlers.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: u64,
    handlers: BTreeMap<ObserverId, Handler>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Ids increase monotonically, so map order is registration order.
    pub fn add(&mut self, handler: impl FnMut() -> ObserverResult + Send + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.handlers.insert(id, Box::new(handler));
        id
    }

    /// Unregisters a handler. Returns whether it was registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes every handler once. Returns how many failed.
    pub fn notify(&mut self) -> usize {
        let mut failed = 0;
        for (id, handler) in self.handlers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    error!(observer = id.0, "active profile observer failed: {e}");
                }
                Err(_) => {
                    failed += 1;
                    error!(observer = id.0, "active profile observer panicked");
                }
            }
        }
        failed
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.handlers.len())
            .finish()
    }
}
