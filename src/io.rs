//! The I/O controller boundary.
//!
//! The engine does not talk to devices. It asks an [`IoController`] to deliver value
//! changes for input bindings to a callback, to write values to output bindings, and it
//! hints the controller when a profile goes live or idle so a backend can reserve or
//! release resources.
//!
//! ## Threading
//! Controllers may invoke callbacks from their own threads. The engine serializes callbacks
//! per profile, so a controller does not need to. Controllers must not hold internal locks
//! while invoking a callback: the callback may write outputs through the same controller.
//!
//! The profile's lock is held while a callback writes outputs. A controller must not
//! deliver input synchronously from inside [`IoController::write_output`] (a loopback from
//! an output straight back to a subscribed input of the same profile): that callback would
//! wait on the lock its caller holds and deadlock. Queue such input and deliver it from
//! another thread instead.

use crate::binding::DeviceBinding;
use crate::error::{EngineError, IoError};
use crate::profile::ProfileId;
use crossbeam::channel::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Callback receiving the new value of a subscribed input binding.
pub type InputCallback = Arc<dyn Fn(i64) + Send + Sync>;

/// Token identifying one live subscription inside a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

/// Backend contract consumed by the engine.
pub trait IoController: Send + Sync {
    /// Start delivering value changes of `binding` to `callback`.
    fn subscribe(
        &self,
        binding: &DeviceBinding,
        callback: InputCallback,
    ) -> Result<SubscriptionHandle, IoError>;

    /// Stop a subscription. Returns `false` if the backend could not remove it.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;

    /// Write a value to an output binding. Returns `false` if the write was dropped.
    fn write_output(&self, binding: &DeviceBinding, value: i64) -> bool;

    /// Resource hint: `profile` became active (`true`) or inactive (`false`).
    fn set_profile_state(&self, profile: ProfileId, active: bool);
}

/// Unsubscribe `handles` in order, giving up after `timeout`.
///
/// With a timeout the batch runs on a helper thread so a stalled backend cannot hold up
/// deactivation; anything not confirmed by the deadline is reported as failed. `None`
/// unsubscribes inline. Returns one error per handle that was not confirmed.
pub(crate) fn unsubscribe_all(
    io: &Arc<dyn IoController>,
    handles: Vec<SubscriptionHandle>,
    timeout: Option<Duration>,
) -> Vec<EngineError> {
    if handles.is_empty() {
        return Vec::new();
    }

    let Some(timeout) = timeout else {
        return handles
            .into_iter()
            .filter(|h| !io.unsubscribe(*h))
            .map(|h| EngineError::UnsubscriptionFailed(format!("handle {} refused", h.0)))
            .collect();
    };

    let (tx, rx) = channel::bounded(handles.len());
    let worker_io = Arc::clone(io);
    let batch = handles.clone();
    let spawned = thread::Builder::new()
        .name("stickswitch-unsubscribe".into())
        .spawn(move || {
            for handle in batch {
                let ok = worker_io.unsubscribe(handle);
                if tx.send((handle, ok)).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("could not spawn unsubscribe worker ({e}); unsubscribing inline");
        return unsubscribe_all(io, handles, None);
    }

    let deadline = Instant::now() + timeout;
    let mut errors = Vec::new();
    let mut confirmed = 0;
    while confirmed < handles.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((handle, true)) => {
                confirmed += 1;
                debug!(handle = handle.0, "unsubscribed");
            }
            Ok((handle, false)) => {
                confirmed += 1;
                errors.push(EngineError::UnsubscriptionFailed(format!(
                    "handle {} refused",
                    handle.0
                )));
            }
            Err(RecvTimeoutError::Timeout) => {
                for handle in &handles[confirmed..] {
                    errors.push(EngineError::UnsubscriptionFailed(format!(
                        "handle {} timed out after {:?}",
                        handle.0, timeout
                    )));
                }
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("unsubscribe worker stopped early");
                for handle in &handles[confirmed..] {
                    errors.push(EngineError::UnsubscriptionFailed(format!(
                        "handle {} not released: unsubscribe worker stopped",
                        handle.0
                    )));
                }
                break;
            }
        }
    }
    errors
}
