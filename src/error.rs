//! Error types for the activation engine.
//!
//! Every failure the engine can report is an [`EngineError`]. None of them are fatal:
//! activation failures are rolled back, unsubscribe failures are reported after the
//! profile has already been finalized as inactive, and load failures are replaced by an
//! empty context (see [`Context::load`](crate::context::Context::load)).
//!
//! Backends report their own failures as [`IoError`], which the engine wraps into
//! [`EngineError::SubscriptionFailed`] with the binding that was being wired.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the registry, profiles, and the [`Context`](crate::context::Context).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A device group, device, profile or plugin lookup missed.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The I/O controller refused (or failed) to subscribe an input binding.
    #[error("subscription failed for {binding}: {source}")]
    SubscriptionFailed {
        binding: String,
        #[source]
        source: IoError,
    },

    /// Best-effort unsubscription did not complete. The profile is inactive regardless.
    #[error("unsubscription failed: {0}")]
    UnsubscriptionFailed(String),

    /// A profile activation attempt was rolled back.
    ///
    /// `causes` holds the failure that aborted the attempt first, followed by any
    /// failures hit while rolling back the bindings subscribed so far.
    #[error("activation of profile '{profile}' aborted: {}", first_cause(.causes))]
    ActivationAborted {
        profile: String,
        causes: Vec<EngineError>,
    },

    /// The saved context could not be read or parsed.
    #[error("failed to load context: {0}")]
    PersistenceLoadFailed(String),

    /// The context could not be serialized or written.
    #[error("failed to save context: {0}")]
    PersistenceSaveFailed(String),

    /// The title is reserved and already taken (only one "Global" profile may exist).
    #[error("profile title '{0}' is reserved and already in use")]
    ReservedTitle(String),

    /// Engine configuration could not be read or is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn first_cause(causes: &[EngineError]) -> String {
    causes
        .first()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "no cause recorded".to_string())
}

impl EngineError {
    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Whether this error (or any cause of an aborted activation) is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        match self {
            EngineError::NotFound { .. } => true,
            EngineError::ActivationAborted { causes, .. } => {
                causes.iter().any(|c| c.is_not_found())
            }
            _ => false,
        }
    }
}

/// Failure reported by an [`IoController`](crate::io::IoController) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The backend does not know the device the binding refers to.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device exists but does not expose the requested channel.
    #[error("channel {channel} not available on device {device}")]
    ChannelUnavailable { device: String, channel: String },

    /// The backend refused the request for its own reasons.
    #[error("backend refused request: {0}")]
    Refused(String),
}
