//! Profile activation and device binding engine.
//!
//! Device groups name the physical devices a setup uses, plugins map input channels to
//! output channels, and profiles bundle plugins into switchable configurations. The
//! [`Context`] owns all of it and activates one profile at a time, transactionally:
//! a profile either gets every input subscription it needs or none of them.
//!
//! Talking to devices is left to an [`IoController`]; [`backends::virtual_input::VirtualIo`]
//! is an in-memory one.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod binding;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod event;
pub mod group;
pub mod io;
pub mod observer;
pub mod persistence;
pub mod plugin;
pub mod profile;

pub use binding::*;
pub use config::EngineConfig;
pub use context::Context;
pub use device::*;
pub use error::{EngineError, EngineResult, IoError};
pub use event::*;
pub use group::{DeviceGroup, DeviceGroupId, DeviceGroupRegistry};
pub use io::{InputCallback, IoController, SubscriptionHandle};
pub use observer::{ObserverError, ObserverId, ObserverResult};
pub use plugin::*;
pub use profile::{Profile, ProfileId, ProfileState, GLOBAL_PROFILE_TITLE};
