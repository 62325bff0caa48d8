//! I/O controller backends for `stickswitch`.
//!
//! Implementations of [`IoController`](crate::io::IoController) and device discovery helpers.
//!
//! # Feature flags
//! - **`hid`** enables [`hid::probe_devices`], which lists HID devices through `hidapi` as
//!   [`Device`](crate::device::Device) records ready to be put into device groups.
//!
//! [`virtual_input::VirtualIo`] is always available. It is the backend the demos and
//! tests run against, and a reference for writing real controllers.

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

pub mod virtual_input;
