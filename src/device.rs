//! Devices as the engine sees them.
//!
//! A [`Device`] is a read-only record handed to the engine by the I/O layer. The engine
//! never opens or polls devices itself; it only stores them in
//! [`DeviceGroup`](crate::group::DeviceGroup)s and passes their ids back to the
//! [`IoController`](crate::io::IoController) when wiring bindings.
//!
//! ## Identity
//! `DeviceId` is whatever stable string the backend uses (`"vid:pid:serial"`, a hidraw
//! path, `"virtual:0"`, ...). The `handle` field is an opaque backend reference and is
//! persisted as-is; treat it as diagnostic data, not identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device category. Device groups are partitioned by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceKind {
    Keyboard,
    Mouse,
    Joystick,
    Generic,
}

impl DeviceKind {
    /// Every kind, in registry order.
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::Keyboard,
        DeviceKind::Mouse,
        DeviceKind::Joystick,
        DeviceKind::Generic,
    ];

    /// Classify a HID top-level collection.
    ///
    /// Generic Desktop page (`0x01`): usage `0x06`/`0x07` keyboard/keypad, `0x02` mouse,
    /// `0x04`/`0x05`/`0x08` joystick/gamepad/multi-axis. Everything else is generic.
    pub fn from_hid_usage(usage_page: u16, usage: u16) -> Self {
        match (usage_page, usage) {
            (0x01, 0x06) | (0x01, 0x07) => DeviceKind::Keyboard,
            (0x01, 0x02) => DeviceKind::Mouse,
            (0x01, 0x04) | (0x01, 0x05) | (0x01, 0x08) => DeviceKind::Joystick,
            _ => DeviceKind::Generic,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Keyboard => "keyboard",
            DeviceKind::Mouse => "mouse",
            DeviceKind::Joystick => "joystick",
            DeviceKind::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// Backend-assigned device identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        DeviceId(s)
    }
}

/// A physical (or virtual) device known to the I/O controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub kind: DeviceKind,
    /// User-facing label (best-effort, from the backend).
    #[serde(default)]
    pub name: String,
    /// Opaque backend reference (OS path, slot, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>, kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.kind, self.id)
    }
}
