//! Device bindings.
//!
//! A [`DeviceBinding`] points a plugin at one channel of one device inside one device
//! group, either as something to listen to ([`Direction::Input`]) or something to write
//! to ([`Direction::Output`]). Bindings are plain values: they carry no subscription
//! state. Subscriptions are created and torn down by the owning
//! [`Profile`](crate::profile::Profile) while it is active.

use crate::device::{DeviceId, DeviceKind};
use crate::event::Channel;
use crate::group::DeviceGroupId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a binding is read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Reference to one input or output channel on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceBinding {
    /// Kind of the group the device lives in (groups are looked up per kind).
    pub kind: DeviceKind,
    pub group: DeviceGroupId,
    pub device: DeviceId,
    pub channel: Channel,
    pub direction: Direction,
}

impl DeviceBinding {
    pub fn input(
        kind: DeviceKind,
        group: DeviceGroupId,
        device: impl Into<DeviceId>,
        channel: Channel,
    ) -> Self {
        Self {
            kind,
            group,
            device: device.into(),
            channel,
            direction: Direction::Input,
        }
    }

    pub fn output(
        kind: DeviceKind,
        group: DeviceGroupId,
        device: impl Into<DeviceId>,
        channel: Channel,
    ) -> Self {
        Self {
            kind,
            group,
            device: device.into(),
            channel,
            direction: Direction::Output,
        }
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }
}

impl fmt::Display for DeviceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        write!(
            f,
            "{}:{}/{} [{} {}]",
            self.kind, self.device, self.channel, dir, self.group
        )
    }
}
