//! Channels and input values.
//!
//! Bindings address a single channel on a device ([`Channel`]): an axis, a button or a
//! hat, by device-local index. Values travelling through bindings are plain `i64`s.
//!
//! ## Value conventions
//! - **Axes:** signed, `[AXIS_MIN, AXIS_MAX]` with `0` as center.
//! - **Buttons:** `1` = pressed, `0` = released. Any non-zero value counts as pressed.
//! - **Hats (POV/D-pad):** `-1` = neutral, `0..7` = 8-way directions (Up = 0, clockwise).
//!
//! Backends that receive device-local deltas can describe them as [`InputKind`] and
//! convert with [`InputKind::channel`] / [`InputKind::value`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of an axis value.
pub const AXIS_MAX: i64 = 32767;
/// Lower bound of an axis value.
pub const AXIS_MIN: i64 = -32767;
/// Button value while pressed.
pub const BUTTON_PRESSED: i64 = 1;
/// Button value while released.
pub const BUTTON_RELEASED: i64 = 0;

/// Category of an input channel on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    Axis,
    Button,
    Hat,
}

/// Selects one channel on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    /// Device-local channel index.
    pub idx: u16,
}

impl Channel {
    pub const fn axis(idx: u16) -> Self {
        Self {
            kind: ChannelKind::Axis,
            idx,
        }
    }

    pub const fn button(idx: u16) -> Self {
        Self {
            kind: ChannelKind::Button,
            idx,
        }
    }

    pub const fn hat(idx: u16) -> Self {
        Self {
            kind: ChannelKind::Hat,
            idx,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChannelKind::Axis => write!(f, "axis {}", self.idx),
            ChannelKind::Button => write!(f, "button {}", self.idx),
            ChannelKind::Hat => write!(f, "hat {}", self.idx),
        }
    }
}

/// Per-device input change (delta).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// A continuous channel changed. `value` is in `[AXIS_MIN, AXIS_MAX]`.
    AxisMoved { axis: u16, value: i64 },

    /// A button transitioned to pressed.
    ButtonPressed { button: u16 },

    /// A button transitioned to released.
    ButtonReleased { button: u16 },

    /// A hat changed. `value`: `-1` = neutral, `0..7` = directions.
    HatChanged { hat: u16, value: i16 },
}

impl InputKind {
    /// The channel this delta belongs to.
    pub fn channel(&self) -> Channel {
        match *self {
            InputKind::AxisMoved { axis, .. } => Channel::axis(axis),
            InputKind::ButtonPressed { button } | InputKind::ButtonReleased { button } => {
                Channel::button(button)
            }
            InputKind::HatChanged { hat, .. } => Channel::hat(hat),
        }
    }

    /// The channel's new value, following the module conventions.
    pub fn value(&self) -> i64 {
        match *self {
            InputKind::AxisMoved { value, .. } => value.clamp(AXIS_MIN, AXIS_MAX),
            InputKind::ButtonPressed { .. } => BUTTON_PRESSED,
            InputKind::ButtonReleased { .. } => BUTTON_RELEASED,
            InputKind::HatChanged { value, .. } => i64::from(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_map_to_channel_values() {
        let press = InputKind::ButtonPressed { button: 3 };
        assert_eq!(press.channel(), Channel::button(3));
        assert_eq!(press.value(), BUTTON_PRESSED);

        let release = InputKind::ButtonReleased { button: 3 };
        assert_eq!(release.value(), BUTTON_RELEASED);

        let hat = InputKind::HatChanged { hat: 0, value: -1 };
        assert_eq!(hat.channel(), Channel::hat(0));
        assert_eq!(hat.value(), -1);
    }

    #[test]
    fn axis_values_are_clamped() {
        let moved = InputKind::AxisMoved {
            axis: 1,
            value: 100_000,
        };
        assert_eq!(moved.value(), AXIS_MAX);
        assert_eq!(moved.channel().to_string(), "axis 1");
    }
}
