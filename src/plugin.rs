//! Transform plugins.
//!
//! A plugin maps changes on its input bindings to writes on its output bindings. Every
//! plugin variant is a case of the closed [`PluginKind`] enum, serialized with an internal
//! `"type"` tag, so loading a saved context never depends on runtime type discovery.
//!
//! ## Callback contract
//! [`Transform::input_changed`] is pure and synchronous: one input event in, a bounded
//! number of [`OutputWrites`] out. It must not block, perform I/O, or reach back into the
//! [`Context`](crate::context::Context). The engine performs the actual writes through the
//! [`IoController`](crate::io::IoController) after the callback returns.
//!
//! ## Subscriptions
//! Plugins never subscribe to devices themselves. The owning
//! [`Profile`](crate::profile::Profile) subscribes every binding returned by
//! [`Transform::inputs`], in that order, and routes each event back with the binding's
//! index.

use crate::binding::{DeviceBinding, Direction};
use crate::error::{EngineError, EngineResult};
use crate::event::{AXIS_MAX, BUTTON_PRESSED, BUTTON_RELEASED};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub Uuid);

impl PluginId {
    pub fn new_random() -> Self {
        PluginId(Uuid::new_v4())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Writes produced by one callback, as `(output index, value)` pairs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputWrites(Vec<(usize, i64)>);

impl OutputWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for the output binding at `output` (index into [`Transform::outputs`]).
    pub fn write(&mut self, output: usize, value: i64) {
        self.0.push((output, value));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.0.iter().copied()
    }
}

/// Capability set shared by all plugin variants.
pub trait Transform {
    /// Input bindings, in subscription order.
    fn inputs(&self) -> Vec<&DeviceBinding>;

    /// Output bindings. [`OutputWrites`] indices refer to this list.
    fn outputs(&self) -> Vec<&DeviceBinding>;

    /// React to a new value on the input at `input`.
    fn input_changed(&mut self, input: usize, value: i64, out: &mut OutputWrites);

    /// Reset transient state. Called when the owning profile goes live; must be idempotent.
    fn activate(&mut self) {}

    /// Called when the owning profile stops receiving events.
    fn deactivate(&mut self) {}
}

fn default_pressed_value() -> i64 {
    AXIS_MAX
}

fn default_sensitivity() -> f32 {
    100.0
}

/// Normalize an axis value into `[-1, 1]`.
#[inline]
fn normalize_axis(value: i64) -> f32 {
    (value as f32 / AXIS_MAX as f32).clamp(-1.0, 1.0)
}

/// A button driving an axis: pressed writes `pressed_value`, released writes
/// `released_value` (center by default). Only transitions produce writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonToAxis {
    pub input: DeviceBinding,
    pub output: DeviceBinding,
    #[serde(default = "default_pressed_value")]
    pub pressed_value: i64,
    #[serde(default)]
    pub released_value: i64,
    #[serde(skip)]
    last: Option<bool>,
}

impl ButtonToAxis {
    pub fn new(input: DeviceBinding, output: DeviceBinding) -> Self {
        Self {
            input,
            output,
            pressed_value: AXIS_MAX,
            released_value: 0,
            last: None,
        }
    }

    pub fn with_values(mut self, pressed: i64, released: i64) -> Self {
        self.pressed_value = pressed;
        self.released_value = released;
        self
    }
}

impl Transform for ButtonToAxis {
    fn inputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.input]
    }

    fn outputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.output]
    }

    fn input_changed(&mut self, _input: usize, value: i64, out: &mut OutputWrites) {
        let pressed = value != BUTTON_RELEASED;
        if self.last == Some(pressed) {
            return;
        }
        self.last = Some(pressed);
        let axis = if pressed {
            self.pressed_value
        } else {
            self.released_value
        };
        out.write(0, axis);
    }

    fn activate(&mut self) {
        self.last = None;
    }
}

/// A button driving another button, optionally inverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonToButton {
    pub input: DeviceBinding,
    pub output: DeviceBinding,
    #[serde(default)]
    pub invert: bool,
    #[serde(skip)]
    last: Option<bool>,
}

impl ButtonToButton {
    pub fn new(input: DeviceBinding, output: DeviceBinding) -> Self {
        Self {
            input,
            output,
            invert: false,
            last: None,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

impl Transform for ButtonToButton {
    fn inputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.input]
    }

    fn outputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.output]
    }

    fn input_changed(&mut self, _input: usize, value: i64, out: &mut OutputWrites) {
        let pressed = (value != BUTTON_RELEASED) != self.invert;
        if self.last == Some(pressed) {
            return;
        }
        self.last = Some(pressed);
        out.write(0, if pressed { BUTTON_PRESSED } else { BUTTON_RELEASED });
    }

    fn activate(&mut self) {
        self.last = None;
    }
}

/// An axis driving another axis with invert, deadzone and sensitivity.
///
/// Deadzone is a percentage of half-travel around center; the remaining travel is
/// rescaled to the full range before sensitivity (percent, 100 = unchanged) is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisToAxis {
    pub input: DeviceBinding,
    pub output: DeviceBinding,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub deadzone_percent: f32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity_percent: f32,
}

impl AxisToAxis {
    pub fn new(input: DeviceBinding, output: DeviceBinding) -> Self {
        Self {
            input,
            output,
            invert: false,
            deadzone_percent: 0.0,
            sensitivity_percent: 100.0,
        }
    }

    fn map(&self, value: i64) -> i64 {
        let mut v = normalize_axis(value);
        if self.invert {
            v = -v;
        }

        let deadzone = (self.deadzone_percent / 100.0).clamp(0.0, 0.99);
        if v.abs() < deadzone {
            v = 0.0;
        } else if deadzone > 0.0 {
            v = v.signum() * (v.abs() - deadzone) / (1.0 - deadzone);
        }

        v = (v * self.sensitivity_percent / 100.0).clamp(-1.0, 1.0);
        (v * AXIS_MAX as f32).round() as i64
    }
}

impl Transform for AxisToAxis {
    fn inputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.input]
    }

    fn outputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.output]
    }

    fn input_changed(&mut self, _input: usize, value: i64, out: &mut OutputWrites) {
        out.write(0, self.map(value));
    }
}

/// An axis driving two buttons: `output_low` while below `-deadzone`, `output_high`
/// while above `+deadzone`. Only edges produce writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisToButton {
    pub input: DeviceBinding,
    pub output_low: DeviceBinding,
    pub output_high: DeviceBinding,
    #[serde(default)]
    pub deadzone_percent: f32,
    #[serde(skip)]
    last: Option<(bool, bool)>,
}

impl AxisToButton {
    pub fn new(
        input: DeviceBinding,
        output_low: DeviceBinding,
        output_high: DeviceBinding,
    ) -> Self {
        Self {
            input,
            output_low,
            output_high,
            deadzone_percent: 0.0,
            last: None,
        }
    }
}

impl Transform for AxisToButton {
    fn inputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.input]
    }

    fn outputs(&self) -> Vec<&DeviceBinding> {
        vec![&self.output_low, &self.output_high]
    }

    fn input_changed(&mut self, _input: usize, value: i64, out: &mut OutputWrites) {
        let v = normalize_axis(value);
        let deadzone = (self.deadzone_percent / 100.0).clamp(0.0, 1.0);
        let state = (v < -deadzone, v > deadzone);
        let (prev_low, prev_high) = match self.last {
            Some(prev) if prev == state => return,
            Some(prev) => (Some(prev.0), Some(prev.1)),
            None => (None, None),
        };
        self.last = Some(state);

        for (idx, (now, before)) in [(state.0, prev_low), (state.1, prev_high)]
            .into_iter()
            .enumerate()
        {
            if before != Some(now) {
                out.write(idx, if now { BUTTON_PRESSED } else { BUTTON_RELEASED });
            }
        }
    }

    fn activate(&mut self) {
        self.last = None;
    }
}

/// Every plugin variant the engine knows how to load and run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PluginKind {
    ButtonToAxis(ButtonToAxis),
    ButtonToButton(ButtonToButton),
    AxisToAxis(AxisToAxis),
    AxisToButton(AxisToButton),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            PluginKind::ButtonToAxis($t) => $body,
            PluginKind::ButtonToButton($t) => $body,
            PluginKind::AxisToAxis($t) => $body,
            PluginKind::AxisToButton($t) => $body,
        }
    };
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(impl From<$variant> for PluginKind {
            fn from(v: $variant) -> Self {
                PluginKind::$variant(v)
            }
        })*
    };
}

impl_from_variant!(ButtonToAxis, ButtonToButton, AxisToAxis, AxisToButton);

impl PluginKind {
    /// Stable tag used in saved documents.
    pub fn tag(&self) -> &'static str {
        match self {
            PluginKind::ButtonToAxis(_) => "ButtonToAxis",
            PluginKind::ButtonToButton(_) => "ButtonToButton",
            PluginKind::AxisToAxis(_) => "AxisToAxis",
            PluginKind::AxisToButton(_) => "AxisToButton",
        }
    }
}

impl Transform for PluginKind {
    fn inputs(&self) -> Vec<&DeviceBinding> {
        dispatch!(self, t => t.inputs())
    }

    fn outputs(&self) -> Vec<&DeviceBinding> {
        dispatch!(self, t => t.outputs())
    }

    fn input_changed(&mut self, input: usize, value: i64, out: &mut OutputWrites) {
        dispatch!(self, t => t.input_changed(input, value, out))
    }

    fn activate(&mut self) {
        dispatch!(self, t => t.activate())
    }

    fn deactivate(&mut self) {
        dispatch!(self, t => t.deactivate())
    }
}

/// A plugin instance inside a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: PluginId,
    pub title: String,
    pub transform: PluginKind,
}

impl Plugin {
    pub fn new(title: impl Into<String>, transform: impl Into<PluginKind>) -> Self {
        Self {
            id: PluginId::new_random(),
            title: title.into(),
            transform: transform.into(),
        }
    }

    /// Check that every declared input is an input binding and every output an output.
    pub fn validate(&self) -> EngineResult<()> {
        let misdeclared = self
            .transform
            .inputs()
            .into_iter()
            .find(|b| b.direction != Direction::Input)
            .or_else(|| {
                self.transform
                    .outputs()
                    .into_iter()
                    .find(|b| b.direction != Direction::Output)
            });
        match misdeclared {
            Some(binding) => Err(EngineError::InvalidConfig(format!(
                "plugin '{}' ({}): binding {} has the wrong direction",
                self.title,
                self.transform.tag(),
                binding
            ))),
            None => Ok(()),
        }
    }

    /// All bindings, inputs first.
    pub fn bindings(&self) -> impl Iterator<Item = &DeviceBinding> + '_ {
        self.transform
            .inputs()
            .into_iter()
            .chain(self.transform.outputs())
    }
}
