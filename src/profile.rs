//! Profiles and their activation state machine.
//!
//! A [`Profile`] is an ordered list of [`Plugin`]s. The device groups it requires are
//! derived from its plugins' bindings. Profiles are created through
//! [`Context::add_profile`](crate::context::Context::add_profile); switching between them
//! goes through [`Context::activate_profile`](crate::context::Context::activate_profile).
//!
//! # States
//! ```text
//!            activate()                    all subscribed
//! Inactive ─────────────► Activating ─────────────────────► Active
//!    ▲                        │ group missing /                 │
//!    │                        │ subscribe failed (rolled back)  │ deactivate()
//!    └────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! # Activation is all-or-nothing
//! Every required group (and every bound device inside it) is resolved first. Input
//! bindings are then subscribed plugin by plugin, in declared order. The first failure
//! stops the pass, every subscription made so far is released, and the profile is back to
//! `Inactive` with an [`EngineError::ActivationAborted`].
//!
//! # Event delivery
//! While active, the profile's plugins live behind one mutex. Every input callback locks it,
//! so callbacks of one profile never overlap, and deactivation flips the `live` flag under
//! the same lock: once [`Profile::deactivate`] has returned, no further output is written,
//! even if the backend is still slow to drop its subscriptions.

use crate::binding::DeviceBinding;
use crate::device::DeviceKind;
use crate::error::{EngineError, EngineResult};
use crate::group::{DeviceGroupId, DeviceGroupRegistry};
use crate::io::{unsubscribe_all, InputCallback, IoController, SubscriptionHandle};
use crate::plugin::{OutputWrites, Plugin, PluginId, Transform};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Title reserved for the profile that is always considered for fallback.
pub const GLOBAL_PROFILE_TITLE: &str = "Global";

/// Stable identifier of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new_random() -> Self {
        ProfileId(Uuid::new_v4())
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Activation state of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileState {
    #[default]
    Inactive,
    Activating,
    Active,
}

/// Everything a profile needs from its context to wire or unwire itself.
pub struct ActivationEnv<'a> {
    pub groups: &'a DeviceGroupRegistry,
    pub io: &'a Arc<dyn IoController>,
    /// Deadline for releasing subscriptions (`None`: unsubscribe inline).
    pub unsubscribe_timeout: Option<Duration>,
}

/// Plugins as seen by the input callbacks of an active profile.
#[derive(Debug)]
struct LivePlugins {
    live: bool,
    plugins: Vec<Plugin>,
}

#[derive(Debug)]
struct Activation {
    shared: Arc<Mutex<LivePlugins>>,
    handles: Vec<SubscriptionHandle>,
}

/// A switchable set of plugins.
#[derive(Debug, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub title: String,
    #[serde(default)]
    plugins: Vec<Plugin>,
    #[serde(skip)]
    state: ProfileState,
    #[serde(skip)]
    activation: Option<Activation>,
}

impl Profile {
    pub(crate) fn new(title: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new_random(),
            title: title.into(),
            plugins: Vec::new(),
            state: ProfileState::Inactive,
            activation: None,
        }
    }

    pub fn state(&self) -> ProfileState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ProfileState::Active
    }

    pub fn is_global(&self) -> bool {
        self.title == GLOBAL_PROFILE_TITLE
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn plugin(&self, id: PluginId) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.id == id)
    }

    /// Appends a plugin. Takes effect on the next activation if the profile is active.
    pub(crate) fn add_plugin(&mut self, plugin: Plugin) {
        self.plugins.push(plugin);
    }

    pub(crate) fn remove_plugin(&mut self, id: PluginId) -> Option<Plugin> {
        let pos = self.plugins.iter().position(|p| p.id == id)?;
        Some(self.plugins.remove(pos))
    }

    /// Device groups referenced by any binding, in first-use order.
    pub fn required_groups(&self) -> Vec<(DeviceKind, DeviceGroupId)> {
        let mut out: Vec<(DeviceKind, DeviceGroupId)> = Vec::new();
        for binding in self.plugins.iter().flat_map(|p| p.bindings()) {
            let key = (binding.kind, binding.group);
            if !out.contains(&key) {
                out.push(key);
            }
        }
        out
    }

    /// Drop any runtime state. Used after deserialization.
    pub(crate) fn reset_runtime(&mut self) {
        self.state = ProfileState::Inactive;
        self.activation = None;
    }

    /// Wire every input binding to the I/O controller.
    ///
    /// No-op when already active. On failure the profile is `Inactive` and holds no
    /// subscriptions (apart from any the backend refused to release during rollback,
    /// which are muted and reported as causes).
    pub fn activate(&mut self, env: &ActivationEnv<'_>) -> EngineResult<()> {
        if self.state == ProfileState::Active {
            return Ok(());
        }
        self.state = ProfileState::Activating;
        debug!(profile = %self.title, "activating");

        if let Err(cause) = resolve_bindings(&self.plugins, env.groups) {
            warn!(profile = %self.title, "activation aborted: {cause}");
            self.state = ProfileState::Inactive;
            return Err(EngineError::ActivationAborted {
                profile: self.title.clone(),
                causes: vec![cause],
            });
        }

        let shared = Arc::new(Mutex::new(LivePlugins {
            live: false,
            plugins: self.plugins.clone(),
        }));
        let mut handles = Vec::new();

        for (plugin_idx, plugin) in self.plugins.iter().enumerate() {
            for (input_idx, binding) in plugin.transform.inputs().into_iter().enumerate() {
                let callback = input_callback(&shared, env.io, plugin_idx, input_idx);
                match env.io.subscribe(binding, callback) {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        warn!(
                            profile = %self.title,
                            plugin = %plugin.title,
                            %binding,
                            "subscription failed ({source}); rolling back {} subscription(s)",
                            handles.len()
                        );
                        let mut causes = vec![EngineError::SubscriptionFailed {
                            binding: binding.to_string(),
                            source,
                        }];
                        causes.extend(unsubscribe_all(env.io, handles, env.unsubscribe_timeout));
                        self.state = ProfileState::Inactive;
                        return Err(EngineError::ActivationAborted {
                            profile: self.title.clone(),
                            causes,
                        });
                    }
                }
            }
        }

        {
            let mut live = shared.lock();
            for plugin in live.plugins.iter_mut() {
                plugin.transform.activate();
            }
            live.live = true;
        }

        info!(
            profile = %self.title,
            subscriptions = handles.len(),
            "profile active"
        );
        self.activation = Some(Activation { shared, handles });
        self.state = ProfileState::Active;
        Ok(())
    }

    /// Release every subscription. No-op when inactive.
    ///
    /// The profile always ends up `Inactive`; subscriptions the backend did not release in
    /// time are reported as [`EngineError::UnsubscriptionFailed`].
    pub fn deactivate(&mut self, env: &ActivationEnv<'_>) -> EngineResult<()> {
        let Some(activation) = self.activation.take() else {
            self.state = ProfileState::Inactive;
            return Ok(());
        };

        {
            let mut live = activation.shared.lock();
            live.live = false;
            for plugin in live.plugins.iter_mut() {
                plugin.transform.deactivate();
            }
        }

        let total = activation.handles.len();
        let errors = unsubscribe_all(env.io, activation.handles, env.unsubscribe_timeout);
        self.state = ProfileState::Inactive;

        if errors.is_empty() {
            info!(profile = %self.title, "profile inactive");
            return Ok(());
        }
        for e in &errors {
            warn!(profile = %self.title, "{e}");
        }
        Err(EngineError::UnsubscriptionFailed(format!(
            "{} of {} subscription(s) of profile '{}' not released",
            errors.len(),
            total,
            self.title
        )))
    }
}

/// Check that every bound group exists and contains the bound device.
fn resolve_bindings(plugins: &[Plugin], groups: &DeviceGroupRegistry) -> EngineResult<()> {
    for binding in plugins.iter().flat_map(|p| p.bindings()) {
        resolve_binding(binding, groups)?;
    }
    Ok(())
}

fn resolve_binding(binding: &DeviceBinding, groups: &DeviceGroupRegistry) -> EngineResult<()> {
    let group = groups.find(binding.kind, binding.group).ok_or_else(|| {
        EngineError::not_found("device group", format!("{} ({})", binding.group, binding.kind))
    })?;
    if !group.contains(&binding.device) {
        return Err(EngineError::not_found(
            "device",
            format!("{} in group '{}'", binding.device, group.title),
        ));
    }
    Ok(())
}

fn input_callback(
    shared: &Arc<Mutex<LivePlugins>>,
    io: &Arc<dyn IoController>,
    plugin_idx: usize,
    input_idx: usize,
) -> InputCallback {
    let shared = Arc::clone(shared);
    let io = Arc::clone(io);
    Arc::new(move |value| {
        let mut live = shared.lock();
        if !live.live {
            return;
        }
        let Some(plugin) = live.plugins.get_mut(plugin_idx) else {
            return;
        };

        let mut out = OutputWrites::new();
        plugin.transform.input_changed(input_idx, value, &mut out);

        let outputs = plugin.transform.outputs();
        for (output_idx, v) in out.iter() {
            match outputs.get(output_idx) {
                Some(binding) => {
                    if !io.write_output(binding, v) {
                        trace!(%binding, value = v, "output write dropped");
                    }
                }
                None => warn!(
                    plugin = %plugin.title,
                    "write to undeclared output {output_idx} ignored"
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualIo;
    use crate::device::Device;
    use crate::event::{Channel, AXIS_MAX};
    use crate::plugin::{ButtonToAxis, ButtonToButton};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Rig {
        io: Arc<VirtualIo>,
        dyn_io: Arc<dyn IoController>,
        groups: DeviceGroupRegistry,
        sticks: DeviceGroupId,
        outputs: DeviceGroupId,
    }

    impl Rig {
        fn new() -> Self {
            let io = Arc::new(VirtualIo::new());
            let dyn_io: Arc<dyn IoController> = io.clone();
            let mut groups = DeviceGroupRegistry::new();
            let sticks = groups.add(DeviceKind::Joystick, "Joystick-1");
            groups
                .add_device(
                    DeviceKind::Joystick,
                    sticks,
                    Device::new("joy:0", DeviceKind::Joystick, "Stick"),
                )
                .unwrap();
            let outputs = groups.add(DeviceKind::Generic, "vJoy");
            groups
                .add_device(
                    DeviceKind::Generic,
                    outputs,
                    Device::new("vjoy:0", DeviceKind::Generic, "vJoy 1"),
                )
                .unwrap();
            Self {
                io,
                dyn_io,
                groups,
                sticks,
                outputs,
            }
        }

        fn env(&self) -> ActivationEnv<'_> {
            ActivationEnv {
                groups: &self.groups,
                io: &self.dyn_io,
                unsubscribe_timeout: None,
            }
        }

        fn button_to_axis(&self, button: u16, axis: u16) -> Plugin {
            Plugin::new(
                format!("B{button}->A{axis}"),
                ButtonToAxis::new(
                    DeviceBinding::input(
                        DeviceKind::Joystick,
                        self.sticks,
                        "joy:0",
                        Channel::button(button),
                    ),
                    DeviceBinding::output(
                        DeviceKind::Generic,
                        self.outputs,
                        "vjoy:0",
                        Channel::axis(axis),
                    ),
                ),
            )
        }
    }

    #[test]
    fn activate_subscribes_every_input_and_routes_events() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.add_plugin(rig.button_to_axis(1, 1));

        profile.activate(&rig.env()).unwrap();
        assert!(profile.is_active());
        assert_eq!(rig.io.subscription_count(), 2);

        rig.io.press_button("joy:0", 1);
        let writes = rig.io.take_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].channel, Channel::axis(1));
        assert_eq!(writes[0].value, AXIS_MAX);
    }

    #[test]
    fn activate_twice_is_a_noop() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.activate(&rig.env()).unwrap();
        profile.activate(&rig.env()).unwrap();
        assert_eq!(rig.io.subscription_count(), 1);
    }

    #[test]
    fn failed_subscription_rolls_back_earlier_ones() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.add_plugin(Plugin::new(
            "Other stick",
            ButtonToButton::new(
                DeviceBinding::input(
                    DeviceKind::Joystick,
                    rig.sticks,
                    "joy:0",
                    Channel::button(7),
                ),
                DeviceBinding::output(
                    DeviceKind::Generic,
                    rig.outputs,
                    "vjoy:0",
                    Channel::button(7),
                ),
            ),
        ));
        rig.io.refuse_device("joy:0");

        let err = profile.activate(&rig.env()).unwrap_err();
        assert!(matches!(err, EngineError::ActivationAborted { .. }));
        assert_eq!(profile.state(), ProfileState::Inactive);
        assert_eq!(rig.io.subscription_count(), 0);
    }

    #[test]
    fn rollback_releases_partial_subscriptions() {
        let mut rig = Rig::new();
        let pad = rig.groups.add(DeviceKind::Joystick, "Pad");
        rig.groups
            .add_device(
                DeviceKind::Joystick,
                pad,
                Device::new("pad:0", DeviceKind::Joystick, "Pad"),
            )
            .unwrap();

        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.add_plugin(Plugin::new(
            "Pad fire",
            ButtonToButton::new(
                DeviceBinding::input(DeviceKind::Joystick, pad, "pad:0", Channel::button(0)),
                DeviceBinding::output(
                    DeviceKind::Generic,
                    rig.outputs,
                    "vjoy:0",
                    Channel::button(0),
                ),
            ),
        ));
        rig.io.refuse_device("pad:0");

        let err = profile.activate(&rig.env()).unwrap_err();
        match err {
            EngineError::ActivationAborted { causes, .. } => {
                assert_eq!(causes.len(), 1);
                assert!(matches!(causes[0], EngineError::SubscriptionFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rig.io.subscription_count(), 0);

        rig.io.press_button("joy:0", 0);
        assert!(rig.io.writes().is_empty());
    }

    #[test]
    fn missing_group_aborts_before_subscribing() {
        let mut rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        assert!(rig.groups.remove(DeviceKind::Generic, rig.outputs));

        let err = profile.activate(&rig.env()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(rig.io.subscription_count(), 0);
        assert_eq!(profile.state(), ProfileState::Inactive);
    }

    #[test]
    fn device_removed_from_group_aborts() {
        let mut rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        rig.groups
            .remove_device(DeviceKind::Joystick, rig.sticks, &"joy:0".into())
            .unwrap();

        let err = profile.activate(&rig.env()).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("joy:0"));
    }

    #[test]
    fn deactivate_stops_output_and_is_idempotent() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.activate(&rig.env()).unwrap();

        profile.deactivate(&rig.env()).unwrap();
        assert_eq!(profile.state(), ProfileState::Inactive);
        assert_eq!(rig.io.subscription_count(), 0);
        assert_eq!(rig.io.press_button("joy:0", 0), 0);
        assert!(rig.io.writes().is_empty());

        profile.deactivate(&rig.env()).unwrap();
    }

    #[test]
    fn failed_unsubscribe_still_finalizes_inactive() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.activate(&rig.env()).unwrap();

        rig.io.fail_unsubscribe(true);
        let err = profile.deactivate(&rig.env()).unwrap_err();
        assert!(matches!(err, EngineError::UnsubscriptionFailed(_)));
        assert_eq!(profile.state(), ProfileState::Inactive);

        // The backend still holds the subscription, but it is muted.
        assert_eq!(rig.io.press_button("joy:0", 0), 1);
        assert!(rig.io.writes().is_empty());
    }

    #[test]
    fn no_output_after_deactivate_returns_under_concurrent_input() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.activate(&rig.env()).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let feeder = {
            let io = Arc::clone(&rig.io);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    io.press_button("joy:0", 0);
                    io.release_button("joy:0", 0);
                }
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        profile.deactivate(&rig.env()).unwrap();
        let after_deactivate = rig.io.writes().len();
        std::thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);
        feeder.join().unwrap();

        assert_eq!(rig.io.writes().len(), after_deactivate);
    }

    #[test]
    fn required_groups_are_deduplicated_in_first_use_order() {
        let rig = Rig::new();
        let mut profile = Profile::new("Game");
        profile.add_plugin(rig.button_to_axis(0, 0));
        profile.add_plugin(rig.button_to_axis(1, 1));
        assert_eq!(
            profile.required_groups(),
            vec![
                (DeviceKind::Joystick, rig.sticks),
                (DeviceKind::Generic, rig.outputs)
            ]
        );
    }

    #[test]
    fn global_title_is_recognized() {
        assert!(Profile::new(GLOBAL_PROFILE_TITLE).is_global());
        assert!(!Profile::new("global").is_global());
    }
}
