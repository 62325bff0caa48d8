//! The top-level aggregate: profiles, device groups, and the active profile slot.
//!
//! A [`Context`] is an ordinary value. Hosts create one (or [`load`](Context::load) one),
//! keep it for the session, and route every mutation through `&mut Context`. It owns
//! the [`IoController`] handle the profiles are wired to.
//!
//! # Switching profiles
//! [`activate_profile`](Context::activate_profile) is optimistic: the new profile is
//! wired first, and the previously active one is torn down only once that succeeded. A
//! failed switch leaves the previous profile active and untouched, so the user never ends
//! up with no mappings because a device was unplugged.
//!
//! ```
//! use std::sync::Arc;
//! use stickswitch::backends::virtual_input::VirtualIo;
//! use stickswitch::{ButtonToAxis, Channel, Context, Device, DeviceBinding, DeviceKind, EngineConfig, Plugin, AXIS_MAX};
//!
//! let io = Arc::new(VirtualIo::new());
//! let mut ctx = Context::new(io.clone(), EngineConfig::default());
//!
//! let stick = ctx.add_device_group(DeviceKind::Joystick, "Joystick-1");
//! ctx.add_device_to_group(DeviceKind::Joystick, stick, Device::new("joy:0", DeviceKind::Joystick, "Stick"))?;
//! let vjoy = ctx.add_device_group(DeviceKind::Generic, "vJoy");
//! ctx.add_device_to_group(DeviceKind::Generic, vjoy, Device::new("vjoy:0", DeviceKind::Generic, "vJoy 1"))?;
//!
//! let game = ctx.add_profile("Game")?;
//! ctx.add_plugin(game, Plugin::new("Throttle", ButtonToAxis::new(
//!     DeviceBinding::input(DeviceKind::Joystick, stick, "joy:0", Channel::button(0)),
//!     DeviceBinding::output(DeviceKind::Generic, vjoy, "vjoy:0", Channel::axis(2)),
//! )))?;
//!
//! ctx.activate_profile(game)?;
//! io.press_button("joy:0", 0);
//! assert_eq!(io.writes()[0].value, AXIS_MAX);
//! # Ok::<(), stickswitch::EngineError>(())
//! ```

use crate::config::EngineConfig;
use crate::device::{Device, DeviceId, DeviceKind};
use crate::error::{EngineError, EngineResult};
use crate::group::{DeviceGroup, DeviceGroupId, DeviceGroupRegistry};
use crate::io::IoController;
use crate::observer::{ObserverId, ObserverRegistry, ObserverResult};
use crate::persistence::{self, ContextDocument};
use crate::plugin::{Plugin, PluginId};
use crate::profile::{ActivationEnv, Profile, ProfileId, GLOBAL_PROFILE_TITLE};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Profiles, device groups and the active profile of one session.
pub struct Context {
    profiles: Vec<Profile>,
    groups: DeviceGroupRegistry,
    active: Option<ProfileId>,
    dirty: bool,
    observers: ObserverRegistry,
    io: Arc<dyn IoController>,
    config: EngineConfig,
}

impl Context {
    /// An empty context wired to `io`.
    pub fn new(io: Arc<dyn IoController>, config: EngineConfig) -> Self {
        Self {
            profiles: Vec::new(),
            groups: DeviceGroupRegistry::new(),
            active: None,
            dirty: false,
            observers: ObserverRegistry::new(),
            io,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn io(&self) -> &Arc<dyn IoController> {
        &self.io
    }


    /// Make `id` the active profile.
    ///
    /// Already active: success, nothing happens. On failure the previously active profile
    /// (if any) is still active and no observer is notified. On success the previous
    /// profile is deactivated and observers are notified once.
    pub fn activate_profile(&mut self, id: ProfileId) -> EngineResult<()> {
        if self.active == Some(id) {
            debug!(profile = %id, "already active");
            return Ok(());
        }
        let idx = self.profile_index(id)?;

        let previous = self.active;
        self.active = Some(id);

        let env = ActivationEnv {
            groups: &self.groups,
            io: &self.io,
            unsubscribe_timeout: self.config.unsubscribe_timeout(),
        };
        if let Err(e) = self.profiles[idx].activate(&env) {
            self.active = previous;
            warn!(profile = %self.profiles[idx].title, "activation failed: {e}");
            return Err(e);
        }

        if let Some(prev) = previous {
            if let Some(profile) = self.profiles.iter_mut().find(|p| p.id == prev) {
                if let Err(e) = profile.deactivate(&env) {
                    warn!(profile = %profile.title, "previous profile torn down with errors: {e}");
                }
            }
            self.io.set_profile_state(prev, false);
        }
        self.io.set_profile_state(id, true);

        info!(profile = %self.profiles[idx].title, "active profile changed");
        self.observers.notify();
        Ok(())
    }

    /// Deactivate `id` if it is the active profile.
    ///
    /// `None`, or a profile that is not the active one, is a successful no-op: no I/O
    /// hint, no notification. Otherwise the slot is cleared and observers are notified,
    /// even if some subscriptions could not be released (that failure is returned).
    pub fn deactivate_profile(&mut self, id: Option<ProfileId>) -> EngineResult<()> {
        let Some(id) = id else {
            return Ok(());
        };
        if self.active != Some(id) {
            debug!(profile = %id, "not active; nothing to deactivate");
            return Ok(());
        }
        self.active = None;

        let result = match self.profiles.iter_mut().find(|p| p.id == id) {
            Some(profile) => {
                let env = ActivationEnv {
                    groups: &self.groups,
                    io: &self.io,
                    unsubscribe_timeout: self.config.unsubscribe_timeout(),
                };
                profile.deactivate(&env)
            }
            None => Ok(()),
        };
        self.io.set_profile_state(id, false);

        info!(profile = %id, "active profile cleared");
        self.observers.notify();
        result
    }

    pub fn active_profile_id(&self) -> Option<ProfileId> {
        self.active
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.active.and_then(|id| self.profile(id))
    }

    pub fn is_active(&self, id: ProfileId) -> bool {
        self.active == Some(id)
    }

    /// Register a handler run after every activation and deactivation.
    ///
    /// Handlers run synchronously while the context is mutably borrowed by the call that
    /// changed the active profile, so they cannot query the context themselves. Record the
    /// change (set a flag, send on a channel) and read
    /// [`active_profile`](Self::active_profile) once the call has returned.
    pub fn on_active_profile_changed(
        &mut self,
        handler: impl FnMut() -> ObserverResult + Send + 'static,
    ) -> ObserverId {
        self.observers.add(handler)
    }

    pub fn remove_active_profile_callback(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }


    /// Create an empty profile. Only one profile may be titled "Global".
    pub fn add_profile(&mut self, title: impl Into<String>) -> EngineResult<ProfileId> {
        let title = title.into();
        self.check_reserved(&title, None)?;
        let profile = Profile::new(title);
        let id = profile.id;
        debug!(profile = %profile.title, %id, "profile added");
        self.profiles.push(profile);
        self.mark_changed();
        Ok(id)
    }

    /// Remove a profile, deactivating it first if it is active.
    pub fn remove_profile(&mut self, id: ProfileId) -> EngineResult<Profile> {
        let idx = self.profile_index(id)?;
        if self.active == Some(id) {
            if let Err(e) = self.deactivate_profile(Some(id)) {
                warn!(profile = %id, "removed profile torn down with errors: {e}");
            }
        }
        let profile = self.profiles.remove(idx);
        self.mark_changed();
        Ok(profile)
    }

    pub fn rename_profile(&mut self, id: ProfileId, title: impl Into<String>) -> EngineResult<()> {
        let title = title.into();
        self.check_reserved(&title, Some(id))?;
        let idx = self.profile_index(id)?;
        self.profiles[idx].title = title;
        self.mark_changed();
        Ok(())
    }

    pub fn profile(&self, id: ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// First profile with this exact title.
    pub fn profile_by_title(&self, title: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.title == title)
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn global_profile(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.is_global())
    }

    /// Append a plugin to a profile. An active profile picks it up on its next activation.
    pub fn add_plugin(&mut self, profile: ProfileId, plugin: Plugin) -> EngineResult<PluginId> {
        plugin.validate()?;
        let idx = self.profile_index(profile)?;
        let id = plugin.id;
        self.profiles[idx].add_plugin(plugin);
        self.mark_changed();
        Ok(id)
    }

    pub fn remove_plugin(&mut self, profile: ProfileId, plugin: PluginId) -> EngineResult<Plugin> {
        let idx = self.profile_index(profile)?;
        let removed = self.profiles[idx]
            .remove_plugin(plugin)
            .ok_or_else(|| EngineError::not_found("plugin", plugin))?;
        self.mark_changed();
        Ok(removed)
    }

    fn profile_index(&self, id: ProfileId) -> EngineResult<usize> {
        self.profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| EngineError::not_found("profile", id))
    }

    fn check_reserved(&self, title: &str, renaming: Option<ProfileId>) -> EngineResult<()> {
        if title != GLOBAL_PROFILE_TITLE {
            return Ok(());
        }
        match self.global_profile() {
            Some(existing) if Some(existing.id) != renaming => {
                Err(EngineError::ReservedTitle(title.to_string()))
            }
            _ => Ok(()),
        }
    }


    pub fn groups(&self) -> &DeviceGroupRegistry {
        &self.groups
    }

    pub fn device_groups(&self, kind: DeviceKind) -> &[DeviceGroup] {
        self.groups.groups(kind)
    }

    pub fn add_device_group(
        &mut self,
        kind: DeviceKind,
        title: impl Into<String>,
    ) -> DeviceGroupId {
        let id = self.groups.add(kind, title);
        self.mark_changed();
        id
    }

    /// Remove a group. Returns `false` for an unknown id.
    ///
    /// Profiles referencing the group keep their bindings and fail to activate until the
    /// bindings are fixed. An active profile keeps its subscriptions until it is switched.
    pub fn remove_device_group(&mut self, kind: DeviceKind, id: DeviceGroupId) -> bool {
        let removed = self.groups.remove(kind, id);
        if removed {
            self.mark_changed();
        }
        removed
    }

    pub fn rename_device_group(
        &mut self,
        kind: DeviceKind,
        id: DeviceGroupId,
        title: impl Into<String>,
    ) -> EngineResult<()> {
        self.groups.rename(kind, id, title)?;
        self.mark_changed();
        Ok(())
    }

    pub fn find_device_group(&self, kind: DeviceKind, id: DeviceGroupId) -> Option<&DeviceGroup> {
        self.groups.find(kind, id)
    }

    pub fn add_device_to_group(
        &mut self,
        kind: DeviceKind,
        id: DeviceGroupId,
        device: Device,
    ) -> EngineResult<()> {
        self.groups.add_device(kind, id, device)?;
        self.mark_changed();
        Ok(())
    }

    pub fn remove_device_from_group(
        &mut self,
        kind: DeviceKind,
        id: DeviceGroupId,
        device: &DeviceId,
    ) -> EngineResult<bool> {
        let removed = self.groups.remove_device(kind, id, device)?;
        if removed {
            self.mark_changed();
        }
        Ok(removed)
    }


    /// Whether there are changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_changed(&mut self) {
        self.dirty = true;
    }

    /// Write profiles and groups to `config.context_path`.
    pub fn save(&mut self) -> EngineResult<()> {
        persistence::save_document(&self.config.context_path, &self.profiles, &self.groups)?;
        self.dirty = false;
        info!(path = %self.config.context_path.display(), "context saved");
        Ok(())
    }

    /// Load from `config.context_path`, reporting failures.
    pub fn try_load(io: Arc<dyn IoController>, config: EngineConfig) -> EngineResult<Self> {
        let doc = persistence::load_document(&config.context_path)?;
        Ok(Self::from_document(doc, io, config))
    }

    /// Load from `config.context_path`, or start empty if there is nothing usable there.
    pub fn load(io: Arc<dyn IoController>, config: EngineConfig) -> Self {
        if !config.context_path.exists() {
            info!(path = %config.context_path.display(), "no saved context; starting empty");
            return Self::new(io, config);
        }
        match persistence::load_document(&config.context_path) {
            Ok(doc) => Self::from_document(doc, io, config),
            Err(e) => {
                error!("{e}; starting with an empty context");
                Self::new(io, config)
            }
        }
    }

    fn from_document(
        doc: ContextDocument,
        io: Arc<dyn IoController>,
        config: EngineConfig,
    ) -> Self {
        let mut ctx = Self::new(io, config);
        ctx.profiles = doc.profiles;
        ctx.groups = doc.groups;
        ctx.post_load();
        info!(
            profiles = ctx.profiles.len(),
            groups = ctx.groups.len(),
            "context loaded"
        );
        ctx
    }

    /// Re-link state after deserialization. Safe to call more than once.
    ///
    /// Tears down the active profile (if any) the same way dropping the context does,
    /// resets every profile to `Inactive`, drops duplicate profile and group ids (first
    /// occurrence wins), and retitles every "Global" profile after the first one.
    /// Observers are not notified.
    pub fn post_load(&mut self) {
        self.teardown_active("post-load");
        for profile in &mut self.profiles {
            profile.reset_runtime();
        }

        let mut seen = HashSet::new();
        let before = self.profiles.len();
        self.profiles.retain(|p| seen.insert(p.id));
        let dropped_profiles = before - self.profiles.len();
        let dropped_groups = self.groups.dedup();
        if dropped_profiles + dropped_groups > 0 {
            warn!(
                dropped_profiles,
                dropped_groups, "duplicate ids dropped while loading"
            );
        }

        let mut globals = 0;
        for profile in self.profiles.iter_mut().filter(|p| p.is_global()) {
            globals += 1;
            if globals > 1 {
                profile.title = format!("{GLOBAL_PROFILE_TITLE} ({globals})");
                warn!(
                    profile = %profile.id,
                    title = %profile.title,
                    "extra Global profile renamed"
                );
            }
        }
        if globals > 1 {
            self.mark_changed();
        }
    }

    /// Release the active profile without notifying observers.
    fn teardown_active(&mut self, reason: &str) {
        let Some(id) = self.active.take() else {
            return;
        };
        let env = ActivationEnv {
            groups: &self.groups,
            io: &self.io,
            unsubscribe_timeout: self.config.unsubscribe_timeout(),
        };
        if let Some(profile) = self.profiles.iter_mut().find(|p| p.id == id) {
            if let Err(e) = profile.deactivate(&env) {
                warn!(profile = %profile.title, "{reason} teardown: {e}");
            }
        }
        self.io.set_profile_state(id, false);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown_active("drop");
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("profiles", &self.profiles.len())
            .field("groups", &self.groups.len())
            .field("active", &self.active)
            .field("dirty", &self.dirty)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualIo;
    use crate::binding::DeviceBinding;
    use crate::event::Channel;
    use crate::plugin::ButtonToButton;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> (Arc<VirtualIo>, Context) {
        let io = Arc::new(VirtualIo::new());
        let config = EngineConfig {
            unsubscribe_timeout_ms: 0,
            ..EngineConfig::default()
        };
        let ctx = Context::new(io.clone(), config);
        (io, ctx)
    }

    #[test]
    fn second_global_profile_is_rejected() {
        let (_io, mut ctx) = context();
        let global = ctx.add_profile(GLOBAL_PROFILE_TITLE).unwrap();
        let err = ctx.add_profile(GLOBAL_PROFILE_TITLE).unwrap_err();
        assert!(matches!(err, EngineError::ReservedTitle(_)));

        let other = ctx.add_profile("Other").unwrap();
        assert!(ctx.rename_profile(other, GLOBAL_PROFILE_TITLE).is_err());
        ctx.rename_profile(global, GLOBAL_PROFILE_TITLE).unwrap();
        assert_eq!(ctx.global_profile().map(|p| p.id), Some(global));
    }

    #[test]
    fn mutations_mark_dirty() {
        let (_io, mut ctx) = context();
        assert!(!ctx.is_dirty());
        ctx.add_device_group(DeviceKind::Keyboard, "Keys");
        assert!(ctx.is_dirty());
    }

    #[test]
    fn failed_lookups_do_not_mark_dirty() {
        let (_io, mut ctx) = context();
        assert!(!ctx.remove_device_group(DeviceKind::Mouse, DeviceGroupId::new_random()));
        assert!(ctx
            .rename_device_group(DeviceKind::Mouse, DeviceGroupId::new_random(), "x")
            .is_err());
        assert!(ctx.remove_plugin(ProfileId::new_random(), PluginId::new_random()).is_err());
        assert!(!ctx.is_dirty());
    }

    #[test]
    fn add_plugin_rejects_misdirected_bindings() {
        let (_io, mut ctx) = context();
        let g = ctx.add_device_group(DeviceKind::Joystick, "Sticks");
        let p = ctx.add_profile("P").unwrap();
        let backwards = Plugin::new(
            "backwards",
            ButtonToButton::new(
                DeviceBinding::output(DeviceKind::Joystick, g, "joy:0", Channel::button(0)),
                DeviceBinding::input(DeviceKind::Joystick, g, "joy:0", Channel::button(1)),
            ),
        );
        let err = ctx.add_plugin(p, backwards).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
        assert!(ctx.profile(p).unwrap().plugins().is_empty());
    }

    #[test]
    fn removing_active_profile_deactivates_and_notifies() {
        let (io, mut ctx) = context();
        let p = ctx.add_profile("Empty").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        ctx.on_active_profile_changed(move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        ctx.activate_profile(p).unwrap();
        let removed = ctx.remove_profile(p).unwrap();
        assert!(!removed.is_active());
        assert_eq!(ctx.active_profile_id(), None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(io.profile_states(), vec![(p, true), (p, false)]);
    }

    #[test]
    fn removed_callback_is_not_invoked() {
        let (_io, mut ctx) = context();
        let p = ctx.add_profile("Empty").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = ctx.on_active_profile_changed(move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(ctx.remove_active_profile_callback(id));
        assert!(!ctx.remove_active_profile_callback(id));

        ctx.activate_profile(p).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_profile_is_not_found() {
        let (_io, mut ctx) = context();
        let err = ctx.activate_profile(ProfileId::new_random()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(ctx.active_profile_id(), None);
    }

    #[test]
    fn post_load_is_idempotent() {
        let (_io, mut ctx) = context();
        let p = ctx.add_profile("A").unwrap();
        ctx.activate_profile(p).unwrap();

        ctx.post_load();
        assert_eq!(ctx.active_profile_id(), None);
        assert!(!ctx.profile(p).unwrap().is_active());
        ctx.post_load();
        assert_eq!(ctx.profiles().len(), 1);
    }

    #[test]
    fn post_load_sends_the_inactive_hint_for_the_torn_down_profile() {
        let (io, mut ctx) = context();
        let p = ctx.add_profile("A").unwrap();
        ctx.activate_profile(p).unwrap();

        ctx.post_load();
        assert_eq!(io.profile_states(), vec![(p, true), (p, false)]);
        assert_eq!(io.subscription_count(), 0);

        ctx.post_load();
        assert_eq!(io.profile_states().len(), 2);
    }

    #[test]
    fn observer_records_the_change_for_the_caller_to_read() {
        let (_io, mut ctx) = context();
        let p = ctx.add_profile("A").unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();
        ctx.on_active_profile_changed(move || {
            tx.send(()).map_err(|e| e.to_string())?;
            Ok(())
        });

        ctx.activate_profile(p).unwrap();
        assert!(rx.try_recv().is_ok());
        assert_eq!(ctx.active_profile().map(|a| a.id), Some(p));

        ctx.deactivate_profile(Some(p)).unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(ctx.active_profile().is_none());
    }

    #[test]
    fn dropping_context_releases_subscriptions() {
        let (io, mut ctx) = context();
        let g = ctx.add_device_group(DeviceKind::Joystick, "Sticks");
        ctx.add_device_to_group(
            DeviceKind::Joystick,
            g,
            Device::new("joy:0", DeviceKind::Joystick, "Stick"),
        )
        .unwrap();
        let p = ctx.add_profile("P").unwrap();
        ctx.add_plugin(
            p,
            Plugin::new(
                "fire",
                ButtonToButton::new(
                    DeviceBinding::input(DeviceKind::Joystick, g, "joy:0", Channel::button(0)),
                    DeviceBinding::output(DeviceKind::Joystick, g, "joy:0", Channel::button(1)),
                ),
            ),
        )
        .unwrap();
        ctx.activate_profile(p).unwrap();
        assert_eq!(io.subscription_count(), 1);

        drop(ctx);
        assert_eq!(io.subscription_count(), 0);
    }
}
