//! Device groups and their registry.
//!
//! Profiles do not depend on individual devices; they depend on *device groups*: named,
//! user-managed sets of devices of a single [`DeviceKind`]. The
//! [`DeviceGroupRegistry`] keeps one collection per kind.
//!
//! # Contract
//! - Group ids are random v4 UUIDs generated by the registry, so they never collide across
//!   kinds.
//! - [`remove`](DeviceGroupRegistry::remove) of an unknown id returns `false` and changes
//!   nothing.
//! - [`rename`](DeviceGroupRegistry::rename), [`add_device`](DeviceGroupRegistry::add_device)
//!   and [`remove_device`](DeviceGroupRegistry::remove_device) on an unknown id return
//!   [`EngineError::NotFound`]. Callers are expected to check with
//!   [`find`](DeviceGroupRegistry::find) first.
//!
//! The registry does not track dirtiness itself; the owning
//! [`Context`](crate::context::Context) marks itself dirty around every mutating call.

use crate::device::{Device, DeviceId, DeviceKind};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a device group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceGroupId(pub Uuid);

impl DeviceGroupId {
    pub fn new_random() -> Self {
        DeviceGroupId(Uuid::new_v4())
    }
}

impl fmt::Display for DeviceGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A named collection of devices of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGroup {
    pub id: DeviceGroupId,
    pub title: String,
    #[serde(default)]
    devices: Vec<Device>,
}

impl DeviceGroup {
    fn new(title: impl Into<String>) -> Self {
        Self {
            id: DeviceGroupId::new_random(),
            title: title.into(),
            devices: Vec::new(),
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.devices.iter().any(|d| &d.id == device)
    }

    /// Adds or replaces a member. Membership is a set keyed by device id.
    fn insert(&mut self, device: Device) {
        match self.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    fn remove(&mut self, device: &DeviceId) -> bool {
        let before = self.devices.len();
        self.devices.retain(|d| &d.id != device);
        self.devices.len() != before
    }
}

/// Per-kind collections of [`DeviceGroup`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGroupRegistry {
    #[serde(default)]
    keyboards: Vec<DeviceGroup>,
    #[serde(default)]
    mice: Vec<DeviceGroup>,
    #[serde(default)]
    joysticks: Vec<DeviceGroup>,
    #[serde(default)]
    generic: Vec<DeviceGroup>,
}

impl DeviceGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All groups of one kind, in creation order.
    pub fn groups(&self, kind: DeviceKind) -> &[DeviceGroup] {
        match kind {
            DeviceKind::Keyboard => &self.keyboards,
            DeviceKind::Mouse => &self.mice,
            DeviceKind::Joystick => &self.joysticks,
            DeviceKind::Generic => &self.generic,
        }
    }

    fn groups_mut(&mut self, kind: DeviceKind) -> &mut Vec<DeviceGroup> {
        match kind {
            DeviceKind::Keyboard => &mut self.keyboards,
            DeviceKind::Mouse => &mut self.mice,
            DeviceKind::Joystick => &mut self.joysticks,
            DeviceKind::Generic => &mut self.generic,
        }
    }

    /// Total number of groups across all kinds.
    pub fn len(&self) -> usize {
        DeviceKind::ALL.iter().map(|k| self.groups(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, kind: DeviceKind, id: DeviceGroupId) -> Option<&DeviceGroup> {
        self.groups(kind).iter().find(|g| g.id == id)
    }

    fn find_mut(&mut self, kind: DeviceKind, id: DeviceGroupId) -> EngineResult<&mut DeviceGroup> {
        self.groups_mut(kind)
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| EngineError::not_found("device group", id))
    }

    /// Creates an empty group and returns its id.
    pub fn add(&mut self, kind: DeviceKind, title: impl Into<String>) -> DeviceGroupId {
        let group = DeviceGroup::new(title);
        let id = group.id;
        self.groups_mut(kind).push(group);
        id
    }

    /// Removes a group. Returns `false` (and changes nothing) if the id is unknown.
    pub fn remove(&mut self, kind: DeviceKind, id: DeviceGroupId) -> bool {
        let groups = self.groups_mut(kind);
        match groups.iter().position(|g| g.id == id) {
            Some(pos) => {
                groups.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn rename(
        &mut self,
        kind: DeviceKind,
        id: DeviceGroupId,
        title: impl Into<String>,
    ) -> EngineResult<()> {
        self.find_mut(kind, id)?.title = title.into();
        Ok(())
    }

    pub fn add_device(
        &mut self,
        kind: DeviceKind,
        id: DeviceGroupId,
        device: Device,
    ) -> EngineResult<()> {
        self.find_mut(kind, id)?.insert(device);
        Ok(())
    }

    /// Removes a member. Returns whether the device was in the group.
    pub fn remove_device(
        &mut self,
        kind: DeviceKind,
        id: DeviceGroupId,
        device: &DeviceId,
    ) -> EngineResult<bool> {
        Ok(self.find_mut(kind, id)?.remove(device))
    }

    /// Drops groups whose id already appeared earlier in the same kind.
    ///
    /// Returns the number of groups dropped. Used when re-linking a loaded document.
    pub(crate) fn dedup(&mut self) -> usize {
        let mut dropped = 0;
        for kind in DeviceKind::ALL {
            let groups = self.groups_mut(kind);
            let mut seen = std::collections::HashSet::new();
            let before = groups.len();
            groups.retain(|g| seen.insert(g.id));
            dropped += before - groups.len();
        }
        dropped
    }
}
