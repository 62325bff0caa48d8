//! In-memory I/O controller.
//!
//! [`VirtualIo`] implements [`IoController`] without touching any hardware. Host code (or a
//! test) injects device input with [`feed`](VirtualIo::feed) and the convenience helpers,
//! and inspects what the engine wrote to output bindings with
//! [`writes`](VirtualIo::writes).
//!
//! It also supports failure injection, which is how the activation rollback paths are
//! exercised: refusing subscriptions for a device, refusing unsubscribes, and stalling
//! unsubscribes to simulate a slow backend.
//!
//! Input may be fed from any thread. Callbacks are invoked after the internal lock is
//! released, so they are free to write outputs back through the same controller.

use crate::binding::DeviceBinding;
use crate::device::DeviceId;
use crate::error::IoError;
use crate::event::{Channel, InputKind, BUTTON_PRESSED};
use crate::io::{InputCallback, IoController, SubscriptionHandle};
use crate::profile::ProfileId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::trace;

/// One value written to an output binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputWrite {
    pub device: DeviceId,
    pub channel: Channel,
    pub value: i64,
}

struct Subscription {
    device: DeviceId,
    channel: Channel,
    callback: InputCallback,
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    subscriptions: BTreeMap<SubscriptionHandle, Subscription>,
    writes: Vec<OutputWrite>,
    profile_states: Vec<(ProfileId, bool)>,
    refused: HashSet<DeviceId>,
    fail_unsubscribe: bool,
    stall_unsubscribe: Option<Duration>,
}

/// Virtual device backend.
#[derive(Default)]
pub struct VirtualIo {
    inner: Mutex<Inner>,
}

impl VirtualIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a device-local input change. Returns how many subscribers received it.
    pub fn feed(&self, device: impl Into<DeviceId>, event: InputKind) -> usize {
        let device = device.into();
        let channel = event.channel();
        let value = event.value();

        let callbacks: Vec<InputCallback> = {
            let inner = self.inner.lock();
            inner
                .subscriptions
                .values()
                .filter(|s| s.device == device && s.channel == channel)
                .map(|s| s.callback.clone())
                .collect()
        };

        trace!(%device, %channel, value, subscribers = callbacks.len(), "virtual input");
        for cb in &callbacks {
            cb(value);
        }
        callbacks.len()
    }

    pub fn press_button(&self, device: impl Into<DeviceId>, button: u16) -> usize {
        self.feed(device, InputKind::ButtonPressed { button })
    }

    pub fn release_button(&self, device: impl Into<DeviceId>, button: u16) -> usize {
        self.feed(device, InputKind::ButtonReleased { button })
    }

    pub fn set_axis(&self, device: impl Into<DeviceId>, axis: u16, value: i64) -> usize {
        self.feed(device, InputKind::AxisMoved { axis, value })
    }

    /// Every output write so far, oldest first.
    pub fn writes(&self) -> Vec<OutputWrite> {
        self.inner.lock().writes.clone()
    }

    /// Drain recorded output writes.
    pub fn take_writes(&self) -> Vec<OutputWrite> {
        std::mem::take(&mut self.inner.lock().writes)
    }

    /// Number of live subscriptions on one channel.
    pub fn subscribers(&self, device: impl Into<DeviceId>, channel: Channel) -> usize {
        let device = device.into();
        self.inner
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.device == device && s.channel == channel)
            .count()
    }

    /// Number of live subscriptions overall.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Profile state hints received so far, oldest first.
    pub fn profile_states(&self) -> Vec<(ProfileId, bool)> {
        self.inner.lock().profile_states.clone()
    }

    /// Refuse every future subscription on `device`.
    pub fn refuse_device(&self, device: impl Into<DeviceId>) {
        self.inner.lock().refused.insert(device.into());
    }

    /// Undo [`refuse_device`](Self::refuse_device).
    pub fn accept_device(&self, device: impl Into<DeviceId>) {
        self.inner.lock().refused.remove(&device.into());
    }

    /// Make `unsubscribe` report failure (the subscription stays registered).
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.inner.lock().fail_unsubscribe = fail;
    }

    /// Delay every `unsubscribe` call by `delay`.
    pub fn stall_unsubscribe(&self, delay: Option<Duration>) {
        self.inner.lock().stall_unsubscribe = delay;
    }
}

impl IoController for VirtualIo {
    fn subscribe(
        &self,
        binding: &DeviceBinding,
        callback: InputCallback,
    ) -> Result<SubscriptionHandle, IoError> {
        let mut inner = self.inner.lock();
        if inner.refused.contains(&binding.device) {
            return Err(IoError::DeviceUnavailable(binding.device.to_string()));
        }
        let handle = SubscriptionHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.subscriptions.insert(
            handle,
            Subscription {
                device: binding.device.clone(),
                channel: binding.channel,
                callback,
            },
        );
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let stall = self.inner.lock().stall_unsubscribe;
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }
        let mut inner = self.inner.lock();
        if inner.fail_unsubscribe {
            return false;
        }
        inner.subscriptions.remove(&handle).is_some()
    }

    fn write_output(&self, binding: &DeviceBinding, value: i64) -> bool {
        self.inner.lock().writes.push(OutputWrite {
            device: binding.device.clone(),
            channel: binding.channel,
            value,
        });
        true
    }

    fn set_profile_state(&self, profile: ProfileId, active: bool) {
        self.inner.lock().profile_states.push((profile, active));
    }
}

impl OutputWrite {
    /// Whether this write is a button press.
    pub fn is_press(&self) -> bool {
        self.value == BUTTON_PRESSED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceKind;
    use crate::group::DeviceGroupId;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn button(idx: u16) -> DeviceBinding {
        DeviceBinding::input(
            DeviceKind::Joystick,
            DeviceGroupId::new_random(),
            "joy:0",
            Channel::button(idx),
        )
    }

    #[test]
    fn feed_reaches_matching_subscribers_only() {
        let io = VirtualIo::new();
        let seen = Arc::new(AtomicI64::new(-1));
        let s = Arc::clone(&seen);
        io.subscribe(&button(1), Arc::new(move |v| s.store(v, Ordering::SeqCst)))
            .unwrap();

        assert_eq!(io.press_button("joy:0", 2), 0);
        assert_eq!(seen.load(Ordering::SeqCst), -1);
        assert_eq!(io.press_button("joy:0", 1), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(io.press_button("joy:9", 1), 0);
    }

    #[test]
    fn refused_device_fails_subscription() {
        let io = VirtualIo::new();
        io.refuse_device("joy:0");
        let err = io.subscribe(&button(0), Arc::new(|_| {})).unwrap_err();
        assert_eq!(err, IoError::DeviceUnavailable("joy:0".into()));

        io.accept_device("joy:0");
        assert!(io.subscribe(&button(0), Arc::new(|_| {})).is_ok());
    }

    #[test]
    fn callbacks_may_write_back_through_the_controller() {
        let io = Arc::new(VirtualIo::new());
        let out = DeviceBinding::output(
            DeviceKind::Joystick,
            DeviceGroupId::new_random(),
            "vjoy:0",
            Channel::axis(0),
        );
        let writer = Arc::clone(&io);
        io.subscribe(
            &button(0),
            Arc::new(move |v| {
                writer.write_output(&out, v * 10);
            }),
        )
        .unwrap();

        io.press_button("joy:0", 0);
        let writes = io.take_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].value, 10);
        assert!(io.writes().is_empty());
    }

    #[test]
    fn unsubscribe_removes_subscription() {
        let io = VirtualIo::new();
        let h = io.subscribe(&button(0), Arc::new(|_| {})).unwrap();
        assert_eq!(io.subscribers("joy:0", Channel::button(0)), 1);
        assert!(io.unsubscribe(h));
        assert!(!io.unsubscribe(h));
        assert_eq!(io.subscription_count(), 0);
    }
}
