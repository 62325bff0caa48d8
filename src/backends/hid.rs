//! HID device discovery.
//!
//! Lists HID top-level collections through `hidapi` and turns them into [`Device`] records
//! so the host can offer them for device groups. Nothing is opened or read here; reading
//! reports is the job of a real [`IoController`](crate::io::IoController).
//!
//! Ids are `vid:pid[:serial]` (lowercase hex), falling back to the OS path when a device
//! has no serial number. Composite devices expose one entry per collection; entries that
//! map to the same id are collapsed and the first classification wins.

use crate::device::{Device, DeviceId, DeviceKind};
use hidapi::{DeviceInfo, HidApi};
use std::collections::HashSet;
use tracing::debug;

fn device_id(info: &DeviceInfo) -> DeviceId {
    match info.serial_number().filter(|s| !s.is_empty()) {
        Some(serial) => DeviceId(format!(
            "{:04x}:{:04x}:{}",
            info.vendor_id(),
            info.product_id(),
            serial
        )),
        None => DeviceId(format!(
            "{:04x}:{:04x}@{}",
            info.vendor_id(),
            info.product_id(),
            info.path().to_string_lossy()
        )),
    }
}

/// Enumerate HID devices as engine [`Device`]s.
pub fn probe_devices(api: &HidApi) -> Vec<Device> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for info in api.device_list() {
        let id = device_id(info);
        if !seen.insert(id.clone()) {
            continue;
        }
        let kind = DeviceKind::from_hid_usage(info.usage_page(), info.usage());
        let name = info.product_string().unwrap_or("Unknown").to_string();
        debug!(%id, %kind, %name, "discovered HID device");
        found.push(Device {
            id,
            kind,
            name,
            handle: Some(info.path().to_string_lossy().into_owned()),
        });
    }

    found
}
