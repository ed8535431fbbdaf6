//! Device registry for tracking sensor readings

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::types::{Device, DeviceKey, DeviceType};

/// Registry of known devices
///
/// Not synchronized: the scheduler thread is its only owner.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceKey, Device>,
}

impl DeviceRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device, replacing any entry with the same key
    pub fn upsert(&mut self, device: Device) {
        self.devices.insert(device.key(), device);
    }

    /// Record a new reading for an existing device
    ///
    /// Returns false and leaves the registry untouched if the key is unknown
    pub fn update(&mut self, key: &DeviceKey, value: f32, now: DateTime<Utc>) -> bool {
        match self.devices.get_mut(key) {
            Some(device) => {
                device.value = value;
                device.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// Get a device by key
    #[must_use]
    pub fn get(&self, key: &DeviceKey) -> Option<&Device> {
        self.devices.get(key)
    }

    /// Snapshot of all devices, ordered by address then type
    #[must_use]
    pub fn all(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.values().cloned().collect();
        devices.sort_by_key(Device::key);
        devices
    }

    /// Value of the most recently updated device of the given type
    #[must_use]
    pub fn latest_value(&self, device_type: DeviceType) -> Option<f32> {
        self.devices
            .values()
            .filter(|d| d.device_type == device_type)
            .max_by_key(|d| (d.updated_at, d.key()))
            .map(|d| d.value)
    }

    /// Drop devices that have not reported within `ttl`
    ///
    /// Returns the number of devices removed
    pub fn sweep_stale(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let before = self.devices.len();
        self.devices.retain(|_, d| now - d.updated_at <= ttl);
        before - self.devices.len()
    }

    /// Number of known devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
