//! Last-known state of the sensors reporting to this concentrator
//!
//! Devices are keyed by the address they talk from and the kind of reading
//! they carry, so one chip reporting through two addresses is two entries

pub mod registry;
pub mod types;

pub use registry::DeviceRegistry;
pub use types::{Device, DeviceKey, DeviceType};
