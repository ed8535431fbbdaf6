//! hearth - edge sensor concentrator with a voice assistant
//!
//! This library provides the core functionality for the hearth daemon:
//! - A UDP protocol through which sensors register and report readings
//! - An in-memory registry of the latest reading per device
//! - Microphone capture, STT, TTS and playback
//! - A keyword-driven assistant that answers with live sensor values
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  datagrams  ┌────────────────────────────────────────┐
//! │   Sensors    │────────────▶│  Listener ──▶ Registry ◀── Status      │
//! └──────────────┘◀────────────│                  ▲                     │
//!                     acks     │                  │ (scheduler thread)  │
//! ┌──────────────┐   frames    │  Capture ──▶ Interaction loop          │
//! │  Microphone  │────────────▶│  bridge          │                     │
//! └──────────────┘             └──────────────────┼─────────────────────┘
//!                                                 ▼ worker pool
//!                                      STT ─ scoring ─ TTS ─ speaker
//! ```

pub mod assistant;
pub mod config;
pub mod daemon;
pub mod devices;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod status;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use devices::{Device, DeviceKey, DeviceRegistry, DeviceType};
pub use error::{Error, Result};
pub use listener::{DeviceListener, SharedRegistry};
pub use protocol::{Ack, DecodeError, Frame};
