//! Rainforest EMU-2 to MQTT bridge
//!
//! Polls the latest readings reported by a serial-attached EMU-2 energy
//! monitor (instantaneous demand, cumulative summation delivered, price)
//! and republishes each as an MQTT message, de-duplicated by the device's
//! reading timestamp so unchanged values are not resent.

pub mod cli;
pub mod config;
pub mod devices;
pub mod output;
pub mod readings;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use devices::{EmuDevice, ReadingSource};
pub use output::{ConnectionState, MqttPublisher, Publisher};
pub use readings::{OutboundMessage, Reading, ReadingKind};
pub use services::{LifecycleController, ReadingReconciler};
pub use utils::error::BridgeError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
