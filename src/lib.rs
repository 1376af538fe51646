// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]

//! # meatnet-ble
//!
//! A transport-agnostic Rust library for decoding and tracking Combustion
//! Inc's Predictive Thermometer probes and MeatNet repeater nodes.
//!
//! The library takes raw BLE payloads (manufacturer-data advertisements,
//! status notifications, UART frames) from whatever radio layer the caller
//! runs and turns them into live probe state: per-sensor temperatures,
//! virtual Core/Surface/Ambient readings, removal predictions, overheat
//! flags and a gap-free temperature log. Probes heard both directly and
//! through repeater nodes are deduplicated by serial number, with hop-count
//! arbitration picking the freshest source.
//!
//! Outbound traffic (log backfill, session info, identity reads) is routed
//! over the best available path through the caller-supplied
//! [`NetworkInterface`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meatnet_ble::{DeviceManager, NetworkInterface};
//!
//! # async fn run(network: Arc<dyn NetworkInterface>) {
//! let manager = DeviceManager::new(network);
//!
//! // Feed manufacturer data from the radio as it arrives.
//! let identifier = uuid::Uuid::new_v4();
//! let data: &[u8] = &[];
//! manager.process_advertisement(identifier, data, Some(-60));
//!
//! for probe in manager.probes() {
//!     println!("Found probe: {}", probe.serial_number_string());
//!
//!     if let Some(virtual_temps) = probe.virtual_temperatures() {
//!         if let Some(core) = virtual_temps.core_celsius {
//!             println!("  Core temperature: {core:.1}°C");
//!         }
//!     }
//! }
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod data;
pub mod device_manager;
pub mod devices;
pub mod error;
pub mod message_handlers;
pub mod prediction_manager;
pub mod protocol;
pub mod transport;
pub mod utils;

// Re-exports for convenience
pub use device_manager::DeviceManager;
pub use devices::{CallbackHandle, ConnectionState, MeatNetNode, Overheating, Probe};
pub use error::{Error, Result};
pub use prediction_manager::PredictionManager;
pub use transport::NetworkInterface;
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

// Re-export commonly used types from submodules
pub use data::{
    InstantReadFilter, LoggedProbeDataPoint, PredictionInfo, PredictionLog, PredictionMode,
    PredictionState, PredictionType, ProbeTemperatureLog, ProbeTemperatures, RawTemperature,
    SessionInformation, VirtualSensors, VirtualTemperatures,
};
pub use protocol::advertising::{
    AdvertisingData, BatteryStatus, HopCount, ProbeColor, ProbeId, ProbeMode, ProductType,
};
pub use protocol::status::ProbeStatus;
