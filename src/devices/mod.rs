//! Device state machines: probes, repeater nodes and their shared core.

pub mod device;
pub mod node;
pub mod probe;

pub use device::{ConnectionState, DeviceCore, MIN_RSSI, STALE_TIMEOUT};
pub use node::MeatNetNode;
pub use probe::{CallbackHandle, ModelInfo, Overheating, Probe, ProbeCommand, TemperatureUpdate};
