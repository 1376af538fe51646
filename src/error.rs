//! Error types for the meatnet-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A payload was too short or a bit-field read ran past the buffer.
    #[error("Malformed payload: {context}")]
    MalformedPayload {
        /// Description of what was malformed about the data.
        context: String,
    },

    /// CRC check failed for a UART frame.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// The expected CRC value.
        expected: u16,
        /// The actual CRC value received.
        actual: u16,
    },

    /// A frame carried a message type this crate does not know.
    #[error("Unknown message type: {raw:#04x}")]
    UnknownMessageType {
        /// The raw type byte.
        raw: u8,
    },

    /// Operation requires a connection but the device is not connected.
    /// Returned by [`crate::NetworkInterface`] implementations.
    #[error("Device not connected")]
    NotConnected,

    /// No route (direct or via a repeater node) exists to a probe.
    #[error("No route to probe {serial_number:08X}")]
    NoRouteToProbe {
        /// Serial number of the unreachable probe.
        serial_number: u32,
    },

    /// The underlying transport reported a failure. Returned by
    /// [`crate::NetworkInterface`] implementations.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
