//! BLE transport abstraction.
//!
//! The state tracking layers never talk to a BLE stack directly; they are
//! handed a [`NetworkInterface`] and feed it connection requests and UART
//! writes. Inbound traffic (advertisements, status notifications, UART
//! notifications) flows the other way through [`crate::DeviceManager`]'s
//! `process_*` methods, so the trait only covers the outbound surface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Firmware Revision String characteristic of the Device Information
/// service.
pub const FIRMWARE_REVISION_UUID: Uuid =
    Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);

/// Hardware Revision String characteristic of the Device Information
/// service.
pub const HARDWARE_REVISION_UUID: Uuid =
    Uuid::from_u128(0x0000_2a27_0000_1000_8000_00805f9b34fb);

/// Model Number String characteristic of the Device Information service.
pub const MODEL_NUMBER_UUID: Uuid =
    Uuid::from_u128(0x0000_2a24_0000_1000_8000_00805f9b34fb);

/// Outbound BLE operations required by the device layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkInterface: Send + Sync {
    /// Initiate a connection to a peripheral.
    async fn connect(&self, identifier: Uuid) -> Result<()>;

    /// Tear down an existing connection.
    async fn disconnect(&self, identifier: Uuid) -> Result<()>;

    /// Write a framed message to the peripheral's UART characteristic.
    async fn send_uart_data(&self, identifier: Uuid, data: Vec<u8>) -> Result<()>;

    /// Read a GATT characteristic of a connected peripheral.
    async fn read_characteristic(&self, identifier: Uuid, characteristic: Uuid)
        -> Result<Vec<u8>>;
}
