//! Advertising data parsing.
//!
//! Combustion devices broadcast their state in manufacturer-specific
//! advertising data keyed by vendor ID 0x09C7. Probes advertise their own
//! readings; MeatNet repeater nodes re-broadcast the readings of probes they
//! can reach, tagged with a hop count.

use crate::data::temperatures::{ProbeTemperatures, VirtualSensors};
use crate::error::{Error, Result};

/// Combustion Inc. BLE vendor ID.
pub const VENDOR_ID: u16 = 0x09C7;

/// Product type identifier from advertising data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProductType {
    /// Predictive Thermometer probe.
    Probe,
    /// MeatNet repeater node (display, booster, etc.).
    MeatNetNode,
    /// Unrecognized product type, raw value preserved.
    Unknown(u8),
}

impl ProductType {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Probe,
            2 => Self::MeatNetNode,
            other => Self::Unknown(other),
        }
    }

    /// Check if this is a probe.
    pub fn is_probe(&self) -> bool {
        matches!(self, Self::Probe)
    }

    /// Check if this is a repeater node.
    pub fn is_repeater(&self) -> bool {
        matches!(self, Self::MeatNetNode)
    }
}

/// Probe operational mode from advertising data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProbeMode {
    /// Normal cooking mode.
    #[default]
    Normal = 0,
    /// Instant read mode with fast updates.
    InstantRead = 1,
    /// Reserved for future use.
    Reserved = 2,
    /// Error state.
    Error = 3,
}

impl ProbeMode {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Normal,
            1 => Self::InstantRead,
            2 => Self::Reserved,
            _ => Self::Error,
        }
    }
}

/// Battery status from advertising data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryStatus {
    /// Battery is OK.
    #[default]
    Ok = 0,
    /// Battery is low.
    Low = 1,
}

impl BatteryStatus {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value & 0x01 {
            0 => Self::Ok,
            _ => Self::Low,
        }
    }

    /// Check if battery is low.
    pub fn is_low(&self) -> bool {
        matches!(self, Self::Low)
    }
}

/// Probe ID (1-8), shown on the silicone ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeId(pub u8);

impl ProbeId {
    /// Create a new ProbeId from the raw 0-indexed wire value.
    pub fn from_raw(value: u8) -> Self {
        Self((value & 0x07) + 1)
    }

    /// The raw 0-indexed value for transmission.
    pub fn to_raw(&self) -> u8 {
        self.0.saturating_sub(1) & 0x07
    }
}

impl Default for ProbeId {
    fn default() -> Self {
        Self(1)
    }
}

impl std::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Probe color (silicone ring color).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProbeColor {
    #[default]
    Yellow = 0,
    Grey = 1,
    Red = 2,
    Orange = 3,
    Blue = 4,
    Green = 5,
    Purple = 6,
    Pink = 7,
}

impl ProbeColor {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value & 0x07 {
            0 => Self::Yellow,
            1 => Self::Grey,
            2 => Self::Red,
            3 => Self::Orange,
            4 => Self::Blue,
            5 => Self::Green,
            6 => Self::Purple,
            _ => Self::Pink,
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Number of repeater hops a re-broadcast advertisement has taken.
///
/// Only present in repeater advertisements; a probe heard directly has no
/// hop count, which the arbitration logic treats as the best possible route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HopCount(pub u8);

impl HopCount {
    /// Create from an advertisement's network information byte, which
    /// carries the hop count 0-indexed in bits 6-7.
    pub fn from_advertisement(byte: u8) -> Self {
        Self(((byte >> 6) & 0x03) + 1)
    }

    /// Create from a node status message's network information byte, which
    /// carries the hop count 0-indexed in bits 0-1.
    pub fn from_network_info(byte: u8) -> Self {
        Self((byte & 0x03) + 1)
    }
}

/// Parsed advertising data from a Combustion device.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisingData {
    /// Product type (probe or repeater).
    pub product_type: ProductType,
    /// Serial number of the probe this data describes. Zero in a repeater
    /// advertisement means the repeater has no probe data to relay.
    pub serial_number: u32,
    /// Temperature readings from all 8 sensors.
    pub temperatures: ProbeTemperatures,
    /// Operational mode.
    pub mode: ProbeMode,
    /// Probe ID (1-8).
    pub probe_id: ProbeId,
    /// Probe color.
    pub color: ProbeColor,
    /// Battery status.
    pub battery_status: BatteryStatus,
    /// Virtual sensor assignments.
    pub virtual_sensors: VirtualSensors,
    /// Hop count, present only in repeater advertisements.
    pub hop_count: Option<HopCount>,
}

impl AdvertisingData {
    /// Minimum size of advertising data payload.
    const MIN_SIZE: usize = 20;

    /// Parse manufacturer-specific advertising data from raw bytes.
    ///
    /// Layout: product type (byte 0), serial number little-endian (1-4),
    /// packed temperatures (5-17), mode/color/ID (18), battery and virtual
    /// sensors (19), network information (20, optional).
    pub fn from_data(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Advertising data too short: {} bytes (need at least {})",
                    data.len(),
                    Self::MIN_SIZE
                ),
            });
        }

        let product_type = ProductType::from_raw(data[0]);
        let serial_number = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);

        // A repeater with no probe to relay advertises serial number zero;
        // the rest of the payload carries nothing usable.
        if product_type.is_repeater() && serial_number == 0 {
            return Ok(Self {
                product_type,
                serial_number,
                temperatures: ProbeTemperatures::empty(),
                mode: ProbeMode::default(),
                probe_id: ProbeId::default(),
                color: ProbeColor::default(),
                battery_status: BatteryStatus::default(),
                virtual_sensors: VirtualSensors::default(),
                hop_count: None,
            });
        }

        let temperatures = ProbeTemperatures::from_packed_bytes(&data[5..18])?;

        // Byte 18: mode in bits 0-1, color in bits 2-4, probe ID in bits 5-7.
        let mode_id_byte = data[18];
        let mode = ProbeMode::from_raw(mode_id_byte & 0x03);
        let color = ProbeColor::from_raw((mode_id_byte >> 2) & 0x07);
        let probe_id = ProbeId::from_raw((mode_id_byte >> 5) & 0x07);

        // Byte 19: battery status in bit 0, virtual sensors in bits 1-7.
        let status_byte = data[19];
        let battery_status = BatteryStatus::from_raw(status_byte & 0x01);
        let virtual_sensors = VirtualSensors::from_byte(status_byte >> 1);

        // Byte 20: network information. Repeater advertisements carry the
        // hop count here; probe advertisements have none.
        let hop_count = if product_type.is_repeater() && data.len() > 20 {
            Some(HopCount::from_advertisement(data[20]))
        } else {
            None
        };

        Ok(Self {
            product_type,
            serial_number,
            temperatures,
            mode,
            probe_id,
            color,
            battery_status,
            virtual_sensors,
            hop_count,
        })
    }

    /// Get the serial number as a formatted string.
    pub fn serial_number_string(&self) -> String {
        format!("{:08X}", self.serial_number)
    }

    /// Whether this advertisement carries usable probe data. Repeaters that
    /// are not connected to a probe advertise serial number zero.
    pub fn has_probe_data(&self) -> bool {
        self.serial_number != 0 || self.product_type.is_probe()
    }
}
