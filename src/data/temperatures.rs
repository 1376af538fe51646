//! Probe temperature decoding.
//!
//! Each probe reports eight thermistors (T1 at the tip through T8 at the
//! handle) packed as consecutive 13-bit codes in 13 bytes. A raw code maps to
//! Celsius as `raw * 0.05 - 20.0`, giving a range of -20C to 389.75C in
//! 0.05C steps. The all-ones code 0x1FFF marks a sensor with no valid
//! reading.

use crate::error::{Error, Result};
use crate::protocol::bitfield::read_bits_le;
use crate::utils::celsius_to_fahrenheit;

/// Number of thermistors on a probe.
pub const SENSOR_COUNT: usize = 8;

/// Packed size of a full temperature block.
pub const PACKED_TEMPERATURE_BYTES: usize = 13;

/// Raw code reported by a sensor with no valid reading.
pub const RAW_TEMPERATURE_INVALID: u16 = 0x1FFF;

/// A single 13-bit raw thermistor code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawTemperature(pub u16);

impl RawTemperature {
    /// Whether this code carries a valid reading.
    pub fn is_valid(&self) -> bool {
        self.0 != RAW_TEMPERATURE_INVALID
    }

    /// Converts the raw code to degrees Celsius.
    ///
    /// Returns `None` for the invalid marker code.
    pub fn celsius(&self) -> Option<f64> {
        if self.is_valid() {
            Some(f64::from(self.0) * 0.05 - 20.0)
        } else {
            None
        }
    }

    /// Converts the raw code to degrees Fahrenheit.
    pub fn fahrenheit(&self) -> Option<f64> {
        self.celsius().map(celsius_to_fahrenheit)
    }
}

/// The eight decoded thermistor readings of one probe report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeTemperatures {
    values: [RawTemperature; SENSOR_COUNT],
}

impl ProbeTemperatures {
    /// A block with no valid readings.
    pub fn empty() -> Self {
        Self {
            values: [RawTemperature(RAW_TEMPERATURE_INVALID); SENSOR_COUNT],
        }
    }

    /// Decodes the 13-byte packed temperature block.
    ///
    /// Sensor `i` occupies bits `13 * i .. 13 * (i + 1)` in little-endian
    /// bit order.
    pub fn from_packed_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < PACKED_TEMPERATURE_BYTES {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Packed temperatures require {} bytes, got {}",
                    PACKED_TEMPERATURE_BYTES,
                    data.len()
                ),
            });
        }

        let mut values = [RawTemperature(RAW_TEMPERATURE_INVALID); SENSOR_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            *value = RawTemperature(read_bits_le(data, 13 * i, 13)? as u16);
        }

        Ok(Self { values })
    }

    /// The raw code of sensor `index` (0 = T1 at the tip).
    pub fn raw(&self, index: usize) -> RawTemperature {
        self.values[index]
    }

    /// All eight raw codes, T1 first.
    pub fn raw_values(&self) -> &[RawTemperature; SENSOR_COUNT] {
        &self.values
    }

    /// Sensor `index` in Celsius, `None` if the sensor has no valid reading.
    pub fn celsius(&self, index: usize) -> Option<f64> {
        self.values[index].celsius()
    }

    /// All eight readings in Celsius.
    pub fn values_celsius(&self) -> [Option<f64>; SENSOR_COUNT] {
        let mut out = [None; SENSOR_COUNT];
        for (i, value) in self.values.iter().enumerate() {
            out[i] = value.celsius();
        }
        out
    }
}

/// Which physical sensor the probe currently reports as the food core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VirtualCoreSensor {
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
}

impl VirtualCoreSensor {
    /// Decodes a 3-bit core selector. Values 6 and 7 are reserved and fall
    /// back to T1.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::T1,
            1 => Self::T2,
            2 => Self::T3,
            3 => Self::T4,
            4 => Self::T5,
            5 => Self::T6,
            _ => Self::T1,
        }
    }

    fn sensor_index(&self) -> usize {
        match self {
            Self::T1 => 0,
            Self::T2 => 1,
            Self::T3 => 2,
            Self::T4 => 3,
            Self::T5 => 4,
            Self::T6 => 5,
        }
    }
}

/// Which physical sensor the probe currently reports as the food surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VirtualSurfaceSensor {
    T4,
    T5,
    T6,
    T7,
}

impl VirtualSurfaceSensor {
    /// Decodes a 2-bit surface selector (offset by T4).
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x03 {
            0 => Self::T4,
            1 => Self::T5,
            2 => Self::T6,
            _ => Self::T7,
        }
    }

    fn sensor_index(&self) -> usize {
        match self {
            Self::T4 => 3,
            Self::T5 => 4,
            Self::T6 => 5,
            Self::T7 => 6,
        }
    }
}

/// Which physical sensor the probe currently reports as ambient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VirtualAmbientSensor {
    T5,
    T6,
    T7,
    T8,
}

impl VirtualAmbientSensor {
    /// Decodes a 2-bit ambient selector (offset by T5).
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x03 {
            0 => Self::T5,
            1 => Self::T6,
            2 => Self::T7,
            _ => Self::T8,
        }
    }

    fn sensor_index(&self) -> usize {
        match self {
            Self::T5 => 4,
            Self::T6 => 5,
            Self::T7 => 6,
            Self::T8 => 7,
        }
    }
}

/// The probe's current virtual sensor assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualSensors {
    pub core: VirtualCoreSensor,
    pub surface: VirtualSurfaceSensor,
    pub ambient: VirtualAmbientSensor,
}

impl VirtualSensors {
    /// Decodes the 7-bit virtual sensor field: core in bits 0-2, surface in
    /// bits 3-4, ambient in bits 5-6.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            core: VirtualCoreSensor::from_raw(byte & 0x07),
            surface: VirtualSurfaceSensor::from_raw((byte >> 3) & 0x03),
            ambient: VirtualAmbientSensor::from_raw((byte >> 5) & 0x03),
        }
    }
}

impl Default for VirtualSensors {
    fn default() -> Self {
        Self::from_byte(0)
    }
}

/// The virtual core, surface and ambient readings resolved against a
/// temperature block.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTemperatures {
    pub core_celsius: Option<f64>,
    pub surface_celsius: Option<f64>,
    pub ambient_celsius: Option<f64>,
}

impl VirtualTemperatures {
    /// Resolves the virtual sensor assignments against a set of readings.
    pub fn resolve(sensors: &VirtualSensors, temperatures: &ProbeTemperatures) -> Self {
        Self {
            core_celsius: temperatures.celsius(sensors.core.sensor_index()),
            surface_celsius: temperatures.celsius(sensors.surface.sensor_index()),
            ambient_celsius: temperatures.celsius(sensors.ambient.sensor_index()),
        }
    }
}
