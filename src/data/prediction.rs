//! Prediction data types.
//!
//! The probe firmware runs a cook prediction engine and reports its state in
//! two packed 7-byte blocks: [`PredictionStatus`] inside status
//! notifications, and [`PredictionLog`] inside log records (which trade the
//! heat start temperature for the virtual sensor assignments). Both use
//! little-endian bit order.

use crate::data::temperatures::VirtualSensors;
use crate::error::{Error, Result};
use crate::protocol::bitfield::read_bits_le;

/// Packed size of a prediction block.
pub const PREDICTION_BLOCK_BYTES: usize = 7;

/// State of the probe's prediction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PredictionState {
    ProbeNotInserted,
    ProbeInserted,
    Cooking,
    Predicting,
    RemovalPredictionDone,
    /// One of the reserved state codes 5 through 14, kept verbatim.
    Reserved(u8),
    Unknown,
}

impl PredictionState {
    /// Decodes a 4-bit state field. Values 5 through 14 are reserved.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::ProbeNotInserted,
            1 => Self::ProbeInserted,
            2 => Self::Cooking,
            3 => Self::Predicting,
            4 => Self::RemovalPredictionDone,
            5..=14 => Self::Reserved(raw),
            _ => Self::Unknown,
        }
    }
}

/// Prediction mode requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PredictionMode {
    None,
    TimeToRemoval,
    RemovalAndResting,
    Reserved,
}

impl PredictionMode {
    /// Decodes a 2-bit mode field.
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x03 {
            0 => Self::None,
            1 => Self::TimeToRemoval,
            2 => Self::RemovalAndResting,
            _ => Self::Reserved,
        }
    }

    /// The 2-bit wire value, used when setting a prediction.
    pub fn to_raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::TimeToRemoval => 1,
            Self::RemovalAndResting => 2,
            Self::Reserved => 3,
        }
    }
}

/// Which phase of the cook the current prediction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PredictionType {
    None,
    Removal,
    Resting,
    Reserved,
}

impl PredictionType {
    /// Decodes a 2-bit type field.
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x03 {
            0 => Self::None,
            1 => Self::Removal,
            2 => Self::Resting,
            _ => Self::Reserved,
        }
    }
}

/// Decoded prediction block from a status notification.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictionStatus {
    pub state: PredictionState,
    pub mode: PredictionMode,
    pub prediction_type: PredictionType,
    /// Target core temperature in Celsius, 0.1C resolution.
    pub set_point_celsius: f64,
    /// Core temperature when the cook started, in Celsius.
    pub heat_start_celsius: f64,
    /// Firmware's raw estimate of seconds until the set point is reached.
    pub seconds_remaining: u32,
    /// Firmware's current core estimate in Celsius.
    pub estimated_core_celsius: f64,
}

impl PredictionStatus {
    /// Decodes the 7-byte prediction block carried in status notifications.
    ///
    /// Layout in little-endian bit order: state `[0:4]`, mode `[4:6]`, type
    /// `[6:8]`, set point `[8:18]` in 0.1C, heat start `[18:28]` in 0.1C,
    /// seconds `[28:45]`, estimated core `[45:56]` in 0.1C offset by -20C.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < PREDICTION_BLOCK_BYTES {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Prediction status requires {} bytes, got {}",
                    PREDICTION_BLOCK_BYTES,
                    data.len()
                ),
            });
        }

        Ok(Self {
            state: PredictionState::from_raw(read_bits_le(data, 0, 4)? as u8),
            mode: PredictionMode::from_raw(read_bits_le(data, 4, 2)? as u8),
            prediction_type: PredictionType::from_raw(read_bits_le(data, 6, 2)? as u8),
            set_point_celsius: read_bits_le(data, 8, 10)? as f64 * 0.1,
            heat_start_celsius: read_bits_le(data, 18, 10)? as f64 * 0.1,
            seconds_remaining: read_bits_le(data, 28, 17)? as u32,
            estimated_core_celsius: read_bits_le(data, 45, 11)? as f64 * 0.1 - 20.0,
        })
    }
}

/// Decoded prediction block from a log record.
///
/// Unlike [`PredictionStatus`] this variant carries the virtual sensor
/// assignments in its first seven bits and omits the heat start temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictionLog {
    pub virtual_sensors: VirtualSensors,
    pub state: PredictionState,
    pub mode: PredictionMode,
    pub prediction_type: PredictionType,
    pub set_point_celsius: f64,
    pub seconds_remaining: u32,
    pub estimated_core_celsius: f64,
}

impl PredictionLog {
    /// Decodes the 7-byte prediction block carried in log records.
    ///
    /// Layout in little-endian bit order: virtual sensors `[0:7]`, state
    /// `[7:11]`, mode `[11:13]`, type `[13:15]`, set point `[15:25]` in
    /// 0.1C, seconds `[25:42]`, estimated core `[42:53]` in 0.1C offset by
    /// -20C.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < PREDICTION_BLOCK_BYTES {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Prediction log requires {} bytes, got {}",
                    PREDICTION_BLOCK_BYTES,
                    data.len()
                ),
            });
        }

        Ok(Self {
            virtual_sensors: VirtualSensors::from_byte(read_bits_le(data, 0, 7)? as u8),
            state: PredictionState::from_raw(read_bits_le(data, 7, 4)? as u8),
            mode: PredictionMode::from_raw(read_bits_le(data, 11, 2)? as u8),
            prediction_type: PredictionType::from_raw(read_bits_le(data, 13, 2)? as u8),
            set_point_celsius: read_bits_le(data, 15, 10)? as f64 * 0.1,
            seconds_remaining: read_bits_le(data, 25, 17)? as u32,
            estimated_core_celsius: read_bits_le(data, 42, 11)? as f64 * 0.1 - 20.0,
        })
    }
}

/// A smoothed, display-ready view of the prediction produced by the
/// prediction engine from successive status notifications.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictionInfo {
    pub state: PredictionState,
    pub mode: PredictionMode,
    pub prediction_type: PredictionType,
    pub set_point_celsius: f64,
    pub heat_start_celsius: f64,
    /// Smoothed countdown, `None` outside an active prediction or when the
    /// raw estimate is implausibly far out.
    pub seconds_remaining: Option<u32>,
    /// Progress from heat start to set point, 0 to 100.
    pub percent_through_cook: u8,
    pub estimated_core_celsius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::temperatures::VirtualCoreSensor;

    fn pack_bits(fields: &[(usize, u32, u64)], len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        for &(offset, width, value) in fields {
            for bit in 0..width as usize {
                if value & (1 << bit) != 0 {
                    let pos = offset + bit;
                    bytes[pos / 8] |= 1 << (pos % 8);
                }
            }
        }
        bytes
    }

    #[test]
    fn test_prediction_state_from_raw() {
        assert_eq!(PredictionState::from_raw(0), PredictionState::ProbeNotInserted);
        assert_eq!(PredictionState::from_raw(3), PredictionState::Predicting);
        assert_eq!(PredictionState::from_raw(4), PredictionState::RemovalPredictionDone);
        assert_eq!(PredictionState::from_raw(5), PredictionState::Reserved(5));
        assert_eq!(PredictionState::from_raw(14), PredictionState::Reserved(14));
        assert_eq!(PredictionState::from_raw(15), PredictionState::Unknown);
    }

    #[test]
    fn test_prediction_status_decode() {
        // state = Predicting, mode = TimeToRemoval, type = Removal,
        // set point 57.0C, heat start 21.5C, 1800 s remaining,
        // estimated core 43.5C.
        let bytes = pack_bits(
            &[
                (0, 4, 3),
                (4, 2, 1),
                (6, 2, 1),
                (8, 10, 570),
                (18, 10, 215),
                (28, 17, 1800),
                (45, 11, 635),
            ],
            PREDICTION_BLOCK_BYTES,
        );

        let status = PredictionStatus::from_bytes(&bytes).unwrap();
        assert_eq!(status.state, PredictionState::Predicting);
        assert_eq!(status.mode, PredictionMode::TimeToRemoval);
        assert_eq!(status.prediction_type, PredictionType::Removal);
        assert!((status.set_point_celsius - 57.0).abs() < 1e-9);
        assert!((status.heat_start_celsius - 21.5).abs() < 1e-9);
        assert_eq!(status.seconds_remaining, 1800);
        assert!((status.estimated_core_celsius - 43.5).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_status_short_buffer() {
        assert!(PredictionStatus::from_bytes(&[0u8; 6]).is_err());
    }

    #[test]
    fn test_prediction_log_decode() {
        // virtual core = T2, state = Cooking, mode = RemovalAndResting,
        // type = Resting, set point 63.0C, 120 s, estimated core 60.0C.
        let bytes = pack_bits(
            &[
                (0, 7, 0b0000_001),
                (7, 4, 2),
                (11, 2, 2),
                (13, 2, 2),
                (15, 10, 630),
                (25, 17, 120),
                (42, 11, 800),
            ],
            PREDICTION_BLOCK_BYTES,
        );

        let log = PredictionLog::from_bytes(&bytes).unwrap();
        assert_eq!(log.virtual_sensors.core, VirtualCoreSensor::T2);
        assert_eq!(log.state, PredictionState::Cooking);
        assert_eq!(log.mode, PredictionMode::RemovalAndResting);
        assert_eq!(log.prediction_type, PredictionType::Resting);
        assert!((log.set_point_celsius - 63.0).abs() < 1e-9);
        assert_eq!(log.seconds_remaining, 120);
        assert!((log.estimated_core_celsius - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_log_max_seconds() {
        // 17-bit seconds field saturates at 131071.
        let bytes = pack_bits(&[(25, 17, 0x1FFFF)], PREDICTION_BLOCK_BYTES);
        let log = PredictionLog::from_bytes(&bytes).unwrap();
        assert_eq!(log.seconds_remaining, 131071);
    }
}
