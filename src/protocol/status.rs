//! Probe status notification parsing.
//!
//! When connected, the probe pushes a status record over its UART service
//! roughly every five seconds. It mirrors the advertisement payload but adds
//! the logged sequence number range and the full prediction block.

use crate::data::prediction::PredictionStatus;
use crate::data::temperatures::{ProbeTemperatures, VirtualSensors};
use crate::error::{Error, Result};
use crate::protocol::advertising::{BatteryStatus, ProbeColor, ProbeId, ProbeMode};

/// Decoded probe status notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeStatus {
    /// Oldest sequence number still held in the probe's log.
    pub min_sequence_number: u32,
    /// Newest logged sequence number.
    pub max_sequence_number: u32,
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
    /// Current prediction engine state.
    pub prediction_status: PredictionStatus,
}

impl ProbeStatus {
    /// Minimum size of a status record.
    pub const MIN_SIZE: usize = 30;

    /// Parse a status record from raw bytes.
    ///
    /// Layout: min sequence big-endian (bytes 0-3), max sequence big-endian
    /// (4-7), packed temperatures (8-20), mode/color/ID (21), battery and
    /// virtual sensors (22), prediction block (23-29).
    pub fn from_data(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Probe status too short: {} bytes (need at least {})",
                    data.len(),
                    Self::MIN_SIZE
                ),
            });
        }

        let min_sequence_number = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let max_sequence_number = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let temperatures = ProbeTemperatures::from_packed_bytes(&data[8..21])?;

        let mode_id_byte = data[21];
        let mode = ProbeMode::from_raw(mode_id_byte & 0x03);
        let color = ProbeColor::from_raw((mode_id_byte >> 2) & 0x07);
        let probe_id = ProbeId::from_raw((mode_id_byte >> 5) & 0x07);

        let status_byte = data[22];
        let battery_status = BatteryStatus::from_raw(status_byte & 0x01);
        let virtual_sensors = VirtualSensors::from_byte(status_byte >> 1);

        let prediction_status = PredictionStatus::from_bytes(&data[23..30])?;

        Ok(Self {
            min_sequence_number,
            max_sequence_number,
            temperatures,
            mode,
            probe_id,
            color,
            battery_status,
            virtual_sensors,
            prediction_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::prediction::{PredictionMode, PredictionState, PredictionType};
    use crate::data::temperatures::VirtualCoreSensor;

    fn base_status() -> Vec<u8> {
        let mut data = vec![0u8; ProbeStatus::MIN_SIZE];
        // min = 5, max = 250, big-endian.
        data[3] = 5;
        data[6] = 0;
        data[7] = 250;
        data
    }

    #[test]
    fn test_sequence_numbers_big_endian() {
        let mut data = base_status();
        data[0..4].copy_from_slice(&[0x00, 0x01, 0x02, 0x03]);
        data[4..8].copy_from_slice(&[0x00, 0x01, 0x02, 0x04]);

        let status = ProbeStatus::from_data(&data).unwrap();
        assert_eq!(status.min_sequence_number, 0x00010203);
        assert_eq!(status.max_sequence_number, 0x00010204);
    }

    #[test]
    fn test_mode_and_identity() {
        let mut data = base_status();
        // Mode = InstantRead, color = Blue, ID = 7.
        data[21] = 0b110_100_01;
        // Low battery, core = T2.
        data[22] = 0b0000_001_1;

        let status = ProbeStatus::from_data(&data).unwrap();
        assert_eq!(status.mode, ProbeMode::InstantRead);
        assert_eq!(status.color, ProbeColor::Blue);
        assert_eq!(status.probe_id.0, 7);
        assert_eq!(status.battery_status, BatteryStatus::Low);
        assert_eq!(status.virtual_sensors.core, VirtualCoreSensor::T2);
    }

    #[test]
    fn test_prediction_block() {
        let mut data = base_status();
        // State = Predicting (3), mode = TimeToRemoval (1), type = Removal (1).
        data[23] = 0b01_01_0011;

        let status = ProbeStatus::from_data(&data).unwrap();
        assert_eq!(status.prediction_status.state, PredictionState::Predicting);
        assert_eq!(status.prediction_status.mode, PredictionMode::TimeToRemoval);
        assert_eq!(status.prediction_status.prediction_type, PredictionType::Removal);
    }

    #[test]
    fn test_too_short() {
        assert!(ProbeStatus::from_data(&[0u8; 29]).is_err());
    }
}
