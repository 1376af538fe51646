//! Direct UART message framing.
//!
//! Messages exchanged with a directly connected probe over its UART service.
//! Every frame starts with the sync bytes 0xCA 0xFE followed by a big-endian
//! CRC-16/CCITT-FALSE. Requests carry message type and payload length;
//! responses additionally carry a success flag and set the high bit of the
//! message type.
//!
//! A single notification may carry several back-to-back response frames;
//! [`Response::responses_from_data`] walks them in order and stops at the
//! first frame that fails to parse.

use crate::data::prediction::{PredictionLog, PredictionMode};
use crate::data::temperatures::ProbeTemperatures;
use crate::error::{Error, Result};
use crate::protocol::advertising::{ProbeColor, ProbeId};
use crate::protocol::crc::{calculate_crc, verify_crc};

/// UART frame sync bytes.
pub const SYNC_BYTES: [u8; 2] = [0xCA, 0xFE];

/// Bit set in the message type of response frames.
pub const RESPONSE_FLAG: u8 = 0x80;

const REQUEST_HEADER_SIZE: usize = 6;
const RESPONSE_HEADER_SIZE: usize = 7;

/// Message types of the direct probe UART service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    SetProbeId = 0x01,
    SetProbeColor = 0x02,
    ReadSessionInfo = 0x03,
    ReadLogs = 0x04,
    SetPrediction = 0x05,
    ReadOverTemperature = 0x06,
}

impl MessageType {
    /// Create from a raw type byte with the response flag stripped.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value & !RESPONSE_FLAG {
            0x01 => Ok(Self::SetProbeId),
            0x02 => Ok(Self::SetProbeColor),
            0x03 => Ok(Self::ReadSessionInfo),
            0x04 => Ok(Self::ReadLogs),
            0x05 => Ok(Self::SetPrediction),
            0x06 => Ok(Self::ReadOverTemperature),
            _ => Err(Error::UnknownMessageType { raw: value }),
        }
    }
}

/// A direct UART request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Request {
    /// Create a request with the given payload.
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Serialize to wire format: sync, CRC big-endian, type, length, payload.
    /// The CRC covers type, length and payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(2 + self.payload.len());
        body.push(self.message_type as u8);
        body.push(self.payload.len() as u8);
        body.extend_from_slice(&self.payload);

        let crc = calculate_crc(&body);

        let mut frame = Vec::with_capacity(REQUEST_HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&SYNC_BYTES);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Parse a request frame, returning the request and its total frame size.
    pub fn from_data(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < REQUEST_HEADER_SIZE {
            return Err(Error::MalformedPayload {
                context: "Request frame shorter than header".into(),
            });
        }
        if data[0..2] != SYNC_BYTES {
            return Err(Error::MalformedPayload {
                context: format!("Bad sync bytes: {:02X} {:02X}", data[0], data[1]),
            });
        }
        if data[4] & RESPONSE_FLAG != 0 {
            return Err(Error::MalformedPayload {
                context: "Response flag set in request frame".into(),
            });
        }

        let message_type = MessageType::from_raw(data[4])?;
        let payload_length = data[5] as usize;
        let total = REQUEST_HEADER_SIZE + payload_length;
        if data.len() < total {
            return Err(Error::MalformedPayload {
                context: "Request frame truncated".into(),
            });
        }

        let expected = u16::from_be_bytes([data[2], data[3]]);
        if !verify_crc(&data[4..total], expected) {
            return Err(Error::CrcMismatch {
                expected,
                actual: calculate_crc(&data[4..total]),
            });
        }

        Ok((
            Self {
                message_type,
                payload: data[REQUEST_HEADER_SIZE..total].to_vec(),
            },
            total,
        ))
    }
}

/// A direct UART response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message_type: MessageType,
    pub success: bool,
    pub payload: Vec<u8>,
}

impl Response {
    /// Parse a response frame, returning the response and its total frame
    /// size. The CRC covers type, success flag, length and payload.
    pub fn from_data(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < RESPONSE_HEADER_SIZE {
            return Err(Error::MalformedPayload {
                context: "Response frame shorter than header".into(),
            });
        }
        if data[0..2] != SYNC_BYTES {
            return Err(Error::MalformedPayload {
                context: format!("Bad sync bytes: {:02X} {:02X}", data[0], data[1]),
            });
        }
        if data[4] & RESPONSE_FLAG == 0 {
            return Err(Error::MalformedPayload {
                context: "Response flag missing in response frame".into(),
            });
        }

        let message_type = MessageType::from_raw(data[4])?;
        let success = data[5] != 0;
        let payload_length = data[6] as usize;
        let total = RESPONSE_HEADER_SIZE + payload_length;
        if data.len() < total {
            return Err(Error::MalformedPayload {
                context: "Response frame truncated".into(),
            });
        }

        let expected = u16::from_be_bytes([data[2], data[3]]);
        if !verify_crc(&data[4..total], expected) {
            return Err(Error::CrcMismatch {
                expected,
                actual: calculate_crc(&data[4..total]),
            });
        }

        Ok((
            Self {
                message_type,
                success,
                payload: data[RESPONSE_HEADER_SIZE..total].to_vec(),
            },
            total,
        ))
    }

    /// Serialize to wire format. Used by tests and by node firmware
    /// emulation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(3 + self.payload.len());
        body.push(self.message_type as u8 | RESPONSE_FLAG);
        body.push(self.success as u8);
        body.push(self.payload.len() as u8);
        body.extend_from_slice(&self.payload);

        let crc = calculate_crc(&body);

        let mut frame = Vec::with_capacity(RESPONSE_HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&SYNC_BYTES);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Split a notification into consecutive response frames.
    ///
    /// Stops at the first frame that fails to parse; trailing garbage is
    /// dropped rather than rescanned for a later sync.
    pub fn responses_from_data(data: &[u8]) -> Vec<Response> {
        let mut responses = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match Self::from_data(&data[offset..]) {
                Ok((response, size)) => {
                    responses.push(response);
                    offset += size;
                }
                Err(_) => break,
            }
        }

        responses
    }
}

/// Request the probe's current session information.
pub fn session_info_request() -> Request {
    Request::new(MessageType::ReadSessionInfo, Vec::new())
}

/// Session information returned by [`MessageType::ReadSessionInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfoResponse {
    pub session_id: u32,
    pub sample_period_ms: u16,
}

impl SessionInfoResponse {
    /// Parse the response payload: session ID little-endian followed by the
    /// sample period in milliseconds. Returns `None` for short payloads,
    /// which some firmware revisions send for failed reads.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < 6 {
            return None;
        }
        Some(Self {
            session_id: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            sample_period_ms: u16::from_le_bytes([payload[4], payload[5]]),
        })
    }
}

/// Request log records in an inclusive sequence number range.
pub fn log_request(min_sequence: u32, max_sequence: u32) -> Request {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&min_sequence.to_le_bytes());
    payload.extend_from_slice(&max_sequence.to_le_bytes());
    Request::new(MessageType::ReadLogs, payload)
}

/// A single log record returned by [`MessageType::ReadLogs`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogResponse {
    pub sequence_number: u32,
    pub temperatures: ProbeTemperatures,
    pub prediction_log: PredictionLog,
}

impl LogResponse {
    const PAYLOAD_SIZE: usize = 24;

    /// Parse the response payload: sequence little-endian, 13 packed
    /// temperature bytes, 7-byte prediction log.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::PAYLOAD_SIZE {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Log response payload too short: {} bytes",
                    payload.len()
                ),
            });
        }

        Ok(Self {
            sequence_number: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            temperatures: ProbeTemperatures::from_packed_bytes(&payload[4..17])?,
            prediction_log: PredictionLog::from_bytes(&payload[17..24])?,
        })
    }
}

/// Set the probe's displayed ID.
pub fn set_probe_id_request(probe_id: ProbeId) -> Request {
    Request::new(MessageType::SetProbeId, vec![probe_id.to_raw()])
}

/// Set the probe's color assignment.
pub fn set_probe_color_request(color: ProbeColor) -> Request {
    Request::new(MessageType::SetProbeColor, vec![color.to_raw()])
}

/// Configure the prediction engine with a removal set point.
///
/// The payload packs the set point in 0.1C steps into the low 10 bits and
/// the prediction mode into bits 10-11, little-endian.
pub fn set_prediction_request(set_point_celsius: f64, mode: PredictionMode) -> Request {
    let raw_set_point = ((set_point_celsius / 0.1).round() as u16) & 0x03FF;
    let packed = (u16::from(mode.to_raw()) << 10) | raw_set_point;
    Request::new(MessageType::SetPrediction, packed.to_le_bytes().to_vec())
}

/// Read the probe's over-temperature flag.
pub fn read_over_temperature_request() -> Request {
    Request::new(MessageType::ReadOverTemperature, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_round_trip() {
        let request = log_request(10, 42);
        let bytes = request.to_bytes();

        assert_eq!(bytes[0..2], SYNC_BYTES);
        assert_eq!(bytes[4], MessageType::ReadLogs as u8);
        assert_eq!(bytes[5], 8);
        assert_eq!(&bytes[6..10], &10u32.to_le_bytes());
        assert_eq!(&bytes[10..14], &42u32.to_le_bytes());

        let (parsed, size) = Request::from_data(&bytes).unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_request_bad_sync() {
        let mut bytes = session_info_request().to_bytes();
        bytes[0] = 0xDE;
        assert!(Request::from_data(&bytes).is_err());
    }

    #[test]
    fn test_request_bad_crc() {
        let mut bytes = log_request(0, 5).to_bytes();
        bytes[6] ^= 0xFF;
        assert!(matches!(
            Request::from_data(&bytes),
            Err(Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_response_round_trip() {
        let response = Response {
            message_type: MessageType::ReadSessionInfo,
            success: true,
            payload: vec![0x01, 0x02, 0x03, 0x04, 0x10, 0x27],
        };
        let bytes = response.to_bytes();
        assert_eq!(bytes[4], MessageType::ReadSessionInfo as u8 | RESPONSE_FLAG);

        let (parsed, size) = Response::from_data(&bytes).unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response_rejects_request_frame() {
        let bytes = session_info_request().to_bytes();
        assert!(Response::from_data(&bytes).is_err());
    }

    #[test]
    fn test_responses_from_data_multiple() {
        let first = Response {
            message_type: MessageType::ReadLogs,
            success: true,
            payload: vec![0u8; 24],
        };
        let second = Response {
            message_type: MessageType::SetProbeId,
            success: false,
            payload: Vec::new(),
        };

        let mut data = first.to_bytes();
        data.extend_from_slice(&second.to_bytes());

        let parsed = Response::responses_from_data(&data);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], first);
        assert_eq!(parsed[1], second);
    }

    #[test]
    fn test_responses_from_data_stops_on_garbage() {
        let first = Response {
            message_type: MessageType::SetProbeColor,
            success: true,
            payload: Vec::new(),
        };
        let mut data = first.to_bytes();
        data.extend_from_slice(&[0x00, 0x11, 0x22]);

        let parsed = Response::responses_from_data(&data);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_session_info_response() {
        let info = SessionInfoResponse::from_payload(&[0x01, 0x02, 0x03, 0x04, 0xE8, 0x03]).unwrap();
        assert_eq!(info.session_id, 0x04030201);
        assert_eq!(info.sample_period_ms, 1000);

        assert!(SessionInfoResponse::from_payload(&[0x01, 0x02]).is_none());
    }

    #[test]
    fn test_log_response_payload() {
        let mut payload = vec![0u8; 24];
        payload[0..4].copy_from_slice(&77u32.to_le_bytes());
        let log = LogResponse::from_payload(&payload).unwrap();
        assert_eq!(log.sequence_number, 77);

        assert!(LogResponse::from_payload(&payload[..23]).is_err());
    }

    #[test]
    fn test_set_prediction_request_packing() {
        let request = set_prediction_request(57.0, PredictionMode::TimeToRemoval);
        let packed = u16::from_le_bytes([request.payload[0], request.payload[1]]);
        assert_eq!(packed & 0x03FF, 570);
        assert_eq!(packed >> 10, 1);
    }

    #[test]
    fn test_set_probe_id_request() {
        let request = set_probe_id_request(ProbeId(4));
        assert_eq!(request.payload, vec![3]);
    }
}
