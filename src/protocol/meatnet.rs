//! MeatNet node UART message framing.
//!
//! Repeater nodes speak a wider framing than the direct probe service: every
//! request carries a random 32-bit request ID so responses can be correlated
//! across the mesh, and nodes push unsolicited requests of their own (probe
//! status relays, heartbeats, topology events). A notification therefore
//! holds a mix of request and response frames back to back;
//! [`NodeMessage::messages_from_data`] walks them in order.

use uuid::Uuid;

use crate::data::prediction::PredictionLog;
use crate::data::temperatures::ProbeTemperatures;
use crate::error::{Error, Result};
use crate::protocol::advertising::HopCount;
use crate::protocol::crc::{calculate_crc, verify_crc};
use crate::protocol::status::ProbeStatus;
use crate::protocol::uart::{RESPONSE_FLAG, SYNC_BYTES};

const NODE_REQUEST_HEADER_SIZE: usize = 10;
const NODE_RESPONSE_HEADER_SIZE: usize = 15;

/// Message types of the MeatNet node UART service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeMessageType {
    SetProbeId = 0x01,
    SetProbeColor = 0x02,
    ReadSessionInfo = 0x03,
    Log = 0x04,
    SetPrediction = 0x05,
    ReadOverTemperature = 0x06,
    Connected = 0x40,
    Disconnected = 0x41,
    ReadNodeList = 0x42,
    ReadNetworkTopology = 0x43,
    ProbeSessionChanged = 0x44,
    ProbeStatus = 0x45,
    ProbeFirmwareRevision = 0x46,
    ProbeHardwareRevision = 0x47,
    ProbeModelInformation = 0x48,
    Heartbeat = 0x49,
}

impl NodeMessageType {
    /// Create from a raw type byte with the response flag stripped.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value & !RESPONSE_FLAG {
            0x01 => Ok(Self::SetProbeId),
            0x02 => Ok(Self::SetProbeColor),
            0x03 => Ok(Self::ReadSessionInfo),
            0x04 => Ok(Self::Log),
            0x05 => Ok(Self::SetPrediction),
            0x06 => Ok(Self::ReadOverTemperature),
            0x40 => Ok(Self::Connected),
            0x41 => Ok(Self::Disconnected),
            0x42 => Ok(Self::ReadNodeList),
            0x43 => Ok(Self::ReadNetworkTopology),
            0x44 => Ok(Self::ProbeSessionChanged),
            0x45 => Ok(Self::ProbeStatus),
            0x46 => Ok(Self::ProbeFirmwareRevision),
            0x47 => Ok(Self::ProbeHardwareRevision),
            0x48 => Ok(Self::ProbeModelInformation),
            0x49 => Ok(Self::Heartbeat),
            _ => Err(Error::UnknownMessageType { raw: value }),
        }
    }
}

/// A MeatNet node request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRequest {
    pub message_type: NodeMessageType,
    pub request_id: u32,
    pub payload: Vec<u8>,
}

impl NodeRequest {
    /// Create a request with a freshly generated request ID.
    pub fn new(message_type: NodeMessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            request_id: Uuid::new_v4().as_u128() as u32,
            payload,
        }
    }

    /// Serialize to wire format: sync, CRC big-endian, type, request ID
    /// big-endian, length, payload. The CRC covers everything after itself.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(6 + self.payload.len());
        body.push(self.message_type as u8);
        body.extend_from_slice(&self.request_id.to_be_bytes());
        body.push(self.payload.len() as u8);
        body.extend_from_slice(&self.payload);

        let crc = calculate_crc(&body);

        let mut frame = Vec::with_capacity(NODE_REQUEST_HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&SYNC_BYTES);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Parse a request frame, returning the request and its total frame size.
    pub fn from_data(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < NODE_REQUEST_HEADER_SIZE {
            return Err(Error::MalformedPayload {
                context: "Node request frame shorter than header".into(),
            });
        }
        if data[0..2] != SYNC_BYTES {
            return Err(Error::MalformedPayload {
                context: format!("Bad sync bytes: {:02X} {:02X}", data[0], data[1]),
            });
        }
        if data[4] & RESPONSE_FLAG != 0 {
            return Err(Error::MalformedPayload {
                context: "Response flag set in node request frame".into(),
            });
        }

        let message_type = NodeMessageType::from_raw(data[4])?;
        let request_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
        let payload_length = data[9] as usize;
        let total = NODE_REQUEST_HEADER_SIZE + payload_length;
        if data.len() < total {
            return Err(Error::MalformedPayload {
                context: "Node request frame truncated".into(),
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
                request_id,
                payload: data[NODE_REQUEST_HEADER_SIZE..total].to_vec(),
            },
            total,
        ))
    }
}

/// A MeatNet node response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResponse {
    pub message_type: NodeMessageType,
    /// ID of the request this answers.
    pub request_id: u32,
    /// ID assigned to this response by the responding node.
    pub response_id: u32,
    pub success: bool,
    pub payload: Vec<u8>,
}

impl NodeResponse {
    /// Parse a response frame, returning the response and its total frame
    /// size.
    pub fn from_data(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < NODE_RESPONSE_HEADER_SIZE {
            return Err(Error::MalformedPayload {
                context: "Node response frame shorter than header".into(),
            });
        }
        if data[0..2] != SYNC_BYTES {
            return Err(Error::MalformedPayload {
                context: format!("Bad sync bytes: {:02X} {:02X}", data[0], data[1]),
            });
        }
        if data[4] & RESPONSE_FLAG == 0 {
            return Err(Error::MalformedPayload {
                context: "Response flag missing in node response frame".into(),
            });
        }

        let message_type = NodeMessageType::from_raw(data[4])?;
        let request_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
        let response_id = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
        let success = data[13] != 0;
        let payload_length = data[14] as usize;
        let total = NODE_RESPONSE_HEADER_SIZE + payload_length;
        if data.len() < total {
            return Err(Error::MalformedPayload {
                context: "Node response frame truncated".into(),
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
                request_id,
                response_id,
                success,
                payload: data[NODE_RESPONSE_HEADER_SIZE..total].to_vec(),
            },
            total,
        ))
    }

    /// Serialize to wire format. Used by tests and by node firmware
    /// emulation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(11 + self.payload.len());
        body.push(self.message_type as u8 | RESPONSE_FLAG);
        body.extend_from_slice(&self.request_id.to_be_bytes());
        body.extend_from_slice(&self.response_id.to_be_bytes());
        body.push(self.success as u8);
        body.push(self.payload.len() as u8);
        body.extend_from_slice(&self.payload);

        let crc = calculate_crc(&body);

        let mut frame = Vec::with_capacity(NODE_RESPONSE_HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&SYNC_BYTES);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }
}

/// A frame pulled out of a node notification.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeMessage {
    Request(NodeRequest),
    Response(NodeResponse),
}

impl NodeMessage {
    /// Split a notification into consecutive frames, responses tried first
    /// at each position. Stops at the first position that parses as neither.
    pub fn messages_from_data(data: &[u8]) -> Vec<NodeMessage> {
        let mut messages = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if let Ok((response, size)) = NodeResponse::from_data(&data[offset..]) {
                messages.push(NodeMessage::Response(response));
                offset += size;
            } else if let Ok((request, size)) = NodeRequest::from_data(&data[offset..]) {
                messages.push(NodeMessage::Request(request));
                offset += size;
            } else {
                break;
            }
        }

        messages
    }
}

/// Request log records for a probe anywhere on the mesh.
pub fn node_read_logs_request(serial_number: u32, min_sequence: u32, max_sequence: u32) -> NodeRequest {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&serial_number.to_be_bytes());
    payload.extend_from_slice(&min_sequence.to_be_bytes());
    payload.extend_from_slice(&max_sequence.to_be_bytes());
    NodeRequest::new(NodeMessageType::Log, payload)
}

/// Request session information for a probe anywhere on the mesh.
pub fn node_read_session_info_request(serial_number: u32) -> NodeRequest {
    NodeRequest::new(
        NodeMessageType::ReadSessionInfo,
        serial_number.to_le_bytes().to_vec(),
    )
}

/// A log record relayed through a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLogResponse {
    pub probe_serial_number: u32,
    pub sequence_number: u32,
    pub temperatures: ProbeTemperatures,
    pub prediction_log: PredictionLog,
}

impl NodeLogResponse {
    const MIN_PAYLOAD_SIZE: usize = 28;

    /// Parse a [`NodeMessageType::Log`] response payload: probe serial
    /// big-endian, sequence big-endian, 13 packed temperature bytes, 7-byte
    /// prediction log.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::MIN_PAYLOAD_SIZE {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Node log response payload too short: {} bytes",
                    payload.len()
                ),
            });
        }

        Ok(Self {
            probe_serial_number: u32::from_be_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]),
            sequence_number: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
            temperatures: ProbeTemperatures::from_packed_bytes(&payload[8..21])?,
            prediction_log: PredictionLog::from_bytes(&payload[21..28])?,
        })
    }
}

/// Session information relayed through a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSessionInfoResponse {
    pub probe_serial_number: u32,
    pub session_id: u32,
    pub sample_period_ms: u16,
}

impl NodeSessionInfoResponse {
    const MIN_PAYLOAD_SIZE: usize = 10;

    /// Parse a [`NodeMessageType::ReadSessionInfo`] response payload: probe
    /// serial, session ID and sample period, all little-endian.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::MIN_PAYLOAD_SIZE {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Node session info payload too short: {} bytes",
                    payload.len()
                ),
            });
        }

        Ok(Self {
            probe_serial_number: u32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]),
            session_id: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            sample_period_ms: u16::from_le_bytes([payload[8], payload[9]]),
        })
    }
}

/// A probe status relayed by a node, pushed as an unsolicited
/// [`NodeMessageType::ProbeStatus`] request.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeProbeStatus {
    pub probe_serial_number: u32,
    pub status: ProbeStatus,
    pub hop_count: HopCount,
}

impl NodeProbeStatus {
    const MIN_PAYLOAD_SIZE: usize = 35;

    /// Parse the request payload: probe serial little-endian, 30-byte status
    /// record, network information byte with the hop count in bits 0-1.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::MIN_PAYLOAD_SIZE {
            return Err(Error::MalformedPayload {
                context: format!(
                    "Node probe status payload too short: {} bytes",
                    payload.len()
                ),
            });
        }

        Ok(Self {
            probe_serial_number: u32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]),
            status: ProbeStatus::from_data(&payload[4..34])?,
            hop_count: HopCount::from_network_info(payload[34]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_node_request_round_trip() {
        let request = node_read_logs_request(0x12345678, 1, 100);
        let bytes = request.to_bytes();

        assert_eq!(bytes[0..2], SYNC_BYTES);
        assert_eq!(bytes[4], NodeMessageType::Log as u8);
        assert_eq!(bytes[9], 12);
        assert_eq!(&bytes[10..14], &0x12345678u32.to_be_bytes());

        let (parsed, size) = NodeRequest::from_data(&bytes).unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_node_request_ids_differ() {
        let a = node_read_session_info_request(1);
        let b = node_read_session_info_request(1);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_node_response_round_trip() {
        let response = NodeResponse {
            message_type: NodeMessageType::ReadSessionInfo,
            request_id: 0xAABBCCDD,
            response_id: 0x11223344,
            success: true,
            payload: vec![0u8; 10],
        };
        let bytes = response.to_bytes();

        let (parsed, size) = NodeResponse::from_data(&bytes).unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_node_response_bad_crc() {
        let mut bytes = NodeResponse {
            message_type: NodeMessageType::Log,
            request_id: 1,
            response_id: 2,
            success: true,
            payload: vec![0u8; 28],
        }
        .to_bytes();
        bytes[20] ^= 0xFF;

        assert!(matches!(
            NodeResponse::from_data(&bytes),
            Err(Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_messages_from_data_mixed() {
        // A response followed by an unsolicited probe status request.
        let response = NodeResponse {
            message_type: NodeMessageType::SetProbeId,
            request_id: 7,
            response_id: 8,
            success: true,
            payload: Vec::new(),
        };
        let request = NodeRequest::new(NodeMessageType::ProbeStatus, vec![0u8; 35]);

        let mut data = response.to_bytes();
        data.extend_from_slice(&request.to_bytes());

        let messages = NodeMessage::messages_from_data(&data);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], NodeMessage::Response(response));
        assert_eq!(messages[1], NodeMessage::Request(request));
    }

    #[test]
    fn test_messages_from_data_stops_on_garbage() {
        let request = NodeRequest::new(NodeMessageType::Heartbeat, Vec::new());
        let mut data = request.to_bytes();
        data.extend_from_slice(&[0xCA, 0xFE, 0x00]);

        let messages = NodeMessage::messages_from_data(&data);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_node_log_response_payload() {
        let mut payload = vec![0u8; 28];
        payload[0..4].copy_from_slice(&0x00C0FFEEu32.to_be_bytes());
        payload[4..8].copy_from_slice(&512u32.to_be_bytes());

        let log = NodeLogResponse::from_payload(&payload).unwrap();
        assert_eq!(log.probe_serial_number, 0x00C0FFEE);
        assert_eq!(log.sequence_number, 512);

        assert!(NodeLogResponse::from_payload(&payload[..27]).is_err());
    }

    #[test]
    fn test_node_session_info_payload() {
        let mut payload = vec![0u8; 10];
        payload[0..4].copy_from_slice(&0x12345678u32.to_le_bytes());
        payload[4..8].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        payload[8..10].copy_from_slice(&5000u16.to_le_bytes());

        let info = NodeSessionInfoResponse::from_payload(&payload).unwrap();
        assert_eq!(info.probe_serial_number, 0x12345678);
        assert_eq!(info.session_id, 0xDEADBEEF);
        assert_eq!(info.sample_period_ms, 5000);
    }

    #[test]
    fn test_node_probe_status_payload() {
        let mut payload = vec![0u8; 35];
        payload[0..4].copy_from_slice(&42u32.to_le_bytes());
        // Status max sequence = 9, big-endian at offset 4 within the record.
        payload[4 + 7] = 9;
        payload[34] = 0x01; // 2 hops

        let status = NodeProbeStatus::from_payload(&payload).unwrap();
        assert_eq!(status.probe_serial_number, 42);
        assert_eq!(status.status.max_sequence_number, 9);
        assert_eq!(status.hop_count, HopCount(2));

        assert!(NodeProbeStatus::from_payload(&payload[..34]).is_err());
    }
}
