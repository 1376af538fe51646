//! Device registry and mesh routing.
//!
//! The [`DeviceManager`] owns every discovered probe and repeater node,
//! feeds them parsed advertisements and UART traffic, and services the
//! routing commands probes emit (log backfill, session info, identity
//! reads). Requests go out over the best available route: a direct
//! connection to the probe itself when there is one, otherwise any connected
//! node that relays the probe.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::devices::node::MeatNetNode;
use crate::devices::probe::{Probe, ProbeCommand};
use crate::error::{Error, Result};
use crate::message_handlers::MessageHandlers;
use crate::protocol::advertising::AdvertisingData;
use crate::protocol::meatnet::{
    node_read_logs_request, node_read_session_info_request, NodeLogResponse, NodeMessage,
    NodeMessageType, NodeProbeStatus, NodeRequest, NodeResponse, NodeSessionInfoResponse,
};
use crate::protocol::status::ProbeStatus;
use crate::protocol::uart::{
    log_request, session_info_request, LogResponse, MessageType, Response, SessionInfoResponse,
};
use crate::transport::{
    NetworkInterface, FIRMWARE_REVISION_UUID, HARDWARE_REVISION_UUID, MODEL_NUMBER_UUID,
};

/// Interval of the staleness and timeout sweep.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

enum Route {
    Direct(Arc<Probe>),
    Node(Arc<MeatNetNode>),
}

/// Registry of discovered devices and router for mesh requests.
pub struct DeviceManager {
    network: Arc<dyn NetworkInterface>,
    probes: RwLock<HashMap<u32, Arc<Probe>>>,
    nodes: RwLock<HashMap<Uuid, Arc<MeatNetNode>>>,
    message_handlers: Arc<MessageHandlers>,
    command_tx: mpsc::UnboundedSender<ProbeCommand>,
}

impl DeviceManager {
    /// Create a manager and start its command and sweep loops.
    pub fn new(network: Arc<dyn NetworkInterface>) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            network,
            probes: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            message_handlers: Arc::new(MessageHandlers::new()),
            command_tx,
        });

        Self::spawn_command_loop(Arc::downgrade(&manager), command_rx);
        Self::spawn_sweep_loop(Arc::downgrade(&manager));

        manager
    }

    fn spawn_command_loop(
        manager: Weak<Self>,
        mut command_rx: mpsc::UnboundedReceiver<ProbeCommand>,
    ) {
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_command(command).await;
            }
        });
    }

    fn spawn_sweep_loop(manager: Weak<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sweep();
            }
        });
    }

    /// One staleness and timeout pass.
    fn sweep(&self) {
        for probe in self.probes.read().values() {
            probe.check_staleness();
        }
        for node in self.nodes.read().values() {
            node.core().check_staleness();
        }
        self.message_handlers.check_timeouts();
    }

    // === Registry ===

    pub fn probes(&self) -> Vec<Arc<Probe>> {
        self.probes.read().values().cloned().collect()
    }

    pub fn probe(&self, serial_number: u32) -> Option<Arc<Probe>> {
        self.probes.read().get(&serial_number).cloned()
    }

    pub fn nodes(&self) -> Vec<Arc<MeatNetNode>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn node(&self, identifier: Uuid) -> Option<Arc<MeatNetNode>> {
        self.nodes.read().get(&identifier).cloned()
    }

    fn probe_by_identifier(&self, identifier: Uuid) -> Option<Arc<Probe>> {
        self.probes
            .read()
            .values()
            .find(|probe| probe.identifier() == identifier)
            .cloned()
    }

    fn get_or_create_probe(&self, serial_number: u32, identifier: Uuid) -> Arc<Probe> {
        let mut probes = self.probes.write();
        Arc::clone(probes.entry(serial_number).or_insert_with(|| {
            debug!(serial_number = format!("{serial_number:08X}"), "New probe");
            Arc::new(Probe::new(
                identifier,
                serial_number,
                Arc::clone(&self.network),
                self.command_tx.clone(),
            ))
        }))
    }

    fn get_or_create_node(&self, identifier: Uuid) -> Arc<MeatNetNode> {
        let mut nodes = self.nodes.write();
        Arc::clone(nodes.entry(identifier).or_insert_with(|| {
            debug!(%identifier, "New MeatNet node");
            Arc::new(MeatNetNode::new(identifier, Arc::clone(&self.network)))
        }))
    }

    // === Inbound traffic ===

    /// Process a manufacturer-data advertisement from a peripheral.
    ///
    /// Malformed advertisements are dropped, not propagated: the radio
    /// hears plenty of unrelated traffic.
    pub fn process_advertisement(&self, identifier: Uuid, data: &[u8], rssi: Option<i16>) {
        let Ok(advertisement) = AdvertisingData::from_data(data) else {
            return;
        };

        if advertisement.product_type.is_probe() {
            let probe = self.get_or_create_probe(advertisement.serial_number, identifier);
            probe.update_identifier(identifier);
            probe.update_with_advertisement(&advertisement, rssi);
        } else if advertisement.product_type.is_repeater() {
            let node = self.get_or_create_node(identifier);
            if let Some(rssi) = rssi {
                node.core().update_rssi(rssi);
            } else {
                node.core().mark_updated();
            }

            // Serial number zero means the repeater has no probe to relay.
            if !advertisement.has_probe_data() {
                return;
            }
            node.add_probe(advertisement.serial_number);

            // Probes first heard through a repeater have no address of
            // their own yet.
            let probe = self.get_or_create_probe(advertisement.serial_number, Uuid::nil());
            probe.update_with_advertisement(&advertisement, None);
        }
    }

    /// Process a status notification from a directly connected probe.
    pub fn process_probe_status_notification(&self, identifier: Uuid, data: &[u8]) {
        let Ok(status) = ProbeStatus::from_data(data) else {
            return;
        };
        if let Some(probe) = self.probe_by_identifier(identifier) {
            probe.update_probe_status(&status, None);
        }
    }

    /// Process a UART notification from a directly connected probe.
    pub fn process_probe_uart(&self, identifier: Uuid, data: &[u8]) {
        let Some(probe) = self.probe_by_identifier(identifier) else {
            return;
        };

        for response in Response::responses_from_data(data) {
            match response.message_type {
                MessageType::ReadSessionInfo => {
                    if let Some(info) = SessionInfoResponse::from_payload(&response.payload) {
                        probe.set_session_information(crate::data::SessionInformation {
                            session_id: info.session_id,
                            sample_period_ms: info.sample_period_ms,
                        });
                    }
                }
                MessageType::ReadLogs => {
                    if let Ok(log) = LogResponse::from_payload(&response.payload) {
                        probe.add_log_data_point(
                            log.sequence_number,
                            log.temperatures,
                            log.prediction_log,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    /// Process a UART notification from a connected MeatNet node.
    pub fn process_node_uart(&self, identifier: Uuid, data: &[u8]) {
        for message in NodeMessage::messages_from_data(data) {
            match message {
                NodeMessage::Response(response) => self.handle_node_response(&response),
                NodeMessage::Request(request) => self.handle_node_request(identifier, &request),
            }
        }
    }

    fn handle_node_response(&self, response: &NodeResponse) {
        // Nodes relay responses to every connected client; only the one
        // that sent the request has a handler registered.
        self.message_handlers
            .handle_response(response.request_id, response.success);

        if !response.success {
            return;
        }

        match response.message_type {
            NodeMessageType::Log => {
                if let Ok(log) = NodeLogResponse::from_payload(&response.payload) {
                    if let Some(probe) = self.probe(log.probe_serial_number) {
                        probe.add_log_data_point(
                            log.sequence_number,
                            log.temperatures,
                            log.prediction_log,
                        );
                    }
                }
            }
            NodeMessageType::ReadSessionInfo => {
                if let Ok(info) = NodeSessionInfoResponse::from_payload(&response.payload) {
                    if let Some(probe) = self.probe(info.probe_serial_number) {
                        probe.set_session_information(crate::data::SessionInformation {
                            session_id: info.session_id,
                            sample_period_ms: info.sample_period_ms,
                        });
                    }
                }
            }
            NodeMessageType::ProbeFirmwareRevision => {
                if let Some((serial_number, value)) = parse_serial_string(&response.payload) {
                    if let Some(probe) = self.probe(serial_number) {
                        probe.core().set_firmware_version(value);
                    }
                }
            }
            NodeMessageType::ProbeHardwareRevision => {
                if let Some((serial_number, value)) = parse_serial_string(&response.payload) {
                    if let Some(probe) = self.probe(serial_number) {
                        probe.core().set_hardware_revision(value);
                    }
                }
            }
            NodeMessageType::ProbeModelInformation => {
                if let Some((serial_number, value)) = parse_serial_string(&response.payload) {
                    if let Some(probe) = self.probe(serial_number) {
                        probe.set_model_info(&value);
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_node_request(&self, identifier: Uuid, request: &NodeRequest) {
        let node = self.get_or_create_node(identifier);
        node.core().mark_updated();

        match request.message_type {
            NodeMessageType::ProbeStatus => {
                if let Ok(status) = NodeProbeStatus::from_payload(&request.payload) {
                    node.add_probe(status.probe_serial_number);
                    let probe =
                        self.get_or_create_probe(status.probe_serial_number, Uuid::nil());
                    probe.update_probe_status(&status.status, Some(status.hop_count));
                }
            }
            NodeMessageType::Connected => {
                if request.payload.len() >= 4 {
                    let serial_number = u32::from_le_bytes([
                        request.payload[0],
                        request.payload[1],
                        request.payload[2],
                        request.payload[3],
                    ]);
                    node.add_probe(serial_number);
                }
            }
            NodeMessageType::Disconnected => {
                if request.payload.len() >= 4 {
                    let serial_number = u32::from_le_bytes([
                        request.payload[0],
                        request.payload[1],
                        request.payload[2],
                        request.payload[3],
                    ]);
                    node.remove_probe(serial_number);
                }
            }
            NodeMessageType::Heartbeat => {}
            _ => {}
        }
    }

    // === Outbound routing ===

    /// Request log records for a probe over the best available route.
    pub fn request_logs(&self, serial_number: u32, min_sequence: u32, max_sequence: u32) {
        let _ = self.command_tx.send(ProbeCommand::RequestLogs {
            serial_number,
            min_sequence,
            max_sequence,
        });
    }

    /// Request session information for a probe over the best available
    /// route.
    pub fn read_session_info(&self, serial_number: u32) {
        let _ = self.command_tx.send(ProbeCommand::RequestSessionInfo { serial_number });
    }

    fn best_route(&self, serial_number: u32) -> Result<Route> {
        if let Some(probe) = self.probe(serial_number) {
            if probe.is_connected() {
                return Ok(Route::Direct(probe));
            }
        }

        let node = self
            .nodes
            .read()
            .values()
            .find(|node| node.core().is_connected() && node.has_route_to(serial_number))
            .cloned();

        match node {
            Some(node) => Ok(Route::Node(node)),
            None => Err(Error::NoRouteToProbe { serial_number }),
        }
    }

    async fn handle_command(&self, command: ProbeCommand) {
        let result = match command {
            ProbeCommand::RequestLogs {
                serial_number,
                min_sequence,
                max_sequence,
            } => {
                self.send_request(
                    serial_number,
                    log_request(min_sequence, max_sequence),
                    node_read_logs_request(serial_number, min_sequence, max_sequence),
                )
                .await
            }
            ProbeCommand::RequestSessionInfo { serial_number } => {
                self.send_request(
                    serial_number,
                    session_info_request(),
                    node_read_session_info_request(serial_number),
                )
                .await
            }
            ProbeCommand::RequestFirmwareVersion { serial_number } => {
                self.send_identity_request(
                    serial_number,
                    NodeMessageType::ProbeFirmwareRevision,
                    FIRMWARE_REVISION_UUID,
                )
                .await
            }
            ProbeCommand::RequestHardwareRevision { serial_number } => {
                self.send_identity_request(
                    serial_number,
                    NodeMessageType::ProbeHardwareRevision,
                    HARDWARE_REVISION_UUID,
                )
                .await
            }
            ProbeCommand::RequestModelInfo { serial_number } => {
                self.send_identity_request(
                    serial_number,
                    NodeMessageType::ProbeModelInformation,
                    MODEL_NUMBER_UUID,
                )
                .await
            }
        };

        if let Err(error) = result {
            debug!(%error, "Routing command not sent");
        }
    }

    /// Send a request over the best route, as a direct frame to a connected
    /// probe or a node frame through the mesh.
    async fn send_request(
        &self,
        serial_number: u32,
        direct: crate::protocol::uart::Request,
        relayed: NodeRequest,
    ) -> Result<()> {
        match self.best_route(serial_number)? {
            Route::Direct(probe) => {
                self.network
                    .send_uart_data(probe.identifier(), direct.to_bytes())
                    .await
            }
            Route::Node(node) => self.send_node_request(&node, relayed).await,
        }
    }

    /// Request a device identity value: a device-info characteristic read
    /// on a direct connection, a node identity request through the mesh.
    async fn send_identity_request(
        &self,
        serial_number: u32,
        message_type: NodeMessageType,
        characteristic: Uuid,
    ) -> Result<()> {
        match self.best_route(serial_number)? {
            Route::Direct(probe) => {
                let data = self
                    .network
                    .read_characteristic(probe.identifier(), characteristic)
                    .await?;
                let value = String::from_utf8_lossy(&data)
                    .trim_end_matches('\0')
                    .to_string();
                match message_type {
                    NodeMessageType::ProbeFirmwareRevision => {
                        probe.core().set_firmware_version(value);
                    }
                    NodeMessageType::ProbeHardwareRevision => {
                        probe.core().set_hardware_revision(value);
                    }
                    NodeMessageType::ProbeModelInformation => probe.set_model_info(&value),
                    _ => {}
                }
                Ok(())
            }
            Route::Node(node) => {
                self.send_node_request(
                    &node,
                    NodeRequest::new(message_type, serial_number.to_le_bytes().to_vec()),
                )
                .await
            }
        }
    }

    async fn send_node_request(&self, node: &MeatNetNode, request: NodeRequest) -> Result<()> {
        let request_id = request.request_id;
        let message_type = request.message_type;
        self.message_handlers.add_handler(
            request_id,
            Box::new(move |success| {
                if !success {
                    warn!(request_id, ?message_type, "Node request failed");
                }
            }),
        );

        self.network
            .send_uart_data(node.identifier(), request.to_bytes())
            .await
    }
}

/// Split an identity response payload into the probe serial (little-endian
/// prefix) and the NUL-trimmed string that follows.
fn parse_serial_string(payload: &[u8]) -> Option<(u32, String)> {
    if payload.len() < 4 {
        return None;
    }
    let serial_number = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let value = String::from_utf8_lossy(&payload[4..])
        .trim_end_matches('\0')
        .to_string();
    Some((serial_number, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::device::ConnectionState;
    use crate::protocol::advertising::HopCount;
    use crate::transport::MockNetworkInterface;

    fn probe_advertisement(serial_number: u32) -> Vec<u8> {
        let mut data = vec![0u8; 21];
        data[0] = 1;
        data[1..5].copy_from_slice(&serial_number.to_le_bytes());
        data
    }

    fn repeater_advertisement(serial_number: u32, hops: u8) -> Vec<u8> {
        let mut data = vec![0u8; 21];
        data[0] = 2;
        data[1..5].copy_from_slice(&serial_number.to_le_bytes());
        data[20] = (hops.saturating_sub(1) & 0x03) << 6;
        data
    }

    #[tokio::test]
    async fn test_probe_discovery() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));
        let identifier = Uuid::new_v4();

        manager.process_advertisement(identifier, &probe_advertisement(42), Some(-55));
        manager.process_advertisement(identifier, &probe_advertisement(42), Some(-56));

        assert_eq!(manager.probes().len(), 1);
        let probe = manager.probe(42).unwrap();
        assert_eq!(probe.identifier(), identifier);
        assert_eq!(probe.rssi(), -56);
    }

    #[tokio::test]
    async fn test_repeater_discovery_creates_probe_and_route() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));
        let node_id = Uuid::new_v4();

        manager.process_advertisement(node_id, &repeater_advertisement(42, 2), Some(-70));

        assert_eq!(manager.nodes().len(), 1);
        let node = manager.node(node_id).unwrap();
        assert!(node.has_route_to(42));
        assert!(manager.probe(42).is_some());
    }

    #[tokio::test]
    async fn test_direct_advertisement_refreshes_mesh_discovered_probe() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));
        let node_id = Uuid::new_v4();
        let probe_id = Uuid::new_v4();

        // First heard through a repeater: no address of its own yet.
        manager.process_advertisement(node_id, &repeater_advertisement(42, 1), Some(-70));
        assert_eq!(manager.probe(42).unwrap().identifier(), Uuid::nil());

        // Heard directly: the real peripheral address takes over and direct
        // status notifications reach the probe.
        manager.process_advertisement(probe_id, &probe_advertisement(42), Some(-55));
        assert_eq!(manager.probe(42).unwrap().identifier(), probe_id);

        let mut status = vec![0u8; 30];
        status[7] = 9; // max sequence, big-endian
        manager.process_probe_status_notification(probe_id, &status);
        assert_eq!(manager.probe(42).unwrap().max_sequence_number(), 9);
    }

    #[tokio::test]
    async fn test_repeater_without_probe_creates_no_probe() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));

        manager.process_advertisement(Uuid::new_v4(), &repeater_advertisement(0, 1), Some(-70));

        assert_eq!(manager.nodes().len(), 1);
        assert!(manager.probes().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_advertisement_ignored() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));
        manager.process_advertisement(Uuid::new_v4(), &[0xFF; 5], Some(-50));
        assert!(manager.probes().is_empty());
        assert!(manager.nodes().is_empty());
    }

    #[tokio::test]
    async fn test_node_probe_status_routed_to_probe() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));
        let node_id = Uuid::new_v4();

        let mut payload = vec![0u8; 35];
        payload[0..4].copy_from_slice(&42u32.to_le_bytes());
        payload[4 + 7] = 17; // max sequence, big-endian within the record
        payload[34] = 0x00; // 1 hop
        let request = NodeRequest::new(NodeMessageType::ProbeStatus, payload);

        manager.process_node_uart(node_id, &request.to_bytes());

        let probe = manager.probe(42).unwrap();
        assert_eq!(probe.max_sequence_number(), 17);
        assert!(manager.node(node_id).unwrap().has_route_to(42));
    }

    #[tokio::test]
    async fn test_session_info_request_routed_through_node() {
        let mut mock = MockNetworkInterface::new();
        mock.expect_send_uart_data()
            .times(1)
            .returning(|_, _| Ok(()));
        let manager = DeviceManager::new(Arc::new(mock));
        let node_id = Uuid::new_v4();

        manager.process_advertisement(node_id, &repeater_advertisement(42, 1), Some(-70));
        manager
            .node(node_id)
            .unwrap()
            .core()
            .update_connection_state(ConnectionState::Connected);

        manager.read_session_info(42);
        // Let the command loop service the request.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(manager.message_handlers.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_direct_identity_read_uses_device_info_characteristics() {
        let mut mock = MockNetworkInterface::new();
        mock.expect_send_uart_data().returning(|_, _| Ok(()));
        mock.expect_read_characteristic()
            .returning(|_, characteristic| {
                if characteristic == FIRMWARE_REVISION_UUID {
                    Ok(b"1.2.3".to_vec())
                } else if characteristic == HARDWARE_REVISION_UUID {
                    Ok(b"rev-A".to_vec())
                } else {
                    Ok(b"CP01:2309".to_vec())
                }
            });
        let manager = DeviceManager::new(Arc::new(mock));
        let probe_id = Uuid::new_v4();

        manager.process_advertisement(probe_id, &probe_advertisement(42), Some(-50));
        let probe = manager.probe(42).unwrap();
        probe.update_connection_state(ConnectionState::Connected);

        // A status notification makes the probe request its missing
        // identity data.
        let mut status = vec![0u8; 30];
        status[7] = 1;
        manager.process_probe_status_notification(probe_id, &status);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(probe.core().firmware_version().as_deref(), Some("1.2.3"));
        assert_eq!(probe.core().hardware_revision().as_deref(), Some("rev-A"));
        assert_eq!(probe.model_info().unwrap().sku, "CP01");
    }

    #[tokio::test]
    async fn test_no_route_drops_request() {
        let mut mock = MockNetworkInterface::new();
        mock.expect_send_uart_data().never();
        let manager = DeviceManager::new(Arc::new(mock));

        manager.request_logs(42, 0, 10);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_hop_count_flows_from_repeater_advertisement() {
        let manager = DeviceManager::new(Arc::new(MockNetworkInterface::new()));

        let data = repeater_advertisement(42, 3);
        let parsed = AdvertisingData::from_data(&data).unwrap();
        assert_eq!(parsed.hop_count, Some(HopCount(3)));

        manager.process_advertisement(Uuid::new_v4(), &data, Some(-70));
        assert!(manager.probe(42).is_some());
    }

    #[test]
    fn test_parse_serial_string() {
        let mut payload = 42u32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"1.2.3\0\0");
        let (serial_number, value) = parse_serial_string(&payload).unwrap();
        assert_eq!(serial_number, 42);
        assert_eq!(value, "1.2.3");

        assert!(parse_serial_string(&[0x01]).is_none());
    }
}
