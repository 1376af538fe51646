//! State shared by every Combustion BLE device.
//!
//! Probes and repeater nodes both carry a connection state machine, signal
//! strength, staleness tracking and firmware identity. [`DeviceCore`] holds
//! that shared state and owns the outbound [`NetworkInterface`] handle; the
//! concrete device types wrap it.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::NetworkInterface;

/// No update for this long marks a device stale.
pub const STALE_TIMEOUT: Duration = Duration::from_secs(15);

/// Weakest RSSI considered meaningful.
pub const MIN_RSSI: i16 = -128;

/// BLE connection state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last connection attempt failed.
    Failed,
}

struct CoreState {
    identifier: Uuid,
    connection_state: ConnectionState,
    rssi: i16,
    last_update: Instant,
    is_connectable: bool,
    maintaining_connection: bool,
    firmware_version: Option<String>,
    hardware_revision: Option<String>,
}

/// Connection, signal and identity state common to all device types.
pub struct DeviceCore {
    network: Arc<dyn NetworkInterface>,
    state: RwLock<CoreState>,
    connection_tx: broadcast::Sender<ConnectionState>,
}

impl DeviceCore {
    pub fn new(identifier: Uuid, network: Arc<dyn NetworkInterface>) -> Self {
        let (connection_tx, _) = broadcast::channel(16);
        Self {
            network,
            state: RwLock::new(CoreState {
                identifier,
                connection_state: ConnectionState::Disconnected,
                rssi: MIN_RSSI,
                last_update: Instant::now(),
                is_connectable: false,
                maintaining_connection: false,
                firmware_version: None,
                hardware_revision: None,
            }),
            connection_tx,
        }
    }

    /// BLE identifier of the peripheral.
    pub fn identifier(&self) -> Uuid {
        self.state.read().identifier
    }

    /// Record a peripheral address seen for this device. Probes first heard
    /// through a repeater start with a nil identifier until a direct
    /// advertisement supplies the real one.
    pub fn set_identifier(&self, identifier: Uuid) {
        self.state.write().identifier = identifier;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.connection_tx.subscribe()
    }

    /// Record a connection state reported by the transport.
    ///
    /// A transition to Disconnected clears the firmware identity so it is
    /// re-read on the next connection. Disconnected or Failed while the
    /// caller asked to maintain the connection triggers a reconnect attempt.
    pub fn update_connection_state(&self, new_state: ConnectionState) {
        let reconnect = {
            let mut state = self.state.write();
            if state.connection_state == new_state {
                return;
            }
            state.connection_state = new_state;

            if new_state == ConnectionState::Disconnected {
                state.firmware_version = None;
                state.hardware_revision = None;
            }

            state.maintaining_connection
                && matches!(
                    new_state,
                    ConnectionState::Disconnected | ConnectionState::Failed
                )
        };

        let _ = self.connection_tx.send(new_state);

        if reconnect {
            debug!(identifier = %self.identifier(), "Reconnecting");
            self.request_connect();
        }
    }

    /// Keep this device connected, reconnecting whenever the link drops.
    pub fn maintain_connection(&self) {
        let connect = {
            let mut state = self.state.write();
            state.maintaining_connection = true;
            state.connection_state != ConnectionState::Connected
        };
        if connect {
            self.request_connect();
        }
    }

    /// Stop maintaining the connection and disconnect if connected.
    pub fn release_connection(&self) {
        let disconnect = {
            let mut state = self.state.write();
            state.maintaining_connection = false;
            state.connection_state == ConnectionState::Connected
        };
        if disconnect {
            let network = Arc::clone(&self.network);
            let identifier = self.identifier();
            tokio::spawn(async move {
                if let Err(error) = network.disconnect(identifier).await {
                    warn!(%identifier, %error, "Disconnect failed");
                }
            });
        }
    }

    pub fn maintaining_connection(&self) -> bool {
        self.state.read().maintaining_connection
    }

    fn request_connect(&self) {
        let network = Arc::clone(&self.network);
        let identifier = self.identifier();
        tokio::spawn(async move {
            if let Err(error) = network.connect(identifier).await {
                warn!(%identifier, %error, "Connect failed");
            }
        });
    }

    /// Outbound transport handle.
    pub fn network(&self) -> &Arc<dyn NetworkInterface> {
        &self.network
    }

    pub fn rssi(&self) -> i16 {
        self.state.read().rssi
    }

    /// Record signal strength, marking the device as seen and connectable.
    pub fn update_rssi(&self, rssi: i16) {
        let mut state = self.state.write();
        state.rssi = rssi.max(MIN_RSSI);
        state.last_update = Instant::now();
        state.is_connectable = true;
    }

    /// Mark the device as seen without touching RSSI.
    pub fn mark_updated(&self) {
        let mut state = self.state.write();
        state.last_update = Instant::now();
        state.is_connectable = true;
    }

    pub fn is_connectable(&self) -> bool {
        self.state.read().is_connectable
    }

    pub fn is_stale(&self) -> bool {
        self.state.read().last_update.elapsed() > STALE_TIMEOUT
    }

    /// Periodic staleness check; a stale device stops being advertised as
    /// connectable.
    pub fn check_staleness(&self) {
        let mut state = self.state.write();
        if state.last_update.elapsed() > STALE_TIMEOUT {
            state.is_connectable = false;
        }
    }

    pub fn firmware_version(&self) -> Option<String> {
        self.state.read().firmware_version.clone()
    }

    pub fn set_firmware_version(&self, version: String) {
        self.state.write().firmware_version = Some(version);
    }

    pub fn hardware_revision(&self) -> Option<String> {
        self.state.read().hardware_revision.clone()
    }

    pub fn set_hardware_revision(&self, revision: String) {
        self.state.write().hardware_revision = Some(revision);
    }
}
