//! MeatNet repeater node tracking.

use std::collections::HashSet;

use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::devices::device::DeviceCore;
use crate::transport::NetworkInterface;

/// A MeatNet repeater node (display, booster or other mesh device).
///
/// Nodes have no serial number in their advertisements; they are identified
/// by their BLE address. What matters for routing is which probe serial
/// numbers the node currently relays, learned from the probe status and
/// connection messages it pushes.
pub struct MeatNetNode {
    core: DeviceCore,
    state: RwLock<NodeState>,
}

#[derive(Default)]
struct NodeState {
    probe_serial_numbers: HashSet<u32>,
    model_info: Option<String>,
}

impl MeatNetNode {
    pub fn new(identifier: Uuid, network: Arc<dyn NetworkInterface>) -> Self {
        Self {
            core: DeviceCore::new(identifier, network),
            state: RwLock::new(NodeState::default()),
        }
    }

    pub fn identifier(&self) -> Uuid {
        self.core.identifier()
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    /// Record that this node relays data for a probe.
    pub fn add_probe(&self, serial_number: u32) {
        self.state.write().probe_serial_numbers.insert(serial_number);
    }

    /// Record that this node lost its link to a probe.
    pub fn remove_probe(&self, serial_number: u32) {
        self.state.write().probe_serial_numbers.remove(&serial_number);
    }

    /// Whether this node currently has a route to a probe.
    pub fn has_route_to(&self, serial_number: u32) -> bool {
        self.state.read().probe_serial_numbers.contains(&serial_number)
    }

    /// Serial numbers of every probe this node relays.
    pub fn probe_serial_numbers(&self) -> Vec<u32> {
        self.state.read().probe_serial_numbers.iter().copied().collect()
    }

    pub fn model_info(&self) -> Option<String> {
        self.state.read().model_info.clone()
    }

    pub fn set_model_info(&self, value: String) {
        self.state.write().model_info = Some(value);
    }
}
