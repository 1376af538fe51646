//! Probe state tracking.
//!
//! A [`Probe`] merges every source of data about one physical thermometer:
//! its own advertisements, advertisements re-broadcast by repeater nodes,
//! and status notifications arriving directly or relayed through the mesh.
//! Competing sources are arbitrated by hop count so a relayed packet never
//! overwrites fresher direct data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::data::instant_read::InstantReadFilter;
use crate::data::log::{LoggedProbeDataPoint, ProbeTemperatureLog};
use crate::data::prediction::{PredictionInfo, PredictionLog};
use crate::data::session::SessionInformation;
use crate::data::temperatures::{ProbeTemperatures, VirtualSensors, VirtualTemperatures};
use crate::devices::device::{ConnectionState, DeviceCore};
use crate::prediction_manager::PredictionManager;
use crate::protocol::advertising::{
    AdvertisingData, BatteryStatus, HopCount, ProbeColor, ProbeId, ProbeMode,
};
use crate::protocol::status::ProbeStatus;
use crate::transport::NetworkInterface;

/// After accepting an instant read value, reject relayed instant reads for
/// this long.
pub const INSTANT_READ_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// After accepting a normal mode status, reject relayed normal mode data for
/// this long.
pub const NORMAL_MODE_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Instant read display clears when no reading arrives for this long.
pub const INSTANT_READ_STALE_TIMEOUT: Duration = Duration::from_secs(5);

/// Status notifications are considered lost after this long.
pub const STATUS_NOTIFICATION_STALE_TIMEOUT: Duration = Duration::from_secs(16);

/// Session information is re-requested at this interval to catch session
/// rollovers.
pub const SESSION_INFO_REQUEST_PERIOD: Duration = Duration::from_secs(180);

/// Per-sensor overheat thresholds in Celsius, T1 through T8.
pub const OVERHEAT_THRESHOLDS_CELSIUS: [f64; 8] =
    [105.0, 105.0, 115.0, 125.0, 300.0, 300.0, 300.0, 300.0];

/// Callback handle for unregistering callbacks. Dropping the handle
/// unregisters the callback.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Sensors currently over their temperature threshold, as a bitmask with
/// bit 0 = T1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overheating {
    pub sensors: u8,
}

impl Overheating {
    /// Evaluate every sensor against its threshold. Sensors without a valid
    /// reading are never overheating.
    pub fn from_temperatures(temperatures: &ProbeTemperatures) -> Self {
        let mut sensors = 0u8;
        for (index, threshold) in OVERHEAT_THRESHOLDS_CELSIUS.iter().enumerate() {
            if let Some(celsius) = temperatures.celsius(index) {
                if celsius >= *threshold {
                    sensors |= 1 << index;
                }
            }
        }
        Self { sensors }
    }

    pub fn is_any_overheating(&self) -> bool {
        self.sensors != 0
    }

    pub fn overheating_indices(&self) -> Vec<usize> {
        (0..8).filter(|i| self.sensors & (1 << i) != 0).collect()
    }
}

/// Routing side effect emitted by a probe, serviced by the device manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCommand {
    RequestLogs {
        serial_number: u32,
        min_sequence: u32,
        max_sequence: u32,
    },
    RequestSessionInfo {
        serial_number: u32,
    },
    RequestFirmwareVersion {
        serial_number: u32,
    },
    RequestHardwareRevision {
        serial_number: u32,
    },
    RequestModelInfo {
        serial_number: u32,
    },
}

/// Temperature update event.
#[derive(Debug, Clone)]
pub struct TemperatureUpdate {
    pub mode: ProbeMode,
    pub temperatures: ProbeTemperatures,
    pub virtual_temperatures: VirtualTemperatures,
}

/// SKU and manufacturing lot, parsed from the model information string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub sku: String,
    pub manufacturing_lot: String,
}

impl ModelInfo {
    /// Parse the "SKU:lot" model information string.
    pub fn from_string(value: &str) -> Option<Self> {
        let (sku, lot) = value.split_once(':')?;
        Some(Self {
            sku: sku.to_string(),
            manufacturing_lot: lot.to_string(),
        })
    }
}

struct ProbeState {
    probe_id: ProbeId,
    color: ProbeColor,
    mode: ProbeMode,
    battery_status: BatteryStatus,
    temperatures: Option<ProbeTemperatures>,
    virtual_sensors: VirtualSensors,
    virtual_temperatures: Option<VirtualTemperatures>,
    overheating: Overheating,
    instant_read_filter: InstantReadFilter,
    min_sequence: u32,
    max_sequence: u32,
    session_information: Option<SessionInformation>,
    logs: HashMap<u32, Arc<ProbeTemperatureLog>>,
    percent_of_logs_synced: u32,
    model_info: Option<ModelInfo>,
    last_normal_mode: Option<Instant>,
    last_normal_mode_hop: Option<HopCount>,
    last_instant_read: Option<Instant>,
    last_instant_read_hop: Option<HopCount>,
    last_status_notification: Option<Instant>,
    last_session_info_request: Option<Instant>,
}

impl ProbeState {
    fn new() -> Self {
        Self {
            probe_id: ProbeId::default(),
            color: ProbeColor::default(),
            mode: ProbeMode::default(),
            battery_status: BatteryStatus::default(),
            temperatures: None,
            virtual_sensors: VirtualSensors::default(),
            virtual_temperatures: None,
            overheating: Overheating::default(),
            instant_read_filter: InstantReadFilter::new(),
            min_sequence: 0,
            max_sequence: 0,
            session_information: None,
            logs: HashMap::new(),
            percent_of_logs_synced: 0,
            model_info: None,
            last_normal_mode: None,
            last_normal_mode_hop: None,
            last_instant_read: None,
            last_instant_read_hop: None,
            last_status_notification: None,
            last_session_info_request: None,
        }
    }

    fn current_log(&self) -> Option<&Arc<ProbeTemperatureLog>> {
        let session = self.session_information?;
        self.logs.get(&session.session_id)
    }
}

/// A single Combustion Predictive Thermometer probe.
pub struct Probe {
    core: DeviceCore,
    serial_number: u32,
    state: Arc<RwLock<ProbeState>>,
    prediction_manager: Arc<PredictionManager>,
    command_tx: mpsc::UnboundedSender<ProbeCommand>,
    temperature_tx: broadcast::Sender<TemperatureUpdate>,
    instant_read_tx: broadcast::Sender<f64>,
    rssi_tx: broadcast::Sender<i16>,
    log_sync_tx: broadcast::Sender<u32>,
    callback_counter: AtomicU64,
}

impl Probe {
    pub fn new(
        identifier: Uuid,
        serial_number: u32,
        network: Arc<dyn NetworkInterface>,
        command_tx: mpsc::UnboundedSender<ProbeCommand>,
    ) -> Self {
        let (temperature_tx, _) = broadcast::channel(64);
        let (instant_read_tx, _) = broadcast::channel(64);
        let (rssi_tx, _) = broadcast::channel(64);
        let (log_sync_tx, _) = broadcast::channel(16);

        Self {
            core: DeviceCore::new(identifier, network),
            serial_number,
            state: Arc::new(RwLock::new(ProbeState::new())),
            prediction_manager: Arc::new(PredictionManager::new()),
            command_tx,
            temperature_tx,
            instant_read_tx,
            rssi_tx,
            log_sync_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    // === Identification ===

    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    pub fn serial_number_string(&self) -> String {
        format!("{:08X}", self.serial_number)
    }

    pub fn identifier(&self) -> Uuid {
        self.core.identifier()
    }

    /// Refresh the peripheral address from a direct advertisement. A probe
    /// first heard through a repeater carries a nil identifier until it is
    /// heard directly; a nil argument never overwrites a known address.
    pub fn update_identifier(&self, identifier: Uuid) {
        if !identifier.is_nil() {
            self.core.set_identifier(identifier);
        }
    }

    pub fn id(&self) -> ProbeId {
        self.state.read().probe_id
    }

    pub fn color(&self) -> ProbeColor {
        self.state.read().color
    }

    pub fn mode(&self) -> ProbeMode {
        self.state.read().mode
    }

    pub fn battery_status(&self) -> BatteryStatus {
        self.state.read().battery_status
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.state.read().model_info.clone()
    }

    // === Connection ===

    pub fn connection_state(&self) -> ConnectionState {
        self.core.connection_state()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    pub fn rssi(&self) -> i16 {
        self.core.rssi()
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    /// Record a connection state change. Dropping the link invalidates the
    /// session, which is re-read on reconnect.
    pub fn update_connection_state(&self, connection_state: ConnectionState) {
        if connection_state == ConnectionState::Disconnected {
            let mut state = self.state.write();
            state.session_information = None;
            state.last_session_info_request = None;
        }
        self.core.update_connection_state(connection_state);
    }

    pub fn maintain_connection(&self) {
        self.core.maintain_connection();
    }

    pub fn release_connection(&self) {
        self.core.release_connection();
    }

    // === Measurements ===

    pub fn temperatures(&self) -> Option<ProbeTemperatures> {
        self.state.read().temperatures
    }

    pub fn virtual_temperatures(&self) -> Option<VirtualTemperatures> {
        self.state.read().virtual_temperatures
    }

    pub fn virtual_sensors(&self) -> VirtualSensors {
        self.state.read().virtual_sensors
    }

    pub fn overheating(&self) -> Overheating {
        self.state.read().overheating
    }

    pub fn instant_read_celsius(&self) -> Option<f64> {
        self.state.read().instant_read_filter.celsius()
    }

    pub fn instant_read_fahrenheit(&self) -> Option<f64> {
        self.state.read().instant_read_filter.fahrenheit()
    }

    pub fn min_sequence_number(&self) -> u32 {
        self.state.read().min_sequence
    }

    pub fn max_sequence_number(&self) -> u32 {
        self.state.read().max_sequence
    }

    pub fn session_information(&self) -> Option<SessionInformation> {
        self.state.read().session_information
    }

    pub fn percent_of_logs_synced(&self) -> u32 {
        self.state.read().percent_of_logs_synced
    }

    /// Log for the current session.
    pub fn temperature_log(&self) -> Option<Arc<ProbeTemperatureLog>> {
        self.state.read().current_log().cloned()
    }

    pub fn prediction_info(&self) -> Option<PredictionInfo> {
        self.prediction_manager.prediction_info()
    }

    /// Whether status notifications have stopped arriving.
    pub fn status_notifications_stale(&self) -> bool {
        self.state
            .read()
            .last_status_notification
            .map(|at| at.elapsed() > STATUS_NOTIFICATION_STALE_TIMEOUT)
            .unwrap_or(false)
    }

    // === Data arbitration ===

    /// Whether data tagged with `hop` should replace the current data, given
    /// when data of the same kind last arrived and over how many hops.
    ///
    /// Direct data (no hop count) always wins. While the lockout from the
    /// last accepted packet is still running, only an equal-or-better route
    /// gets through, and nothing beats direct. After the lockout anything is
    /// accepted.
    fn should_accept(
        last_seen: Option<Instant>,
        last_hop: Option<HopCount>,
        hop: Option<HopCount>,
        lockout: Duration,
    ) -> bool {
        let Some(hop) = hop else {
            return true;
        };

        let lockout_running = last_seen
            .map(|at| at.elapsed() <= lockout)
            .unwrap_or(false);
        if !lockout_running {
            return true;
        }

        match last_hop {
            None => false,
            Some(last_hop) => hop <= last_hop,
        }
    }

    // === Updates ===

    /// Apply an advertisement for this probe, heard directly (`hop_count`
    /// `None` in the data) or re-broadcast by a repeater.
    ///
    /// Advertisements are ignored while connected; status notifications are
    /// the better source then.
    pub fn update_with_advertisement(&self, advertisement: &AdvertisingData, rssi: Option<i16>) {
        if let Some(rssi) = rssi {
            self.core.update_rssi(rssi);
            let _ = self.rssi_tx.send(rssi);
        } else {
            self.core.mark_updated();
        }

        if self.is_connected() {
            return;
        }

        let hop = advertisement.hop_count;
        let mut instant_read = None;
        let update = {
            let mut state = self.state.write();
            let now = Instant::now();

            match advertisement.mode {
                ProbeMode::InstantRead => {
                    if !Self::should_accept(
                        state.last_instant_read,
                        state.last_instant_read_hop,
                        hop,
                        INSTANT_READ_LOCK_TIMEOUT,
                    ) {
                        return;
                    }
                    state
                        .instant_read_filter
                        .add_reading(advertisement.temperatures.celsius(0));
                    state.last_instant_read = Some(now);
                    state.last_instant_read_hop = hop;
                    instant_read = state.instant_read_filter.celsius();
                }
                ProbeMode::Normal => {
                    if !Self::should_accept(
                        state.last_normal_mode,
                        state.last_normal_mode_hop,
                        hop,
                        NORMAL_MODE_LOCK_TIMEOUT,
                    ) {
                        return;
                    }
                    // The normal mode lockout is armed by status updates
                    // only, so a relayed status keeps precedence over
                    // advertisements for prediction data.
                }
                ProbeMode::Reserved | ProbeMode::Error => return,
            }

            state.mode = advertisement.mode;
            state.probe_id = advertisement.probe_id;
            state.color = advertisement.color;
            state.battery_status = advertisement.battery_status;
            state.temperatures = Some(advertisement.temperatures);
            state.virtual_sensors = advertisement.virtual_sensors;
            let virtual_temperatures = VirtualTemperatures::resolve(
                &advertisement.virtual_sensors,
                &advertisement.temperatures,
            );
            state.virtual_temperatures = Some(virtual_temperatures);
            state.overheating = Overheating::from_temperatures(&advertisement.temperatures);

            TemperatureUpdate {
                mode: advertisement.mode,
                temperatures: advertisement.temperatures,
                virtual_temperatures,
            }
        };

        let _ = self.temperature_tx.send(update);
        if let Some(celsius) = instant_read {
            let _ = self.instant_read_tx.send(celsius);
        }
    }

    /// Apply a status record, received directly (`hop_count` `None`) or
    /// relayed by a node.
    pub fn update_probe_status(&self, status: &ProbeStatus, hop_count: Option<HopCount>) {
        let mut instant_read = None;
        let update = {
            let mut state = self.state.write();
            let now = Instant::now();

            // A relayed status can lag behind data already logged; applying
            // it would move the sequence range backwards.
            if let Some(max_logged) = state.current_log().and_then(|log| log.max_sequence_number())
            {
                if status.max_sequence_number < max_logged {
                    debug!(
                        serial_number = self.serial_number,
                        max_sequence = status.max_sequence_number,
                        max_logged,
                        "Discarding stale status"
                    );
                    return;
                }
            }

            match status.mode {
                ProbeMode::InstantRead => {
                    if !Self::should_accept(
                        state.last_instant_read,
                        state.last_instant_read_hop,
                        hop_count,
                        INSTANT_READ_LOCK_TIMEOUT,
                    ) {
                        return;
                    }
                    state
                        .instant_read_filter
                        .add_reading(status.temperatures.celsius(0));
                    state.last_instant_read = Some(now);
                    state.last_instant_read_hop = hop_count;
                    instant_read = state.instant_read_filter.celsius();
                }
                ProbeMode::Normal => {
                    if !Self::should_accept(
                        state.last_normal_mode,
                        state.last_normal_mode_hop,
                        hop_count,
                        NORMAL_MODE_LOCK_TIMEOUT,
                    ) {
                        return;
                    }
                    state.last_normal_mode = Some(now);
                    state.last_normal_mode_hop = hop_count;
                }
                ProbeMode::Reserved | ProbeMode::Error => return,
            }

            state.mode = status.mode;
            state.probe_id = status.probe_id;
            state.color = status.color;
            state.battery_status = status.battery_status;
            state.min_sequence = status.min_sequence_number;
            state.max_sequence = status.max_sequence_number;
            state.last_status_notification = Some(now);

            let mut update = None;
            if status.mode == ProbeMode::Normal {
                state.temperatures = Some(status.temperatures);
                state.virtual_sensors = status.virtual_sensors;
                let virtual_temperatures =
                    VirtualTemperatures::resolve(&status.virtual_sensors, &status.temperatures);
                state.virtual_temperatures = Some(virtual_temperatures);
                state.overheating = Overheating::from_temperatures(&status.temperatures);

                self.prediction_manager
                    .update_prediction_status(&status.prediction_status, status.max_sequence_number);

                if let Some(log) = state.current_log() {
                    log.append_data_point(LoggedProbeDataPoint {
                        sequence_number: status.max_sequence_number,
                        temperatures: status.temperatures,
                        virtual_sensors: status.virtual_sensors,
                        prediction_log: None,
                    });
                }

                update = Some(TemperatureUpdate {
                    mode: status.mode,
                    temperatures: status.temperatures,
                    virtual_temperatures,
                });
            }

            self.request_missing_data(&mut state);
            self.update_log_sync(&mut state);
            update
        };

        self.core.mark_updated();

        if let Some(update) = update {
            let _ = self.temperature_tx.send(update);
        }
        if let Some(celsius) = instant_read {
            let _ = self.instant_read_tx.send(celsius);
        }
    }

    /// Record session information learned from a session info response. A
    /// changed session ID starts a fresh log.
    pub fn set_session_information(&self, session_information: SessionInformation) {
        let mut state = self.state.write();
        state.session_information = Some(session_information);
        state
            .logs
            .entry(session_information.session_id)
            .or_insert_with(|| Arc::new(ProbeTemperatureLog::new(session_information)));
    }

    /// Record a log record received through a log transfer.
    pub fn add_log_data_point(
        &self,
        sequence_number: u32,
        temperatures: ProbeTemperatures,
        prediction_log: PredictionLog,
    ) {
        let percent = {
            let mut state = self.state.write();
            let Some(log) = state.current_log() else {
                return;
            };
            log.append_data_point(LoggedProbeDataPoint {
                sequence_number,
                temperatures,
                virtual_sensors: prediction_log.virtual_sensors,
                prediction_log: Some(prediction_log),
            });
            self.update_log_sync(&mut state)
        };

        if let Some(percent) = percent {
            let _ = self.log_sync_tx.send(percent);
        }
    }

    fn request_missing_data(&self, state: &mut ProbeState) {
        let session_request_due = match state.last_session_info_request {
            None => true,
            Some(at) => at.elapsed() > SESSION_INFO_REQUEST_PERIOD,
        };
        if state.session_information.is_none() || session_request_due {
            state.last_session_info_request = Some(Instant::now());
            let _ = self.command_tx.send(ProbeCommand::RequestSessionInfo {
                serial_number: self.serial_number,
            });
        }

        if self.core.firmware_version().is_none() {
            let _ = self.command_tx.send(ProbeCommand::RequestFirmwareVersion {
                serial_number: self.serial_number,
            });
        }
        if self.core.hardware_revision().is_none() {
            let _ = self.command_tx.send(ProbeCommand::RequestHardwareRevision {
                serial_number: self.serial_number,
            });
        }
        if state.model_info.is_none() {
            let _ = self.command_tx.send(ProbeCommand::RequestModelInfo {
                serial_number: self.serial_number,
            });
        }
    }

    /// Refresh the sync percentage and request the first missing log range.
    /// Returns the percentage when it changed.
    fn update_log_sync(&self, state: &mut ProbeState) -> Option<u32> {
        let (min_sequence, max_sequence) = (state.min_sequence, state.max_sequence);
        let log = state.current_log()?;

        if let Some((lower, upper)) = log.missing_range(min_sequence, max_sequence) {
            let _ = self.command_tx.send(ProbeCommand::RequestLogs {
                serial_number: self.serial_number,
                min_sequence: lower,
                max_sequence: upper,
            });
        }

        let percent = log.percent_complete(min_sequence, max_sequence);
        if percent != state.percent_of_logs_synced {
            state.percent_of_logs_synced = percent;
            Some(percent)
        } else {
            None
        }
    }

    pub fn set_model_info(&self, value: &str) {
        if let Some(model_info) = ModelInfo::from_string(value) {
            self.state.write().model_info = Some(model_info);
        }
    }

    /// Periodic staleness pass, driven by the device manager tick. Clears
    /// the instant read display when readings stop.
    pub fn check_staleness(&self) {
        self.core.check_staleness();

        let mut state = self.state.write();
        let instant_read_stale = state
            .last_instant_read
            .map(|at| at.elapsed() > INSTANT_READ_STALE_TIMEOUT)
            .unwrap_or(false);
        if instant_read_stale {
            state.instant_read_filter.add_reading(None);
            state.last_instant_read = None;
            state.last_instant_read_hop = None;
        }
    }

    // === Listeners ===

    /// Subscribe to temperature updates.
    pub fn subscribe_temperatures(&self) -> broadcast::Receiver<TemperatureUpdate> {
        self.temperature_tx.subscribe()
    }

    /// Subscribe to smoothed prediction updates.
    pub fn subscribe_predictions(&self) -> broadcast::Receiver<PredictionInfo> {
        self.prediction_manager.subscribe()
    }

    /// Subscribe to accepted instant read display values in Celsius.
    pub fn subscribe_instant_read(&self) -> broadcast::Receiver<f64> {
        self.instant_read_tx.subscribe()
    }

    /// Subscribe to signal strength updates from direct advertisements.
    pub fn subscribe_rssi(&self) -> broadcast::Receiver<i16> {
        self.rssi_tx.subscribe()
    }

    /// Subscribe to log sync percentage changes.
    pub fn subscribe_log_sync(&self) -> broadcast::Receiver<u32> {
        self.log_sync_tx.subscribe()
    }

    /// Register a temperature update callback.
    pub fn on_temperature_update(
        &self,
        callback: impl Fn(TemperatureUpdate) + Send + Sync + 'static,
    ) -> CallbackHandle {
        let mut receiver = self.temperature_tx.subscribe();
        let task = tokio::spawn(async move {
            while let Ok(update) = receiver.recv().await {
                callback(update);
            }
        });
        let id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        CallbackHandle::new(id, move || task.abort())
    }

    /// Register a prediction update callback.
    pub fn on_prediction_update(
        &self,
        callback: impl Fn(PredictionInfo) + Send + Sync + 'static,
    ) -> CallbackHandle {
        let mut receiver = self.prediction_manager.subscribe();
        let task = tokio::spawn(async move {
            while let Ok(info) = receiver.recv().await {
                callback(info);
            }
        });
        let id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        CallbackHandle::new(id, move || task.abort())
    }

    /// Register an instant read callback, fired with the filtered display
    /// value whenever an instant read is accepted.
    pub fn on_instant_read_update(
        &self,
        callback: impl Fn(f64) + Send + Sync + 'static,
    ) -> CallbackHandle {
        let mut receiver = self.instant_read_tx.subscribe();
        let task = tokio::spawn(async move {
            while let Ok(celsius) = receiver.recv().await {
                callback(celsius);
            }
        });
        let id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        CallbackHandle::new(id, move || task.abort())
    }

    /// Register a signal strength callback.
    pub fn on_rssi_update(
        &self,
        callback: impl Fn(i16) + Send + Sync + 'static,
    ) -> CallbackHandle {
        let mut receiver = self.rssi_tx.subscribe();
        let task = tokio::spawn(async move {
            while let Ok(rssi) = receiver.recv().await {
                callback(rssi);
            }
        });
        let id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        CallbackHandle::new(id, move || task.abort())
    }
}
