//! Prediction smoothing.
//!
//! The firmware's raw time-to-removal estimate is noisy: it refreshes every
//! five seconds, jumps in whole-second steps and swings with temperature
//! noise early in a cook. This module turns the raw estimate into a display
//! countdown. Far from removal the estimate is shown in 15 second steps and
//! only refreshed every few status updates; close to removal it is
//! linearized into a once-per-200ms countdown that glides toward each new
//! firmware estimate instead of jumping.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::data::prediction::{PredictionInfo, PredictionState, PredictionStatus};

/// No status update for this long clears the smoothed prediction.
pub const PREDICTION_STALE_TIMEOUT: Duration = Duration::from_secs(15);

/// Raw estimates beyond this many seconds are treated as "no estimate".
pub const MAX_PREDICTION_TIME_SECONDS: u32 = 60 * 60 * 4;

/// In the low resolution regime, refresh the displayed estimate every this
/// many status updates.
pub const PREDICTION_TIME_UPDATE_COUNT: u32 = 3;

/// Below this many seconds remaining the countdown switches to the
/// linearized high resolution regime.
pub const LOW_RESOLUTION_CUTOFF_SECONDS: u32 = 60 * 5;

/// Display granularity in the low resolution regime.
pub const LOW_RESOLUTION_PRECISION_SECONDS: u32 = 15;

/// Tick rate of the linearized countdown.
pub const LINEARIZATION_UPDATE_RATE: Duration = Duration::from_millis(200);

/// Interval at which the firmware refreshes its raw estimate.
pub const PREDICTION_STATUS_RATE: Duration = Duration::from_secs(5);

const BROADCAST_CAPACITY: usize = 32;

#[derive(Debug, Default)]
struct ManagerInner {
    previous_info: Option<PredictionInfo>,
    previous_sequence_number: Option<u32>,
    previous_set_point_celsius: Option<f64>,
    linearization_running: bool,
    /// Smoothed countdown in milliseconds.
    current_linearization_ms: f64,
    /// Milliseconds subtracted per linearization tick.
    linearization_tick_ms: f64,
}

/// Smooths raw prediction statuses into display-ready [`PredictionInfo`]
/// values and publishes them on a broadcast channel.
pub struct PredictionManager {
    inner: Arc<Mutex<ManagerInner>>,
    sender: broadcast::Sender<PredictionInfo>,
    linearization_task: Mutex<Option<JoinHandle<()>>>,
    stale_task: Mutex<Option<JoinHandle<()>>>,
}

impl PredictionManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(ManagerInner::default())),
            sender,
            linearization_task: Mutex::new(None),
            stale_task: Mutex::new(None),
        }
    }

    /// Subscribe to smoothed prediction updates, including linearization
    /// ticks between status updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PredictionInfo> {
        self.sender.subscribe()
    }

    /// The most recent smoothed prediction.
    pub fn prediction_info(&self) -> Option<PredictionInfo> {
        self.inner.lock().previous_info
    }

    /// Process a prediction block from a status update.
    ///
    /// Duplicate deliveries of the same sequence number with an unchanged
    /// set point are ignored, so a status relayed by several mesh routes is
    /// only processed once.
    pub fn update_prediction_status(
        &self,
        status: &PredictionStatus,
        sequence_number: u32,
    ) -> Option<PredictionInfo> {
        let info = {
            let mut inner = self.inner.lock();

            if inner.previous_sequence_number == Some(sequence_number)
                && inner.previous_set_point_celsius == Some(status.set_point_celsius)
            {
                return inner.previous_info;
            }

            let seconds_remaining = self.determine_seconds_remaining(&mut inner, status, sequence_number);

            let info = PredictionInfo {
                state: status.state,
                mode: status.mode,
                prediction_type: status.prediction_type,
                set_point_celsius: status.set_point_celsius,
                heat_start_celsius: status.heat_start_celsius,
                seconds_remaining,
                percent_through_cook: percent_through_cook(status),
                estimated_core_celsius: status.estimated_core_celsius,
            };

            inner.previous_info = Some(info);
            inner.previous_sequence_number = Some(sequence_number);
            inner.previous_set_point_celsius = Some(status.set_point_celsius);
            info
        };

        if info.seconds_remaining.is_some()
            && status.seconds_remaining <= LOW_RESOLUTION_CUTOFF_SECONDS
        {
            self.restart_linearization();
        } else {
            self.stop_linearization();
        }
        self.restart_stale_timer();

        let _ = self.sender.send(info);
        Some(info)
    }

    fn determine_seconds_remaining(
        &self,
        inner: &mut ManagerInner,
        status: &PredictionStatus,
        sequence_number: u32,
    ) -> Option<u32> {
        if status.state != PredictionState::Predicting {
            inner.linearization_running = false;
            return None;
        }

        if status.seconds_remaining > MAX_PREDICTION_TIME_SECONDS {
            inner.linearization_running = false;
            return None;
        }

        if status.seconds_remaining > LOW_RESOLUTION_CUTOFF_SECONDS {
            inner.linearization_running = false;

            let previous_seconds = inner.previous_info.and_then(|info| info.seconds_remaining);
            let refresh = inner.previous_sequence_number.is_none()
                || sequence_number % PREDICTION_TIME_UPDATE_COUNT == 0
                || previous_seconds.is_none();

            if refresh {
                let precision = LOW_RESOLUTION_PRECISION_SECONDS;
                let rounded =
                    (status.seconds_remaining + precision / 2) / precision * precision;
                Some(rounded)
            } else {
                previous_seconds
            }
        } else {
            // Linearize toward where the firmware estimate will be at its
            // next refresh.
            let target_seconds =
                status.seconds_remaining.saturating_sub(PREDICTION_STATUS_RATE.as_secs() as u32);

            if !inner.linearization_running {
                inner.current_linearization_ms = f64::from(status.seconds_remaining) * 1000.0;
                inner.linearization_tick_ms = LINEARIZATION_UPDATE_RATE.as_millis() as f64;
                inner.linearization_running = true;
            } else {
                let interval_count = PREDICTION_STATUS_RATE.as_millis() as f64
                    / LINEARIZATION_UPDATE_RATE.as_millis() as f64;
                let target_ms = f64::from(target_seconds) * 1000.0;
                inner.linearization_tick_ms =
                    (inner.current_linearization_ms - target_ms) / interval_count;
            }

            Some((inner.current_linearization_ms / 1000.0).round() as u32)
        }
    }

    fn restart_linearization(&self) {
        let inner = Arc::clone(&self.inner);
        let sender = self.sender.clone();

        let mut task = self.linearization_task.lock();
        if let Some(task) = task.take() {
            task.abort();
        }
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LINEARIZATION_UPDATE_RATE);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of an interval fires immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let info = {
                    let mut inner = inner.lock();
                    if !inner.linearization_running {
                        break;
                    }
                    inner.current_linearization_ms =
                        (inner.current_linearization_ms - inner.linearization_tick_ms).max(0.0);
                    let seconds = (inner.current_linearization_ms / 1000.0).round() as u32;

                    match inner.previous_info {
                        Some(mut info) => {
                            info.seconds_remaining = Some(seconds);
                            inner.previous_info = Some(info);
                            info
                        }
                        None => break,
                    }
                };

                trace!(seconds = ?info.seconds_remaining, "Linearization tick");
                let _ = sender.send(info);
            }
        }));
    }

    fn stop_linearization(&self) {
        self.inner.lock().linearization_running = false;
        if let Some(task) = self.linearization_task.lock().take() {
            task.abort();
        }
    }

    fn restart_stale_timer(&self) {
        let inner = Arc::clone(&self.inner);

        let mut task = self.stale_task.lock();
        if let Some(task) = task.take() {
            task.abort();
        }
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(PREDICTION_STALE_TIMEOUT).await;
            let mut inner = inner.lock();
            inner.linearization_running = false;
            inner.previous_info = None;
            inner.previous_sequence_number = None;
            inner.previous_set_point_celsius = None;
        }));
    }
}

impl Default for PredictionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PredictionManager {
    fn drop(&mut self) {
        if let Some(task) = self.linearization_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.stale_task.lock().take() {
            task.abort();
        }
    }
}

/// Progress from heat start to set point based on the estimated core
/// temperature, clamped to 0..=100.
pub fn percent_through_cook(status: &PredictionStatus) -> u8 {
    let start = status.heat_start_celsius;
    let end = status.set_point_celsius;
    let core = status.estimated_core_celsius;

    if core > end {
        return 100;
    }
    if start > core {
        return 0;
    }
    if (end - start).abs() < f64::EPSILON {
        return 100;
    }
    ((core - start) / (end - start) * 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::prediction::{PredictionMode, PredictionType};

    fn predicting_status(seconds_remaining: u32) -> PredictionStatus {
        PredictionStatus {
            state: PredictionState::Predicting,
            mode: PredictionMode::TimeToRemoval,
            prediction_type: PredictionType::Removal,
            set_point_celsius: 57.0,
            heat_start_celsius: 20.0,
            seconds_remaining,
            estimated_core_celsius: 40.0,
        }
    }

    #[tokio::test]
    async fn test_not_predicting_has_no_countdown() {
        let manager = PredictionManager::new();
        let mut status = predicting_status(600);
        status.state = PredictionState::Cooking;

        let info = manager.update_prediction_status(&status, 1).unwrap();
        assert_eq!(info.seconds_remaining, None);
    }

    #[tokio::test]
    async fn test_implausible_estimate_has_no_countdown() {
        let manager = PredictionManager::new();
        let status = predicting_status(MAX_PREDICTION_TIME_SECONDS + 1);

        let info = manager.update_prediction_status(&status, 1).unwrap();
        assert_eq!(info.seconds_remaining, None);
    }

    #[tokio::test]
    async fn test_four_hour_estimate_still_counts_down() {
        let manager = PredictionManager::new();

        // Exactly four hours is the last plausible estimate.
        let info = manager
            .update_prediction_status(&predicting_status(MAX_PREDICTION_TIME_SECONDS), 1)
            .unwrap();
        assert_eq!(info.seconds_remaining, Some(14400));

        let info = manager
            .update_prediction_status(&predicting_status(MAX_PREDICTION_TIME_SECONDS + 1), 2)
            .unwrap();
        assert_eq!(info.seconds_remaining, None);
    }

    #[tokio::test]
    async fn test_low_resolution_rounds_to_fifteen_seconds() {
        let manager = PredictionManager::new();

        let info = manager
            .update_prediction_status(&predicting_status(1234), 1)
            .unwrap();
        // 1234 rounds to the nearest multiple of 15.
        assert_eq!(info.seconds_remaining, Some(1230));

        let info = manager
            .update_prediction_status(&predicting_status(1250), 2)
            .unwrap();
        // Not a refresh sequence number: the previous display value holds.
        assert_eq!(info.seconds_remaining, Some(1230));

        let info = manager
            .update_prediction_status(&predicting_status(1250), 3)
            .unwrap();
        assert_eq!(info.seconds_remaining, Some(1245));
    }

    #[tokio::test]
    async fn test_duplicate_status_ignored() {
        let manager = PredictionManager::new();
        let status = predicting_status(1000);

        let first = manager.update_prediction_status(&status, 5).unwrap();
        let second = manager.update_prediction_status(&status, 5).unwrap();
        assert_eq!(first, second);

        // Same sequence number with a new set point is a fresh cook setup
        // and must be processed.
        let mut retargeted = status;
        retargeted.set_point_celsius = 63.0;
        let third = manager.update_prediction_status(&retargeted, 5).unwrap();
        assert_eq!(third.set_point_celsius, 63.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linearized_countdown_ticks() {
        let manager = PredictionManager::new();
        let mut receiver = manager.subscribe();

        let info = manager
            .update_prediction_status(&predicting_status(120), 1)
            .unwrap();
        assert_eq!(info.seconds_remaining, Some(120));

        // Skip the status update event itself.
        let first = receiver.recv().await.unwrap();
        assert_eq!(first.seconds_remaining, Some(120));

        // Ticks count down from the raw estimate.
        let tick = receiver.recv().await.unwrap();
        let seconds = tick.seconds_remaining.unwrap();
        assert!(seconds <= 120);
        let tick = receiver.recv().await.unwrap();
        assert!(tick.seconds_remaining.unwrap() <= seconds);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_update_steers_toward_next_estimate() {
        let manager = PredictionManager::new();

        manager.update_prediction_status(&predicting_status(120), 1);
        let info = manager
            .update_prediction_status(&predicting_status(110), 2)
            .unwrap();

        // The countdown does not jump to the new raw value; it keeps its
        // current position and adjusts its tick rate instead.
        let seconds = info.seconds_remaining.unwrap();
        assert!(seconds >= 110);
        assert!(seconds <= 120);
    }

    #[tokio::test]
    async fn test_percent_through_cook() {
        let mut status = predicting_status(100);
        status.heat_start_celsius = 20.0;
        status.set_point_celsius = 60.0;

        status.estimated_core_celsius = 40.0;
        assert_eq!(percent_through_cook(&status), 50);

        status.estimated_core_celsius = 65.0;
        assert_eq!(percent_through_cook(&status), 100);

        status.estimated_core_celsius = 10.0;
        assert_eq!(percent_through_cook(&status), 0);

        status.estimated_core_celsius = 39.9;
        // Truncated, not rounded.
        assert_eq!(percent_through_cook(&status), 49);

        // Degenerate range counts as done.
        status.estimated_core_celsius = 60.0;
        status.heat_start_celsius = 60.0;
        assert_eq!(percent_through_cook(&status), 100);
    }
}
