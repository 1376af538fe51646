//! Per-session temperature log storage.
//!
//! Log records arrive from two directions at once: live status updates
//! append the newest sequence number while backfill transfers replay older
//! ranges, often out of order and with duplicates when several mesh routes
//! answer the same request. Records that extend the contiguous tail are
//! inserted directly; everything else lands in an accumulator that is merged
//! into the log once no new out-of-order record has arrived for a short
//! stabilization window, or immediately when the accumulator fills up.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::data::prediction::PredictionLog;
use crate::data::session::SessionInformation;
use crate::data::temperatures::{ProbeTemperatures, VirtualSensors};

/// Quiet period after which buffered out-of-order records are merged.
pub const ACCUMULATOR_STABILIZATION_TIME: Duration = Duration::from_millis(200);

/// Accumulator capacity; reaching it forces an immediate merge.
pub const ACCUMULATOR_MAX: usize = 500;

/// One logged temperature record.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedProbeDataPoint {
    pub sequence_number: u32,
    pub temperatures: ProbeTemperatures,
    pub virtual_sensors: VirtualSensors,
    /// Present for records received through log transfers; live status
    /// appends do not carry the log-format prediction block.
    pub prediction_log: Option<PredictionLog>,
}

#[derive(Debug, Default)]
struct LogInner {
    data_points: BTreeMap<u32, LoggedProbeDataPoint>,
    accumulator: BTreeMap<u32, LoggedProbeDataPoint>,
    start_time: Option<DateTime<Utc>>,
}

impl LogInner {
    fn contains(&self, sequence_number: u32) -> bool {
        self.data_points.contains_key(&sequence_number)
            || self.accumulator.contains_key(&sequence_number)
    }

    fn merge_accumulator(&mut self) {
        let buffered = std::mem::take(&mut self.accumulator);
        self.data_points.extend(buffered);
    }
}

/// Temperature log for one cook session.
pub struct ProbeTemperatureLog {
    session_information: SessionInformation,
    inner: Arc<Mutex<LogInner>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl ProbeTemperatureLog {
    pub fn new(session_information: SessionInformation) -> Self {
        Self {
            session_information,
            inner: Arc::new(Mutex::new(LogInner::default())),
            flush_task: Mutex::new(None),
        }
    }

    pub fn session_information(&self) -> SessionInformation {
        self.session_information
    }

    /// Append a record.
    ///
    /// Records that extend the contiguous tail (or start an empty log) are
    /// inserted directly. Duplicates are dropped. Anything else goes through
    /// the accumulator and becomes visible after the stabilization window.
    pub fn append_data_point(&self, data_point: LoggedProbeDataPoint) {
        let sequence = data_point.sequence_number;
        let mut inner = self.inner.lock();

        if inner.contains(sequence) {
            return;
        }

        let next_contiguous = inner.data_points.keys().next_back().map(|max| max + 1);
        if inner.data_points.is_empty() || next_contiguous == Some(sequence) {
            if inner.start_time.is_none() {
                let elapsed = chrono::Duration::milliseconds(
                    i64::from(sequence) * i64::from(self.session_information.sample_period_ms),
                );
                inner.start_time = Some(Utc::now() - elapsed);
            }
            inner.data_points.insert(sequence, data_point);
            return;
        }

        inner.accumulator.insert(sequence, data_point);
        if inner.accumulator.len() >= ACCUMULATOR_MAX {
            debug!(
                session_id = self.session_information.session_id,
                "Log accumulator full, merging immediately"
            );
            inner.merge_accumulator();
            drop(inner);
            if let Some(task) = self.flush_task.lock().take() {
                task.abort();
            }
            return;
        }
        drop(inner);

        self.restart_flush_timer();
    }

    fn restart_flush_timer(&self) {
        let inner = Arc::clone(&self.inner);
        let mut flush_task = self.flush_task.lock();
        if let Some(task) = flush_task.take() {
            task.abort();
        }
        *flush_task = Some(tokio::spawn(async move {
            tokio::time::sleep(ACCUMULATOR_STABILIZATION_TIME).await;
            inner.lock().merge_accumulator();
        }));
    }

    /// Whether a record with this sequence number has been received, merged
    /// or still buffered.
    pub fn contains(&self, sequence_number: u32) -> bool {
        self.inner.lock().contains(sequence_number)
    }

    /// Number of merged records.
    pub fn data_point_count(&self) -> usize {
        self.inner.lock().data_points.len()
    }

    /// Merged records in sequence order.
    pub fn data_points(&self) -> Vec<LoggedProbeDataPoint> {
        self.inner.lock().data_points.values().cloned().collect()
    }

    /// Highest merged sequence number.
    pub fn max_sequence_number(&self) -> Option<u32> {
        self.inner.lock().data_points.keys().next_back().copied()
    }

    /// Wall-clock time of sequence number zero, set when the first record
    /// lands.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().start_time
    }

    /// The first gap in `min..=max`, as an inclusive range of missing
    /// sequence numbers. `None` when every record in the range is present.
    ///
    /// The lower bound is the first missing number scanning forward; the
    /// upper bound is the first missing number scanning backward, never
    /// below the lower bound. When only the endpoints are missing this
    /// still yields a well-formed range.
    pub fn missing_range(&self, min_sequence: u32, max_sequence: u32) -> Option<(u32, u32)> {
        if min_sequence > max_sequence {
            return None;
        }
        let inner = self.inner.lock();

        let lower = (min_sequence..=max_sequence).find(|seq| !inner.contains(*seq))?;
        let upper = (lower..=max_sequence)
            .rev()
            .find(|seq| !inner.contains(*seq))
            .unwrap_or(lower);

        Some((lower, upper))
    }

    /// Number of records present in `min..=max`.
    pub fn logs_in_range(&self, min_sequence: u32, max_sequence: u32) -> u32 {
        if min_sequence > max_sequence {
            return 0;
        }
        let inner = self.inner.lock();
        (min_sequence..=max_sequence)
            .filter(|seq| inner.contains(*seq))
            .count() as u32
    }

    /// Percentage of `min..=max` present, truncated. Only a fully complete
    /// range reports 100.
    pub fn percent_complete(&self, min_sequence: u32, max_sequence: u32) -> u32 {
        if min_sequence > max_sequence {
            return 100;
        }
        let expected = u64::from(max_sequence - min_sequence) + 1;
        let present = u64::from(self.logs_in_range(min_sequence, max_sequence));
        if present >= expected {
            100
        } else {
            (present * 100 / expected) as u32
        }
    }
}

impl std::fmt::Debug for ProbeTemperatureLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ProbeTemperatureLog")
            .field("session_information", &self.session_information)
            .field("data_points", &inner.data_points.len())
            .field("accumulator", &inner.accumulator.len())
            .finish()
    }
}

impl Drop for ProbeTemperatureLog {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::temperatures::PACKED_TEMPERATURE_BYTES;

    fn session() -> SessionInformation {
        SessionInformation {
            session_id: 1,
            sample_period_ms: 1000,
        }
    }

    fn point(sequence_number: u32) -> LoggedProbeDataPoint {
        LoggedProbeDataPoint {
            sequence_number,
            temperatures: ProbeTemperatures::from_packed_bytes(
                &[0u8; PACKED_TEMPERATURE_BYTES],
            )
            .unwrap(),
            virtual_sensors: VirtualSensors::default(),
            prediction_log: None,
        }
    }

    #[tokio::test]
    async fn test_contiguous_appends_are_direct() {
        let log = ProbeTemperatureLog::new(session());
        for seq in 0..5 {
            log.append_data_point(point(seq));
        }
        assert_eq!(log.data_point_count(), 5);
        assert_eq!(log.missing_range(0, 4), None);
    }

    #[tokio::test]
    async fn test_duplicates_dropped() {
        let log = ProbeTemperatureLog::new(session());
        log.append_data_point(point(0));
        log.append_data_point(point(0));
        log.append_data_point(point(1));
        log.append_data_point(point(1));
        assert_eq!(log.data_point_count(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_buffered_then_merged() {
        let log = ProbeTemperatureLog::new(session());
        log.append_data_point(point(0));
        // Gap: 5 is out of order.
        log.append_data_point(point(5));
        assert_eq!(log.data_point_count(), 1);
        assert!(log.contains(5));

        tokio::time::sleep(ACCUMULATOR_STABILIZATION_TIME * 2).await;
        assert_eq!(log.data_point_count(), 2);
    }

    #[tokio::test]
    async fn test_accumulator_full_merges_immediately() {
        let log = ProbeTemperatureLog::new(session());
        log.append_data_point(point(0));
        // All out of order relative to the tail.
        for seq in 2..2 + ACCUMULATOR_MAX as u32 {
            log.append_data_point(point(seq));
        }
        assert_eq!(log.data_point_count(), 1 + ACCUMULATOR_MAX);
    }

    #[tokio::test]
    async fn test_missing_range() {
        let log = ProbeTemperatureLog::new(session());
        for seq in [0u32, 1, 2, 5, 6, 9, 10] {
            log.append_data_point(point(seq));
        }
        tokio::time::sleep(ACCUMULATOR_STABILIZATION_TIME * 2).await;

        assert_eq!(log.missing_range(0, 10), Some((3, 8)));
        assert_eq!(log.missing_range(0, 6), Some((3, 4)));
        assert_eq!(log.missing_range(0, 2), None);
        // Single missing record yields a degenerate range.
        assert_eq!(log.missing_range(5, 7), Some((7, 7)));
    }

    #[tokio::test]
    async fn test_missing_range_endpoints_absent() {
        let log = ProbeTemperatureLog::new(session());
        for seq in [1u32, 2, 3] {
            log.append_data_point(point(seq));
        }
        tokio::time::sleep(ACCUMULATOR_STABILIZATION_TIME * 2).await;

        assert_eq!(log.missing_range(0, 4), Some((0, 4)));
    }

    #[tokio::test]
    async fn test_percent_complete() {
        let log = ProbeTemperatureLog::new(session());
        for seq in 0..50 {
            log.append_data_point(point(seq));
        }
        assert_eq!(log.percent_complete(0, 49), 100);
        assert_eq!(log.percent_complete(0, 99), 50);
        // 50 of 101 expected truncates to 49.
        assert_eq!(log.percent_complete(0, 100), 49);
        assert_eq!(log.logs_in_range(10, 59), 40);
    }

    #[tokio::test]
    async fn test_start_time_back_dated() {
        let log = ProbeTemperatureLog::new(session());
        let before = Utc::now();
        log.append_data_point(point(60));
        let start = log.start_time().unwrap();
        // 60 samples at 1 s apart puts the start about a minute ago.
        let offset = before - start;
        assert!(offset >= chrono::Duration::seconds(59));
        assert!(offset <= chrono::Duration::seconds(61));
    }
}
