//! Cook session information.

/// Identity and timing of one cook session.
///
/// The probe starts a new session each time it is removed from the charger,
/// and sequence numbers restart from zero. The sample period tells how far
/// apart consecutive log records are in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionInformation {
    /// Random identifier assigned by the probe firmware.
    pub session_id: u32,
    /// Interval between log records in milliseconds.
    pub sample_period_ms: u16,
}
