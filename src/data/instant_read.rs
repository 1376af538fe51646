//! Instant read display filtering.
//!
//! In instant read mode the probe reports T1 several times a second, and a
//! raw reading sitting right on a rounding boundary makes the displayed
//! whole-degree value flicker between neighbors. The filter holds the
//! current display value until the raw reading moves past the displayed
//! value by more than half a degree plus a small deadband.
//!
//! Celsius and Fahrenheit displays are filtered independently so each unit
//! is stable on its own scale.

use crate::utils::{celsius_to_fahrenheit, celsius_to_fahrenheit_difference};

/// Deadband applied on top of the half-degree rounding window, in Celsius.
const DEADBAND_RANGE_CELSIUS: f64 = 0.05;

/// Stable whole-degree display values for the instant read temperature.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InstantReadFilter {
    celsius: Option<f64>,
    fahrenheit: Option<f64>,
}

impl InstantReadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a new instant read temperature. `None` clears both display
    /// values, used when the probe leaves instant read mode or goes stale.
    pub fn add_reading(&mut self, temperature_celsius: Option<f64>) {
        match temperature_celsius {
            Some(celsius) => {
                self.celsius =
                    Some(Self::filtered(self.celsius, celsius, DEADBAND_RANGE_CELSIUS));
                self.fahrenheit = Some(Self::filtered(
                    self.fahrenheit,
                    celsius_to_fahrenheit(celsius),
                    celsius_to_fahrenheit_difference(DEADBAND_RANGE_CELSIUS),
                ));
            }
            None => {
                self.celsius = None;
                self.fahrenheit = None;
            }
        }
    }

    fn filtered(current: Option<f64>, reading: f64, deadband: f64) -> f64 {
        match current {
            None => reading.round(),
            Some(display) => {
                if reading > display + 0.5 + deadband || reading < display - 0.5 - deadband {
                    reading.round()
                } else {
                    display
                }
            }
        }
    }

    /// Current whole-degree Celsius display value.
    pub fn celsius(&self) -> Option<f64> {
        self.celsius
    }

    /// Current whole-degree Fahrenheit display value.
    pub fn fahrenheit(&self) -> Option<f64> {
        self.fahrenheit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reading_rounds() {
        let mut filter = InstantReadFilter::new();
        filter.add_reading(Some(22.4));
        assert_eq!(filter.celsius(), Some(22.0));
        // 22.4C = 72.32F.
        assert_eq!(filter.fahrenheit(), Some(72.0));
    }

    #[test]
    fn test_holds_within_deadband() {
        let mut filter = InstantReadFilter::new();
        filter.add_reading(Some(22.0));
        assert_eq!(filter.celsius(), Some(22.0));

        // 22.55 exceeds 22.5 but not 22.5 + deadband.
        filter.add_reading(Some(22.55));
        assert_eq!(filter.celsius(), Some(22.0));

        filter.add_reading(Some(21.46));
        assert_eq!(filter.celsius(), Some(22.0));
    }

    #[test]
    fn test_updates_beyond_deadband() {
        let mut filter = InstantReadFilter::new();
        filter.add_reading(Some(22.0));

        filter.add_reading(Some(22.6));
        assert_eq!(filter.celsius(), Some(23.0));

        filter.add_reading(Some(21.2));
        assert_eq!(filter.celsius(), Some(21.0));
    }

    #[test]
    fn test_no_flicker_on_boundary() {
        let mut filter = InstantReadFilter::new();
        filter.add_reading(Some(22.0));

        // Oscillating right on the rounding boundary must not flicker.
        for _ in 0..10 {
            filter.add_reading(Some(22.49));
            assert_eq!(filter.celsius(), Some(22.0));
            filter.add_reading(Some(22.51));
            assert_eq!(filter.celsius(), Some(22.0));
        }
    }

    #[test]
    fn test_units_filtered_independently() {
        let mut filter = InstantReadFilter::new();
        filter.add_reading(Some(30.0));
        assert_eq!(filter.celsius(), Some(30.0));
        assert_eq!(filter.fahrenheit(), Some(86.0));

        // 30.4C = 86.72F: Celsius display holds, Fahrenheit does not.
        filter.add_reading(Some(30.4));
        assert_eq!(filter.celsius(), Some(30.0));
        assert_eq!(filter.fahrenheit(), Some(87.0));
    }

    #[test]
    fn test_none_clears() {
        let mut filter = InstantReadFilter::new();
        filter.add_reading(Some(25.0));
        filter.add_reading(None);
        assert_eq!(filter.celsius(), None);
        assert_eq!(filter.fahrenheit(), None);

        filter.add_reading(Some(40.7));
        assert_eq!(filter.celsius(), Some(41.0));
    }
}
