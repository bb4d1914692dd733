//! Range sensing parameters

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RangeParams {
    /// A new sample is accepted straight away if it differs from the last accepted value by no
    /// more than this.
    ///
    /// Units: centimeters
    pub spike_threshold_cm: f64,

    /// Maximum time the last accepted value is held while samples keep spiking. After this the
    /// new sample is accepted regardless.
    ///
    /// Units: seconds
    pub timeout_s: f64,

    /// Maximum distance the sensor can report, also the filter's initial value.
    ///
    /// Units: centimeters
    pub max_distance_cm: f64,

    /// Maximum time without a successful sample before the reading is considered lost.
    ///
    /// Units: seconds
    pub stale_s: f64,

    /// BCM pin number of the trigger line
    pub trigger_pin: u8,

    /// BCM pin number of the echo line
    pub echo_pin: u8,

    /// Maximum time to wait for an echo.
    ///
    /// Units: seconds
    pub echo_timeout_s: f64,
}

impl Default for RangeParams {
    fn default() -> Self {
        Self {
            spike_threshold_cm: 20.0,
            timeout_s: 0.3,
            max_distance_cm: 200.0,
            stale_s: 1.0,
            trigger_pin: 25,
            echo_pin: 26,
            echo_timeout_s: 0.03,
        }
    }
}
