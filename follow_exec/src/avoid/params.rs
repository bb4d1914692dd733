//! Obstacle avoidance parameters
//!
//! All maneuvers are open loop, the durations here were calibrated on the bench and will need
//! recalibrating for a different chassis or battery.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AvoidParams {
    /// Pause after stopping before sensor readings are trusted.
    ///
    /// Units: seconds
    pub settle_delay_s: f64,

    /// Duration of a probe or detour pivot, calibrated to roughly 45 to 90 degrees of rotation.
    ///
    /// Units: seconds
    pub probe_duration_s: f64,

    /// Extra duration added to every right pivot, the chassis turns right more slowly.
    ///
    /// Units: seconds
    pub right_pivot_trim_s: f64,

    /// Pause after each probe pivot, before sampling and before the next motion.
    ///
    /// Units: seconds
    pub probe_pause_s: f64,

    /// Speed of all maneuver pivots.
    ///
    /// Units: percent
    pub pivot_speed: f64,

    /// Duration of the forward leg of a detour.
    ///
    /// Units: seconds
    pub detour_clearance_s: f64,

    /// Units: percent
    pub detour_speed: f64,

    /// Duration of the reverse when both sides are blocked.
    ///
    /// Units: seconds
    pub retreat_duration_s: f64,

    /// Units: percent
    pub retreat_speed: f64,

    /// Number of retreats allowed before giving up as surrounded.
    pub max_retreats: u32,

    /// Interval at which timed holds check for an operator interrupt.
    ///
    /// Units: seconds
    pub poll_interval_s: f64,
}

impl Default for AvoidParams {
    fn default() -> Self {
        Self {
            settle_delay_s: 0.3,
            probe_duration_s: 0.5,
            right_pivot_trim_s: 0.05,
            probe_pause_s: 0.5,
            pivot_speed: 45.0,
            detour_clearance_s: 1.2,
            detour_speed: 100.0,
            retreat_duration_s: 1.0,
            retreat_speed: 100.0,
            max_retreats: 3,
            poll_interval_s: 0.05,
        }
    }
}
