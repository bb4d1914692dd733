//! Drive parameters

use serde::Deserialize;

/// Pin assignments and wiring corrections for the L298N motor driver.
///
/// The enable lines are fixed to the hardware PWM outputs, GPIO18 (left) and GPIO19 (right).
#[derive(Debug, Clone, Deserialize)]
pub struct DriveParams {
    /// PWM frequency used on the enable lines.
    ///
    /// Units: hertz
    pub pwm_frequency_hz: f64,

    /// BCM pin driven high to turn the left motor forward
    pub left_fwd_pin: u8,

    /// BCM pin driven high to turn the left motor backward
    pub left_rev_pin: u8,

    pub right_fwd_pin: u8,

    pub right_rev_pin: u8,

    /// Reverse the left motor direction to correct for swapped wiring
    pub invert_left: bool,

    /// Reverse the right motor direction to correct for swapped wiring
    pub invert_right: bool,
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 1000.0,
            left_fwd_pin: 23,
            left_rev_pin: 24,
            right_fwd_pin: 27,
            right_rev_pin: 22,
            invert_left: false,
            invert_right: true,
        }
    }
}
