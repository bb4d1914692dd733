// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, OutputPin};

use super::{RangeError, RangeParams, RangeSensor};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Speed of sound in air at room temperature.
///
/// Units: centimeters/second
const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;

/// Length of the trigger pulse.
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HcSr04 {
    trigger: OutputPin,
    echo: InputPin,

    echo_timeout: Duration,
    max_distance_cm: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HcSr04 {
    pub fn new(params: &RangeParams) -> Result<Self, RangeError> {
        let gpio = Gpio::new().map_err(RangeError::Gpio)?;

        let mut trigger = gpio
            .get(params.trigger_pin)
            .map_err(RangeError::Gpio)?
            .into_output();
        trigger.set_low();

        let echo = gpio
            .get(params.echo_pin)
            .map_err(RangeError::Gpio)?
            .into_input();

        Ok(Self {
            trigger,
            echo,
            echo_timeout: util::time::seconds_to_std(params.echo_timeout_s),
            max_distance_cm: params.max_distance_cm,
        })
    }

    /// Busy wait until the echo line reaches `high`, returning false on timeout.
    fn wait_for_echo(&self, high: bool, deadline: Instant) -> bool {
        while self.echo.is_high() != high {
            if Instant::now() >= deadline {
                return false;
            }
        }
        true
    }
}

impl RangeSensor for HcSr04 {
    fn sample(&mut self) -> Result<f64, RangeError> {
        self.trigger.set_high();
        thread::sleep(TRIGGER_PULSE);
        self.trigger.set_low();

        // No rising edge at all means the sensor isn't responding
        let deadline = Instant::now() + self.echo_timeout;
        if !self.wait_for_echo(true, deadline) {
            return Err(RangeError::EchoTimeout(self.echo_timeout.as_secs_f64()));
        }

        // A pulse longer than the timeout is an out of range target
        let start = Instant::now();
        if !self.wait_for_echo(false, start + self.echo_timeout) {
            return Ok(self.max_distance_cm);
        }

        let distance_cm = start.elapsed().as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0;

        Ok(distance_cm.min(self.max_distance_cm))
    }
}
