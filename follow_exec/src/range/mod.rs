//! # Range module
//!
//! Provides the filtered forward range reading used to stop short of obstacles the camera can't
//! classify. Raw samples come from a [`RangeSensor`] and are passed through a spike rejecting
//! [`RangeFilter`]; [`RangeMonitor`] glues the two together and tracks sensor staleness.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod filter;
mod params;

/// [`RangeSensor`] implementation for the HC-SR04 ultrasonic ranger on Raspberry Pi GPIO.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub mod hc_sr04;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use comms_if::eqpt::range::RangeReading;
use log::{debug, warn};

pub use filter::RangeFilter;
pub use params::RangeParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of raw, unfiltered range samples.
pub trait RangeSensor: Send {
    /// Take one raw sample, in centimeters.
    fn sample(&mut self) -> Result<f64, RangeError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Samples a [`RangeSensor`] and filters the result.
pub struct RangeMonitor {
    sensor: Box<dyn RangeSensor>,

    filter: RangeFilter,

    /// Maximum age of the last successful sample before the reading is considered lost
    stale_s: f64,

    /// Time of the last successful sample
    last_sample_s: f64,

    num_consec_failures: u64,
}

/// Simulated range sensor returning a settable distance.
///
/// Clones share the same distance, so a script runner can hold one clone and the monitor
/// another.
#[derive(Clone)]
pub struct SimRange {
    distance_cm: Arc<Mutex<f64>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("No echo was received within {0} s")]
    EchoTimeout(f64),

    #[error("The sensor returned an invalid distance: {0}")]
    InvalidSample(f64),

    #[error("The simulated sensor is unavailable")]
    SimUnavailable,

    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    #[error("GPIO error: {0}")]
    Gpio(rppal::gpio::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RangeMonitor {
    pub fn new(sensor: Box<dyn RangeSensor>, params: &RangeParams, now_s: f64) -> Self {
        Self {
            sensor,
            filter: RangeFilter::new(params, now_s),
            stale_s: params.stale_s,
            last_sample_s: now_s,
            num_consec_failures: 0,
        }
    }

    /// Sample the sensor and return the filtered reading.
    ///
    /// A failed sample reuses the last filtered value. If no sample has succeeded for longer than
    /// the stale limit `None` is returned.
    pub fn read(&mut self, now_s: f64) -> Option<RangeReading> {
        match self.sensor.sample() {
            Ok(raw_cm) if raw_cm.is_finite() && raw_cm >= 0.0 => {
                if self.num_consec_failures > 0 {
                    debug!(
                        "Range sensor recovered after {} failed samples",
                        self.num_consec_failures
                    );
                }
                self.num_consec_failures = 0;
                self.last_sample_s = now_s;
                self.filter.update(raw_cm, now_s);
            }
            Ok(raw_cm) => self.sample_failed(RangeError::InvalidSample(raw_cm)),
            Err(e) => self.sample_failed(e),
        }

        if now_s - self.last_sample_s > self.stale_s {
            None
        }
        else {
            Some(self.filter.last())
        }
    }

    fn sample_failed(&mut self, err: RangeError) {
        self.num_consec_failures += 1;

        // Only warn on the first failure of a run, the rest are noise
        if self.num_consec_failures == 1 {
            warn!("Range sample failed: {}", err);
        }
    }
}

impl SimRange {
    pub fn new(distance_cm: f64) -> Self {
        Self {
            distance_cm: Arc::new(Mutex::new(distance_cm)),
        }
    }

    pub fn set(&self, distance_cm: f64) {
        if let Ok(mut d) = self.distance_cm.lock() {
            *d = distance_cm;
        }
    }
}

impl RangeSensor for SimRange {
    fn sample(&mut self) -> Result<f64, RangeError> {
        self.distance_cm
            .lock()
            .map(|d| *d)
            .map_err(|_| RangeError::SimUnavailable)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Sensor which fails every sample
    struct DeadSensor;

    impl RangeSensor for DeadSensor {
        fn sample(&mut self) -> Result<f64, RangeError> {
            Err(RangeError::EchoTimeout(0.03))
        }
    }

    #[test]
    fn test_monitor_reads_sim() {
        let params = RangeParams::default();
        let sim = SimRange::new(150.0);
        let mut mon = RangeMonitor::new(Box::new(sim.clone()), &params, 0.0);

        // The start-up value is held until the filter timeout has passed
        assert_eq!(mon.read(0.1), Some(RangeReading::new(params.max_distance_cm)));
        assert_eq!(mon.read(0.4), Some(RangeReading::new(150.0)));

        // A real approach is tracked in steps smaller than the spike threshold
        sim.set(135.0);
        assert_eq!(mon.read(0.5), Some(RangeReading::new(135.0)));
    }

    #[test]
    fn test_monitor_goes_stale() {
        let params = RangeParams::default();
        let mut mon = RangeMonitor::new(Box::new(DeadSensor), &params, 0.0);

        // Until the stale limit the initial value is held
        assert_eq!(
            mon.read(params.stale_s * 0.5),
            Some(RangeReading::new(params.max_distance_cm))
        );

        assert_eq!(mon.read(params.stale_s + 0.1), None);
    }

    #[test]
    fn test_monitor_rejects_invalid() {
        let params = RangeParams::default();
        let sim = SimRange::new(f64::NAN);
        let mut mon = RangeMonitor::new(Box::new(sim), &params, 0.0);

        assert_eq!(mon.read(params.stale_s + 0.1), None);
    }
}
