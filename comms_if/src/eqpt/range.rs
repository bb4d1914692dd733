//! # Range Equipment Data

use serde::{Deserialize, Serialize};

/// A denoised distance reading from the forward facing range sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    /// Distance to the nearest object in centimeters.
    pub distance_cm: f64,
}

impl RangeReading {
    pub fn new(distance_cm: f64) -> Self {
        Self { distance_cm }
    }

    /// True if the reading is at or inside the given distance.
    pub fn within(&self, distance_cm: f64) -> bool {
        self.distance_cm <= distance_cm
    }
}
