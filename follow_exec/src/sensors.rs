//! # Sensors
//!
//! Bundles the perception source and the range monitor so the pursuit machine and the maneuver
//! sequencer can take fresh readings through one interface.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use comms_if::eqpt::{perception::PerceptionSnapshot, range::RangeReading};

use crate::{perception::PerceptionSource, range::RangeMonitor};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Fresh sensor readings. Both return `None` if the data is missing or stale.
pub trait Sensing {
    fn snapshot(&mut self, now_s: f64) -> Option<Arc<PerceptionSnapshot>>;

    fn range(&mut self, now_s: f64) -> Option<RangeReading>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Sensors {
    perception: Box<dyn PerceptionSource>,
    range: RangeMonitor,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Sensors {
    pub fn new(perception: Box<dyn PerceptionSource>, range: RangeMonitor) -> Self {
        Self { perception, range }
    }

    /// True once the perception source has nothing more to give.
    pub fn finished(&self) -> bool {
        self.perception.finished()
    }
}

impl Sensing for Sensors {
    fn snapshot(&mut self, now_s: f64) -> Option<Arc<PerceptionSnapshot>> {
        self.perception.latest(now_s)
    }

    fn range(&mut self, now_s: f64) -> Option<RangeReading> {
        self.range.read(now_s)
    }
}
