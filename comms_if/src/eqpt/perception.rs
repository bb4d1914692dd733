//! # Perception Equipment Interface
//!
//! Two layers of perception data are defined here:
//!
//! - [`DetectionFrame`] - the raw output of the external detector, one labelled bounding box per
//!   detected object. This is the wire format published by the detector process.
//! - [`PerceptionSnapshot`] - the per-cycle summary consumed by the control loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single frame of detections produced by the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// UTC timestamp at which the frame was captured
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Width of the frame in pixels
    pub width: u32,

    /// Height of the frame in pixels
    pub height: u32,

    /// All detections in the frame, in the order the detector reported them
    pub detections: Vec<Detection>,
}

/// One labelled object detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Class label, for instance `"person"` or `"chair"`
    pub label: String,

    /// Detector confidence, between 0 and 1
    pub confidence: f64,

    /// Bounding box of the object
    pub bbox: BoundingBox,
}

/// Axis aligned bounding box in pixel coordinates, origin at the top left of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Summary of the scene produced once per cycle.
///
/// `person_area_fraction` is `Some` if and only if `person_detected` is set. `person_in_front` is
/// only meaningful when both a person is detected and an obstacle is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub person_detected: bool,

    /// Horizontal position of the tracked person relative to the frame centre
    pub bearing: Bearing,

    /// Steering multiplier derived from the person's offset from centre, 1.0 when dead centre
    pub bias: f64,

    /// Person bounding box area as a fraction of the frame area
    pub person_area_fraction: Option<f64>,

    /// True if an obstacle occupies the forward path
    pub obstacle_present: bool,

    /// True if the person is nearer than the flagged obstacle and overlapping it
    pub person_in_front: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Discretised horizontal position of the tracked person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bearing {
    Left,
    Right,
    Centered,
    None,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PerceptionSnapshot {
    /// A snapshot in which nothing was seen.
    pub fn empty() -> Self {
        Self {
            person_detected: false,
            bearing: Bearing::None,
            bias: 0.0,
            person_area_fraction: None,
            obstacle_present: false,
            person_in_front: false,
        }
    }

    /// Build a snapshot of a tracked person.
    pub fn person(bearing: Bearing, bias: f64, area_fraction: f64) -> Self {
        Self {
            person_detected: true,
            bearing,
            bias: bias.max(0.0).min(1.0),
            person_area_fraction: Some(area_fraction),
            obstacle_present: false,
            person_in_front: false,
        }
    }

    /// Returns a copy of this snapshot with an obstacle flagged in the forward path.
    pub fn with_obstacle(mut self, person_in_front: bool) -> Self {
        self.obstacle_present = true;
        self.person_in_front = person_in_front && self.person_detected;
        self
    }

    /// True if an obstacle blocks the path and it isn't the person that is close.
    pub fn path_blocked(&self) -> bool {
        self.obstacle_present && !(self.person_detected && self.person_in_front)
    }
}

impl Default for PerceptionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// Horizontal centre of the box in pixels.
    pub fn centre_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Bottom edge of the box in pixels.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// True if the two boxes overlap horizontally.
    pub fn overlaps_x(&self, other: &BoundingBox) -> bool {
        self.x < other.x + other.width && self.x + self.width > other.x
    }
}

impl std::fmt::Display for Bearing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bearing::Left => write!(f, "left"),
            Bearing::Right => write!(f, "right"),
            Bearing::Centered => write!(f, "centered"),
            Bearing::None => write!(f, "none"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "person_detected": true,
            "bearing": "Left",
            "bias": 0.7,
            "person_area_fraction": 0.2,
            "obstacle_present": false,
            "person_in_front": false
        }"#;

        let snap: PerceptionSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snap, PerceptionSnapshot::person(Bearing::Left, 0.7, 0.2));
    }

    #[test]
    fn test_path_blocked() {
        let snap = PerceptionSnapshot::person(Bearing::Centered, 1.0, 0.4);
        assert!(!snap.path_blocked());
        assert!(snap.clone().with_obstacle(false).path_blocked());
        assert!(!snap.with_obstacle(true).path_blocked());

        // Nobody to be in front of the obstacle
        assert!(PerceptionSnapshot::empty().with_obstacle(true).path_blocked());
    }

    #[test]
    fn test_bbox_overlap() {
        let a = BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = BoundingBox { x: 9.0, y: 0.0, width: 10.0, height: 10.0 };
        let c = BoundingBox { x: 10.0, y: 0.0, width: 10.0, height: 10.0 };

        assert!(a.overlaps_x(&b));
        assert!(!a.overlaps_x(&c));
        assert_eq!(a.bottom(), 10.0);
        assert_eq!(b.centre_x(), 14.0);
    }
}
