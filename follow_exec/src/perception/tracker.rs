//! # Tracker
//!
//! Reduces a [`DetectionFrame`] to a [`PerceptionSnapshot`]: picks the person to follow, works out
//! their bearing and apparent size, and decides whether any obstacle blocks the forward path.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::Deserialize;

use comms_if::eqpt::perception::{
    Bearing, BoundingBox, Detection, DetectionFrame, PerceptionSnapshot,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerParams {
    /// Detections below this confidence are ignored
    pub confidence_threshold: f64,

    /// Label of the detections to follow
    pub person_label: String,

    /// Half width of the band around the frame centre, as a fraction of the frame width, in which
    /// the person is considered centred
    pub centre_band: f64,

    /// Labels of the detections which count as obstacles
    pub obstacle_labels: Vec<String>,

    /// An obstacle must be wider than this fraction of the frame to block the path
    pub width_threshold: f64,

    /// An obstacle's centre must be within half this fraction of the frame width from the centre
    /// to block the path
    pub centre_threshold: f64,

    /// An obstacle's bottom edge must be lower than this fraction of the frame height to block
    /// the path
    pub bottom_threshold: f64,
}

pub struct Tracker {
    params: TrackerParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Tracker {
    pub fn new(params: TrackerParams) -> Self {
        Self { params }
    }

    /// Build the snapshot for the given frame.
    pub fn snapshot(&self, frame: &DetectionFrame) -> PerceptionSnapshot {
        if frame.width == 0 || frame.height == 0 {
            return PerceptionSnapshot::empty();
        }

        let frame_w = frame.width as f64;
        let frame_h = frame.height as f64;

        let confident: Vec<&Detection> = frame
            .detections
            .iter()
            .filter(|d| d.confidence >= self.params.confidence_threshold)
            .collect();

        let person = confident
            .iter()
            .find(|d| d.label == self.params.person_label)
            .copied();

        let blocking: Vec<&Detection> = confident
            .iter()
            .filter(|d| self.is_obstacle(&d.label))
            .filter(|d| self.blocks_path(&d.bbox, frame_w, frame_h))
            .copied()
            .collect();

        let mut snapshot = match person {
            Some(p) => {
                let cx = p.bbox.centre_x() / frame_w;
                let bias = 1.0 - (cx - 0.5).abs() / 0.5;
                let area = p.bbox.area() / (frame_w * frame_h);

                PerceptionSnapshot::person(self.bearing(cx), bias, area.max(0.0).min(1.0))
            }
            None => PerceptionSnapshot::empty(),
        };

        if !blocking.is_empty() {
            // The person must be in front of every blocking obstacle to suppress avoidance
            let in_front = match person {
                Some(p) => blocking.iter().all(|o| is_in_front(&p.bbox, &o.bbox)),
                None => false,
            };

            snapshot = snapshot.with_obstacle(in_front);
        }

        trace!(
            "Tracked: person={} bearing={} area={:?} obstacle={} in_front={}",
            snapshot.person_detected,
            snapshot.bearing,
            snapshot.person_area_fraction,
            snapshot.obstacle_present,
            snapshot.person_in_front
        );

        snapshot
    }

    fn bearing(&self, cx: f64) -> Bearing {
        if cx > 0.5 + self.params.centre_band {
            Bearing::Right
        }
        else if cx < 0.5 - self.params.centre_band {
            Bearing::Left
        }
        else {
            Bearing::Centered
        }
    }

    fn is_obstacle(&self, label: &str) -> bool {
        self.params.obstacle_labels.iter().any(|l| l == label)
    }

    fn blocks_path(&self, bbox: &BoundingBox, frame_w: f64, frame_h: f64) -> bool {
        let wide = bbox.width / frame_w > self.params.width_threshold;
        let centred =
            (bbox.centre_x() / frame_w - 0.5).abs() < self.params.centre_threshold / 2.0;
        let close = bbox.bottom() / frame_h > self.params.bottom_threshold;

        wide && centred && close
    }
}

impl Default for TrackerParams {
    fn default() -> Self {
        let obstacle_labels = [
            "chair",
            "couch",
            "bed",
            "bench",
            "table",
            "tv",
            "potted plant",
            "car",
            "truck",
            "bottle",
            "vase",
            "wall",
            "refrigerator",
            "microwave",
        ];

        Self {
            confidence_threshold: 0.55,
            person_label: String::from("person"),
            centre_band: 0.1,
            obstacle_labels: obstacle_labels.iter().map(|s| s.to_string()).collect(),
            width_threshold: 0.25,
            centre_threshold: 0.5,
            bottom_threshold: 0.8,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The person is in front of the obstacle if their feet are lower in the frame and the two boxes
/// overlap horizontally.
fn is_in_front(person: &BoundingBox, obstacle: &BoundingBox) -> bool {
    person.bottom() > obstacle.bottom() && person.overlaps_x(obstacle)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
