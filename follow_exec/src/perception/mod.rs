//! # Perception module
//!
//! The control loop never waits on the camera. Instead the detector's output is reduced to a
//! [`PerceptionSnapshot`] by the [`Tracker`] and published into a [`SnapshotSlot`], from which the
//! loop takes the most recent value each cycle. A snapshot older than the stale limit is treated as
//! missing.
//!
//! Sources:
//! - [`SnapshotSlot`] - fed by the [`DetClient`] from the network detector
//! - [`ScriptedPerception`] - replays a perception script for bench runs

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod det_client;
mod tracker;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use log::{info, warn};

use comms_if::eqpt::perception::PerceptionSnapshot;
use util::script_interpreter::{PendingFrames, ScriptInterpreter};

use crate::range::SimRange;

pub use det_client::{DetClient, DetClientError};
pub use tracker::{Tracker, TrackerParams};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something the control loop can pull the latest perception snapshot from.
pub trait PerceptionSource {
    /// The most recent snapshot, or `None` if there is none or it is stale.
    fn latest(&mut self, now_s: f64) -> Option<Arc<PerceptionSnapshot>>;

    /// True once the source will never produce another snapshot.
    fn finished(&self) -> bool {
        false
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Single-value hand-off of the latest snapshot between a producer thread and the control loop.
///
/// Writers replace the whole `Arc` so a reader only ever sees a complete snapshot. Clones share
/// the same slot.
#[derive(Clone)]
pub struct SnapshotSlot {
    inner: Arc<Mutex<Option<Stamped>>>,

    /// Maximum age of a snapshot before it is treated as missing.
    ///
    /// Units: seconds
    stale_s: f64,
}

/// A snapshot along with the time it was published.
#[derive(Clone)]
struct Stamped {
    snapshot: Arc<PerceptionSnapshot>,
    published_s: f64,
}

/// Replays a perception script against the session clock.
///
/// If the script carries range readings they are pushed into the given [`SimRange`]. The final
/// frame is held for a while after it becomes due so the control loop can act on it before the
/// script is reported finished.
pub struct ScriptedPerception {
    interp: ScriptInterpreter,
    current: Option<Arc<PerceptionSnapshot>>,
    range: Option<SimRange>,

    /// Time at which the script is finished, the last frame time plus the hold.
    ///
    /// Units: seconds
    end_s: f64,

    ended: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SnapshotSlot {
    pub fn new(stale_s: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            stale_s,
        }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: PerceptionSnapshot, now_s: f64) {
        let stamped = Stamped {
            snapshot: Arc::new(snapshot),
            published_s: now_s,
        };

        match self.inner.lock() {
            Ok(mut slot) => *slot = Some(stamped),
            Err(_) => warn!("Perception slot poisoned, snapshot dropped"),
        }
    }

    /// Get the current snapshot if it is younger than the stale limit.
    pub fn get(&self, now_s: f64) -> Option<Arc<PerceptionSnapshot>> {
        let stamped = self.inner.lock().ok()?.clone()?;

        if now_s - stamped.published_s > self.stale_s {
            None
        }
        else {
            Some(stamped.snapshot)
        }
    }
}

impl PerceptionSource for SnapshotSlot {
    fn latest(&mut self, now_s: f64) -> Option<Arc<PerceptionSnapshot>> {
        self.get(now_s)
    }
}

impl ScriptedPerception {
    pub fn new(interp: ScriptInterpreter, range: Option<SimRange>, end_hold_s: f64) -> Self {
        info!(
            "Loaded perception script with {} frames lasting {:.1} s",
            interp.get_num_frames(),
            interp.get_duration()
        );

        let end_s = interp.get_duration() + end_hold_s.max(0.0);

        Self {
            interp,
            current: None,
            range,
            end_s,
            ended: false,
        }
    }
}

impl PerceptionSource for ScriptedPerception {
    fn latest(&mut self, now_s: f64) -> Option<Arc<PerceptionSnapshot>> {
        match self.interp.get_pending(now_s) {
            PendingFrames::Some(frames) => {
                for frame in frames {
                    if let (Some(range), Some(cm)) = (&self.range, frame.range_cm) {
                        range.set(cm);
                    }
                    self.current = Some(Arc::new(frame.snapshot));
                }
            }
            PendingFrames::EndOfScript => {
                if !self.ended && now_s >= self.end_s {
                    info!("End of perception script");
                    self.ended = true;
                }
            }
            PendingFrames::None => (),
        }

        self.current.clone()
    }

    fn finished(&self) -> bool {
        self.ended
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::range::RangeSensor;
    use comms_if::eqpt::perception::Bearing;

    #[test]
    fn test_slot_staleness() {
        let mut slot = SnapshotSlot::new(0.5);
        assert!(slot.latest(0.0).is_none());

        slot.publish(PerceptionSnapshot::person(Bearing::Centered, 1.0, 0.3), 1.0);

        let snap = slot.latest(1.2).unwrap();
        assert!(snap.person_detected);

        // Past the stale limit the snapshot is withheld
        assert!(slot.latest(1.6).is_none());
    }

    #[test]
    fn test_slot_shared_between_clones() {
        let writer = SnapshotSlot::new(1.0);
        let mut reader = writer.clone();

        writer.publish(PerceptionSnapshot::empty(), 0.0);
        let first = reader.latest(0.1).unwrap();

        writer.publish(PerceptionSnapshot::person(Bearing::Left, 0.5, 0.1), 0.2);
        let second = reader.latest(0.3).unwrap();

        // Earlier readers keep the snapshot they were given
        assert!(!first.person_detected);
        assert!(second.person_detected);
    }

    #[test]
    fn test_scripted() {
        let script = r#"
            0.0: {"person_detected": false, "bearing": "None", "bias": 0.0,
                  "person_area_fraction": null, "obstacle_present": false,
                  "person_in_front": false, "range_cm": 150.0};
            1.0: {"person_detected": true, "bearing": "Right", "bias": 0.8,
                  "person_area_fraction": 0.25, "obstacle_present": false,
                  "person_in_front": false, "range_cm": 40.0};
        "#;

        let mut range = SimRange::new(200.0);
        let mut src = ScriptedPerception::new(
            ScriptInterpreter::from_str(script).unwrap(),
            Some(range.clone()),
            2.0,
        );

        assert!(!src.latest(0.1).unwrap().person_detected);
        assert_eq!(range.sample().unwrap(), 150.0);

        // Nothing new is due so the current snapshot is repeated
        assert!(!src.latest(0.5).unwrap().person_detected);

        let snap = src.latest(1.0).unwrap();
        assert_eq!(snap.bearing, Bearing::Right);
        assert_eq!(range.sample().unwrap(), 40.0);
        assert!(!src.finished());

        // The last frame is held for the end hold before the script finishes
        let snap = src.latest(2.9).unwrap();
        assert_eq!(snap.bearing, Bearing::Right);
        assert!(!src.finished());

        src.latest(3.0);
        assert!(src.finished());
    }
}
