//! # Perception script interpreter module
//!
//! This module provides an interpreter for perception scripts, which replay timed perception
//! snapshots (and optionally range readings) into the control loop so it can be exercised on the
//! bench without a camera.
//!
//! Each entry in a script has the form
//!
//! ```text
//! 1.5: {"person_detected": true, "bearing": "Centered", "bias": 1.0, ...};
//! ```
//!
//! where the number is the session time in seconds at which the entry becomes current and the
//! payload is a JSON [`PerceptionSnapshot`], with an optional `range_cm` field.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use comms_if::eqpt::perception::PerceptionSnapshot;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The payload of a single script entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptFrame {
    #[serde(flatten)]
    pub snapshot: PerceptionSnapshot,

    /// Raw range reading to inject, if any
    #[serde(default)]
    pub range_cm: Option<f64>,
}

/// A frame which is scripted to occur at a specific time.
struct Entry {
    /// The time the frame becomes current
    exec_time_s: f64,

    frame: ScriptFrame,
}

/// A script interpreter.
///
/// After initialising with the path to the script use `.get_pending()` to acquire the frames
/// which have become due.
pub struct ScriptInterpreter {
    _script_path: PathBuf,
    entries: VecDeque<Entry>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script contains an invalid timestamp: {0}. Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid frame at {0} s: {1}")]
    InvalidFrame(f64, serde_json::Error),

    #[error("Script entries must be in time order, {0} s follows {1} s")]
    OutOfOrder(f64, f64),
}

pub enum PendingFrames {
    None,
    Some(Vec<ScriptFrame>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {
    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = PathBuf::from(script_path.as_ref());

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path).map_err(ScriptError::ScriptLoadError)?;

        let mut interp = Self::from_str(&script)?;
        interp._script_path = path;

        Ok(interp)
    }

    /// Create a new interpreter from the contents of a script.
    pub fn from_str(script: &str) -> Result<Self, ScriptError> {
        let mut entries: VecDeque<Entry> = VecDeque::new();

        // Timestamp, colon, then everything up to the terminating semicolon
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .expect("Script regex is invalid");

        for cap in re.captures_iter(script) {
            let (time_str, payload) = match (cap.get(1), cap.get(3)) {
                (Some(t), Some(p)) => (t.as_str(), p.as_str()),
                _ => continue,
            };

            let exec_time_s: f64 = time_str
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            if let Some(last) = entries.back() {
                if exec_time_s < last.exec_time_s {
                    return Err(ScriptError::OutOfOrder(exec_time_s, last.exec_time_s));
                }
            }

            let frame: ScriptFrame = serde_json::from_str(payload)
                .map_err(|e| ScriptError::InvalidFrame(exec_time_s, e))?;

            entries.push_back(Entry { exec_time_s, frame });
        }

        if entries.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        Ok(ScriptInterpreter {
            _script_path: PathBuf::new(),
            entries,
        })
    }

    /// Return the frames which have become due at `current_time_s`, oldest first.
    pub fn get_pending(&mut self, current_time_s: f64) -> PendingFrames {
        if self.entries.is_empty() {
            return PendingFrames::EndOfScript;
        }

        let mut frames = vec![];

        while let Some(front) = self.entries.front() {
            if front.exec_time_s > current_time_s {
                break;
            }
            if let Some(e) = self.entries.pop_front() {
                frames.push(e.frame);
            }
        }

        if frames.is_empty() {
            PendingFrames::None
        }
        else {
            PendingFrames::Some(frames)
        }
    }

    /// Get the number of frames remaining in the script
    pub fn get_num_frames(&self) -> usize {
        self.entries.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.entries.back() {
            Some(e) => e.exec_time_s,
            None => 0f64,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::perception::Bearing;

    const SCRIPT: &str = r#"
        0.0: {"person_detected": false, "bearing": "None", "bias": 0.0,
              "person_area_fraction": null, "obstacle_present": false,
              "person_in_front": false};
        0.5: {"person_detected": true, "bearing": "Centered", "bias": 1.0,
              "person_area_fraction": 0.2, "obstacle_present": false,
              "person_in_front": false, "range_cm": 120.0};
        2.0: {"person_detected": true, "bearing": "Left", "bias": 0.6,
              "person_area_fraction": 0.4, "obstacle_present": true,
              "person_in_front": true};
    "#;

    #[test]
    fn test_parse_script() {
        let si = ScriptInterpreter::from_str(SCRIPT).unwrap();
        assert_eq!(si.get_num_frames(), 3);
        assert_eq!(si.get_duration(), 2.0);
    }

    #[test]
    fn test_pending() {
        let mut si = ScriptInterpreter::from_str(SCRIPT).unwrap();

        match si.get_pending(0.6) {
            PendingFrames::Some(f) => {
                assert_eq!(f.len(), 2);
                assert_eq!(f[0].snapshot, PerceptionSnapshot::empty());
                assert_eq!(f[1].snapshot, PerceptionSnapshot::person(Bearing::Centered, 1.0, 0.2));
                assert_eq!(f[1].range_cm, Some(120.0));
            }
            _ => panic!("Expected two pending frames"),
        }

        assert!(matches!(si.get_pending(1.0), PendingFrames::None));

        match si.get_pending(2.5) {
            PendingFrames::Some(f) => {
                assert!(f[0].snapshot.obstacle_present);
                assert!(f[0].snapshot.person_in_front);
                assert_eq!(f[0].range_cm, None);
            }
            _ => panic!("Expected a pending frame"),
        }

        assert!(matches!(si.get_pending(3.0), PendingFrames::EndOfScript));
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(ScriptInterpreter::from_str("nothing here"), Err(ScriptError::ScriptEmpty)));
        assert!(matches!(
            ScriptInterpreter::from_str("1.0: {\"bogus\": 1};"),
            Err(ScriptError::InvalidFrame(_, _))
        ));
    }
}
