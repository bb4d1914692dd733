//! # Follow Executable Parameters
//!
//! All tunable constants for the executable, loaded from `follow_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::{
    avoid::AvoidParams, drive::DriveParams, perception::TrackerParams, pursuit::PursuitParams,
    range::RangeParams, status::StatusParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FollowExecParams {
    /// Target period of one control cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Maximum age of a perception snapshot before it is treated as missing.
    ///
    /// Units: seconds
    pub perception_stale_s: f64,

    /// Time the last frame of a perception script is held before the run ends.
    ///
    /// Units: seconds
    pub script_end_hold_s: f64,

    pub pursuit: PursuitParams,

    pub avoid: AvoidParams,

    pub range: RangeParams,

    pub tracker: TrackerParams,

    pub status: StatusParams,

    pub drive: DriveParams,
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_params_file() {
        let params: FollowExecParams =
            util::params::from_str(include_str!("../../params/follow_exec.toml")).unwrap();

        assert_eq!(params.cycle_period_s, 0.1);
        assert_eq!(params.script_end_hold_s, 2.0);
        assert_eq!(params.pursuit.min_area, 0.35);
        assert_eq!(params.pursuit.max_area, 0.5);
        assert_eq!(params.range.spike_threshold_cm, 20.0);
        assert_eq!(params.avoid.settle_delay_s, 0.3);
        assert!(params.tracker.obstacle_labels.iter().any(|l| l == "potted plant"));
        assert!(!params.drive.invert_left);
    }

    #[test]
    fn test_missing_section() {
        let res: Result<FollowExecParams, _> =
            util::params::from_str(
            "cycle_period_s = 0.1\nperception_stale_s = 0.5\nscript_end_hold_s = 2.0\n",
        );
        assert!(res.is_err());
    }
}
