//! # Obstacle avoidance module
//!
//! When the path is blocked the pursuit machine hands control to the [`ManeuverSequencer`], which
//! runs the following sequence synchronously on the control thread:
//!
//! - `Settle` - stop and let the sensors settle
//! - `ProbeLeft`, `ProbeRight` - pivot toward the side, sample, pivot back
//! - `Decide` - detour on the first clear side (left preferred), otherwise retreat and try again
//! - `DetourLeft`, `DetourRight` - pivot toward the clear side and drive forward past the obstacle
//! - `Retreat` - reverse away, then start again from `Settle`
//! - `Surrounded` - the retreat limit has been reached, stop and give up
//!
//! Every motion is open loop and timed, and ends with a stop before the next step begins.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};

use comms_if::eqpt::drive::DriveCommand;

use crate::{cycle::CycleCtx, drive::DriveError, pursuit::PursuitState};

pub use params::AvoidParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Remaining time below which a hold is considered complete.
const HOLD_TOLERANCE_S: f64 = 1e-6;

/// Shortest interval between interrupt checks during a hold.
const MIN_POLL_INTERVAL_S: f64 = 0.001;

pub const MSG_SURROUNDED: &str = "Surrounded by obstacles, cannot proceed";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ManeuverSequencer {
    params: AvoidParams,

    /// Range at or below which a probed side counts as blocked.
    ///
    /// Units: centimeters
    safe_distance_cm: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Steps of the avoidance sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnvrStep {
    Settle,
    ProbeLeft,
    ProbeRight,
    Decide,
    DetourLeft,
    DetourRight,
    Retreat,
    Surrounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManeuverOutcome {
    /// A detour was made on the given side and the robot is stopped past the obstacle
    Cleared(Side),

    /// Both sides stayed blocked through every allowed retreat
    Surrounded,
}

#[derive(Debug, thiserror::Error)]
pub enum ManeuverError {
    #[error("Drive failure during maneuver: {0}")]
    Drive(#[from] DriveError),

    #[error("Maneuver interrupted by the operator")]
    Interrupted,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ManeuverSequencer {
    pub fn new(params: AvoidParams, safe_distance_cm: f64) -> Self {
        Self {
            params,
            safe_distance_cm,
        }
    }

    /// Run the avoidance sequence to completion.
    ///
    /// `state` is kept up to date with the pursuit state matching the current step.
    pub fn run(
        &self,
        ctx: &mut CycleCtx,
        state: &mut PursuitState,
    ) -> Result<ManeuverOutcome, ManeuverError> {
        let mut step = MnvrStep::Settle;
        let mut left_blocked = true;
        let mut right_blocked = true;
        let mut num_retreats = 0u32;

        loop {
            if ctx.aborted() {
                return Err(ManeuverError::Interrupted);
            }

            let new_state = step.pursuit_state();
            if *state != new_state {
                debug!("Avoidance {:?}: {} -> {}", step, state, new_state);
                *state = new_state;
            }

            step = match step {
                MnvrStep::Settle => {
                    ctx.drive.stop()?;
                    self.hold(ctx, self.params.settle_delay_s)?;
                    MnvrStep::ProbeLeft
                }
                MnvrStep::ProbeLeft => {
                    ctx.status.report("Checking left...");
                    left_blocked = self.probe(ctx, Side::Left)?;
                    MnvrStep::ProbeRight
                }
                MnvrStep::ProbeRight => {
                    ctx.status.report("Checking right...");
                    right_blocked = self.probe(ctx, Side::Right)?;
                    MnvrStep::Decide
                }
                MnvrStep::Decide => {
                    debug!(
                        "Probe results: left {}, right {}",
                        blocked_str(left_blocked),
                        blocked_str(right_blocked)
                    );
                    decide(
                        left_blocked,
                        right_blocked,
                        num_retreats,
                        self.params.max_retreats,
                    )
                }
                MnvrStep::DetourLeft => {
                    ctx.status.report("Path clear on left, turning left...");
                    self.detour(ctx, Side::Left)?;
                    info!("Detoured left");
                    return Ok(ManeuverOutcome::Cleared(Side::Left));
                }
                MnvrStep::DetourRight => {
                    ctx.status.report("Path clear on right, turning right...");
                    self.detour(ctx, Side::Right)?;
                    info!("Detoured right");
                    return Ok(ManeuverOutcome::Cleared(Side::Right));
                }
                MnvrStep::Retreat => {
                    num_retreats += 1;
                    ctx.status.report("Obstacles both sides, moving backwards...");
                    info!(
                        "Both sides blocked, retreating ({}/{})",
                        num_retreats, self.params.max_retreats
                    );
                    self.drive_for(
                        ctx,
                        DriveCommand::reverse(self.params.retreat_speed),
                        self.params.retreat_duration_s,
                    )?;
                    MnvrStep::Settle
                }
                MnvrStep::Surrounded => {
                    ctx.drive.stop()?;
                    warn!("Still blocked after {} retreats, giving up", num_retreats);
                    ctx.status.report(MSG_SURROUNDED);
                    return Ok(ManeuverOutcome::Surrounded);
                }
            };
        }
    }

    /// Pivot toward `side`, sample whether it is blocked, then pivot back. Returns true if the
    /// side is blocked.
    fn probe(&self, ctx: &mut CycleCtx, side: Side) -> Result<bool, ManeuverError> {
        self.pivot(ctx, side)?;
        self.hold(ctx, self.params.probe_pause_s)?;

        let blocked = self.side_blocked(ctx);

        self.pivot(ctx, side.opposite())?;
        self.hold(ctx, self.params.probe_pause_s)?;

        Ok(blocked)
    }

    fn detour(&self, ctx: &mut CycleCtx, side: Side) -> Result<(), ManeuverError> {
        self.pivot(ctx, side)?;
        self.drive_for(
            ctx,
            DriveCommand::straight(self.params.detour_speed),
            self.params.detour_clearance_s,
        )
    }

    fn pivot(&self, ctx: &mut CycleCtx, side: Side) -> Result<(), ManeuverError> {
        let speed = self.params.pivot_speed;

        match side {
            Side::Left => self.drive_for(
                ctx,
                DriveCommand::PivotLeft { speed },
                self.params.probe_duration_s,
            ),
            Side::Right => self.drive_for(
                ctx,
                DriveCommand::PivotRight { speed },
                self.params.probe_duration_s + self.params.right_pivot_trim_s,
            ),
        }
    }

    /// Execute `cmd` for `duration_s` and then stop.
    fn drive_for(
        &self,
        ctx: &mut CycleCtx,
        cmd: DriveCommand,
        duration_s: f64,
    ) -> Result<(), ManeuverError> {
        if ctx.aborted() {
            return Err(ManeuverError::Interrupted);
        }

        ctx.drive.execute(&cmd)?;

        if let Err(e) = self.hold(ctx, duration_s) {
            ctx.drive.stop().ok();
            return Err(e);
        }

        ctx.drive.stop()?;

        Ok(())
    }

    /// Wait for `duration_s`, checking for an interrupt every poll interval.
    fn hold(&self, ctx: &CycleCtx, duration_s: f64) -> Result<(), ManeuverError> {
        let end_s = ctx.clock.now_s() + duration_s;
        let poll_s = self.params.poll_interval_s.max(MIN_POLL_INTERVAL_S);

        loop {
            if ctx.aborted() {
                return Err(ManeuverError::Interrupted);
            }

            let remaining_s = end_s - ctx.clock.now_s();
            if remaining_s <= HOLD_TOLERANCE_S {
                return Ok(());
            }

            ctx.clock.sleep_s(remaining_s.min(poll_s));
        }
    }

    /// A side is blocked if the camera sees an obstacle, the range is inside the safe distance,
    /// or either reading is unavailable.
    fn side_blocked(&self, ctx: &mut CycleCtx) -> bool {
        let now_s = ctx.clock.now_s();

        let camera_blocked = match ctx.sensors.snapshot(now_s) {
            Some(s) => s.obstacle_present,
            None => {
                warn!("No perception while probing, assuming blocked");
                true
            }
        };

        let range_blocked = match ctx.sensors.range(now_s) {
            Some(r) => r.within(self.safe_distance_cm),
            None => {
                warn!("No range while probing, assuming blocked");
                true
            }
        };

        camera_blocked || range_blocked
    }
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl MnvrStep {
    /// Pursuit state reported while this step is running.
    pub fn pursuit_state(self) -> PursuitState {
        match self {
            MnvrStep::ProbeLeft => PursuitState::ProbingLeft,
            MnvrStep::ProbeRight => PursuitState::ProbingRight,
            MnvrStep::DetourLeft | MnvrStep::DetourRight => PursuitState::Detouring,
            MnvrStep::Settle | MnvrStep::Decide | MnvrStep::Retreat | MnvrStep::Surrounded => {
                PursuitState::Blocked
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Choose the step after both sides have been probed.
fn decide(left_blocked: bool, right_blocked: bool, num_retreats: u32, max_retreats: u32) -> MnvrStep {
    match (left_blocked, right_blocked) {
        (false, _) => MnvrStep::DetourLeft,
        (true, false) => MnvrStep::DetourRight,
        (true, true) if num_retreats < max_retreats => MnvrStep::Retreat,
        (true, true) => MnvrStep::Surrounded,
    }
}

fn blocked_str(blocked: bool) -> &'static str {
    match blocked {
        true => "blocked",
        false => "clear",
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        cell::RefCell,
        collections::VecDeque,
        sync::{atomic::{AtomicBool, Ordering}, Arc},
    };

    use comms_if::eqpt::{
        perception::{Bearing, PerceptionSnapshot},
        range::RangeReading,
    };

    use crate::{clock::{Clock, SimClock}, drive::SimDrive, sensors::Sensing, status::StatusSink};

    /// Returns queued obstacle flags for each probe sample, clear once the queue is empty.
    struct ProbeSensors<'a> {
        obstacles: VecDeque<Option<bool>>,
        range_cm: Option<f64>,
        num_samples: usize,

        /// Raised on the given sample to simulate an operator interrupt
        abort_on: Option<(usize, &'a AtomicBool)>,
    }

    impl<'a> ProbeSensors<'a> {
        fn new(obstacles: &[Option<bool>]) -> Self {
            Self {
                obstacles: obstacles.iter().copied().collect(),
                range_cm: Some(200.0),
                num_samples: 0,
                abort_on: None,
            }
        }
    }

    impl<'a> Sensing for ProbeSensors<'a> {
        fn snapshot(&mut self, _now_s: f64) -> Option<Arc<PerceptionSnapshot>> {
            self.num_samples += 1;

            if let Some((n, abort)) = self.abort_on {
                if n == self.num_samples {
                    abort.store(true, Ordering::Relaxed);
                }
            }

            match self.obstacles.pop_front().unwrap_or(Some(false)) {
                Some(true) => Some(Arc::new(
                    PerceptionSnapshot::person(Bearing::Centered, 1.0, 0.2).with_obstacle(false),
                )),
                Some(false) => Some(Arc::new(PerceptionSnapshot::empty())),
                None => None,
            }
        }

        fn range(&mut self, _now_s: f64) -> Option<RangeReading> {
            self.range_cm.map(RangeReading::new)
        }
    }

    #[derive(Default)]
    struct Reports(RefCell<Vec<String>>);

    impl StatusSink for Reports {
        fn report(&self, msg: &str) {
            self.0.borrow_mut().push(msg.to_string())
        }
    }

    impl Reports {
        fn count(&self, msg: &str) -> usize {
            self.0.borrow().iter().filter(|m| m.as_str() == msg).count()
        }
    }

    struct Harness {
        drive: SimDrive,
        reports: Reports,
        clock: SimClock,
        abort: AtomicBool,
        state: PursuitState,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                drive: SimDrive::new(),
                reports: Reports::default(),
                clock: SimClock::new(0.0),
                abort: AtomicBool::new(false),
                state: PursuitState::Blocked,
            }
        }

        fn run(
            &mut self,
            seq: &ManeuverSequencer,
            sensors: &mut dyn Sensing,
        ) -> Result<ManeuverOutcome, ManeuverError> {
            let mut ctx = CycleCtx {
                drive: &mut self.drive,
                sensors,
                status: &self.reports,
                clock: &self.clock,
                abort: &self.abort,
            };
            seq.run(&mut ctx, &mut self.state)
        }
    }

    fn sequencer(max_retreats: u32) -> ManeuverSequencer {
        ManeuverSequencer::new(
            AvoidParams {
                max_retreats,
                ..Default::default()
            },
            50.0,
        )
    }

    fn pivot_l() -> DriveCommand {
        DriveCommand::PivotLeft { speed: 45.0 }
    }

    fn pivot_r() -> DriveCommand {
        DriveCommand::PivotRight { speed: 45.0 }
    }

    /// Commands issued by the settle and both probes
    fn probe_prefix() -> Vec<DriveCommand> {
        let s = DriveCommand::Stop;
        vec![s, pivot_l(), s, pivot_r(), s, pivot_r(), s, pivot_l(), s]
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(false, false, 0, 2), MnvrStep::DetourLeft);
        assert_eq!(decide(false, true, 0, 2), MnvrStep::DetourLeft);
        assert_eq!(decide(true, false, 0, 2), MnvrStep::DetourRight);
        assert_eq!(decide(true, true, 1, 2), MnvrStep::Retreat);
        assert_eq!(decide(true, true, 2, 2), MnvrStep::Surrounded);
    }

    #[test]
    fn test_left_clear_right_blocked() {
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[Some(false), Some(true)]);

        let outcome = h.run(&sequencer(3), &mut sensors).unwrap();
        assert_eq!(outcome, ManeuverOutcome::Cleared(Side::Left));
        assert_eq!(h.state, PursuitState::Detouring);

        let history = h.drive.history();
        let prefix = probe_prefix();
        assert_eq!(&history[..prefix.len()], &prefix[..]);

        // After the decision: pivot left then forward, never touching a right pivot
        let after = &history[prefix.len()..];
        assert_eq!(
            after,
            &[
                pivot_l(),
                DriveCommand::Stop,
                DriveCommand::straight(100.0),
                DriveCommand::Stop
            ]
        );
        assert!(!after.contains(&pivot_r()));

        // settle + two probes + detour
        assert!((h.clock.now_s() - 6.1).abs() < 1e-3);
    }

    #[test]
    fn test_both_clear_prefers_left() {
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[Some(false), Some(false)]);

        let outcome = h.run(&sequencer(3), &mut sensors).unwrap();
        assert_eq!(outcome, ManeuverOutcome::Cleared(Side::Left));
    }

    #[test]
    fn test_left_blocked_right_clear() {
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[Some(true), Some(false)]);

        let outcome = h.run(&sequencer(3), &mut sensors).unwrap();
        assert_eq!(outcome, ManeuverOutcome::Cleared(Side::Right));

        let history = h.drive.history();
        let after = &history[probe_prefix().len()..];
        assert_eq!(
            after,
            &[
                pivot_r(),
                DriveCommand::Stop,
                DriveCommand::straight(100.0),
                DriveCommand::Stop
            ]
        );
    }

    #[test]
    fn test_retreat_then_clear() {
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[Some(true), Some(true), Some(false), Some(true)]);

        let outcome = h.run(&sequencer(3), &mut sensors).unwrap();
        assert_eq!(outcome, ManeuverOutcome::Cleared(Side::Left));

        let num_reverse = h
            .drive
            .history()
            .iter()
            .filter(|c| matches!(c, DriveCommand::Backward { .. }))
            .count();
        assert_eq!(num_reverse, 1);
        assert_eq!(sensors.num_samples, 4);
    }

    #[test]
    fn test_surrounded_is_bounded() {
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[Some(true); 64]);

        let outcome = h.run(&sequencer(2), &mut sensors).unwrap();
        assert_eq!(outcome, ManeuverOutcome::Surrounded);
        assert_eq!(h.state, PursuitState::Blocked);

        // Two retreats, three rounds of probing, then give up
        let num_reverse = h
            .drive
            .history()
            .iter()
            .filter(|c| matches!(c, DriveCommand::Backward { .. }))
            .count();
        assert_eq!(num_reverse, 2);
        assert_eq!(sensors.num_samples, 6);

        assert_eq!(h.reports.count(MSG_SURROUNDED), 1);
        assert_eq!(h.drive.last(), Some(&DriveCommand::Stop));
        assert!(!h.drive.history().iter().any(|c| c.is_forward()));
    }

    #[test]
    fn test_missing_readings_count_as_blocked() {
        let mut h = Harness::new();

        // No snapshot on either side
        let mut sensors = ProbeSensors::new(&[None, None]);
        assert_eq!(
            h.run(&sequencer(0), &mut sensors).unwrap(),
            ManeuverOutcome::Surrounded
        );

        // Camera clear but the range is inside the safe distance
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[]);
        sensors.range_cm = Some(30.0);
        assert_eq!(
            h.run(&sequencer(0), &mut sensors).unwrap(),
            ManeuverOutcome::Surrounded
        );

        // No range at all
        let mut h = Harness::new();
        let mut sensors = ProbeSensors::new(&[]);
        sensors.range_cm = None;
        assert_eq!(
            h.run(&sequencer(0), &mut sensors).unwrap(),
            ManeuverOutcome::Surrounded
        );
    }

    #[test]
    fn test_interrupt_mid_probe() {
        let mut h = Harness::new();
        let abort = AtomicBool::new(false);
        let mut sensors = ProbeSensors::new(&[]);
        sensors.abort_on = Some((1, &abort));

        let result = {
            let mut ctx = CycleCtx {
                drive: &mut h.drive,
                sensors: &mut sensors,
                status: &h.reports,
                clock: &h.clock,
                abort: &abort,
            };
            sequencer(3).run(&mut ctx, &mut h.state)
        };

        assert!(matches!(result, Err(ManeuverError::Interrupted)));
        assert_eq!(h.state, PursuitState::ProbingLeft);
        assert_eq!(h.drive.last(), Some(&DriveCommand::Stop));
        assert!(!h.drive.history().iter().any(|c| c.is_forward()));
    }

    #[test]
    fn test_drive_fault() {
        let mut h = Harness::new();
        h.drive = SimDrive::faulty();
        let mut sensors = ProbeSensors::new(&[]);

        assert!(matches!(
            h.run(&sequencer(3), &mut sensors),
            Err(ManeuverError::Drive(_))
        ));
    }
}
