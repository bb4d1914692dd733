//! # Pursuit module
//!
//! The [`PursuitCtrl`] state machine is stepped once per control cycle. Each cycle it takes the
//! latest perception snapshot and range reading and picks one intent, in priority order:
//!
//! 1. `Avoid` - an obstacle blocks the path, hand over to the [`ManeuverSequencer`]
//! 2. `Search` - no person is visible, stop
//! 3. `RangeLost` - the range sensor has gone stale, stop until it recovers
//! 4. `Approach`, `Hold` or `Retreat` - regulate distance to the person using the area of their
//!    bounding box
//!
//! An obstacle which the person is standing in front of does not trigger avoidance.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt::Display;

use log::{debug, info, trace};

use comms_if::eqpt::{
    drive::{clamp_speed, DriveCommand},
    perception::{Bearing, PerceptionSnapshot},
    range::RangeReading,
};

use crate::{
    avoid::{AvoidParams, ManeuverError, ManeuverOutcome, ManeuverSequencer, MSG_SURROUNDED},
    cycle::CycleCtx,
    drive::DriveError,
};

pub use params::PursuitParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PursuitCtrl {
    params: PursuitParams,

    sequencer: ManeuverSequencer,

    state: PursuitState,

    /// Time of the last state transition
    last_transition_s: f64,

    /// The distance band currently acted on
    committed_band: Option<Band>,

    /// A different band that has been observed, and the time it was first observed
    candidate_band: Option<(Band, f64)>,

    /// Last message given to the status reporter
    last_report: Option<String>,

    /// Set once the robot has given up as surrounded, after which it only stops
    halted: bool,
}

/// Result of a single control cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: PursuitState,

    /// The command issued directly by this cycle. After a maneuver this is `Stop`, since every
    /// maneuver leaves the robot stopped.
    pub command: DriveCommand,

    pub person_area: Option<f64>,

    pub range_cm: Option<f64>,

    /// Outcome of the maneuver run this cycle, if any
    pub maneuver: Option<ManeuverOutcome>,

    pub halted: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PursuitState {
    Searching,
    Approaching,
    Holding,
    Retreating,
    ProbingLeft,
    ProbingRight,
    Detouring,
    Blocked,
}

/// What the machine has decided to do this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Intent {
    Avoid,
    Search,
    RangeLost,
    Approach { area: f64 },
    Hold,
    Retreat { area: f64 },
}

/// Position of the person's area relative to the target band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    TooFar,
    InRange,
    TooClose,
}

#[derive(Debug, thiserror::Error)]
pub enum PursuitError {
    #[error("Drive failure: {0}")]
    Drive(#[from] DriveError),

    #[error("Avoidance maneuver failed: {0}")]
    Maneuver(#[from] ManeuverError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PursuitCtrl {
    pub fn new(params: PursuitParams, avoid_params: AvoidParams) -> Self {
        let sequencer = ManeuverSequencer::new(avoid_params, params.safe_distance_cm);

        Self {
            params,
            sequencer,
            state: PursuitState::Searching,
            last_transition_s: 0.0,
            committed_band: None,
            candidate_band: None,
            last_report: None,
            halted: false,
        }
    }

    pub fn state(&self) -> PursuitState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Run one control cycle.
    ///
    /// Sensor problems never cause an error here, they resolve to a stop. Errors are only returned
    /// for drive failures and for an operator interrupt during a maneuver.
    pub fn step(&mut self, ctx: &mut CycleCtx) -> Result<CycleOutcome, PursuitError> {
        let now_s = ctx.clock.now_s();

        if self.halted {
            ctx.drive.stop()?;
            return Ok(self.outcome(DriveCommand::Stop, None, None, None));
        }

        let snapshot = ctx.sensors.snapshot(now_s);
        let range = ctx.sensors.range(now_s);

        let intent = self.decide(snapshot.as_deref(), range, now_s);
        trace!("Intent: {:?}", intent);

        let area = snapshot.as_ref().and_then(|s| s.person_area_fraction);
        let range_cm = range.map(|r| r.distance_cm);

        // The person is only steered toward when a snapshot exists, which all following intents
        // require
        let person = snapshot.as_deref().cloned().unwrap_or_default();

        match intent {
            Intent::Avoid => {
                let outcome = self.enter_avoid(ctx, now_s)?;
                Ok(self.outcome(DriveCommand::Stop, area, range_cm, Some(outcome)))
            }
            Intent::Search => {
                let cmd = self.enter_search(ctx, now_s)?;
                Ok(self.outcome(cmd, area, range_cm, None))
            }
            Intent::RangeLost => {
                let cmd = self.enter_range_lost(ctx, now_s)?;
                Ok(self.outcome(cmd, area, range_cm, None))
            }
            Intent::Approach { area: a } => {
                let cmd = self.enter_approach(ctx, &person, a, now_s)?;
                Ok(self.outcome(cmd, area, range_cm, None))
            }
            Intent::Hold => {
                let cmd = self.enter_hold(ctx, &person, now_s)?;
                Ok(self.outcome(cmd, area, range_cm, None))
            }
            Intent::Retreat { area: a } => {
                let cmd = self.enter_retreat(ctx, &person, a, now_s)?;
                Ok(self.outcome(cmd, area, range_cm, None))
            }
        }
    }

    /// Pick the intent for this cycle.
    fn decide(
        &mut self,
        snapshot: Option<&PerceptionSnapshot>,
        range: Option<RangeReading>,
        now_s: f64,
    ) -> Intent {
        let camera_blocked = snapshot.map(|s| s.path_blocked()).unwrap_or(false);
        let range_blocked = range
            .map(|r| r.within(self.params.safe_distance_cm))
            .unwrap_or(false);

        if camera_blocked || range_blocked {
            return Intent::Avoid;
        }

        // A missing snapshot is treated as no person
        let area = match snapshot.and_then(|s| s.person_area_fraction) {
            Some(a) if snapshot.map(|s| s.person_detected).unwrap_or(false) => a,
            _ => {
                self.reset_band();
                return Intent::Search;
            }
        };

        if range.is_none() {
            self.reset_band();
            return Intent::RangeLost;
        }

        match self.settled_band(self.band(area), now_s) {
            Band::TooFar => Intent::Approach { area },
            Band::InRange => Intent::Hold,
            Band::TooClose => Intent::Retreat { area },
        }
    }

    /// Thresholds are inclusive of the holding band.
    fn band(&self, area: f64) -> Band {
        if area < self.params.min_area {
            Band::TooFar
        }
        else if area > self.params.max_area {
            Band::TooClose
        }
        else {
            Band::InRange
        }
    }

    /// Apply the band settle time, returning the band to act on.
    fn settled_band(&mut self, observed: Band, now_s: f64) -> Band {
        let committed = match self.committed_band {
            Some(b) if self.params.band_settle_s > 0.0 => b,
            _ => {
                self.committed_band = Some(observed);
                self.candidate_band = None;
                return observed;
            }
        };

        if observed == committed {
            self.candidate_band = None;
            return committed;
        }

        match self.candidate_band {
            Some((band, since_s)) if band == observed => {
                if now_s - since_s >= self.params.band_settle_s {
                    debug!("Band {:?} settled, committing", observed);
                    self.committed_band = Some(observed);
                    self.candidate_band = None;
                    observed
                }
                else {
                    committed
                }
            }
            _ => {
                self.candidate_band = Some((observed, now_s));
                committed
            }
        }
    }

    fn reset_band(&mut self) {
        self.committed_band = None;
        self.candidate_band = None;
    }

    fn enter_avoid(&mut self, ctx: &mut CycleCtx, now_s: f64) -> Result<ManeuverOutcome, PursuitError> {
        self.set_state(PursuitState::Blocked, now_s);
        self.reset_band();

        // Always announced, maneuvers report their own progress
        self.last_report = None;
        self.report(ctx, "Trying to avoid an obstacle...");

        let mut mnvr_state = self.state;
        let result = self.sequencer.run(ctx, &mut mnvr_state);

        let end_s = ctx.clock.now_s();
        self.set_state(mnvr_state, end_s);
        self.last_report = None;

        let outcome = result?;

        if outcome == ManeuverOutcome::Surrounded {
            info!("Surrounded, halting");
            self.halted = true;
            self.last_report = Some(String::from(MSG_SURROUNDED));
        }

        Ok(outcome)
    }

    fn enter_search(&mut self, ctx: &mut CycleCtx, now_s: f64) -> Result<DriveCommand, PursuitError> {
        self.set_state(PursuitState::Searching, now_s);
        self.report(ctx, "No person detected, waiting...");
        self.issue(ctx, DriveCommand::Stop)
    }

    fn enter_range_lost(
        &mut self,
        ctx: &mut CycleCtx,
        now_s: f64,
    ) -> Result<DriveCommand, PursuitError> {
        self.set_state(PursuitState::Holding, now_s);
        self.report(ctx, "Range sensor lost, stopping...");
        self.issue(ctx, DriveCommand::Stop)
    }

    fn enter_approach(
        &mut self,
        ctx: &mut CycleCtx,
        person: &PerceptionSnapshot,
        area: f64,
        now_s: f64,
    ) -> Result<DriveCommand, PursuitError> {
        self.set_state(PursuitState::Approaching, now_s);
        self.report(ctx, "Person is too far away, moving forward...");

        let error = (self.params.min_area - area) / self.params.min_area;

        self.issue(
            ctx,
            DriveCommand::Forward {
                speed: self.scaled_speed(error),
                bias: person.bias,
                toward: person.bearing,
            },
        )
    }

    fn enter_hold(
        &mut self,
        ctx: &mut CycleCtx,
        person: &PerceptionSnapshot,
        now_s: f64,
    ) -> Result<DriveCommand, PursuitError> {
        self.set_state(PursuitState::Holding, now_s);

        let speed = self.params.hold_turn_speed;

        let (msg, cmd) = match person.bearing {
            Bearing::Left => ("Turning left...", DriveCommand::PivotLeft { speed }),
            Bearing::Right => ("Turning right...", DriveCommand::PivotRight { speed }),
            Bearing::Centered | Bearing::None => ("Distance is OK, stopping...", DriveCommand::Stop),
        };

        self.report(ctx, msg);
        self.issue(ctx, cmd)
    }

    fn enter_retreat(
        &mut self,
        ctx: &mut CycleCtx,
        person: &PerceptionSnapshot,
        area: f64,
        now_s: f64,
    ) -> Result<DriveCommand, PursuitError> {
        self.set_state(PursuitState::Retreating, now_s);
        self.report(ctx, "Person is too close, moving backwards...");

        let error = (area - self.params.max_area) / self.params.max_area;

        self.issue(
            ctx,
            DriveCommand::Backward {
                speed: self.scaled_speed(error),
                bias: person.bias,
                toward: person.bearing,
            },
        )
    }

    fn scaled_speed(&self, error: f64) -> f64 {
        clamp_speed(self.params.speed + self.params.speed_gain * error)
    }

    fn issue(&mut self, ctx: &mut CycleCtx, cmd: DriveCommand) -> Result<DriveCommand, PursuitError> {
        ctx.drive.execute(&cmd)?;
        Ok(cmd)
    }

    /// Report a status message if it differs from the last one reported.
    fn report(&mut self, ctx: &CycleCtx, msg: &str) {
        if self.last_report.as_deref() != Some(msg) {
            ctx.status.report(msg);
            self.last_report = Some(msg.to_string());
        }
    }

    fn set_state(&mut self, new_state: PursuitState, now_s: f64) {
        if new_state != self.state {
            info!(
                "{} -> {} (after {:.1} s)",
                self.state,
                new_state,
                now_s - self.last_transition_s
            );
            self.state = new_state;
            self.last_transition_s = now_s;
        }
    }

    fn outcome(
        &self,
        command: DriveCommand,
        person_area: Option<f64>,
        range_cm: Option<f64>,
        maneuver: Option<ManeuverOutcome>,
    ) -> CycleOutcome {
        CycleOutcome {
            state: self.state,
            command,
            person_area,
            range_cm,
            maneuver,
            halted: self.halted,
        }
    }
}

impl PursuitError {
    /// True if the error is an operator interrupt rather than a fault.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, PursuitError::Maneuver(ManeuverError::Interrupted))
    }
}

impl Display for PursuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PursuitState::Searching => "Searching",
            PursuitState::Approaching => "Approaching",
            PursuitState::Holding => "Holding",
            PursuitState::Retreating => "Retreating",
            PursuitState::ProbingLeft => "ProbingLeft",
            PursuitState::ProbingRight => "ProbingRight",
            PursuitState::Detouring => "Detouring",
            PursuitState::Blocked => "Blocked",
        };

        write!(f, "{}", s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque, sync::atomic::AtomicBool, sync::Arc};

    use crate::{clock::SimClock, drive::SimDrive, sensors::Sensing, status::StatusSink};

    /// Sensors returning a fixed snapshot and range, with an optional queue of snapshots which
    /// take priority.
    struct FixedSensors {
        snapshot: Option<PerceptionSnapshot>,
        queued: VecDeque<Option<PerceptionSnapshot>>,
        range_cm: Option<f64>,
    }

    impl FixedSensors {
        fn new(snapshot: Option<PerceptionSnapshot>) -> Self {
            Self {
                snapshot,
                queued: VecDeque::new(),
                range_cm: Some(200.0),
            }
        }
    }

    impl Sensing for FixedSensors {
        fn snapshot(&mut self, _now_s: f64) -> Option<Arc<PerceptionSnapshot>> {
            match self.queued.pop_front() {
                Some(s) => s.map(Arc::new),
                None => self.snapshot.clone().map(Arc::new),
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

    struct Rig {
        ctrl: PursuitCtrl,
        drive: SimDrive,
        sensors: FixedSensors,
        reports: Reports,
        clock: SimClock,
        abort: AtomicBool,
    }

    impl Rig {
        fn new(snapshot: Option<PerceptionSnapshot>) -> Self {
            Self::with_params(snapshot, PursuitParams::default())
        }

        fn with_params(snapshot: Option<PerceptionSnapshot>, params: PursuitParams) -> Self {
            Self {
                ctrl: PursuitCtrl::new(params, AvoidParams::default()),
                drive: SimDrive::new(),
                sensors: FixedSensors::new(snapshot),
                reports: Reports::default(),
                clock: SimClock::new(0.0),
                abort: AtomicBool::new(false),
            }
        }

        fn step(&mut self) -> Result<CycleOutcome, PursuitError> {
            let mut ctx = CycleCtx {
                drive: &mut self.drive,
                sensors: &mut self.sensors,
                status: &self.reports,
                clock: &self.clock,
                abort: &self.abort,
            };
            let out = self.ctrl.step(&mut ctx);
            self.clock.advance(0.1);
            out
        }

        fn count_reports(&self, msg: &str) -> usize {
            self.reports.0.borrow().iter().filter(|m| m.as_str() == msg).count()
        }
    }

    fn person(area: f64) -> PerceptionSnapshot {
        PerceptionSnapshot::person(Bearing::Centered, 1.0, area)
    }

    #[test]
    fn test_approach_then_retreat() {
        let mut rig = Rig::new(Some(person(0.2)));

        let out = rig.step().unwrap();
        assert_eq!(out.state, PursuitState::Approaching);
        match out.command {
            DriveCommand::Forward { speed, bias, .. } => {
                assert!((bias - 1.0).abs() < 1e-9);
                let expected = 50.0 + 50.0 * (0.35 - 0.2) / 0.35;
                assert!((speed - expected).abs() < 1e-9);
            }
            c => panic!("Expected forward, got {}", c),
        }
        assert_eq!(rig.drive.last(), Some(&out.command));

        rig.sensors.snapshot = Some(person(0.55));
        let out = rig.step().unwrap();
        assert_eq!(out.state, PursuitState::Retreating);
        assert!(matches!(out.command, DriveCommand::Backward { .. }));
    }

    #[test]
    fn test_boundaries_hold() {
        for area in [0.35, 0.5].iter() {
            let mut rig = Rig::new(Some(person(*area)));
            let out = rig.step().unwrap();

            assert_eq!(out.state, PursuitState::Holding);
            assert_eq!(out.command, DriveCommand::Stop);
        }
    }

    #[test]
    fn test_hold_recentres() {
        let mut rig = Rig::new(Some(PerceptionSnapshot::person(Bearing::Left, 0.6, 0.4)));
        let out = rig.step().unwrap();
        assert_eq!(out.state, PursuitState::Holding);
        assert_eq!(out.command, DriveCommand::PivotLeft { speed: 50.0 });

        rig.sensors.snapshot = Some(PerceptionSnapshot::person(Bearing::Right, 0.6, 0.4));
        let out = rig.step().unwrap();
        assert_eq!(out.command, DriveCommand::PivotRight { speed: 50.0 });
    }

    #[test]
    fn test_no_person_is_search() {
        // Both an empty and a missing snapshot are treated as no person
        for snap in [Some(PerceptionSnapshot::empty()), None].iter() {
            let mut rig = Rig::new(Some(person(0.2)));
            rig.step().unwrap();

            rig.sensors.snapshot = snap.clone();
            let out = rig.step().unwrap();

            assert_eq!(out.person_area, None);
            assert_eq!(out.command, DriveCommand::Stop);
            assert_eq!(out.state, PursuitState::Searching);
        }
    }

    #[test]
    fn test_search_iff_no_area() {
        let snaps = vec![
            None,
            Some(PerceptionSnapshot::empty()),
            Some(person(0.1)),
            Some(person(0.4)),
            Some(person(0.9)),
            Some(PerceptionSnapshot::person(Bearing::Right, 0.3, 0.45)),
        ];

        for snap in snaps {
            let mut rig = Rig::new(snap);
            let out = rig.step().unwrap();

            let searching = out.command == DriveCommand::Stop && out.state == PursuitState::Searching;
            assert_eq!(out.person_area.is_none(), searching);
        }
    }

    #[test]
    fn test_obstacle_never_forward() {
        // Person far away, which on its own would mean approaching. Only the cycle's own read
        // sees the obstacle, so both probes find their side clear.
        let mut rig = Rig::new(Some(person(0.1)));
        rig.sensors.queued.push_back(Some(person(0.1).with_obstacle(false)));

        let out = rig.step().unwrap();
        assert_eq!(out.state, PursuitState::Detouring);
        assert!(out.maneuver.is_some());

        // The first command of the cycle is the settle stop, not a forward
        assert_eq!(rig.drive.history()[0], DriveCommand::Stop);
        assert_eq!(rig.count_reports("Trying to avoid an obstacle..."), 1);
    }

    #[test]
    fn test_person_in_front_of_obstacle_is_followed() {
        let mut rig = Rig::new(Some(person(0.2).with_obstacle(true)));
        let out = rig.step().unwrap();

        assert_eq!(out.state, PursuitState::Approaching);
        assert!(out.command.is_forward());
        assert!(out.maneuver.is_none());
    }

    #[test]
    fn test_range_triggers_avoidance() {
        let mut rig = Rig::new(Some(person(0.2)));
        rig.sensors.range_cm = Some(50.0);

        // Range stays inside the safe distance so every probe is blocked until giving up
        let out = rig.step().unwrap();
        assert_eq!(out.maneuver, Some(ManeuverOutcome::Surrounded));
        assert!(!rig.drive.history().iter().any(|c| c.is_forward()));
    }

    #[test]
    fn test_surrounded_halts_and_reports_once() {
        let mut rig = Rig::new(Some(person(0.2).with_obstacle(false)));

        let out = rig.step().unwrap();
        assert!(out.halted);
        assert_eq!(out.state, PursuitState::Blocked);
        assert_eq!(rig.drive.last(), Some(&DriveCommand::Stop));

        // Later cycles only stop, even if the path clears
        rig.sensors.snapshot = Some(person(0.2));
        for _ in 0..5 {
            let out = rig.step().unwrap();
            assert_eq!(out.command, DriveCommand::Stop);
            assert!(out.halted);
        }

        assert!(rig.ctrl.is_halted());
        assert_eq!(rig.count_reports(MSG_SURROUNDED), 1);
    }

    #[test]
    fn test_range_lost_stops() {
        let mut rig = Rig::new(Some(person(0.2)));
        rig.sensors.range_cm = None;

        let out = rig.step().unwrap();
        assert_eq!(out.command, DriveCommand::Stop);
        assert_eq!(out.state, PursuitState::Holding);

        rig.sensors.range_cm = Some(150.0);
        let out = rig.step().unwrap();
        assert_eq!(out.state, PursuitState::Approaching);
    }

    #[test]
    fn test_reports_on_change_only() {
        let mut rig = Rig::new(Some(person(0.2)));
        for _ in 0..5 {
            rig.step().unwrap();
        }
        rig.sensors.snapshot = None;
        rig.step().unwrap();

        assert_eq!(
            *rig.reports.0.borrow(),
            vec![
                String::from("Person is too far away, moving forward..."),
                String::from("No person detected, waiting..."),
            ]
        );
    }

    #[test]
    fn test_band_settle() {
        let params = PursuitParams {
            band_settle_s: 0.25,
            ..Default::default()
        };
        let mut rig = Rig::with_params(Some(person(0.2)), params);

        // t = 0.0 commits straight away
        assert_eq!(rig.step().unwrap().state, PursuitState::Approaching);

        // A brief spike into the retreat band is ignored
        rig.sensors.snapshot = Some(person(0.6));
        assert_eq!(rig.step().unwrap().state, PursuitState::Approaching);
        rig.sensors.snapshot = Some(person(0.2));
        assert_eq!(rig.step().unwrap().state, PursuitState::Approaching);

        // Held long enough it is acted on, t = 0.3 to 0.6
        rig.sensors.snapshot = Some(person(0.6));
        assert_eq!(rig.step().unwrap().state, PursuitState::Approaching);
        assert_eq!(rig.step().unwrap().state, PursuitState::Approaching);
        assert_eq!(rig.step().unwrap().state, PursuitState::Approaching);
        assert_eq!(rig.step().unwrap().state, PursuitState::Retreating);
    }

    #[test]
    fn test_drive_fault_is_error() {
        let mut rig = Rig::new(Some(person(0.2)));
        rig.drive = SimDrive::faulty();

        assert!(matches!(rig.step(), Err(PursuitError::Drive(_))));
    }

    #[test]
    fn test_interrupt_during_avoid() {
        let mut rig = Rig::new(Some(person(0.2).with_obstacle(false)));
        rig.abort.store(true, std::sync::atomic::Ordering::Relaxed);

        let err = rig.step().unwrap_err();
        assert!(err.is_interrupt());
    }
}
