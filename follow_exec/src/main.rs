//! Person following executable entry point.
//!
//! # Architecture
//!
//! The executable runs a single fixed period control loop:
//!
//!     - Initialise the session, logging and parameters
//!     - Initialise the status reporter, sensors and drive
//!     - Main loop:
//!         - Pursuit processing (which may run a blocking avoidance maneuver)
//!         - Cycle archiving
//!         - Cycle management
//!     - Shutdown: stop, disable the drive, stop the status reporter
//!
//! Perception arrives from the network detector or, with `--script`, from a perception script.
//! With `--sim`, or when not running on a Raspberry Pi, the drive and range sensor are simulated.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};
use structopt::StructOpt;

// Internal
use comms_if::net::{zmq, NetParams};
use follow_lib::{
    clock::SessionClock,
    cycle::{self, CycleCtx},
    drive::{DriveActuator, DriveError, DriveParams, SimDrive},
    params::FollowExecParams,
    perception::{DetClient, PerceptionSource, ScriptedPerception, SnapshotSlot, Tracker},
    pursuit::{CycleOutcome, PursuitCtrl},
    range::{RangeError, RangeMonitor, RangeParams, RangeSensor, SimRange},
    sensors::Sensors,
    status::{LogAnnouncer, SpeechAnnouncer, StatusReporter},
};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    script_interpreter::ScriptInterpreter,
    session::{self, Session},
    time::seconds_to_std,
};

#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
use follow_lib::{drive::l298n::L298nDrive, range::hc_sr04::HcSr04};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Distance reported by the simulated range sensor when no script sets it.
///
/// Units: centimeters
const SIM_CLEAR_RANGE_CM: f64 = 200.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "follow_exec", about = "Person following robot control executable")]
struct Opts {
    /// Parameter file, relative to $FOLLOW_SW_ROOT/params unless absolute
    #[structopt(long, default_value = "follow_exec.toml")]
    params: String,

    /// Replay a perception script instead of connecting to the detector
    #[structopt(long, parse(from_os_str))]
    script: Option<PathBuf>,

    /// Use the simulated drive and range sensor
    #[structopt(long)]
    sim: bool,

    /// Log at trace level
    #[structopt(short, long)]
    verbose: bool,
}

/// One row of the cycle archive.
#[derive(Serialize)]
struct CycleRecord {
    cycle: u64,
    time_s: f64,
    state: String,
    command: String,
    person_area: Option<f64>,
    range_cm: Option<f64>,
    halted: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("follow_exec", "sessions").wrap_err("Failed to create the session")?;

    let min_level = match opts.verbose {
        true => LevelFilter::Trace,
        false => LevelFilter::Debug,
    };
    logger_init(min_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Person Following Executable\n");
    info!(
        "Running on: {}",
        host::get_hostname().unwrap_or_else(|| String::from("unknown host"))
    );
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opts);

    // ---- LOAD PARAMETERS ----

    let params: FollowExecParams = match Path::new(&opts.params).is_absolute() {
        true => util::params::load_path(&opts.params),
        false => util::params::load(&opts.params),
    }
    .wrap_err("Could not load the follow_exec parameters")?;

    info!("Parameters loaded from {}", opts.params);

    // ---- INTERRUPT HANDLER ----

    let abort = Arc::new(AtomicBool::new(false));
    {
        let abort = abort.clone();
        ctrlc::set_handler(move || abort.store(true, Ordering::Relaxed))
            .wrap_err("Failed to set the interrupt handler")?;
    }

    // ---- STATUS REPORTER ----

    let mut reporter = match params.status.speech {
        true => StatusReporter::new(SpeechAnnouncer::new(&params.status)),
        false => StatusReporter::new(LogAnnouncer),
    }
    .wrap_err("Failed to start the status reporter")?;

    info!("Status reporter initialised");

    // ---- SENSORS ----

    let now_s = session::get_elapsed_seconds();

    let (range_sensor, sim_range) = init_range(opts.sim, &params.range)
        .wrap_err("Failed to initialise the range sensor")?;
    let range_monitor = RangeMonitor::new(range_sensor, &params.range, now_s);

    // The detector client and its context must outlive the loop
    let zmq_ctx = zmq::Context::new();
    let mut _det_client: Option<DetClient> = None;

    let perception: Box<dyn PerceptionSource> = match opts.script {
        Some(ref path) => {
            info!("Loading perception script from {:?}", path);
            let si = ScriptInterpreter::new(path).wrap_err("Failed to load the script")?;
            Box::new(ScriptedPerception::new(si, sim_range, params.script_end_hold_s))
        }
        None => {
            let net_params: NetParams =
                util::params::load("net.toml").wrap_err("Could not load net params")?;

            let slot = SnapshotSlot::new(params.perception_stale_s);
            _det_client = Some(
                DetClient::new(
                    &zmq_ctx,
                    &net_params,
                    Tracker::new(params.tracker.clone()),
                    slot.clone(),
                )
                .wrap_err("Failed to initialise the DetClient")?,
            );
            info!("DetClient initialised");

            Box::new(slot)
        }
    };

    let mut sensors = Sensors::new(perception, range_monitor);

    info!("Sensors initialised");

    // ---- ARCHIVE ----

    let mut archiver = Archiver::from_path(&session, "pursuit/cycles.csv")
        .wrap_err("Failed to create the cycle archive")?;

    // ---- DRIVE ----

    // Created last, so every exit path from here on goes through the shutdown sequence
    let mut drive = init_drive(opts.sim, &params.drive).wrap_err("Failed to initialise the drive")?;

    info!("Drive initialised");

    let mut pursuit = PursuitCtrl::new(params.pursuit.clone(), params.avoid.clone());

    // ---- MAIN LOOP ----

    info!("Initialisation complete, beginning main loop\n");

    let clock = SessionClock;
    let cycle_period = seconds_to_std(params.cycle_period_s);
    let mut num_cycles: u64 = 0;

    let loop_result: Result<(), Report> = loop {
        let cycle_start_instant = Instant::now();

        if abort.load(Ordering::Relaxed) {
            info!("Interrupt received, stopping");
            break Ok(());
        }

        if sensors.finished() {
            info!("End of perception script reached, stopping");
            break Ok(());
        }

        // ---- PURSUIT PROCESSING ----

        let step_result = {
            let mut ctx = CycleCtx {
                drive: drive.as_mut(),
                sensors: &mut sensors,
                status: &reporter,
                clock: &clock,
                abort: &abort,
            };

            pursuit.step(&mut ctx)
        };

        let outcome = match step_result {
            Ok(o) => o,
            Err(e) if e.is_interrupt() => {
                info!("Interrupted during an avoidance maneuver, stopping");
                break Ok(());
            }
            Err(e) => {
                error!("Control loop fault: {}", e);
                break Err(e).wrap_err("The control loop failed");
            }
        };

        // ---- WRITE ARCHIVES ----

        if let Err(e) = archiver.serialise(CycleRecord::new(num_cycles, &outcome)) {
            warn!("Could not archive cycle {}: {}", num_cycles, e);
        }

        if outcome.halted {
            info!("Pursuit has halted, stopping");
            break Ok(());
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            // Maneuver cycles always overrun, so only warn about the others
            None if outcome.maneuver.is_none() => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
            None => (),
        }

        num_cycles += 1;
    };

    // ---- SHUTDOWN ----

    cycle::shutdown(
        drive.as_mut(),
        &mut reporter,
        seconds_to_std(params.status.shutdown_grace_s),
    );

    info!("End of execution after {} cycles", num_cycles);

    loop_result
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CycleRecord {
    fn new(cycle: u64, outcome: &CycleOutcome) -> Self {
        Self {
            cycle,
            time_s: session::get_elapsed_seconds(),
            state: outcome.state.to_string(),
            command: outcome.command.to_string(),
            person_area: outcome.person_area,
            range_cm: outcome.range_cm,
            halted: outcome.halted,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Create the drive, real on the Raspberry Pi unless simulation is requested.
#[allow(unused_variables)]
fn init_drive(sim: bool, params: &DriveParams) -> Result<Box<dyn DriveActuator>, DriveError> {
    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    {
        if !sim {
            return Ok(Box::new(L298nDrive::new(params)?));
        }
    }

    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    {
        if !sim {
            warn!("Motor hardware is only available on the Raspberry Pi, using the simulated drive");
        }
    }

    Ok(Box::new(SimDrive::new()))
}

/// Create the range sensor. If it is simulated a handle to it is also returned so a script can
/// set the distance.
#[allow(unused_variables)]
fn init_range(
    sim: bool,
    params: &RangeParams,
) -> Result<(Box<dyn RangeSensor>, Option<SimRange>), RangeError> {
    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    {
        if !sim {
            return Ok((Box::new(HcSr04::new(params)?), None));
        }
    }

    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    {
        if !sim {
            warn!("The range sensor is only available on the Raspberry Pi, using the simulated sensor");
        }
    }

    let sim_range = SimRange::new(SIM_CLEAR_RANGE_CM);

    Ok((Box::new(sim_range.clone()), Some(sim_range)))
}
