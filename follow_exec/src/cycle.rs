//! # Cycle context
//!
//! Everything a control cycle acts through, borrowed for the duration of one cycle, and the
//! shutdown sequence run when the control loop exits.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{error, info};

use crate::{
    clock::Clock,
    drive::DriveActuator,
    sensors::Sensing,
    status::{StatusReporter, StatusSink},
};

pub struct CycleCtx<'a> {
    pub drive: &'a mut dyn DriveActuator,
    pub sensors: &'a mut dyn Sensing,
    pub status: &'a dyn StatusSink,
    pub clock: &'a dyn Clock,

    /// Set by the interrupt handler when the operator asks to stop
    pub abort: &'a AtomicBool,
}

impl<'a> CycleCtx<'a> {
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}

/// Stop and disable the drive, then stop the status reporter within `grace`.
///
/// Each step is attempted even if an earlier one fails, so this is safe to run after a drive
/// fault.
pub fn shutdown(drive: &mut dyn DriveActuator, reporter: &mut StatusReporter, grace: Duration) {
    info!("Shutting down");

    if let Err(e) = drive.stop() {
        error!("Could not stop the drive: {}", e);
    }

    if let Err(e) = drive.disable() {
        error!("Could not disable the drive: {}", e);
    }

    reporter.shutdown(grace);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        sync::Arc,
        thread,
        time::Instant,
    };

    use comms_if::eqpt::{drive::DriveCommand, perception::Bearing};

    use crate::{
        drive::SimDrive,
        status::{AnnounceError, Announcer},
    };

    /// Announcer which hangs on every message and ignores cancellation until released.
    struct HungAnnouncer {
        release: Arc<AtomicBool>,
    }

    impl Announcer for HungAnnouncer {
        fn announce(&mut self, _msg: &str) -> Result<(), AnnounceError> {
            while !self.release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }

    #[test]
    fn test_shutdown_after_fault() {
        let release = Arc::new(AtomicBool::new(false));
        let mut reporter = StatusReporter::new(HungAnnouncer {
            release: release.clone(),
        })
        .unwrap();

        reporter.report("Person is too far away, moving forward...");
        thread::sleep(Duration::from_millis(50));

        // The fault which ends the control loop
        let mut drive = SimDrive::faulty();
        assert!(drive.forward(50.0, 1.0, Bearing::Centered).is_err());

        let grace = Duration::from_millis(100);
        let start = Instant::now();
        shutdown(&mut drive, &mut reporter, grace);
        let elapsed = start.elapsed();

        // Stop, then the stop issued by disable
        let history = drive.history();
        assert!(history.len() >= 2);
        assert_eq!(
            &history[history.len() - 2..],
            &[DriveCommand::Stop, DriveCommand::Stop]
        );
        assert!(drive.is_disabled());

        // The hung announcement is waited on twice, then abandoned
        assert!(elapsed >= grace);
        assert!(elapsed < grace * 2 + Duration::from_millis(200));

        // Later reports are dropped without blocking
        reporter.report("ignored");

        release.store(true, Ordering::SeqCst);
    }
}
