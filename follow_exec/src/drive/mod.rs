//! # Drive module
//!
//! Differential drive actuation. [`DriveActuator`] is the interface used by the pursuit machine
//! and the maneuver sequencer, [`SimDrive`] is used off-target, in tests and with `--sim`, while
//! [`l298n::L298nDrive`] drives the real motors.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

/// [`DriveActuator`] implementation for an L298N dual H-bridge on Raspberry Pi GPIO.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub mod l298n;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use comms_if::eqpt::{drive::DriveCommand, perception::Bearing};
use log::{debug, trace};

pub use params::DriveParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of commands kept by a [`SimDrive`] created with [`SimDrive::new`].
pub const DEFAULT_SIM_HISTORY_LEN: usize = 1024;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A differential drive.
///
/// `stop()` must zero the net torque on both wheels immediately and be safe to call at any time,
/// any number of times, including after `disable()`.
pub trait DriveActuator {
    fn forward(&mut self, speed: f64, bias: f64, toward: Bearing) -> Result<(), DriveError>;

    fn backward(&mut self, speed: f64, bias: f64, toward: Bearing) -> Result<(), DriveError>;

    fn pivot_left(&mut self, speed: f64) -> Result<(), DriveError>;

    fn pivot_right(&mut self, speed: f64) -> Result<(), DriveError>;

    fn stop(&mut self) -> Result<(), DriveError>;

    /// Stop and de-energise the motors. Motion commands fail after this is called.
    fn disable(&mut self) -> Result<(), DriveError>;

    /// Dispatch a [`DriveCommand`] to the matching primitive.
    fn execute(&mut self, cmd: &DriveCommand) -> Result<(), DriveError> {
        trace!("Drive command: {}", cmd);

        match *cmd {
            DriveCommand::Forward {
                speed,
                bias,
                toward,
            } => self.forward(speed, bias, toward),
            DriveCommand::Backward {
                speed,
                bias,
                toward,
            } => self.backward(speed, bias, toward),
            DriveCommand::PivotLeft { speed } => self.pivot_left(speed),
            DriveCommand::PivotRight { speed } => self.pivot_right(speed),
            DriveCommand::Stop => self.stop(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated drive which logs and records the commands it is given.
///
/// Only the most recent commands are kept, so a long simulated run doesn't grow without bound.
#[derive(Debug)]
pub struct SimDrive {
    history: VecDeque<DriveCommand>,

    max_history: usize,

    disabled: bool,

    /// If set every motion command fails, used to exercise actuator fault handling.
    fail_motion: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("The drive has been disabled")]
    Disabled,

    #[error("Simulated drive fault")]
    SimFault,

    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    #[error("GPIO error: {0}")]
    Gpio(rppal::gpio::Error),

    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    #[error("PWM error: {0}")]
    Pwm(rppal::pwm::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDrive {
    pub fn new() -> Self {
        Self::with_history_len(DEFAULT_SIM_HISTORY_LEN)
    }

    /// Create a drive which keeps at most `max_history` commands.
    pub fn with_history_len(max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history.min(DEFAULT_SIM_HISTORY_LEN)),
            max_history: max_history.max(1),
            disabled: false,
            fail_motion: false,
        }
    }

    /// Create a drive that fails on every motion command but still stops and disables cleanly.
    pub fn faulty() -> Self {
        Self {
            fail_motion: true,
            ..Self::new()
        }
    }

    /// The retained commands, oldest first.
    pub fn history(&self) -> Vec<DriveCommand> {
        self.history.iter().copied().collect()
    }

    pub fn last(&self) -> Option<&DriveCommand> {
        self.history.back()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn record(&mut self, cmd: DriveCommand) {
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(cmd);
    }

    fn motion(&mut self, cmd: DriveCommand) -> Result<(), DriveError> {
        if self.disabled {
            return Err(DriveError::Disabled);
        }
        if self.fail_motion {
            return Err(DriveError::SimFault);
        }

        debug!("[SimDrive] {}", cmd);
        self.record(cmd);
        Ok(())
    }
}

impl Default for SimDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveActuator for SimDrive {
    fn forward(&mut self, speed: f64, bias: f64, toward: Bearing) -> Result<(), DriveError> {
        self.motion(DriveCommand::Forward {
            speed,
            bias,
            toward,
        })
    }

    fn backward(&mut self, speed: f64, bias: f64, toward: Bearing) -> Result<(), DriveError> {
        self.motion(DriveCommand::Backward {
            speed,
            bias,
            toward,
        })
    }

    fn pivot_left(&mut self, speed: f64) -> Result<(), DriveError> {
        self.motion(DriveCommand::PivotLeft { speed })
    }

    fn pivot_right(&mut self, speed: f64) -> Result<(), DriveError> {
        self.motion(DriveCommand::PivotRight { speed })
    }

    fn stop(&mut self) -> Result<(), DriveError> {
        debug!("[SimDrive] Stop");
        self.record(DriveCommand::Stop);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DriveError> {
        if !self.disabled {
            debug!("[SimDrive] Disabled");
        }
        self.record(DriveCommand::Stop);
        self.disabled = true;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_execute_dispatch() {
        let mut drive = SimDrive::new();

        let cmds = [
            DriveCommand::straight(50.0),
            DriveCommand::PivotLeft { speed: 30.0 },
            DriveCommand::Stop,
        ];

        for c in cmds.iter() {
            drive.execute(c).unwrap();
        }

        assert_eq!(drive.history(), cmds.to_vec());
    }

    #[test]
    fn test_history_bounded() {
        let mut drive = SimDrive::with_history_len(3);

        for i in 0..5 {
            drive.pivot_left(i as f64).unwrap();
        }

        assert_eq!(
            drive.history(),
            vec![
                DriveCommand::PivotLeft { speed: 2.0 },
                DriveCommand::PivotLeft { speed: 3.0 },
                DriveCommand::PivotLeft { speed: 4.0 },
            ]
        );
        assert_eq!(drive.last(), Some(&DriveCommand::PivotLeft { speed: 4.0 }));

        // Drives from new() are bounded too
        let mut drive = SimDrive::new();
        for _ in 0..(DEFAULT_SIM_HISTORY_LEN + 10) {
            drive.stop().unwrap();
        }
        assert_eq!(drive.history().len(), DEFAULT_SIM_HISTORY_LEN);
    }

    #[test]
    fn test_disable() {
        let mut drive = SimDrive::new();
        drive.disable().unwrap();
        drive.disable().unwrap();

        assert!(drive.is_disabled());
        assert!(matches!(
            drive.forward(50.0, 1.0, Bearing::Centered),
            Err(DriveError::Disabled)
        ));

        // Stop remains valid after disabling
        assert!(drive.stop().is_ok());
    }

    #[test]
    fn test_faulty() {
        let mut drive = SimDrive::faulty();
        assert!(drive.pivot_right(50.0).is_err());
        assert!(drive.stop().is_ok());
        assert!(drive.disable().is_ok());
    }
}
