//! # Drive Equipment Commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::perception::Bearing;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum speed demand, as a percentage of maximum actuation.
pub const MAX_SPEED: f64 = 100.0;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A differential drive demand.
///
/// `speed` is a percentage of maximum actuation between 0 and 100. `bias` multiplies the speed of
/// the inner wheel, which is the wheel on the `toward` side, so the robot arcs toward that side.
/// A `toward` of `Centered` or `None` drives both wheels equally and the bias is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DriveCommand {
    Forward {
        speed: f64,
        bias: f64,
        toward: Bearing,
    },
    Backward {
        speed: f64,
        bias: f64,
        toward: Bearing,
    },
    PivotLeft {
        speed: f64,
    },
    PivotRight {
        speed: f64,
    },
    Stop,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveCommand {
    /// Drive forward in a straight line.
    pub fn straight(speed: f64) -> Self {
        DriveCommand::Forward {
            speed: clamp_speed(speed),
            bias: 1.0,
            toward: Bearing::Centered,
        }
    }

    /// Reverse in a straight line.
    pub fn reverse(speed: f64) -> Self {
        DriveCommand::Backward {
            speed: clamp_speed(speed),
            bias: 1.0,
            toward: Bearing::Centered,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, DriveCommand::Forward { .. })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, DriveCommand::Stop)
    }

    /// Compute the normalised (-1 to +1) left and right wheel demands for this command.
    pub fn wheel_demands(&self) -> (f64, f64) {
        match *self {
            DriveCommand::Forward { speed, bias, toward } => biased(speed, bias, toward),
            DriveCommand::Backward { speed, bias, toward } => {
                let (l, r) = biased(speed, bias, toward);
                (-l, -r)
            }
            DriveCommand::PivotLeft { speed } => {
                let s = clamp_speed(speed) / MAX_SPEED;
                (-s, s)
            }
            DriveCommand::PivotRight { speed } => {
                let s = clamp_speed(speed) / MAX_SPEED;
                (s, -s)
            }
            DriveCommand::Stop => (0.0, 0.0),
        }
    }
}

impl std::fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveCommand::Forward { speed, bias, toward } => {
                write!(f, "Forward({:.0}, {:.2}, {})", speed, bias, toward)
            }
            DriveCommand::Backward { speed, bias, toward } => {
                write!(f, "Backward({:.0}, {:.2}, {})", speed, bias, toward)
            }
            DriveCommand::PivotLeft { speed } => write!(f, "PivotLeft({:.0})", speed),
            DriveCommand::PivotRight { speed } => write!(f, "PivotRight({:.0})", speed),
            DriveCommand::Stop => write!(f, "Stop"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Limit a speed demand to the valid range.
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return 0.0;
    }
    speed.max(0.0).min(MAX_SPEED)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Magnitudes of the (left, right) wheel demands for a biased straight-line command.
fn biased(speed: f64, bias: f64, toward: Bearing) -> (f64, f64) {
    let s = clamp_speed(speed) / MAX_SPEED;
    let inner = s * bias.max(0.0).min(1.0);

    match toward {
        Bearing::Left => (inner, s),
        Bearing::Right => (s, inner),
        Bearing::Centered | Bearing::None => (s, s),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wheel_demands() {
        let fwd_left = DriveCommand::Forward { speed: 50.0, bias: 0.5, toward: Bearing::Left };
        assert_eq!(fwd_left.wheel_demands(), (0.25, 0.5));

        let back_right = DriveCommand::Backward { speed: 100.0, bias: 0.2, toward: Bearing::Right };
        assert_eq!(back_right.wheel_demands(), (-1.0, -0.2));

        assert_eq!(DriveCommand::PivotLeft { speed: 40.0 }.wheel_demands(), (-0.4, 0.4));
        assert_eq!(DriveCommand::PivotRight { speed: 40.0 }.wheel_demands(), (0.4, -0.4));
        assert_eq!(DriveCommand::Stop.wheel_demands(), (0.0, 0.0));
    }

    #[test]
    fn test_centered_ignores_bias() {
        let cmd = DriveCommand::Forward { speed: 80.0, bias: 0.1, toward: Bearing::Centered };
        assert_eq!(cmd.wheel_demands(), (0.8, 0.8));
    }

    #[test]
    fn test_clamp_speed() {
        assert_eq!(clamp_speed(150.0), 100.0);
        assert_eq!(clamp_speed(-3.0), 0.0);
        assert_eq!(clamp_speed(f64::NAN), 0.0);
        assert_eq!(DriveCommand::straight(120.0), DriveCommand::Forward {
            speed: 100.0,
            bias: 1.0,
            toward: Bearing::Centered
        });
    }
}
