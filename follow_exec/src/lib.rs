//! # Person following library
//!
//! This library exposes the control modules of the follow executable so they can be reused and
//! tested by other crates in the workspace.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Obstacle avoidance - timed probe, detour and retreat maneuvers
pub mod avoid;

/// Time source for the control loop
pub mod clock;

/// Everything a control cycle acts through
pub mod cycle;

/// Drive actuation - differential drive primitives and motor drivers
pub mod drive;

/// Executable parameters
pub mod params;

/// Perception - tracking detector output and handing snapshots to the control loop
pub mod perception;

/// Pursuit state machine - follows the person and triggers avoidance
pub mod pursuit;

/// Range sensing - the spike rejecting range filter and sensor drivers
pub mod range;

/// Sensor bundle used by the control loop
pub mod sensors;

/// Status reporting for logs and speech
pub mod status;
