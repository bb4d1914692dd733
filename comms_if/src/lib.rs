//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software: the data exchanged between
//! the detector, the range sensor, the control loop and the drive hardware.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Data definitions for equipment (detector, ranger, drive)
pub mod eqpt;

/// Network module
pub mod net;
