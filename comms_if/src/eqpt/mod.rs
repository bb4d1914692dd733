//! # Equipment Interface
//!
//! This module defines the interface structures which are passed between equipment and the
//! control loop.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod drive;
pub mod perception;
pub mod range;
