//! # Hardware abstraction module
//!
//! The odometer and position controller never touch hardware directly. They
//! are given implementations of two capabilities:
//!
//! - [`DigitalInputs`] - configures GPIO inputs and opens [`EdgeWatcher`]s
//!   which block until one of a set of pins sees a level transition.
//! - [`MotorDrive`] - drives each motor forward or in reverse at a duty cycle
//!   percentage, or stops it.
//!
//! Linux sysfs backends are provided for both, matching the BeagleBone Black
//! wiring the robot was built on.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod gpio;
mod motor;

/// [`MotorDrive`] implementation for a DRV8833 dual H-bridge driven by sysfs PWM channels.
pub mod drv8833;

/// [`DigitalInputs`] implementation using the legacy sysfs GPIO interface.
pub mod sysfs_gpio;

/// Test doubles for the hardware capabilities.
#[cfg(test)]
pub(crate) mod mock;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use gpio::*;
pub use motor::*;
