//! # Navigation library.
//!
//! Wheel odometry and go-to-goal position control for a differential drive
//! robot running on an embedded Linux board. The executable in this crate is a
//! thin driver over these modules.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Hardware abstraction - digital edge inputs and motor drive capabilities with sysfs backends
pub mod hal;

/// Localisation types - the dead reckoned pose and the interface used to share it
pub mod loc;

/// Odometer - decodes the wheel encoders into tick counts and distances
pub mod odometer;

/// Position control - drives the robot to a waypoint using the odometer and a PID heading law
pub mod pos_ctrl;

/// Telemetry - trajectory points recorded for offline plotting
pub mod telemetry;

/// Executable level parameters
pub mod params;
