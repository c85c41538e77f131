//! # Position control module
//!
//! Drives the robot to a waypoint given in the global frame.
//!
//! The robot's pose is dead reckoned from the odometer every control tick.
//! Translation uses the heading from before the tick and rotation comes from
//! the difference in wheel travel:
//!
//! ```text
//! x += d * cos(heading)
//! y += d * sin(heading)
//! heading += (d_right - d_left) / wheelbase
//! ```
//!
//! A PID controller on the heading error gives an angular velocity
//! correction, which together with a constant forward velocity is turned into
//! a velocity for each wheel and then, through the motor calibration curves,
//! into duty cycles.
//!
//! Navigation to a waypoint ends when the robot is within the arrival radius
//! of it, or is abandoned when the robot keeps getting further away from it,
//! see [`DriftPolicy`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod controllers;
mod heading;
pub mod params;
mod segment;
mod state;
pub mod velocity;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc
};
use serde::Serialize;
use thiserror::Error;

use crate::{hal::MotorError, odometer::OdometerError};

pub use heading::heading_to;
pub use params::{DriftPolicy, Params, ParamsError};
pub use segment::{DriftMonitor, DriftStatus};
pub use state::PositionController;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle used to cancel navigation from another thread.
///
/// A cancellation ends the waypoint in progress, or the next one to start,
/// with [`WaypointOutcome::Cancelled`] and is then cleared.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How navigation to a waypoint ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaypointOutcome {
    /// The robot is within the arrival radius of the waypoint
    Arrived,

    /// The robot kept moving away from the waypoint
    AbortedDrift,

    /// Cancelled through a [`CancelHandle`]
    Cancelled
}

#[derive(Debug, Error)]
pub enum PosCtrlError {
    #[error("Invalid position control parameters: {0}")]
    Params(#[from] ParamsError),

    #[error("Odometer error: {0}")]
    Odometer(#[from] OdometerError),

    #[error("The odometer has stopped, the pose can no longer be estimated")]
    OdometerFailed,

    #[error("Motor error: {0}")]
    Motor(#[from] MotorError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the cancellation, returning whether one was pending.
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}
