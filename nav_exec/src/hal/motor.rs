//! Motor drive capability

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest accepted duty cycle percentage.
pub const MAX_DUTY_CYCLE_PCT: u8 = 100;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for driving the two wheel motors.
pub trait MotorDrive: Send + Sync {

    /// Turn the motor forward.
    ///
    /// ## Arguments
    /// - `motor` - The motor to drive
    /// - `duty_cycle_pct` - Duty cycle between 0 and 100. Values outside this range are rejected.
    fn forward(&self, motor: Motor, duty_cycle_pct: u8) -> Result<(), MotorError>;

    /// Turn the motor in reverse, see [`MotorDrive::forward`].
    fn reverse(&self, motor: Motor, duty_cycle_pct: u8) -> Result<(), MotorError>;

    /// Brake the motor.
    fn stop(&self, motor: Motor) -> Result<(), MotorError>;

    /// Drive the motor in the given direction.
    fn drive(&self, motor: Motor, direction: Direction, duty_cycle_pct: u8) -> Result<(), MotorError> {
        match direction {
            Direction::Forward => self.forward(motor, duty_cycle_pct),
            Direction::Reverse => self.reverse(motor, duty_cycle_pct)
        }
    }

    /// Brake both motors.
    ///
    /// Both motors are always commanded, the first error (if any) is returned.
    fn stop_all(&self) -> Result<(), MotorError> {
        let left = self.stop(Motor::Left);
        let right = self.stop(Motor::Right);
        left.and(right)
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One of the two drive motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motor {
    Left,
    Right
}

/// Direction of wheel rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse
}

#[derive(Debug, Error)]
pub enum MotorError {
    #[error("Duty cycle must be between 0 and 100 %, got {0}")]
    InvalidDutyCycle(u8),

    #[error("Could not write PWM control file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Direction {
    /// The direction a signed velocity turns the wheel in. Zero is forward.
    pub fn from_velocity(velocity: f64) -> Self {
        if velocity < 0.0 {
            Direction::Reverse
        }
        else {
            Direction::Forward
        }
    }
}
