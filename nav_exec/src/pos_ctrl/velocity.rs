//! Wheel velocity conversions
//!
//! The curves map a wheel's linear velocity onto the PWM duty cycle that
//! produces it. They're straight line fits of `velocity = slope * pct + intercept`
//! to time-to-distance measurements taken with the calibration subcommand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;

use crate::hal::MAX_DUTY_CYCLE_PCT;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Left motor calibration.
pub const LEFT_CURVE: VelocityCurve = VelocityCurve {
    slope: 0.1103,
    intercept: -0.2833
};

/// Right motor calibration.
pub const RIGHT_CURVE: VelocityCurve = VelocityCurve {
    slope: 0.10263,
    intercept: -0.2395
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Linear velocity (cm/s) against duty cycle (%) fit for one motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCurve {
    pub slope: f64,
    pub intercept: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VelocityCurve {
    /// Get the duty cycle percentage for the magnitude of `velocity`.
    ///
    /// The magnitude is clamped to `max_velocity` first. The direction of
    /// rotation is up to the caller.
    pub fn duty_cycle_pct(&self, velocity: f64, max_velocity: f64) -> u8 {
        let mut magnitude = velocity.abs();

        if magnitude > max_velocity {
            trace!(
                "Requested velocity {:.2} is above the maximum {:.2}, clamping",
                velocity, max_velocity
            );
            magnitude = max_velocity;
        }

        let pct = ((magnitude - self.intercept) / self.slope).round();

        pct.max(0.0).min(MAX_DUTY_CYCLE_PCT as f64) as u8
    }
}

/// Get the (left, right) wheel velocities which give the forward velocity
/// `forward` and angular velocity `angular` (rad/s).
///
/// These are the differential drive equations
/// `v_r = (2v + wL) / 2r` and `v_l = (2v - wL) / 2r`.
pub fn wheel_velocities(
    forward: f64,
    angular: f64,
    wheelbase_cm: f64,
    wheel_radius_cm: f64
) -> (f64, f64) {
    let left = (2.0 * forward - angular * wheelbase_cm) / (2.0 * wheel_radius_cm);
    let right = (2.0 * forward + angular * wheelbase_cm) / (2.0 * wheel_radius_cm);

    (left, right)
}
