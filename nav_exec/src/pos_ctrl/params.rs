//! Parameters for position control

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for position control.
///
/// Distances are in centimetres and velocities in centimetres per second.
#[derive(Debug, Deserialize, Clone)]
pub struct Params {
    /// Proportional gain of the heading controller
    pub k_p: f64,

    /// Integral gain of the heading controller
    pub k_i: f64,

    /// Derivative gain of the heading controller
    pub k_d: f64,

    /// Distance between the wheels
    pub wheelbase_cm: f64,

    pub wheel_radius_cm: f64,

    /// Wheel velocities are clamped to this before conversion to a duty cycle
    pub max_velocity: f64,

    /// Forward velocity while in transit
    pub cruise_velocity: f64,

    /// Forward velocity once the target is within the approach radius
    pub approach_velocity: f64,

    /// The target is reached when it's no further than this
    pub arrival_radius_cm: f64,

    /// The robot slows down once the target is closer than this
    pub approach_radius_cm: f64,

    /// The waypoint is abandoned once the robot has moved away from the target by this fraction
    /// of the initial distance
    pub drift_abort_fraction: f64,

    #[serde(default)]
    pub drift_policy: DriftPolicy,

    /// Sleep between control ticks
    pub tick_period_ms: u64,

    /// Number of ticks between recomputations of the reference heading
    pub heading_recompute_interval: u32,

    /// Integrate the commanded wheel velocities instead of reading the
    /// odometer, and don't drive the motors.
    #[serde(default)]
    pub simulation: bool
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How sustained movement away from the target is detected.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    /// Abort once the distance to the target has grown by
    /// `drift_abort_fraction` of the initial distance since it started
    /// growing.
    Distance,

    /// Abort after more than `max` consecutive ticks without getting closer.
    Iterations { max: u32 }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("{0} must be positive and finite")]
    NotPositive(&'static str),

    #[error("{0} must be finite and not negative")]
    Negative(&'static str),

    #[error("The approach radius ({approach}) must be larger than the arrival radius ({arrival})")]
    RadiiOrder {
        arrival: f64,
        approach: f64
    },

    #[error("{0} must not exceed the maximum wheel velocity")]
    AboveMaxVelocity(&'static str),

    #[error("The heading recompute interval must be at least one tick")]
    ZeroRecomputeInterval
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let positive = [
            ("wheelbase_cm", self.wheelbase_cm),
            ("wheel_radius_cm", self.wheel_radius_cm),
            ("max_velocity", self.max_velocity),
            ("cruise_velocity", self.cruise_velocity),
            ("approach_velocity", self.approach_velocity),
            ("arrival_radius_cm", self.arrival_radius_cm),
            ("approach_radius_cm", self.approach_radius_cm),
            ("drift_abort_fraction", self.drift_abort_fraction)
        ];
        for (name, value) in positive.iter() {
            if !(value.is_finite() && *value > 0.0) {
                return Err(ParamsError::NotPositive(*name))
            }
        }

        for (name, value) in [("k_p", self.k_p), ("k_i", self.k_i), ("k_d", self.k_d)].iter() {
            if !(value.is_finite() && *value >= 0.0) {
                return Err(ParamsError::Negative(*name))
            }
        }

        if self.approach_radius_cm <= self.arrival_radius_cm {
            return Err(ParamsError::RadiiOrder {
                arrival: self.arrival_radius_cm,
                approach: self.approach_radius_cm
            })
        }

        if self.cruise_velocity > self.max_velocity {
            return Err(ParamsError::AboveMaxVelocity("cruise_velocity"))
        }
        if self.approach_velocity > self.max_velocity {
            return Err(ParamsError::AboveMaxVelocity("approach_velocity"))
        }

        if self.heading_recompute_interval == 0 {
            return Err(ParamsError::ZeroRecomputeInterval)
        }

        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            k_p: 0.90,
            k_i: 0.0005,
            k_d: 0.0,
            wheelbase_cm: 9.0,
            wheel_radius_cm: 2.0,
            max_velocity: 10.0,
            cruise_velocity: 9.0,
            approach_velocity: 3.0,
            arrival_radius_cm: 5.0,
            approach_radius_cm: 10.0,
            drift_abort_fraction: 0.25,
            drift_policy: DriftPolicy::Distance,
            tick_period_ms: 50,
            heading_recompute_interval: 10,
            simulation: false
        }
    }
}

impl Default for DriftPolicy {
    fn default() -> Self {
        DriftPolicy::Distance
    }
}
