//! # Heading controller
//!
//! A discrete PID controller on the heading error. Its output is the angular
//! velocity correction the wheels should apply.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// PID on the heading error (rad), output in rad/s.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    k_p: f64,
    k_i: f64,
    k_d: f64,

    /// Error at the last update, for the derivative term
    prev_error: f64,

    /// Sum of error * dt since the last reset
    integral: f64
}

/// The individual terms of one controller update.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p, k_i, k_d,
            integral: 0f64,
            prev_error: 0f64
        }
    }

    /// Clear the integral and previous error.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = 0f64;
    }

    /// Update the controller with the error `dt` seconds after the previous
    /// update, returning each term. The output is their sum.
    pub fn update(&mut self, error: f64, dt: f64) -> PidTerms {
        // The integral accumulates nothing over a zero dt anyway, but the
        // derivative is undefined so it's taken as zero.
        self.integral += error * dt;

        let deriv = if dt > 0f64 {
            (error - self.prev_error) / dt
        }
        else {
            0f64
        };

        self.prev_error = error;

        PidTerms {
            p: self.k_p * error,
            i: self.k_i * self.integral,
            d: self.k_d * deriv
        }
    }
}
