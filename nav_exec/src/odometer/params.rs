//! Parameters for the odometer

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;
use serde::Deserialize;

use crate::hal::Pin;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct Params {
    /// GPIO numbers of the encoder channels
    pub pins: EncoderPins,

    /// How long calibration will wait for an edge before deciding the wheel
    /// isn't turning.
    #[serde(default = "default_calibration_timeout_s")]
    pub calibration_timeout_s: f64
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct EncoderPins {
    pub left_a: Pin,
    pub left_b: Pin,
    pub right_a: Pin,
    pub right_b: Pin
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Params {
    /// The calibration timeout as a duration. Non-finite or negative values give zero.
    pub fn calibration_timeout(&self) -> Duration {
        if self.calibration_timeout_s.is_finite() && self.calibration_timeout_s > 0.0 {
            Duration::from_secs_f64(self.calibration_timeout_s)
        }
        else {
            Duration::from_secs(0)
        }
    }
}

impl EncoderPins {
    /// Pins in `[left_a, left_b, right_a, right_b]` order.
    pub fn as_array(&self) -> [Pin; 4] {
        [self.left_a, self.left_b, self.right_a, self.right_b]
    }
}

impl Default for EncoderPins {
    /// The BeagleBone Black wiring: P9_11, P9_13, P8_7 and P8_8.
    fn default() -> Self {
        Self {
            left_a: 30,
            left_b: 31,
            right_a: 66,
            right_b: 67
        }
    }
}

fn default_calibration_timeout_s() -> f64 {
    2.0
}
