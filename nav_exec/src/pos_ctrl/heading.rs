//! Bearing to a target

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use nalgebra::Vector2;
use util::maths::map_pi_to_2pi;

/// X offsets within this are treated as zero to avoid dividing by it.
const ALIGNED_X_TOLERANCE: f64 = 0.01;

/// Get the heading required to drive from `from` to `to`.
///
/// The result is in `[0, 2pi)`, except when `to` and `from` coincide in which
/// case there is no bearing and `current_heading` is returned unchanged.
pub fn heading_to(to: &Vector2<f64>, from: &Vector2<f64>, current_heading: f64) -> f64 {
    let offset = to - from;
    let (x, y) = (offset[0], offset[1]);

    if x.abs() <= ALIGNED_X_TOLERANCE {
        if y > 0.0 {
            FRAC_PI_2
        }
        else if y < 0.0 {
            3.0 * FRAC_PI_2
        }
        else {
            current_heading
        }
    }
    else if x > 0.0 {
        // atan gives (-pi/2, pi/2) here, negative values are moved up a turn.
        // A tiny negative angle rounds up to exactly 2pi when moved.
        let heading = map_pi_to_2pi((y / x).atan());
        if heading >= TAU {
            heading - TAU
        }
        else {
            heading
        }
    }
    else {
        (y / x).atan() + PI
    }
}
