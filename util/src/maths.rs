//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Wrap an angle into the range (-pi, pi].
///
/// The wrap goes through `atan2(sin(a), cos(a))`, so the sine and cosine of
/// the result match those of the input. `atan2` can return exactly `-pi`
/// which is folded back onto `+pi` to keep the interval half open.
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float + FloatConst
{
    let pi_t = T::PI();
    let tau_t = pi_t + pi_t;

    let wrapped = angle.sin().atan2(angle.cos());

    if wrapped <= -pi_t {
        wrapped + tau_t
    }
    else {
        wrapped
    }
}

/// Get the shortest signed angular distance from `from` to `to`, in the range
/// (-pi, pi].
///
/// A positive result means `to` lies anticlockwise of `from`.
pub fn ang_dist_pi<T>(to: T, from: T) -> T
where
    T: Float + FloatConst
{
    wrap_pi(to - from)
}

/// Map a value in the range [-pi, pi] to [0, 2pi)
pub fn map_pi_to_2pi<T>(value: T) -> T
where
    T: Float + FloatConst
{
    let tau_t = T::PI() + T::PI();

    if value < T::zero() {
        tau_t + value
    }
    else {
        value
    }
}
