//! Per-waypoint state
//!
//! Everything here lives for a single call to
//! [`super::PositionController::go_to_waypoint`]. The pose carries over
//! between waypoints and the PID is reset for each one.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;
use nalgebra::Vector2;

use super::{DriftPolicy, Params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the navigation to one waypoint.
#[derive(Debug)]
pub(crate) struct SegmentState {
    pub target: Vector2<f64>,

    /// Heading the controller is steering towards
    pub reference_heading: f64,

    pub drift: DriftMonitor,

    /// Set once the target has been within the approach radius, never cleared
    pub approaching: bool,

    pub iteration: u64,
    pub elapsed: Duration,

    /// Wheel distances at the previous tick
    prev_dist: (f64, f64),

    /// Integrated commanded velocities, used in simulation
    sim_dist: (f64, f64)
}

/// Distances travelled since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DistanceDeltas {
    pub left: f64,
    pub right: f64,

    /// Mean of the two wheels
    pub total: f64
}

/// Tracks the distance to the target and decides when the robot is moving
/// away from it for too long.
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    policy: DriftPolicy,
    abort_fraction: f64,

    initial: Option<f64>,
    last: Option<f64>,

    /// Distance when the current run of non-improving ticks started
    onset: f64,

    consecutive: u32
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftStatus {
    /// The distance shrank, or this is the first sample
    Improving,

    /// The distance didn't shrink
    Drifting {
        consecutive: u32,

        /// Growth in distance since the drift started
        growth: f64
    },

    /// The drift has gone on for too long
    Abort
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SegmentState {
    pub fn new(params: &Params, target: Vector2<f64>, reference_heading: f64) -> Self {
        Self {
            target,
            reference_heading,
            drift: DriftMonitor::new(params.drift_policy, params.drift_abort_fraction),
            approaching: false,
            iteration: 0,
            elapsed: Duration::from_secs(0),
            prev_dist: (0.0, 0.0),
            sim_dist: (0.0, 0.0)
        }
    }

    /// Get the distance travelled by each wheel since the previous call, given the distances
    /// since the start of the segment.
    pub fn distance_deltas(&mut self, left: f64, right: f64) -> DistanceDeltas {
        let (prev_left, prev_right) = self.prev_dist;
        self.prev_dist = (left, right);

        DistanceDeltas {
            left: left - prev_left,
            right: right - prev_right,
            total: (left + right) / 2.0 - (prev_left + prev_right) / 2.0
        }
    }

    /// Advance the simulated wheel distances by driving at the given (left, right) velocities
    /// for `dt` seconds, returning the new distances.
    pub fn integrate_velocities(&mut self, velocities: (f64, f64), dt: f64) -> (f64, f64) {
        self.sim_dist.0 += velocities.0 * dt;
        self.sim_dist.1 += velocities.1 * dt;
        self.sim_dist
    }
}

impl DriftMonitor {
    pub fn new(policy: DriftPolicy, abort_fraction: f64) -> Self {
        Self {
            policy,
            abort_fraction,
            initial: None,
            last: None,
            onset: 0.0,
            consecutive: 0
        }
    }

    /// Distance to the target on the first sample.
    pub fn initial(&self) -> Option<f64> {
        self.initial
    }

    /// Feed in the current distance to the target.
    pub fn update(&mut self, distance: f64) -> DriftStatus {
        let last = match self.last.replace(distance) {
            Some(l) => l,
            None => {
                self.initial = Some(distance);
                return DriftStatus::Improving
            }
        };

        if distance < last {
            self.consecutive = 0;
            return DriftStatus::Improving
        }

        if self.consecutive == 0 {
            self.onset = distance;
        }
        self.consecutive = self.consecutive.saturating_add(1);

        let growth = distance - self.onset;

        let abort = match self.policy {
            DriftPolicy::Distance => {
                growth >= self.abort_fraction * self.initial.unwrap_or(distance)
            },
            DriftPolicy::Iterations { max } => self.consecutive > max
        };

        if abort {
            DriftStatus::Abort
        }
        else {
            DriftStatus::Drifting {
                consecutive: self.consecutive,
                growth
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_policy() {
        let mut d = DriftMonitor::new(DriftPolicy::Distance, 0.25);

        assert_eq!(d.update(20.0), DriftStatus::Improving);
        assert_eq!(d.initial(), Some(20.0));
        assert_eq!(d.update(18.0), DriftStatus::Improving);

        // Not moving counts as drifting but doesn't grow
        assert_eq!(d.update(18.0), DriftStatus::Drifting { consecutive: 1, growth: 0.0 });
        assert_eq!(d.update(21.0), DriftStatus::Drifting { consecutive: 2, growth: 3.0 });

        // Getting closer resets the run
        assert_eq!(d.update(20.0), DriftStatus::Improving);
        assert_eq!(d.update(24.0), DriftStatus::Drifting { consecutive: 1, growth: 0.0 });
        assert_eq!(d.update(28.0), DriftStatus::Drifting { consecutive: 2, growth: 4.0 });

        // 5 is a quarter of the initial 20
        assert_eq!(d.update(29.0), DriftStatus::Abort);
    }

    #[test]
    fn test_iterations_policy() {
        let mut d = DriftMonitor::new(DriftPolicy::Iterations { max: 3 }, 0.25);

        d.update(10.0);
        for i in 1..=3 {
            assert!(matches!(
                d.update(10.0 + 100.0 * i as f64),
                DriftStatus::Drifting { consecutive, .. } if consecutive == i
            ));
        }
        assert_eq!(d.update(500.0), DriftStatus::Abort);
    }

    #[test]
    fn test_distance_deltas() {
        let mut seg = SegmentState::new(&Params::default(), Vector2::new(1.0, 1.0), 0.0);

        let d = seg.distance_deltas(1.0, 3.0);
        assert_eq!(d, DistanceDeltas { left: 1.0, right: 3.0, total: 2.0 });

        let d = seg.distance_deltas(1.5, 3.0);
        assert_relative_eq!(d.left, 0.5);
        assert_relative_eq!(d.right, 0.0);
        assert_relative_eq!(d.total, 0.25);

        assert_eq!(seg.integrate_velocities((2.0, -1.0), 0.5), (1.0, -0.5));
        assert_eq!(seg.integrate_velocities((2.0, -1.0), 0.5), (2.0, -1.0));
    }
}
