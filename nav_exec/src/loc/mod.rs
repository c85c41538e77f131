//! # Localisation module
//!
//! The robot's pose is estimated by dead reckoning from the wheel odometry,
//! see [`crate::pos_ctrl`]. This module holds the pose type and the
//! interface other components use to read it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, PoisonError, RwLock};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The estimated pose of the robot in the global frame.
///
/// The global frame is anchored at the robot's position and heading when the
/// position controller was created.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    /// Position in centimetres
    pub position_cm: Vector2<f64>,

    /// Heading in radians anticlockwise from the X axis, in the range
    /// (-pi, pi]
    pub heading_rad: f64,

    /// Mission time at which the pose was estimated
    pub timestamp_ms: u64
}

/// A thread safe, read only view of a pose owned elsewhere.
#[derive(Debug, Clone, Default)]
pub struct SharedPose {
    inner: Arc<RwLock<Pose>>
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Something which can report the robot's current pose.
pub trait PoseProvider {
    fn current_pose(&self) -> Pose;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x_cm: f64, y_cm: f64, heading_rad: f64) -> Self {
        Self {
            position_cm: Vector2::new(x_cm, y_cm),
            heading_rad,
            timestamp_ms: 0
        }
    }

    pub fn x(&self) -> f64 {
        self.position_cm[0]
    }

    pub fn y(&self) -> f64 {
        self.position_cm[1]
    }

    /// Unit vector pointing along the heading.
    pub fn forward2(&self) -> Vector2<f64> {
        Vector2::new(self.heading_rad.cos(), self.heading_rad.sin())
    }
}

impl SharedPose {
    /// Replace the shared pose. Only the owner of the pose should call this.
    pub(crate) fn publish(&self, pose: Pose) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = pose;
    }
}

impl PoseProvider for SharedPose {
    fn current_pose(&self) -> Pose {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}
