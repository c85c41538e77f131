//! # Navigation Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;
use serde::Deserialize;

use crate::hal::{drv8833, sysfs_gpio::DEFAULT_GPIO_ROOT};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NavExecParams {

    /// Root of the sysfs GPIO interface
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,

    /// Motor driver PWM setup
    pub pwm: drv8833::Params,

    /// The (x, y) waypoints to visit in order, in cm
    pub waypoints: Vec<[f64; 2]>,

    /// Time to wait with the motors stopped before starting each waypoint
    #[serde(default = "default_waypoint_pause_s")]
    pub waypoint_pause_s: f64,

    /// Name of the trajectory log in the session archive, none to not log
    /// the trajectory
    #[serde(default)]
    pub dotlog_name: Option<String>
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_gpio_root() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_ROOT)
}

fn default_waypoint_pause_s() -> f64 {
    1.0
}
