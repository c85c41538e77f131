//! DRV8833 dual H-bridge driver
//!
//! Each motor is connected to the bridge through two PWM channels, A and B.
//! With the default (normal) channel polarity the bridge's slow decay truth
//! table gives:
//!
//! | A    | B    | Motor   |
//! |------|------|---------|
//! | high | PWM  | forward |
//! | PWM  | high | reverse |
//! | high | high | brake   |
//!
//! Since the driven input sits high for the "off" part of the cycle the duty
//! written to the channel is inverted, a 100 % speed writes a duty of 0 ns.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex
};
use log::{debug, info, trace};
use serde::Deserialize;

use super::{Motor, MotorDrive, MotorError, MAX_DUTY_CYCLE_PCT};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default PWM period in nanoseconds (2 kHz).
pub const DEFAULT_PERIOD_NS: u32 = 500_000;

/// Polarity at which a duty of 0 gives 0 V and a duty of one period gives the full rail.
const NORMAL_POLARITY: u8 = 0;

const PERIOD_FILE: &str = "period";
const DUTY_FILE: &str = "duty";
const POLARITY_FILE: &str = "polarity";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the DRV8833 driver.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Control directory of each PWM channel.
    pub channels: PwmChannels,

    /// PWM period in nanoseconds.
    #[serde(default = "default_period_ns")]
    pub period_ns: u32,

    /// Optional cape manager slots file, each entry in `overlays` is written to it before the
    /// channels are set up.
    #[serde(default)]
    pub slots_file: Option<PathBuf>,

    #[serde(default)]
    pub overlays: Vec<String>
}

/// sysfs control directories for the four PWM channels.
#[derive(Debug, Clone, Deserialize)]
pub struct PwmChannels {
    pub left_a: PathBuf,
    pub left_b: PathBuf,
    pub right_a: PathBuf,
    pub right_b: PathBuf
}

/// Motor drive through a DRV8833.
pub struct Drv8833 {
    channels: PwmChannels,
    period_ns: u32,

    /// Serialises commands so a stop-then-drive sequence isn't interleaved with another command
    /// to the same bridge.
    lock: Mutex<()>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Drv8833 {
    /// Set up the PWM channels and brake both motors.
    ///
    /// Every channel is given the configured period and normal polarity and is then pulled high.
    pub fn new(params: &Params) -> Result<Self, MotorError> {
        if let Some(ref slots) = params.slots_file {
            for overlay in params.overlays.iter() {
                info!("Loading overlay {} into {:?}", overlay, slots);
                write_value(slots, overlay)?;
            }
        }

        let drv = Self {
            channels: params.channels.clone(),
            period_ns: params.period_ns,
            lock: Mutex::new(())
        };

        for channel in drv.all_channels().iter() {
            write_value(&channel.join(PERIOD_FILE), drv.period_ns)?;
            write_value(&channel.join(POLARITY_FILE), NORMAL_POLARITY)?;
            write_value(&channel.join(DUTY_FILE), drv.period_ns)?;
        }

        debug!("DRV8833 initialised with a period of {} ns", drv.period_ns);

        Ok(drv)
    }

    /// Get the duty in nanoseconds for a speed percentage.
    pub fn duty_ns(&self, duty_cycle_pct: u8) -> Result<u32, MotorError> {
        if duty_cycle_pct > MAX_DUTY_CYCLE_PCT {
            return Err(MotorError::InvalidDutyCycle(duty_cycle_pct))
        }

        let off_fraction = (100 - duty_cycle_pct) as f64 / 100.0;
        Ok((off_fraction * self.period_ns as f64) as u32)
    }

    fn all_channels(&self) -> [&Path; 4] {
        [
            self.channels.left_a.as_path(),
            self.channels.left_b.as_path(),
            self.channels.right_a.as_path(),
            self.channels.right_b.as_path()
        ]
    }

    /// Get the (A, B) channels of a motor.
    fn motor_channels(&self, motor: Motor) -> (&Path, &Path) {
        match motor {
            Motor::Left => (self.channels.left_a.as_path(), self.channels.left_b.as_path()),
            Motor::Right => (self.channels.right_a.as_path(), self.channels.right_b.as_path())
        }
    }

    fn pull_high(&self, channel: &Path) -> Result<(), MotorError> {
        write_value(&channel.join(DUTY_FILE), self.period_ns)
    }

    fn brake(&self, motor: Motor) -> Result<(), MotorError> {
        let (a, b) = self.motor_channels(motor);
        self.pull_high(a)?;
        self.pull_high(b)
    }

    /// Brake the motor, hold `held` high and drive `driven` at the given speed.
    fn spin(
        &self,
        motor: Motor,
        held: &Path,
        driven: &Path,
        duty_cycle_pct: u8
    ) -> Result<(), MotorError> {
        let duty_ns = self.duty_ns(duty_cycle_pct)?;

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        self.brake(motor)?;
        self.pull_high(held)?;
        write_value(&driven.join(DUTY_FILE), duty_ns)?;

        trace!("{:?} motor at {} % ({} ns)", motor, duty_cycle_pct, duty_ns);

        Ok(())
    }
}

impl MotorDrive for Drv8833 {
    fn forward(&self, motor: Motor, duty_cycle_pct: u8) -> Result<(), MotorError> {
        let (a, b) = self.motor_channels(motor);
        self.spin(motor, a, b, duty_cycle_pct)
    }

    fn reverse(&self, motor: Motor, duty_cycle_pct: u8) -> Result<(), MotorError> {
        let (a, b) = self.motor_channels(motor);
        self.spin(motor, b, a, duty_cycle_pct)
    }

    fn stop(&self, motor: Motor) -> Result<(), MotorError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.brake(motor)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_period_ns() -> u32 {
    DEFAULT_PERIOD_NS
}

fn write_value<T: ToString>(path: &Path, value: T) -> Result<(), MotorError> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .and_then(|mut f| f.write_all(value.to_string().as_bytes()))
        .map_err(|source| MotorError::Write {
            path: path.to_path_buf(),
            source
        })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
