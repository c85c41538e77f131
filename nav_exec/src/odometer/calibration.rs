//! Motor calibration measurement
//!
//! Times how long one wheel takes to turn a number of revolutions at a fixed
//! duty cycle. Repeating this over a range of duty cycles gives the
//! velocity curves used by position control.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};
use log::{debug, info, warn};
use thiserror::Error;

use crate::hal::{
    Direction, EdgeWatcher, GpioError, Level, MotorDrive, MotorError, WaitEvent, MAX_DUTY_CYCLE_PCT
};
use super::{Odometer, QuadratureDecoder, Wheel, TICKS_PER_REVOLUTION};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Calibration can't run while the decode thread is running")]
    AlreadyRunning,

    #[error("Invalid calibration request: {0}")]
    InvalidRequest(&'static str),

    #[error("Encoder GPIO error during calibration: {0}")]
    Gpio(#[from] GpioError),

    #[error("Motor error during calibration: {0}")]
    Motor(#[from] MotorError),

    #[error("No encoder edge within {timeout:?} after {ticks} ticks")]
    Timeout {
        ticks: i64,
        timeout: Duration
    },

    #[error("Double transition on the encoder after {ticks} ticks")]
    InvalidTransition {
        ticks: i64
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Odometer {
    /// Measure how long it takes to turn one wheel the given number of revolutions.
    ///
    /// This blocks until the measurement completes and can't be used while the decode thread is
    /// running. Counts are reset first and the calibrated wheel's ticks are counted as the
    /// measurement progresses. The motor is always stopped before returning.
    ///
    /// The first edge is exempt from the double transition check since the starting phase of the
    /// channels isn't known.
    pub fn time_to_distance(
        &self,
        motors: &dyn MotorDrive,
        wheel: Wheel,
        direction: Direction,
        revolutions: u32,
        speed_pct: u8
    ) -> Result<Duration, CalibrationError> {
        if self.is_running() {
            return Err(CalibrationError::AlreadyRunning)
        }
        if revolutions == 0 {
            return Err(CalibrationError::InvalidRequest("at least one revolution is required"))
        }
        if speed_pct > MAX_DUTY_CYCLE_PCT {
            return Err(CalibrationError::InvalidRequest("speed must be between 0 and 100 %"))
        }

        self.reset();

        let (pin_a, pin_b) = self.pins.for_wheel(wheel);
        debug!("Calibrating {:?} wheel on GPIOs {} and {}", wheel, pin_a, pin_b);

        let mut watcher = self.inputs.watch(&[pin_a, pin_b])?;

        let target_ticks = revolutions as i64 * TICKS_PER_REVOLUTION as i64;
        let motor = wheel.motor();

        let start = Instant::now();
        let measured = motors
            .drive(motor, direction, speed_pct)
            .map_err(CalibrationError::from)
            .and_then(|_| self.count_ticks(watcher.as_mut(), wheel, target_ticks, start));

        let stopped = motors.stop(motor);

        let elapsed = measured?;
        stopped?;

        info!(
            "{:?} wheel turned {} revolutions {:?} at {} % in {:.3} s",
            wheel, revolutions, direction, speed_pct, elapsed.as_secs_f64()
        );

        Ok(elapsed)
    }

    fn count_ticks(
        &self,
        watcher: &mut dyn EdgeWatcher,
        wheel: Wheel,
        target_ticks: i64,
        start: Instant
    ) -> Result<Duration, CalibrationError> {
        let timeout = match self.calibration_timeout {
            t if t > Duration::from_secs(0) => Some(t),
            _ => None
        };

        let mut decoder = QuadratureDecoder::new();
        let mut levels = [Level::Low; 2];
        let mut first = true;
        let mut ticks = 0i64;

        while ticks.abs() < target_ticks {
            match watcher.wait(timeout)? {
                WaitEvent::Edge => (),
                WaitEvent::Woken => continue,
                WaitEvent::TimedOut => {
                    warn!("{:?} wheel calibration timed out after {} ticks", wheel, ticks);
                    return Err(CalibrationError::Timeout {
                        ticks,
                        timeout: self.calibration_timeout
                    })
                }
            }

            watcher.read_levels(&mut levels)?;
            let mut step = decoder.step(levels[0], levels[1]);

            if first {
                step.invalid = false;
                first = false;
            }

            {
                let mut counts = self.shared.lock_counts();
                counts.apply_wheel(wheel, step);
            }

            if step.invalid {
                warn!("{:?} wheel double transition during calibration", wheel);
                return Err(CalibrationError::InvalidTransition { ticks })
            }

            ticks += step.delta;
        }

        Ok(start.elapsed())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
