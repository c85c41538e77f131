//! # Odometer
//!
//! Decodes the two quadrature wheel encoders into signed tick counts.
//!
//! Each wheel has an optical encoder with two channels, A and B, wired to
//! digital inputs configured to notify on both edges. A background decode
//! thread blocks until any of the four inputs changes, samples all four and
//! steps one [`QuadratureDecoder`] per wheel. The counts are kept behind a
//! single mutex so that both wheels are always read (and reset) together.
//!
//! Ticks convert to linear distance with
//! `2 * pi * wheel_radius * ticks / TICKS_PER_REVOLUTION`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod calibration;
mod decoder;
pub mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::HashSet,
    f64::consts::PI,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError
    },
    thread::{self, JoinHandle},
    time::Duration
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hal::{
    DigitalInputs, Edge, EdgeWaker, EdgeWatcher, GpioError, Level, Motor, Pin, PinDirection,
    WaitEvent
};

pub use calibration::CalibrationError;
pub use decoder::{DecodeStep, QuadratureDecoder};
pub use params::{EncoderPins, Params};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of counted encoder ticks in one wheel revolution.
pub const TICKS_PER_REVOLUTION: f64 = 48.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Wheel encoder odometer.
pub struct Odometer {
    pins: EncoderPins,
    wheel_radius_cm: f64,
    calibration_timeout: Duration,

    inputs: Arc<dyn DigitalInputs>,
    shared: Arc<Shared>,

    worker: Option<Worker>
}

/// Tick and decode error counts for both wheels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncoderCounts {
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub left_errors: u64,
    pub right_errors: u64
}

/// Data shared with the decode thread.
struct Shared {
    counts: Mutex<EncoderCounts>,

    /// The decode thread is running
    running: AtomicBool,

    /// Request for the decode thread to exit
    stop: AtomicBool,

    /// The decode thread exited on an I/O failure
    error: AtomicBool
}

struct Worker {
    jh: JoinHandle<()>,
    waker: Arc<dyn EdgeWaker>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One of the two encoded wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    Left,
    Right
}

#[derive(Debug, Error)]
pub enum OdometerError {
    #[error("Wheel radius must be positive and finite, got {0} cm")]
    InvalidWheelRadius(f64),

    #[error("GPIO {0} is assigned to more than one encoder channel")]
    DuplicatePin(Pin),

    #[error("Encoder GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("The decode thread is already running")]
    AlreadyRunning,

    #[error("Could not start the decode thread: {0}")]
    Spawn(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Odometer {
    /// Create a new odometer.
    ///
    /// All four encoder pins are configured as inputs notifying on both edges. The decode thread
    /// isn't started until [`Odometer::run`] is called.
    pub fn new(
        inputs: Arc<dyn DigitalInputs>,
        params: &Params,
        wheel_radius_cm: f64
    ) -> Result<Self, OdometerError> {
        if !(wheel_radius_cm.is_finite() && wheel_radius_cm > 0.0) {
            return Err(OdometerError::InvalidWheelRadius(wheel_radius_cm))
        }

        let mut seen = HashSet::new();
        for pin in params.pins.as_array().iter() {
            if !seen.insert(*pin) {
                return Err(OdometerError::DuplicatePin(*pin))
            }
        }

        for pin in params.pins.as_array().iter() {
            inputs.configure(*pin, PinDirection::Input, Edge::Both)?;
        }

        debug!(
            "Odometer created on pins {:?} with a {} cm wheel radius",
            params.pins, wheel_radius_cm
        );

        Ok(Self {
            pins: params.pins,
            wheel_radius_cm,
            calibration_timeout: params.calibration_timeout(),
            inputs,
            shared: Arc::new(Shared {
                counts: Mutex::new(EncoderCounts::default()),
                running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                error: AtomicBool::new(false)
            }),
            worker: None
        })
    }

    /// Start the decode thread.
    ///
    /// The encoder inputs are opened before this returns, an open failure sets the error flag and
    /// is returned. Counts are reset before decoding starts.
    pub fn run(&mut self) -> Result<(), OdometerError> {
        if self.is_running() {
            return Err(OdometerError::AlreadyRunning)
        }

        // Collect a thread which exited by itself
        self.stop();

        let watcher = match self.inputs.watch(&self.pins.as_array()) {
            Ok(w) => w,
            Err(e) => {
                error!("Could not open the encoder inputs: {}", e);
                self.shared.error.store(true, Ordering::SeqCst);
                return Err(OdometerError::Gpio(e))
            }
        };
        let waker = watcher.waker();

        self.reset();
        self.shared.error.store(false, Ordering::SeqCst);
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let jh = thread::Builder::new()
            .name("odometer::decode".into())
            .spawn(move || decode_thread(shared, watcher))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                OdometerError::Spawn(e)
            })?;

        self.worker = Some(Worker { jh, waker });

        info!("Odometer started");

        Ok(())
    }

    /// Stop the decode thread and wait for it to exit.
    ///
    /// The thread is woken from its wait so this returns promptly. If the wake can't be delivered
    /// the thread is left to exit on the next edge.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);

        let worker = match self.worker.take() {
            Some(w) => w,
            None => return
        };

        if let Err(e) = worker.waker.wake() {
            warn!("Could not wake the decode thread, it will exit on the next edge: {}", e);
            return
        }

        if worker.jh.join().is_err() {
            error!("The decode thread panicked");
        }

        self.shared.running.store(false, Ordering::SeqCst);

        debug!("Odometer stopped");
    }

    /// Zero the tick and error counts of both wheels.
    pub fn reset(&self) {
        *self.shared.lock_counts() = EncoderCounts::default();
    }

    /// Get the counts of both wheels as of the same instant.
    pub fn snapshot(&self) -> EncoderCounts {
        *self.shared.lock_counts()
    }

    /// Get the (left, right) tick counts.
    pub fn odometry(&self) -> (i64, i64) {
        let c = self.snapshot();
        (c.left_ticks, c.right_ticks)
    }

    /// Get the (left, right) distance travelled in centimetres.
    pub fn distance(&self) -> (f64, f64) {
        let (left, right) = self.odometry();
        (self.ticks_to_cm(left), self.ticks_to_cm(right))
    }

    /// Get the (left, right) decode error counts.
    pub fn error_count(&self) -> (u64, u64) {
        let c = self.snapshot();
        (c.left_errors, c.right_errors)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether the decode thread exited because of an I/O failure.
    pub fn has_error(&self) -> bool {
        self.shared.error.load(Ordering::SeqCst)
    }

    pub fn wheel_radius_cm(&self) -> f64 {
        self.wheel_radius_cm
    }

    /// Convert a tick count into centimetres travelled.
    pub fn ticks_to_cm(&self, ticks: i64) -> f64 {
        2.0 * PI * self.wheel_radius_cm * (ticks as f64) / TICKS_PER_REVOLUTION
    }
}

impl Drop for Odometer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl EncoderCounts {
    /// Apply one decoded sample for each wheel.
    fn apply(&mut self, left: DecodeStep, right: DecodeStep) {
        self.apply_wheel(Wheel::Left, left);
        self.apply_wheel(Wheel::Right, right);
    }

    fn apply_wheel(&mut self, wheel: Wheel, step: DecodeStep) {
        let (ticks, errors) = match wheel {
            Wheel::Left => (&mut self.left_ticks, &mut self.left_errors),
            Wheel::Right => (&mut self.right_ticks, &mut self.right_errors)
        };

        *ticks += step.delta;
        if step.invalid {
            *errors += 1;
        }
    }
}

impl Shared {
    /// The counts are plain integers so a poisoned lock still holds consistent data.
    fn lock_counts(&self) -> MutexGuard<EncoderCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Wheel {
    /// The motor which turns this wheel.
    pub fn motor(self) -> Motor {
        match self {
            Wheel::Left => Motor::Left,
            Wheel::Right => Motor::Right
        }
    }
}

impl EncoderPins {
    /// Get the (A, B) pins of a wheel.
    pub fn for_wheel(&self, wheel: Wheel) -> (Pin, Pin) {
        match wheel {
            Wheel::Left => (self.left_a, self.left_b),
            Wheel::Right => (self.right_a, self.right_b)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn decode_thread(shared: Arc<Shared>, mut watcher: Box<dyn EdgeWatcher>) {
    let mut left = QuadratureDecoder::new();
    let mut right = QuadratureDecoder::new();
    let mut levels = [Level::Low; 4];

    if let Err(e) = decode_loop(&shared, watcher.as_mut(), &mut left, &mut right, &mut levels) {
        error!("Encoder I/O failure, odometry has stopped: {}", e);
        shared.error.store(true, Ordering::SeqCst);
    }

    shared.running.store(false, Ordering::SeqCst);
}

fn decode_loop(
    shared: &Shared,
    watcher: &mut dyn EdgeWatcher,
    left: &mut QuadratureDecoder,
    right: &mut QuadratureDecoder,
    levels: &mut [Level; 4]
) -> Result<(), GpioError> {
    // Start from the current levels rather than assuming both channels are low
    watcher.read_levels(levels)?;
    left.step(levels[0], levels[1]);
    right.step(levels[2], levels[3]);

    while !shared.stop.load(Ordering::SeqCst) {
        match watcher.wait(None)? {
            WaitEvent::Edge => (),
            WaitEvent::Woken | WaitEvent::TimedOut => continue
        }

        watcher.read_levels(levels)?;

        let l = left.step(levels[0], levels[1]);
        let r = right.step(levels[2], levels[3]);

        if l.invalid {
            debug!("Left encoder double transition to {:?}", &levels[..2]);
        }
        if r.invalid {
            debug!("Right encoder double transition to {:?}", &levels[2..]);
        }

        shared.lock_counts().apply(l, r);
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::hal::mock::{EncoderSim, ScriptFeeder, ScriptedInputs};
    use approx::assert_relative_eq;
    use std::time::Instant;

    pub(crate) fn test_params() -> Params {
        Params {
            pins: EncoderPins::default(),
            calibration_timeout_s: 0.1
        }
    }

    pub(crate) fn scripted_odometer(radius: f64) -> (Odometer, Arc<ScriptedInputs>, ScriptFeeder) {
        let (inputs, feeder) = ScriptedInputs::new();
        let inputs = Arc::new(inputs);
        let odo = Odometer::new(inputs.clone(), &test_params(), radius).unwrap();
        (odo, inputs, feeder)
    }

    /// Poll until the condition holds, panicking after a couple of seconds.
    pub(crate) fn wait_for<F: Fn() -> bool>(cond: F) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(2), "condition not met in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_new() {
        let (odo, inputs, _feeder) = scripted_odometer(2.0);
        assert!(!odo.is_running());
        assert_eq!(odo.snapshot(), EncoderCounts::default());

        let configured = inputs.configured.lock().unwrap().clone();
        assert_eq!(configured.len(), 4);
        assert!(configured
            .iter()
            .all(|(_, dir, edge)| *dir == PinDirection::Input && *edge == Edge::Both));

        let (inputs, _) = ScriptedInputs::new();
        let inputs: Arc<dyn DigitalInputs> = Arc::new(inputs);
        assert!(matches!(
            Odometer::new(inputs.clone(), &test_params(), 0.0),
            Err(OdometerError::InvalidWheelRadius(_))
        ));
        assert!(matches!(
            Odometer::new(inputs.clone(), &test_params(), f64::NAN),
            Err(OdometerError::InvalidWheelRadius(_))
        ));

        let mut params = test_params();
        params.pins.right_b = params.pins.left_a;
        assert!(matches!(
            Odometer::new(inputs, &params, 2.0),
            Err(OdometerError::DuplicatePin(30))
        ));
    }

    #[test]
    fn test_configure_failure() {
        let (inputs, _) = ScriptedInputs::new();
        inputs.fail_configure.store(true, Ordering::SeqCst);
        assert!(matches!(
            Odometer::new(Arc::new(inputs), &test_params(), 2.0),
            Err(OdometerError::Gpio(GpioError::Configure { .. }))
        ));
    }

    #[test]
    fn test_decode_thread() {
        let (mut odo, _inputs, feeder) = scripted_odometer(2.0);
        let mut sim = EncoderSim::new(EncoderPins::default().as_array());

        odo.run().unwrap();
        assert!(odo.is_running());
        assert!(matches!(odo.run(), Err(OdometerError::AlreadyRunning)));

        sim.feed(&feeder, 12, 1, 1);
        wait_for(|| odo.odometry() == (12, 12));

        // Left wheel backwards, right wheel held
        sim.feed(&feeder, 5, -1, 0);
        wait_for(|| odo.odometry() == (7, 12));
        assert_eq!(odo.error_count(), (0, 0));

        let (l, r) = odo.distance();
        assert_relative_eq!(l, 2.0 * PI * 2.0 * 7.0 / 48.0);
        assert_relative_eq!(r, PI);

        // Double transition on the right wheel from 00 to 11
        feeder.edge(vec![(66, Level::High), (67, Level::High)]);
        wait_for(|| odo.error_count() == (0, 1));
        assert_eq!(odo.odometry(), (7, 12));

        odo.reset();
        assert_eq!(odo.odometry(), (0, 0));
        assert_eq!(odo.error_count(), (0, 0));

        odo.stop();
        assert!(!odo.is_running());
        assert!(!odo.has_error());
    }

    #[test]
    fn test_distance_scales_with_radius() {
        let (mut small, _i, small_feeder) = scripted_odometer(2.0);
        let (mut large, _j, large_feeder) = scripted_odometer(4.0);

        small.run().unwrap();
        large.run().unwrap();

        EncoderSim::new(EncoderPins::default().as_array()).feed(&small_feeder, 24, 1, -1);
        EncoderSim::new(EncoderPins::default().as_array()).feed(&large_feeder, 24, 1, -1);

        wait_for(|| small.odometry() == (24, -24) && large.odometry() == (24, -24));

        let (sl, sr) = small.distance();
        let (ll, lr) = large.distance();
        assert_relative_eq!(sl, 2.0 * PI);
        assert_relative_eq!(sr, -2.0 * PI);
        assert_relative_eq!(ll, 2.0 * sl);
        assert_relative_eq!(lr, 2.0 * sr);
    }

    #[test]
    fn test_concurrent_reset() {
        let (mut odo, _inputs, feeder) = scripted_odometer(2.0);
        odo.run().unwrap();

        let feed = thread::spawn(move || {
            EncoderSim::new(EncoderPins::default().as_array()).feed(&feeder, 2000, 1, 1);
            feeder
        });

        // Both wheels move together and are reset together, so any snapshot must agree
        for _ in 0..500 {
            odo.reset();
            let c = odo.snapshot();
            assert_eq!(c.left_ticks, c.right_ticks);
            assert!(c.left_ticks >= 0 && c.left_ticks <= 2000);
            assert_eq!(c.left_errors, 0);
        }

        let _feeder = feed.join().unwrap();
    }

    #[test]
    fn test_stop_latency() {
        let (mut odo, _inputs, _feeder) = scripted_odometer(2.0);
        odo.run().unwrap();

        // Nothing is moving so the thread is blocked waiting for an edge
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        odo.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!odo.is_running());

        // Can be restarted
        odo.run().unwrap();
        assert!(odo.is_running());
    }

    #[test]
    fn test_io_failure() {
        let (mut odo, inputs, feeder) = scripted_odometer(2.0);
        odo.run().unwrap();

        feeder.fail_read();
        wait_for(|| !odo.is_running());
        assert!(odo.has_error());

        // Failing to open the inputs is reported straight away
        odo.stop();
        inputs.fail_watch.store(true, Ordering::SeqCst);
        assert!(matches!(odo.run(), Err(OdometerError::Gpio(GpioError::Open { .. }))));
        assert!(odo.has_error());
        assert!(!odo.is_running());
    }
}
