//! Scripted hardware for tests

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex
    },
    time::Duration
};

use crate::telemetry::{TelemetrySink, TrackPoint};
use util::archive::ArchiveError;
use super::{
    DigitalInputs, Edge, EdgeWaker, EdgeWatcher, GpioError, Level, Motor, MotorDrive, MotorError,
    Pin, PinDirection, WaitEvent, MAX_DUTY_CYCLE_PCT
};

// ------------------------------------------------------------------------------------------------
// DIGITAL INPUTS
// ------------------------------------------------------------------------------------------------

/// Gray code levels (A, B) in forward order.
pub const GRAY_FORWARD: [(Level, Level); 4] = [
    (Level::Low, Level::Low),
    (Level::High, Level::Low),
    (Level::High, Level::High),
    (Level::Low, Level::High)
];

#[derive(Debug)]
pub enum ScriptEvent {
    /// An edge, carrying the levels of the pins that changed
    Edge(Vec<(Pin, Level)>),

    /// Wake the current wait
    Wake,

    /// Report an edge but fail the following level read
    FailRead
}

/// Inputs whose edges are pushed by the test through a [`ScriptFeeder`].
///
/// All watchers opened on the inputs share the one event queue.
pub struct ScriptedInputs {
    rx: Arc<Mutex<Receiver<ScriptEvent>>>,
    tx: Mutex<Sender<ScriptEvent>>,
    pub configured: Mutex<Vec<(Pin, PinDirection, Edge)>>,
    pub fail_configure: AtomicBool,
    pub fail_watch: AtomicBool
}

#[derive(Clone)]
pub struct ScriptFeeder {
    tx: Sender<ScriptEvent>
}

pub struct ScriptedWatcher {
    pins: Vec<Pin>,
    levels: HashMap<Pin, Level>,
    rx: Arc<Mutex<Receiver<ScriptEvent>>>,
    waker: Arc<ScriptedWaker>,
    fail_next_read: bool
}

struct ScriptedWaker {
    tx: Mutex<Sender<ScriptEvent>>
}

/// Generates level snapshots for a pair of quadrature encoders.
pub struct EncoderSim {
    pins: [Pin; 4],
    left_phase: i64,
    right_phase: i64
}

impl ScriptedInputs {
    pub fn new() -> (Self, ScriptFeeder) {
        let (tx, rx) = mpsc::channel();

        let inputs = Self {
            rx: Arc::new(Mutex::new(rx)),
            tx: Mutex::new(tx.clone()),
            configured: Mutex::new(Vec::new()),
            fail_configure: AtomicBool::new(false),
            fail_watch: AtomicBool::new(false)
        };

        (inputs, ScriptFeeder { tx })
    }
}

impl DigitalInputs for ScriptedInputs {
    fn configure(&self, pin: Pin, direction: PinDirection, edge: Edge) -> Result<(), GpioError> {
        if self.fail_configure.load(Ordering::SeqCst) {
            return Err(GpioError::Configure {
                pin,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure")
            })
        }

        self.configured.lock().unwrap().push((pin, direction, edge));
        Ok(())
    }

    fn watch(&self, pins: &[Pin]) -> Result<Box<dyn EdgeWatcher>, GpioError> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(GpioError::Open {
                pin: pins.first().copied().unwrap_or(0),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure")
            })
        }

        let tx = self.tx.lock().unwrap().clone();

        Ok(Box::new(ScriptedWatcher {
            pins: pins.to_vec(),
            levels: HashMap::new(),
            rx: self.rx.clone(),
            waker: Arc::new(ScriptedWaker { tx: Mutex::new(tx) }),
            fail_next_read: false
        }))
    }
}

impl EdgeWatcher for ScriptedWatcher {
    fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitEvent, GpioError> {
        let event = {
            let rx = self.rx.lock().unwrap();
            match timeout {
                Some(t) => match rx.recv_timeout(t) {
                    Ok(e) => e,
                    Err(RecvTimeoutError::Timeout) => return Ok(WaitEvent::TimedOut),
                    Err(RecvTimeoutError::Disconnected) => return Err(disconnected())
                },
                None => rx.recv().map_err(|_| disconnected())?
            }
        };

        match event {
            ScriptEvent::Edge(changes) => {
                for (pin, level) in changes {
                    self.levels.insert(pin, level);
                }
                Ok(WaitEvent::Edge)
            },
            ScriptEvent::Wake => Ok(WaitEvent::Woken),
            ScriptEvent::FailRead => {
                self.fail_next_read = true;
                Ok(WaitEvent::Edge)
            }
        }
    }

    fn read_levels(&mut self, levels: &mut [Level]) -> Result<(), GpioError> {
        if levels.len() != self.pins.len() {
            return Err(GpioError::LevelCount {
                expected: self.pins.len(),
                actual: levels.len()
            })
        }

        if self.fail_next_read {
            self.fail_next_read = false;
            return Err(GpioError::Read {
                pin: self.pins[0],
                source: std::io::Error::new(std::io::ErrorKind::Other, "scripted failure")
            })
        }

        for (pin, level) in self.pins.iter().zip(levels.iter_mut()) {
            *level = self.levels.get(pin).copied().unwrap_or_default();
        }

        Ok(())
    }

    fn waker(&self) -> Arc<dyn EdgeWaker> {
        self.waker.clone()
    }
}

impl EdgeWaker for ScriptedWaker {
    fn wake(&self) -> Result<(), GpioError> {
        self.tx.lock().unwrap().send(ScriptEvent::Wake).map_err(|_| disconnected_wake())
    }
}

impl ScriptFeeder {
    pub fn edge(&self, changes: Vec<(Pin, Level)>) {
        self.tx.send(ScriptEvent::Edge(changes)).unwrap();
    }

    pub fn wake(&self) {
        self.tx.send(ScriptEvent::Wake).unwrap();
    }

    pub fn fail_read(&self) {
        self.tx.send(ScriptEvent::FailRead).unwrap();
    }
}

impl EncoderSim {
    /// Encoders on `[left_a, left_b, right_a, right_b]`, both at the `00` state.
    pub fn new(pins: [Pin; 4]) -> Self {
        Self {
            pins,
            left_phase: 0,
            right_phase: 0
        }
    }

    /// Advance each wheel by one gray code state in the direction of the sign of its step (zero
    /// leaves it where it is) and get the full level snapshot.
    pub fn step(&mut self, left: i64, right: i64) -> Vec<(Pin, Level)> {
        self.left_phase += left.signum();
        self.right_phase += right.signum();

        let (la, lb) = GRAY_FORWARD[self.left_phase.rem_euclid(4) as usize];
        let (ra, rb) = GRAY_FORWARD[self.right_phase.rem_euclid(4) as usize];

        vec![
            (self.pins[0], la),
            (self.pins[1], lb),
            (self.pins[2], ra),
            (self.pins[3], rb)
        ]
    }

    /// Queue `count` steps on the feeder.
    pub fn feed(&mut self, feeder: &ScriptFeeder, count: usize, left: i64, right: i64) {
        for _ in 0..count {
            feeder.edge(self.step(left, right));
        }
    }
}

fn disconnected() -> GpioError {
    GpioError::Wait(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "script closed"))
}

fn disconnected_wake() -> GpioError {
    GpioError::Wake(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "script closed"))
}

// ------------------------------------------------------------------------------------------------
// MOTORS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    Forward(Motor, u8),
    Reverse(Motor, u8),
    Stop(Motor)
}

/// Records every motor command.
#[derive(Default)]
pub struct RecordingMotors {
    pub commands: Mutex<Vec<MotorCommand>>,
    pub fail: AtomicBool
}

impl RecordingMotors {
    pub fn commands(&self) -> Vec<MotorCommand> {
        self.commands.lock().unwrap().clone()
    }

    fn record(&self, command: MotorCommand, duty_cycle_pct: u8) -> Result<(), MotorError> {
        if duty_cycle_pct > MAX_DUTY_CYCLE_PCT {
            return Err(MotorError::InvalidDutyCycle(duty_cycle_pct))
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(MotorError::Write {
                path: "scripted".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "scripted failure")
            })
        }

        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

impl MotorDrive for RecordingMotors {
    fn forward(&self, motor: Motor, duty_cycle_pct: u8) -> Result<(), MotorError> {
        self.record(MotorCommand::Forward(motor, duty_cycle_pct), duty_cycle_pct)
    }

    fn reverse(&self, motor: Motor, duty_cycle_pct: u8) -> Result<(), MotorError> {
        self.record(MotorCommand::Reverse(motor, duty_cycle_pct), duty_cycle_pct)
    }

    fn stop(&self, motor: Motor) -> Result<(), MotorError> {
        self.record(MotorCommand::Stop(motor), 0)
    }
}

// ------------------------------------------------------------------------------------------------
// TELEMETRY
// ------------------------------------------------------------------------------------------------

/// Telemetry sink which keeps every point.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub points: Arc<Mutex<Vec<TrackPoint>>>
}

impl RecordingSink {
    pub fn points(&self) -> Vec<TrackPoint> {
        self.points.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&mut self, point: &TrackPoint) -> Result<(), ArchiveError> {
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }
}
