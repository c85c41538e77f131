//! Digital edge input capability

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{sync::Arc, time::Duration};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A GPIO number as used by the kernel.
pub type Pin = u32;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Access to a board's digital inputs.
pub trait DigitalInputs: Send + Sync {

    /// Set the direction of a pin and the edges which will raise a notification.
    fn configure(&self, pin: Pin, direction: PinDirection, edge: Edge) -> Result<(), GpioError>;

    /// Open notifiers on the given pins.
    ///
    /// The returned watcher reads levels in the same order as `pins`. Dropping
    /// it closes the notifiers.
    fn watch(&self, pins: &[Pin]) -> Result<Box<dyn EdgeWatcher>, GpioError>;
}

/// A set of open edge notifiers which can be waited on together.
pub trait EdgeWatcher: Send {

    /// Block until at least one watched pin sees an edge, the watcher is woken,
    /// or the timeout expires. `None` waits forever.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitEvent, GpioError>;

    /// Read the current level of every watched pin into `levels`.
    ///
    /// `levels` must be the same length as the pin list given to
    /// [`DigitalInputs::watch`].
    fn read_levels(&mut self, levels: &mut [Level]) -> Result<(), GpioError>;

    /// Get a handle which can interrupt a blocked [`EdgeWatcher::wait`] from
    /// another thread.
    fn waker(&self) -> Arc<dyn EdgeWaker>;
}

/// Wakes an [`EdgeWatcher`] blocked in `wait`.
pub trait EdgeWaker: Send + Sync {

    /// Make the current (or next) `wait` call return [`WaitEvent::Woken`].
    fn wake(&self) -> Result<(), GpioError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High
}

/// The direction of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output
}

/// Edges on which a pin raises a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both
}

/// Why [`EdgeWatcher::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// At least one watched pin changed level
    Edge,

    /// The watcher's waker was used
    Woken,

    /// The timeout expired without an edge
    TimedOut
}

/// Errors raised by digital input backends.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Could not configure GPIO {pin}: {source}")]
    Configure {
        pin: Pin,
        source: std::io::Error
    },

    #[error("Could not open GPIO {pin} for reading: {source}")]
    Open {
        pin: Pin,
        source: std::io::Error
    },

    #[error("Could not create the watcher wake handle: {0}")]
    WakeHandle(std::io::Error),

    #[error("Waiting for an edge failed: {0}")]
    Wait(std::io::Error),

    #[error("Could not read the level of GPIO {pin}: {source}")]
    Read {
        pin: Pin,
        source: std::io::Error
    },

    #[error("GPIO {pin} returned an unrecognised value {value:?}")]
    InvalidValue {
        pin: Pin,
        value: String
    },

    #[error("Expected a buffer for {expected} levels but got one for {actual}")]
    LevelCount {
        expected: usize,
        actual: usize
    },

    #[error("Could not wake the edge watcher: {0}")]
    Wake(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}
