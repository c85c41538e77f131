//! Sysfs GPIO backend
//!
//! Pins are exported through `<root>/export` and configured by writing their
//! `direction` and `edge` attributes. Edge notification uses `poll(2)` on the
//! pins' `value` files, which the kernel flags with `POLLPRI` when an enabled
//! edge occurs. An `eventfd(2)` is polled alongside them so that a blocked
//! wait can be interrupted from another thread.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    os::unix::{
        fs::OpenOptionsExt,
        io::{AsRawFd, FromRawFd}
    },
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration
};
use log::{debug, trace};

use super::{DigitalInputs, Edge, EdgeWaker, EdgeWatcher, GpioError, Level, Pin, PinDirection, WaitEvent};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default location of the sysfs GPIO class.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Size of the buffer used to read a value file. Values are a single digit and a newline.
const VALUE_BUF_LEN: usize = 8;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Digital inputs accessed through the sysfs GPIO class.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf
}

/// Open value files for a set of pins.
pub struct SysfsWatcher {
    values: Vec<ValueFile>,
    wake: Arc<EventFd>
}

struct ValueFile {
    pin: Pin,
    file: File
}

/// Waker backed by an eventfd.
struct EventFd {
    file: File
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SysfsGpio {
    /// Create a new backend rooted at the given sysfs GPIO directory.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into()
        }
    }

    fn pin_dir(&self, pin: Pin) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    /// Export the pin unless it's already been exported.
    fn export(&self, pin: Pin) -> Result<(), GpioError> {
        if self.pin_dir(pin).exists() {
            trace!("GPIO {} already exported", pin);
            return Ok(())
        }

        write_attr(&self.root.join("export"), &pin.to_string())
            .map_err(|source| GpioError::Configure { pin, source })
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(DEFAULT_GPIO_ROOT)
    }
}

impl DigitalInputs for SysfsGpio {
    fn configure(&self, pin: Pin, direction: PinDirection, edge: Edge) -> Result<(), GpioError> {
        self.export(pin)?;

        let dir = self.pin_dir(pin);

        let direction_str = match direction {
            PinDirection::Input => "in",
            PinDirection::Output => "out"
        };
        write_attr(&dir.join("direction"), direction_str)
            .map_err(|source| GpioError::Configure { pin, source })?;

        let edge_str = match edge {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both"
        };
        write_attr(&dir.join("edge"), edge_str)
            .map_err(|source| GpioError::Configure { pin, source })?;

        debug!("Configured GPIO {} as {} with {} edge", pin, direction_str, edge_str);

        Ok(())
    }

    fn watch(&self, pins: &[Pin]) -> Result<Box<dyn EdgeWatcher>, GpioError> {
        let mut values = Vec::with_capacity(pins.len());

        for &pin in pins {
            let file = OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(self.pin_dir(pin).join("value"))
                .map_err(|source| GpioError::Open { pin, source })?;

            values.push(ValueFile { pin, file });
        }

        let wake = EventFd::new().map_err(GpioError::WakeHandle)?;

        Ok(Box::new(SysfsWatcher {
            values,
            wake: Arc::new(wake)
        }))
    }
}

impl EdgeWatcher for SysfsWatcher {
    fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitEvent, GpioError> {
        let timeout_ms: libc::c_int = match timeout {
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1
        };

        let mut fds: Vec<libc::pollfd> = self.values
            .iter()
            .map(|v| libc::pollfd {
                fd: v.file.as_raw_fd(),
                events: libc::POLLPRI | libc::POLLERR,
                revents: 0
            })
            .collect();
        fds.push(libc::pollfd {
            fd: self.wake.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0
        });

        loop {
            // Safety: `fds` is a valid, exclusively borrowed array of `fds.len()` pollfd structs
            // for the duration of the call.
            let rc = unsafe {
                libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms)
            };

            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue
                }
                return Err(GpioError::Wait(err))
            }

            if rc == 0 {
                return Ok(WaitEvent::TimedOut)
            }

            break
        }

        // The wake descriptor is last
        let (wake_fd, value_fds) = match fds.split_last() {
            Some(s) => s,
            None => return Ok(WaitEvent::TimedOut)
        };

        if wake_fd.revents & libc::POLLIN != 0 {
            self.wake.drain();
            return Ok(WaitEvent::Woken)
        }

        if value_fds.iter().any(|p| p.revents & libc::POLLNVAL != 0) {
            return Err(GpioError::Wait(io::Error::new(
                io::ErrorKind::InvalidInput,
                "value file descriptor is not open"
            )))
        }

        if value_fds.iter().any(|p| p.revents & (libc::POLLPRI | libc::POLLERR) != 0) {
            Ok(WaitEvent::Edge)
        }
        else {
            Ok(WaitEvent::TimedOut)
        }
    }

    fn read_levels(&mut self, levels: &mut [Level]) -> Result<(), GpioError> {
        if levels.len() != self.values.len() {
            return Err(GpioError::LevelCount {
                expected: self.values.len(),
                actual: levels.len()
            })
        }

        for (value, level) in self.values.iter_mut().zip(levels.iter_mut()) {
            let pin = value.pin;

            value.file
                .seek(SeekFrom::Start(0))
                .map_err(|source| GpioError::Read { pin, source })?;

            let mut buf = [0u8; VALUE_BUF_LEN];
            let num_read = value.file
                .read(&mut buf)
                .map_err(|source| GpioError::Read { pin, source })?;

            *level = parse_level(pin, &buf[..num_read])?;
        }

        Ok(())
    }

    fn waker(&self) -> Arc<dyn EdgeWaker> {
        self.wake.clone()
    }
}

impl EventFd {
    fn new() -> io::Result<Self> {
        // Safety: eventfd has no memory safety preconditions, the returned descriptor is checked
        // before use.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error())
        }

        // Safety: `fd` is a freshly created descriptor that nothing else owns.
        let file = unsafe { File::from_raw_fd(fd) };

        Ok(Self { file })
    }

    /// Reset the counter so the descriptor stops polling readable.
    fn drain(&self) {
        let mut buf = [0u8; 8];
        if let Err(e) = (&self.file).read(&mut buf) {
            if e.kind() != io::ErrorKind::WouldBlock {
                debug!("Could not drain the watcher wake handle: {}", e);
            }
        }
    }
}

impl EdgeWaker for EventFd {
    fn wake(&self) -> Result<(), GpioError> {
        (&self.file)
            .write_all(&1u64.to_ne_bytes())
            .map_err(GpioError::Wake)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn write_attr(path: &Path, value: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(value.as_bytes())
}

/// Parse the contents of a value file. Only the bytes actually read are considered, any non-zero
/// integer is high.
fn parse_level(pin: Pin, bytes: &[u8]) -> Result<Level, GpioError> {
    let text = String::from_utf8_lossy(bytes);

    match text.trim().parse::<i64>() {
        Ok(v) => Ok(Level::from(v != 0)),
        Err(_) => Err(GpioError::InvalidValue {
            pin,
            value: text.into_owned()
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
