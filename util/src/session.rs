//! Sessions
//!
//! A session is one run of an executable. It gets its own directory holding
//! the log file and an `arch` directory for archived data:
//!
//! ```text
//! $DDNAV_SW_ROOT/<sessions_dir>/<exec>_<YYYYmmdd_HHMMSS>/
//!     <exec>.log
//!     arch/
//! ```
//!
//! The epoch of the first session made in a process is the zero point for
//! log timestamps.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{host, time};

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// chrono strftime format of the session directory suffix.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const ARCHIVE_DIR: &str = "arch";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Session {
    pub session_root: PathBuf,

    /// Directory archivers write into
    pub arch_root: PathBuf,

    pub log_file_path: PathBuf
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable ({}) is not set", host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot create the session directory {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a session in `$DDNAV_SW_ROOT/<sessions_dir>`.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        Self::new_in(root.join(sessions_dir), exec_name)
    }

    /// Start a session in the given directory, creating it if needed.
    pub fn new_in<P: AsRef<Path>>(sessions_dir: P, exec_name: &str) -> Result<Self, SessionError> {
        let epoch = SESSION_EPOCH.get_or_init(Utc::now);

        let session_root = sessions_dir
            .as_ref()
            .join(format!("{}_{}", exec_name, epoch.format(TIMESTAMP_FORMAT)));
        let arch_root = session_root.join(ARCHIVE_DIR);

        fs::create_dir_all(&arch_root)
            .map_err(|e| SessionError::CannotCreateDir(arch_root.clone(), e))?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
            arch_root
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds since the session epoch, or `NAN` before any session is started.
pub fn get_elapsed_seconds() -> f64 {
    SESSION_EPOCH
        .get()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}

pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_in() {
        let dir = tempfile::tempdir().unwrap();

        let a = Session::new_in(dir.path(), "nav_exec").unwrap();
        assert!(a.arch_root.is_dir());
        assert!(a.session_root.starts_with(dir.path()));
        assert_eq!(a.log_file_path.file_name().unwrap(), "nav_exec.log");
        assert_eq!(a.arch_root, a.session_root.join("arch"));

        // Sessions in one process share the epoch
        let b = Session::new_in(dir.path(), "calib").unwrap();
        let suffix = |s: &Session| {
            let name = s.session_root.file_name().unwrap().to_string_lossy().into_owned();
            name.rsplitn(3, '_').take(2).map(String::from).collect::<Vec<_>>()
        };
        assert_eq!(suffix(&a), suffix(&b));

        assert!(get_epoch().is_some());
        assert!(get_elapsed_seconds() >= 0.0);
    }
}
