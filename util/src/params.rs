//! Parameter file loading
//!
//! Parameters are TOML files in `$DDNAV_SW_ROOT/params`, deserialised
//! straight into each module's `Params` struct.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PARAMS_DIR: &str = "params";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable ({}) is not set", host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot read the parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Invalid parameters in {0:?}: {1}")]
    DeserialiseError(PathBuf, toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The directory parameter files are loaded from.
pub fn params_dir() -> Result<PathBuf, LoadError> {
    host::get_sw_root()
        .map(|root| root.join(PARAMS_DIR))
        .map_err(|_| LoadError::SwRootNotSet)
}

/// Load `file_name` from the parameters directory.
pub fn load<P: DeserializeOwned>(file_name: &str) -> Result<P, LoadError> {
    load_from(params_dir()?.join(file_name))
}

/// Load a parameter file from an explicit path.
pub fn load_from<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>
{
    let path = path.as_ref();

    let contents = fs::read_to_string(path)
        .map_err(|e| LoadError::FileLoadError(path.to_path_buf(), e))?;

    toml::from_str(&contents)
        .map_err(|e| LoadError::DeserialiseError(path.to_path_buf(), e))
}
