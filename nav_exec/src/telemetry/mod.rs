//! # Telemetry module
//!
//! Every control tick the position controller emits a [`TrackPoint`] so the
//! driven trajectory can be plotted offline. Telemetry is never read back by
//! the controller and a failing sink doesn't stop control.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::path::Path;
use serde::Serialize;

use util::{
    archive::{ArchiveError, ArchiveFormat, Archiver},
    session::Session
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Extension of trajectory log files.
pub const DOT_LOG_EXTENSION: &str = "dlg";

const COLOUR_RED: &str = "ff0000";
const COLOUR_BLACK: &str = "000000";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single point on the driven trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPoint {
    /// Mission time in seconds
    pub time_s: f64,

    pub x: f64,
    pub y: f64,

    pub class: DotClass,

    /// The point marks a reached waypoint
    pub waypoint: bool
}

/// Writes track points to a tab separated "dot log", one point per line:
///
/// ```text
/// <time_s> <x> <y> <rrggbb colour> <waypoint 0|1>
/// ```
pub struct DotLog {
    archiver: Archiver
}

/// Sink which discards every point.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[derive(Serialize)]
struct DotRecord {
    time_s: String,
    x: String,
    y: String,
    colour: &'static str,
    waypoint: u8
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Classification of a track point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DotClass {
    /// In transit
    Neutral,

    /// Within the approach radius of the target
    Approaching,

    /// Within the arrival radius of the target
    Arrival
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Destination for track points.
pub trait TelemetrySink: Send {
    fn record(&mut self, point: &TrackPoint) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DotLog {
    /// Create a dot log named `<name>.dlg` in the session's archive directory.
    pub fn new(session: &Session, name: &str) -> Result<Self, ArchiveError> {
        Ok(Self {
            archiver: Archiver::from_path(
                session,
                format!("{}.{}", name, DOT_LOG_EXTENSION),
                Self::format()
            )?
        })
    }

    /// Create a dot log at an explicit path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        Ok(Self {
            archiver: Archiver::from_file(path, Self::format())?
        })
    }

    fn format() -> ArchiveFormat {
        ArchiveFormat {
            delimiter: b'\t',
            has_headers: false
        }
    }
}

impl TelemetrySink for DotLog {
    fn record(&mut self, point: &TrackPoint) -> Result<(), ArchiveError> {
        self.archiver.serialise(DotRecord {
            time_s: format!("{:.2}", point.time_s),
            x: format!("{:.2}", point.x),
            y: format!("{:.2}", point.y),
            colour: point.class.colour(),
            waypoint: point.waypoint as u8
        })
    }
}

impl TelemetrySink for NullSink {
    fn record(&mut self, _point: &TrackPoint) -> Result<(), ArchiveError> {
        Ok(())
    }
}

impl DotClass {
    /// Plot colour of the class. Both approach and arrival points are red.
    pub fn colour(self) -> &'static str {
        match self {
            DotClass::Neutral => COLOUR_BLACK,
            DotClass::Approaching | DotClass::Arrival => COLOUR_RED
        }
    }
}
