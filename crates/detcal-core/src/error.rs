//! Shared error type for the calibration toolkit.
//!
//! Fatal conditions (missing configuration, missing histograms, unreadable
//! parameters) surface as [`CalibError`] values before anything is written.
//! Per-element degradations (insufficient statistics, non-physical fits) are
//! absorbed by the calibration driver and never appear here.

use std::{error::Error, fmt, io};

/// Errors returned by the calibration core and driver.
#[derive(Debug)]
pub enum CalibError {
    /// A required configuration key is absent.
    ConfigMissing { key: String },
    /// A required aggregated histogram does not exist for the run sets.
    HistogramMissing { name: String },
    /// A parameter array is absent from the store.
    ParamsMissing {
        param: String,
        calibration: String,
        run_set: u32,
    },
    /// A stored parameter array has the wrong length.
    ParamCount {
        param: String,
        expected: usize,
        found: usize,
    },
    /// Two histograms with incompatible binning were combined.
    HistogramShape {
        expected: (usize, f64, f64),
        found: (usize, f64, f64),
    },
    /// An element index outside `[0, n_elem)` was requested.
    OutOfRange { elem: usize, n_elem: usize },
    /// An operation was requested in the wrong module phase.
    Phase { op: &'static str, phase: &'static str },
    /// An indicator was adjusted on an element with no fit state.
    NoFitState { elem: usize },
    /// Underlying file I/O failed.
    Io(io::Error),
    /// A store or histogram file could not be parsed.
    Format(String),
}

impl fmt::Display for CalibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibError::ConfigMissing { key } => {
                write!(f, "configuration key '{key}' was not found")
            }
            CalibError::HistogramMissing { name } => {
                write!(f, "histogram '{name}' does not exist for the given run sets")
            }
            CalibError::ParamsMissing {
                param,
                calibration,
                run_set,
            } => write!(
                f,
                "parameters '{param}' not found for calibration '{calibration}', run set {run_set}"
            ),
            CalibError::ParamCount {
                param,
                expected,
                found,
            } => write!(
                f,
                "parameters '{param}' hold {found} values, expected {expected}"
            ),
            CalibError::HistogramShape { expected, found } => write!(
                f,
                "histogram shape mismatch: expected {} bins in [{}, {}], found {} bins in [{}, {}]",
                expected.0, expected.1, expected.2, found.0, found.1, found.2
            ),
            CalibError::OutOfRange { elem, n_elem } => {
                write!(f, "element {elem} outside [0, {n_elem})")
            }
            CalibError::Phase { op, phase } => {
                write!(f, "operation '{op}' not allowed in phase {phase}")
            }
            CalibError::NoFitState { elem } => {
                write!(f, "element {elem} has no fit state to adjust")
            }
            CalibError::Io(err) => write!(f, "i/o error: {err}"),
            CalibError::Format(msg) => write!(f, "format error: {msg}"),
        }
    }
}

impl Error for CalibError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CalibError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CalibError {
    fn from(err: io::Error) -> Self {
        CalibError::Io(err)
    }
}

impl From<serde_json::Error> for CalibError {
    fn from(err: serde_json::Error) -> Self {
        CalibError::Format(err.to_string())
    }
}
