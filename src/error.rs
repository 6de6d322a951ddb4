// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur while validating inputs or locating an event.
#[derive(Debug)]
pub enum HypoError {
    /// The layer sequence is malformed (empty, bad first top, non-increasing tops).
    InvalidLayers {
        /// The layer index where the problem was detected.
        index: usize,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// Layer velocity is not positive and finite.
    InvalidVelocity {
        /// The layer index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// A run-control parameter is out of range.
    InvalidRunControl {
        /// The parameter name.
        field: &'static str,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// A latitude or longitude is out of range.
    InvalidCoordinate {
        /// The offending value in decimal degrees or minutes.
        value: f64,
        /// Explanation of why it's invalid.
        reason: &'static str,
    },
    /// An arrival time cannot be represented as a calendar time.
    InvalidArrivalTime {
        /// The station that carried the reading.
        station: String,
    },
    /// A phase references a station that is not in the roster.
    UnknownStation(String),
    /// The roster contains the same station code twice.
    DuplicateStation(String),
    /// Fewer usable (non-zero weight) observations than free parameters.
    InsufficientData {
        /// Number of observations needed.
        required: usize,
        /// Number of usable observations available.
        usable: usize,
    },
    /// No valid ray path exists for this station and trial depth.
    Geometry {
        /// The station code, empty when evaluated outside a solve.
        station: String,
        /// The trial depth in km.
        depth: f64,
    },
    /// Normal equations unsolvable even after freezing unknowns.
    SingularSystem {
        /// Number of unknowns the system started with.
        unknowns: usize,
    },
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Input document could not be parsed or written.
    Parse(String),
    /// The worker pool for batch solving could not be built.
    ThreadPool(String),
    /// I/O error occurred.
    IoError(std::io::Error),
}

impl fmt::Display for HypoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HypoError::InvalidLayers { index, reason } => {
                write!(f, "invalid velocity layers at index {}: {}", index, reason)
            }
            HypoError::InvalidVelocity { index, value } => {
                write!(
                    f,
                    "invalid velocity in layer {}: {} (must be positive and finite)",
                    index, value
                )
            }
            HypoError::InvalidRunControl { field, reason } => {
                write!(f, "invalid run control '{}': {}", field, reason)
            }
            HypoError::InvalidCoordinate { value, reason } => {
                write!(f, "invalid coordinate {}: {}", value, reason)
            }
            HypoError::InvalidArrivalTime { station } => {
                write!(f, "invalid arrival time for station {}", station)
            }
            HypoError::UnknownStation(code) => write!(f, "unknown station: {}", code),
            HypoError::DuplicateStation(code) => write!(f, "duplicate station: {}", code),
            HypoError::InsufficientData { required, usable } => {
                write!(
                    f,
                    "insufficient data: {} usable observations, at least {} required",
                    usable, required
                )
            }
            HypoError::Geometry { station, depth } => {
                write!(
                    f,
                    "no valid ray path to station '{}' from depth {} km",
                    station, depth
                )
            }
            HypoError::SingularSystem { unknowns } => {
                write!(
                    f,
                    "singular normal equations: none of {} unknowns solvable",
                    unknowns
                )
            }
            HypoError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            HypoError::Parse(msg) => write!(f, "parse error: {}", msg),
            HypoError::ThreadPool(msg) => write!(f, "thread pool error: {}", msg),
            HypoError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for HypoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HypoError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HypoError {
    fn from(e: std::io::Error) -> Self {
        HypoError::IoError(e)
    }
}

impl HypoError {
    /// True for the error kinds that abort a solve for the event.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HypoError::InsufficientData { .. } | HypoError::SingularSystem { .. }
        )
    }
}

/// Convenience type alias for Results with HypoError.
pub type Result<T> = std::result::Result<T, HypoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_velocity() {
        let e = HypoError::InvalidVelocity {
            index: 2,
            value: -1.0,
        };
        assert_eq!(
            e.to_string(),
            "invalid velocity in layer 2: -1 (must be positive and finite)"
        );
    }

    #[test]
    fn display_insufficient_data() {
        let e = HypoError::InsufficientData {
            required: 3,
            usable: 2,
        };
        assert_eq!(
            e.to_string(),
            "insufficient data: 2 usable observations, at least 3 required"
        );
    }

    #[test]
    fn display_geometry() {
        let e = HypoError::Geometry {
            station: "HOOD".to_string(),
            depth: -1.5,
        };
        assert_eq!(
            e.to_string(),
            "no valid ray path to station 'HOOD' from depth -1.5 km"
        );
    }

    #[test]
    fn display_singular_system() {
        let e = HypoError::SingularSystem { unknowns: 4 };
        assert_eq!(
            e.to_string(),
            "singular normal equations: none of 4 unknowns solvable"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = HypoError::IoError(io_err);
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: HypoError = io_err.into();
        assert!(matches!(e, HypoError::IoError(_)));
    }

    #[test]
    fn fatal_classification() {
        assert!(HypoError::SingularSystem { unknowns: 4 }.is_fatal());
        assert!(HypoError::InsufficientData {
            required: 3,
            usable: 1
        }
        .is_fatal());
        assert!(!HypoError::Geometry {
            station: String::new(),
            depth: -1.0
        }
        .is_fatal());
        assert!(!HypoError::UnknownStation("X".into()).is_fatal());
    }
}
