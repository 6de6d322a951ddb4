// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Single-event earthquake location in a horizontally layered crust.
//!
//! Given arrival times read at a network of stations, a flat-layered P
//! velocity model and run-control parameters, the locator finds the origin
//! time, epicenter and depth by Geiger's method: the travel-time equations
//! are linearized about a trial hypocenter, the weighted least-squares
//! adjustment is solved, and the trial is moved until the residuals settle.
//! Results carry a magnitude estimate and letter-grade quality codes.
//!
//! Events are independent; [`Locator::locate_batch`] solves many of them in
//! parallel against shared, read-only inputs.

#![warn(missing_docs)]

/// Hypocenter, residual and archive records built from a finished solve.
pub mod assemble;
/// Run-control parameters and iteration thresholds.
pub mod control;
/// Angles, times, readings and the station roster.
pub mod core;
/// Observation rows and least-squares systems for one trial hypocenter.
pub mod design;
/// Error types for the library.
pub mod error;
/// Short-distance geographic offsets and azimuthal gap.
pub mod geodesy;
/// Loading run files and writing results.
pub mod io;
/// Normal equations and the pivoting linear solver.
pub mod linalg;
/// The Geiger iteration.
pub mod locator;
/// Amplitude and duration magnitudes.
pub mod magnitude;
/// Quality grades.
pub mod quality;
/// Flat-layered travel times.
pub mod velocity;
/// Observation weights.
pub mod weighting;

pub use crate::assemble::{ArchiveRecord, ArrivalResidual, Hypocenter, SolveResult};
pub use crate::control::RunControl;
pub use crate::core::{Event, PhaseObservation, StationRecord, StationRoster};
pub use crate::error::{HypoError, Result};
pub use crate::locator::{IterationSnapshot, Locator, SolveWarning, Termination};
pub use crate::quality::{QualityClass, QualityCodes};
pub use crate::velocity::{LayeredModel, TravelTimeModel, VelocityLayer};

/// Locate one event from plain inputs.
///
/// Validates the station list, layers and run control, then runs a single
/// solve. Use [`Locator`] directly to reuse validated inputs across events.
///
/// # Errors
/// Returns an error for invalid inputs or when the event cannot be located.
pub fn solve(
    label: &str,
    stations: &[StationRecord],
    layers: &[VelocityLayer],
    control: &RunControl,
    phases: &[PhaseObservation],
) -> Result<SolveResult> {
    let model = LayeredModel::new(layers.to_vec())?;
    let roster = StationRoster::new(stations.to_vec())?;
    Locator::new(&model, &roster, control)?.locate(label, phases)
}
