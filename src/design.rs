// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::control::RunControl;
use crate::core::{Phase, PhaseObservation, StationRecord};
use crate::geodesy;
use crate::velocity::{TravelTime, TravelTimeModel};
use crate::weighting::azimuthal_factors;

/// Parameters adjusted by the iteration, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unknown {
    /// Eastward epicenter shift (longitude), km.
    East,
    /// Northward epicenter shift (latitude), km.
    North,
    /// Depth shift, km.
    Depth,
    /// Origin time shift, s.
    OriginTime,
}

impl Unknown {
    /// All unknowns in column order.
    pub const ALL: [Unknown; 4] = [
        Unknown::East,
        Unknown::North,
        Unknown::Depth,
        Unknown::OriginTime,
    ];

    /// Slot of this unknown in a full four-element step.
    pub fn slot(self) -> usize {
        self as usize
    }
}

/// Current trial hypocenter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    /// Latitude, decimal degrees.
    pub latitude: f64,
    /// Longitude, decimal degrees.
    pub longitude: f64,
    /// Depth, km.
    pub depth: f64,
    /// Origin time, seconds after the event reference minute.
    pub origin: f64,
}

/// A phase reading resolved against the roster, fixed for the solve.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    /// The station that recorded it.
    pub station: &'a StationRecord,
    /// The reading itself.
    pub reading: &'a PhaseObservation,
    /// Arrival time, seconds after the event reference minute.
    pub arrival: f64,
}

/// Per-observation scratch values for one trial hypocenter. Owned by a
/// single evaluation; never shared between iterations or events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRow {
    /// Eastward offset of the station from the epicenter, km.
    pub east: f64,
    /// Northward offset of the station from the epicenter, km.
    pub north: f64,
    /// Epicentral distance, km.
    pub distance: f64,
    /// Azimuth from epicenter to station, degrees.
    pub azimuth: f64,
    /// Predicted travel time and derivatives; `None` when no ray exists.
    pub travel: Option<TravelTime>,
    /// Observed minus predicted arrival, seconds.
    pub residual: f64,
    /// Observation weight in [0, 1].
    pub weight: f64,
}

impl ObservationRow {
    /// True if the row takes part in the least-squares system.
    pub fn is_usable(&self) -> bool {
        self.weight > 0.0 && self.travel.is_some()
    }
}

/// All rows for one trial, with the origin time centred on them.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Trial the rows were computed at, origin time included.
    pub trial: Trial,
    /// One row per observation, in input order.
    pub rows: Vec<ObservationRow>,
    /// Rows dropped because no ray path exists.
    pub dropped: usize,
}

impl Evaluation {
    /// Number of usable rows.
    pub fn usable(&self) -> usize {
        self.rows.iter().filter(|r| r.is_usable()).count()
    }

    /// Weighted RMS residual over the usable rows.
    pub fn rms(&self) -> f64 {
        let (sum_w, sum_wr2) = self
            .rows
            .iter()
            .filter(|r| r.is_usable())
            .fold((0.0, 0.0), |(w, wr2), r| {
                (w + r.weight, wr2 + r.weight * r.residual * r.residual)
            });
        if sum_w > 0.0 {
            (sum_wr2 / sum_w).sqrt()
        } else {
            0.0
        }
    }
}

/// Weighted linear system for one iteration. Zero-weight rows are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignSystem {
    /// Unknowns the columns stand for.
    pub unknowns: Vec<Unknown>,
    /// Partial derivatives of predicted arrival, one row per usable observation.
    pub jacobian: Array2<f64>,
    /// Observed minus predicted arrival for the same rows.
    pub residuals: Array1<f64>,
    /// Observation weights for the same rows.
    pub weights: Array1<f64>,
    /// Index into `Evaluation::rows` of each matrix row.
    pub rows: Vec<usize>,
}

impl DesignSystem {
    /// Column of `unknown`, if it is being solved for.
    pub fn column(&self, unknown: Unknown) -> Option<usize> {
        self.unknowns.iter().position(|&u| u == unknown)
    }
}

/// Builds observation rows and least-squares systems against a travel-time
/// model.
pub struct DesignBuilder<'a, M: TravelTimeModel> {
    model: &'a M,
    control: &'a RunControl,
}

impl<'a, M: TravelTimeModel> DesignBuilder<'a, M> {
    /// Create a builder over a model and run parameters.
    pub fn new(model: &'a M, control: &'a RunControl) -> Self {
        DesignBuilder { model, control }
    }

    /// Travel time for one reading from the trial, S scaled by Vp/Vs.
    pub fn travel_time(&self, phase: Phase, distance: f64, depth: f64) -> Option<TravelTime> {
        let tt = self.model.p_wave(distance, depth).ok()?;
        Some(match phase {
            Phase::P => tt,
            Phase::S => tt.scaled(self.control.vp_vs_ratio),
        })
    }

    /// Compute geometry, travel times, weights and residuals at `trial`.
    ///
    /// The origin time is replaced by the weighted mean of observed minus
    /// predicted arrivals, which is its least-squares value for a fixed
    /// epicenter and depth. With no usable rows the trial origin is kept.
    pub fn evaluate(&self, trial: Trial, observations: &[Observation<'_>]) -> Evaluation {
        let control = self.control;
        let mut dropped = 0;
        let mut rows: Vec<ObservationRow> = observations
            .iter()
            .map(|obs| {
                let offset = geodesy::offset(
                    trial.latitude,
                    trial.longitude,
                    obs.station.latitude.to_decimal(),
                    obs.station.longitude.to_decimal(),
                );
                let travel = self.travel_time(obs.reading.phase, offset.distance, trial.depth);
                if travel.is_none() {
                    dropped += 1;
                    tracing::warn!(
                        station = %obs.station.code,
                        depth = trial.depth,
                        "no ray path; observation dropped for this iteration"
                    );
                }
                let weight = control.weighting.weight(
                    offset.distance,
                    obs.reading.quality,
                    control.near_distance,
                    control.far_distance,
                );
                ObservationRow {
                    east: offset.east,
                    north: offset.north,
                    distance: offset.distance,
                    azimuth: offset.azimuth,
                    travel,
                    residual: 0.0,
                    weight,
                }
            })
            .collect();

        if control.azimuthal_weighting {
            apply_azimuthal_weighting(&mut rows, observations);
        }

        let predicted = |obs: &Observation<'_>, row: &ObservationRow| -> Option<f64> {
            row.travel.map(|tt| tt.time + obs.station.delay)
        };

        let mut origin = trial.origin;
        let (sum_w, sum_wt) = observations
            .iter()
            .zip(&rows)
            .filter(|(_, row)| row.is_usable())
            .filter_map(|(obs, row)| predicted(obs, row).map(|p| (row.weight, obs.arrival - p)))
            .fold((0.0, 0.0), |(w, wt), (rw, t)| (w + rw, wt + rw * t));
        if sum_w > 0.0 {
            origin = sum_wt / sum_w;
        }

        for (obs, row) in observations.iter().zip(rows.iter_mut()) {
            if let Some(p) = predicted(obs, row) {
                row.residual = obs.arrival - origin - p;
            }
        }

        Evaluation {
            trial: Trial { origin, ..trial },
            rows,
            dropped,
        }
    }

    /// Assemble the Jacobian and residuals over the usable rows of
    /// `evaluation` for the given columns.
    pub fn assemble(&self, evaluation: &Evaluation, unknowns: &[Unknown]) -> DesignSystem {
        let used: Vec<usize> = evaluation
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_usable())
            .map(|(i, _)| i)
            .collect();

        let mut jacobian = Array2::<f64>::zeros((used.len(), unknowns.len()));
        let mut residuals = Array1::<f64>::zeros(used.len());
        let mut weights = Array1::<f64>::zeros(used.len());

        for (r, &i) in used.iter().enumerate() {
            let row = &evaluation.rows[i];
            let Some(tt) = row.travel else { continue };
            // Moving the source toward a station shortens the distance
            let (de, dn) = if row.distance > 0.0 {
                (-row.east / row.distance, -row.north / row.distance)
            } else {
                (0.0, 0.0)
            };
            for (c, unknown) in unknowns.iter().enumerate() {
                jacobian[[r, c]] = match unknown {
                    Unknown::East => tt.dt_ddistance * de,
                    Unknown::North => tt.dt_ddistance * dn,
                    Unknown::Depth => tt.dt_ddepth,
                    Unknown::OriginTime => 1.0,
                };
            }
            residuals[r] = row.residual;
            weights[r] = row.weight;
        }

        DesignSystem {
            unknowns: unknowns.to_vec(),
            jacobian,
            residuals,
            weights,
            rows: used,
        }
    }
}

/// Multiply each weighted row by its station's azimuthal factor. Readings
/// at the same station share one azimuth and one factor.
fn apply_azimuthal_weighting(rows: &mut [ObservationRow], observations: &[Observation<'_>]) {
    let mut azimuths: Vec<f64> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();
    for (obs, row) in observations.iter().zip(rows.iter()) {
        if row.weight <= 0.0 {
            continue;
        }
        slot.entry(obs.station.code.as_str()).or_insert_with(|| {
            azimuths.push(row.azimuth);
            azimuths.len() - 1
        });
    }
    let factors = azimuthal_factors(&azimuths);
    for (obs, row) in observations.iter().zip(rows.iter_mut()) {
        if let Some(&i) = slot.get(obs.station.code.as_str()) {
            row.weight *= factors[i];
        }
    }
}
