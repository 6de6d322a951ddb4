// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::control::RunControl;
use crate::core::{GeoAngle, Phase, PhaseObservation, StationRecord, TimeStamp};
use crate::design::{Evaluation, Observation};
use crate::error::Result;
use crate::geodesy::azimuthal_gap;
use crate::locator::{IterationSnapshot, SolveWarning, Termination};
use crate::magnitude::{self, MagnitudeReading};
use crate::quality::{classify, QualityClass, QualityCodes, QualityInputs};
use crate::velocity::{RayPath, VelocityLayer};

/// Final location of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypocenter {
    /// Origin time.
    pub origin: TimeStamp,
    /// Epicenter latitude.
    pub latitude: GeoAngle,
    /// Epicenter longitude.
    pub longitude: GeoAngle,
    /// Focal depth, km.
    pub depth: f64,
    /// Preferred magnitude: amplitude if available, else duration.
    pub magnitude: Option<f64>,
    /// Spread of the station values behind `magnitude`.
    pub magnitude_spread: Option<f64>,
    /// Amplitude magnitude.
    pub amplitude_magnitude: Option<f64>,
    /// Duration magnitude.
    pub duration_magnitude: Option<f64>,
    /// Readings with non-zero weight.
    pub observations: usize,
    /// Largest azimuthal gap between weighted stations, degrees.
    pub gap: f64,
    /// Weighted RMS residual, seconds.
    pub rms: f64,
    /// Epicentral distance of the nearest weighted station, km.
    pub nearest_distance: f64,
    /// Horizontal standard error, km.
    pub horizontal_error: Option<f64>,
    /// Depth standard error, km.
    pub depth_error: Option<f64>,
    /// Quality grades.
    pub quality: QualityCodes,
    /// Depth was held rather than solved for.
    pub depth_frozen: bool,
    /// How the iteration ended.
    pub termination: Termination,
}

/// Per-reading output row at the final location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalResidual {
    /// Station code.
    pub station: String,
    /// Phase.
    pub phase: Phase,
    /// Epicentral distance, km.
    pub distance: f64,
    /// Azimuth from epicenter to station, degrees.
    pub azimuth: f64,
    /// Angle of incidence at the station, degrees.
    pub incidence: Option<f64>,
    /// Take-off angle at the source, degrees.
    pub takeoff: Option<f64>,
    /// First-arriving ray.
    pub path: Option<RayPath>,
    /// Observed travel time, seconds.
    pub observed: f64,
    /// Predicted travel time including the station delay, seconds.
    pub predicted: Option<f64>,
    /// Observed minus predicted, seconds.
    pub residual: Option<f64>,
    /// Weight at the final iteration.
    pub weight: f64,
    /// Station magnitude from this reading, if it carried magnitude data.
    pub magnitude: Option<f64>,
}

/// Everything a solve returns for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    /// Event label supplied by the caller.
    pub label: String,
    /// The located hypocenter (one per solve).
    pub hypocenters: Vec<Hypocenter>,
    /// Iteration snapshots in order.
    pub iteration_history: Vec<IterationSnapshot>,
    /// Index in `iteration_history` of the snapshot holding the reported
    /// trial.
    pub best: usize,
    /// Residual rows for every reading.
    pub arrivals: Vec<ArrivalResidual>,
    /// Non-fatal conditions met during the solve.
    pub warnings: Vec<SolveWarning>,
}

impl SolveResult {
    /// The solved hypocenter, if any.
    pub fn hypocenter(&self) -> Option<&Hypocenter> {
        self.hypocenters.first()
    }

    /// The snapshot the hypocenter was built from.
    pub fn best_snapshot(&self) -> Option<&IterationSnapshot> {
        self.iteration_history.get(self.best)
    }
}

/// Inputs and outputs of a run gathered for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Run control in effect.
    pub control: RunControl,
    /// Velocity model.
    pub layers: Vec<VelocityLayer>,
    /// Station roster.
    pub stations: Vec<StationRecord>,
    /// Phase readings.
    pub phases: Vec<PhaseObservation>,
    /// Resulting hypocenters.
    pub hypocenters: Vec<Hypocenter>,
}

impl ArchiveRecord {
    /// Gather copies of the run's inputs and results.
    pub fn new(
        control: &RunControl,
        layers: &[VelocityLayer],
        stations: &[StationRecord],
        phases: &[PhaseObservation],
        hypocenters: &[Hypocenter],
    ) -> Self {
        ArchiveRecord {
            control: control.clone(),
            layers: layers.to_vec(),
            stations: stations.to_vec(),
            phases: phases.to_vec(),
            hypocenters: hypocenters.to_vec(),
        }
    }
}

/// The final state of a solve, handed over for assembly.
pub(crate) struct FinalFit<'a, 'b> {
    pub reference: NaiveDateTime,
    pub observations: &'b [Observation<'a>],
    pub evaluation: &'b Evaluation,
    pub horizontal_error: Option<f64>,
    pub depth_error: Option<f64>,
    pub depth_frozen: bool,
    pub termination: Termination,
    pub best: usize,
}

/// Build the result for one event: magnitude, quality grades, hypocenter
/// and residual rows.
pub(crate) fn assemble(
    label: &str,
    control: &RunControl,
    fit: &FinalFit<'_, '_>,
    history: Vec<IterationSnapshot>,
    warnings: Vec<SolveWarning>,
) -> Result<SolveResult> {
    let eval = fit.evaluation;
    let trial = eval.trial;

    let weighted: Vec<_> = eval.rows.iter().filter(|r| r.is_usable()).collect();
    let azimuths: Vec<f64> = weighted.iter().map(|r| r.azimuth).collect();
    let gap = azimuthal_gap(&azimuths);
    let nearest_distance = weighted
        .iter()
        .map(|r| r.distance)
        .fold(f64::INFINITY, f64::min);
    let rms = eval.rms();

    let readings: Vec<MagnitudeReading<'_>> = fit
        .observations
        .iter()
        .zip(&eval.rows)
        .map(|(obs, row)| MagnitudeReading {
            station: &obs.station.code,
            calibration: &obs.station.calibration,
            amplitude: obs.reading.amplitude,
            coda_duration: obs.reading.coda_duration,
            distance: row.distance,
            depth: trial.depth,
            weight: row.weight,
        })
        .collect();
    let event_magnitude = magnitude::estimate(&readings, &control.duration_magnitude);
    let preferred = event_magnitude.preferred();

    let quality = classify(
        &control.quality,
        &QualityInputs {
            rms,
            gap,
            observations: weighted.len(),
            nearest_distance,
            depth: trial.depth,
            horizontal_error: fit.horizontal_error,
            depth_error: fit.depth_error,
            depth_frozen: fit.depth_frozen,
            degraded: fit.termination.is_degraded(),
        },
    );

    let hypocenter = Hypocenter {
        origin: TimeStamp::from_offset(fit.reference, trial.origin),
        latitude: GeoAngle::from_decimal_latitude(trial.latitude)?,
        longitude: GeoAngle::from_decimal_longitude(trial.longitude)?,
        depth: trial.depth,
        magnitude: preferred.map(|m| m.mean),
        magnitude_spread: preferred.map(|m| m.spread),
        amplitude_magnitude: event_magnitude.amplitude.map(|m| m.mean),
        duration_magnitude: event_magnitude.duration.map(|m| m.mean),
        observations: weighted.len(),
        gap,
        rms,
        nearest_distance,
        horizontal_error: fit.horizontal_error,
        depth_error: fit.depth_error,
        quality,
        depth_frozen: fit.depth_frozen,
        termination: fit.termination,
    };

    let mut arrivals: Vec<ArrivalResidual> = fit
        .observations
        .iter()
        .zip(&readings)
        .zip(&eval.rows)
        .map(|((obs, reading), row)| {
            let predicted = row.travel.map(|tt| tt.time + obs.station.delay);
            let amplitude = reading.amplitude.and_then(|amp| {
                magnitude::amplitude_magnitude(
                    &amp,
                    reading.calibration,
                    row.distance.hypot(trial.depth),
                )
            });
            let duration = reading.coda_duration.and_then(|tau| {
                magnitude::duration_magnitude(tau, row.distance, &control.duration_magnitude)
            });
            ArrivalResidual {
                station: obs.station.code.clone(),
                phase: obs.reading.phase,
                distance: row.distance,
                azimuth: row.azimuth,
                incidence: row.travel.map(|tt| tt.incidence),
                takeoff: row.travel.map(|tt| tt.takeoff),
                path: row.travel.map(|tt| tt.path),
                observed: obs.arrival - trial.origin,
                predicted,
                residual: predicted.map(|_| row.residual),
                weight: row.weight,
                magnitude: amplitude.or(duration),
            }
        })
        .collect();

    if control.sort_stations {
        arrivals.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    Ok(SolveResult {
        label: label.to_string(),
        hypocenters: vec![hypocenter],
        iteration_history: history,
        best: fit.best,
        arrivals,
        warnings,
    })
}

/// Residual statistics for one station over a batch of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationResidualSummary {
    /// Station code.
    pub station: String,
    /// Number of weighted residuals.
    pub count: usize,
    /// Mean residual, seconds.
    pub mean: f64,
    /// Standard deviation about the mean, seconds.
    pub spread: f64,
}

/// Mean and spread of weighted residuals per station, over the events whose
/// overall grade is at least `min_quality`. Stations are returned in code
/// order.
pub fn summarize_station_residuals(
    results: &[SolveResult],
    min_quality: QualityClass,
) -> Vec<StationResidualSummary> {
    let mut by_station: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for result in results {
        let accepted = result
            .hypocenter()
            .is_some_and(|h| h.quality.overall.at_least(min_quality));
        if !accepted {
            continue;
        }
        for arrival in &result.arrivals {
            if arrival.weight <= 0.0 {
                continue;
            }
            if let Some(residual) = arrival.residual {
                by_station.entry(&arrival.station).or_default().push(residual);
            }
        }
    }

    by_station
        .into_iter()
        .map(|(station, residuals)| {
            let n = residuals.len() as f64;
            let mean = residuals.iter().sum::<f64>() / n;
            let var = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
            StationResidualSummary {
                station: station.to_string(),
                count: residuals.len(),
                mean,
                spread: var.sqrt(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn arrival(station: &str, residual: f64, weight: f64) -> ArrivalResidual {
        ArrivalResidual {
            station: station.to_string(),
            phase: Phase::P,
            distance: 10.0,
            azimuth: 0.0,
            incidence: None,
            takeoff: None,
            path: None,
            observed: 2.0,
            predicted: Some(2.0 - residual),
            residual: Some(residual),
            weight,
            magnitude: None,
        }
    }

    fn result(overall: QualityClass, arrivals: Vec<ArrivalResidual>) -> SolveResult {
        let date = NaiveDate::from_ymd_opt(1990, 6, 1).unwrap();
        let hypocenter = Hypocenter {
            origin: TimeStamp::new(date, 0, 0, 0.0),
            latitude: GeoAngle::from_decimal_latitude(45.0).unwrap(),
            longitude: GeoAngle::from_decimal_longitude(-121.0).unwrap(),
            depth: 5.0,
            magnitude: None,
            magnitude_spread: None,
            amplitude_magnitude: None,
            duration_magnitude: None,
            observations: arrivals.len(),
            gap: 90.0,
            rms: 0.1,
            nearest_distance: 5.0,
            horizontal_error: None,
            depth_error: None,
            quality: QualityCodes {
                overall,
                depth: overall,
                solution: overall,
            },
            depth_frozen: false,
            termination: Termination::Converged,
        };
        SolveResult {
            label: "ev".to_string(),
            hypocenters: vec![hypocenter],
            iteration_history: Vec::new(),
            best: 0,
            arrivals,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn summary_filters_by_quality_and_weight() {
        let results = vec![
            result(
                QualityClass::A,
                vec![
                    arrival("AAA", 0.2, 1.0),
                    arrival("BBB", -0.1, 1.0),
                    arrival("CCC", 5.0, 0.0),
                ],
            ),
            result(QualityClass::B, vec![arrival("AAA", 0.4, 0.5)]),
            result(QualityClass::D, vec![arrival("AAA", 9.0, 1.0)]),
        ];
        let summary = summarize_station_residuals(&results, QualityClass::C);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].station, "AAA");
        assert_eq!(summary[0].count, 2);
        assert!((summary[0].mean - 0.3).abs() < 1e-12);
        assert!((summary[0].spread - 0.1).abs() < 1e-12);
        assert_eq!(summary[1].station, "BBB");
        assert_eq!(summary[1].spread, 0.0);
    }

    #[test]
    fn archive_serializes_to_json() {
        let res = result(QualityClass::B, vec![arrival("AAA", 0.1, 1.0)]);
        let archive = ArchiveRecord::new(
            &RunControl::default(),
            &[VelocityLayer::new(5.0, 0.0), VelocityLayer::new(6.5, 12.0)],
            &[],
            &[],
            &res.hypocenters,
        );
        let json = serde_json::to_string(&archive).unwrap();
        let back: ArchiveRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.layers.len(), 2);
        assert_eq!(back.hypocenters[0].quality.overall, QualityClass::B);
        assert_eq!(res.hypocenter().map(|h| h.depth), Some(5.0));
    }
}
