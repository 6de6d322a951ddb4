// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};

use crate::core::{Amplitude, MagnitudeCalibration};

/// Coefficients of the signal-duration magnitude
/// `M = c1 + c2·log10(τ) + c3·Δ`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationMagnitude {
    /// Constant term.
    pub c1: f64,
    /// Coefficient of log10 duration.
    pub c2: f64,
    /// Coefficient of epicentral distance.
    pub c3: f64,
}

impl Default for DurationMagnitude {
    fn default() -> Self {
        DurationMagnitude {
            c1: -0.87,
            c2: 2.0,
            c3: 0.0035,
        }
    }
}

/// How a station magnitude was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MagnitudeKind {
    /// From maximum amplitude and period.
    Amplitude,
    /// From signal duration.
    Duration,
}

/// One station's contribution to the event magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMagnitude {
    /// Station code.
    pub station: String,
    /// Measurement kind.
    pub kind: MagnitudeKind,
    /// Station magnitude.
    pub value: f64,
    /// Weight in the event mean.
    pub weight: f64,
}

/// Weighted mean and spread of station magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeEstimate {
    /// Weighted mean magnitude.
    pub mean: f64,
    /// Weighted standard deviation about the mean.
    pub spread: f64,
    /// Number of contributing stations.
    pub count: usize,
}

/// Everything the estimator derived for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMagnitude {
    /// Amplitude magnitude, if any station had an amplitude reading.
    pub amplitude: Option<MagnitudeEstimate>,
    /// Duration magnitude, if any station had a duration reading.
    pub duration: Option<MagnitudeEstimate>,
    /// Individual station values.
    pub stations: Vec<StationMagnitude>,
}

impl EventMagnitude {
    /// The reported magnitude: amplitude when available, else duration.
    pub fn preferred(&self) -> Option<MagnitudeEstimate> {
        self.amplitude.or(self.duration)
    }
}

/// A reading the estimator may use, with its geometry at the final location.
#[derive(Debug, Clone, Copy)]
pub struct MagnitudeReading<'a> {
    /// Station code.
    pub station: &'a str,
    /// Station calibration.
    pub calibration: &'a MagnitudeCalibration,
    /// Amplitude reading, if any.
    pub amplitude: Option<Amplitude>,
    /// Signal duration, if any.
    pub coda_duration: Option<f64>,
    /// Epicentral distance, km.
    pub distance: f64,
    /// Focal depth, km.
    pub depth: f64,
    /// Observation weight from the weighting policy.
    pub weight: f64,
}

/// Station amplitude magnitude; `None` for non-positive amplitude or period.
pub fn amplitude_magnitude(
    amplitude: &Amplitude,
    calibration: &MagnitudeCalibration,
    hypocentral_distance: f64,
) -> Option<f64> {
    if amplitude.amplitude <= 0.0 || amplitude.period <= 0.0 {
        return None;
    }
    let r = hypocentral_distance.max(1.0);
    Some(
        (amplitude.amplitude / amplitude.period).log10()
            + calibration.log_distance * r.log10()
            + calibration.linear_distance * r
            + calibration.constant
            + calibration.station_correction,
    )
}

/// Station duration magnitude; `None` for a non-positive duration.
pub fn duration_magnitude(duration: f64, distance: f64, coeffs: &DurationMagnitude) -> Option<f64> {
    if duration <= 0.0 {
        return None;
    }
    Some(coeffs.c1 + coeffs.c2 * duration.log10() + coeffs.c3 * distance)
}

/// Weighted mean and standard deviation of `(value, weight)` pairs. When
/// every weight is zero the stations count equally.
pub fn aggregate(values: &[(f64, f64)]) -> Option<MagnitudeEstimate> {
    if values.is_empty() {
        return None;
    }
    let total: f64 = values.iter().map(|&(_, w)| w).sum();
    let weight = |w: f64| if total > 0.0 { w } else { 1.0 };
    let norm: f64 = values.iter().map(|&(_, w)| weight(w)).sum();
    let mean = values.iter().map(|&(m, w)| weight(w) * m).sum::<f64>() / norm;
    let var = values
        .iter()
        .map(|&(m, w)| weight(w) * (m - mean).powi(2))
        .sum::<f64>()
        / norm;
    Some(MagnitudeEstimate {
        mean,
        spread: var.sqrt(),
        count: values.len(),
    })
}

/// Compute station and event magnitudes. Readings without magnitude data
/// are skipped.
pub fn estimate(readings: &[MagnitudeReading<'_>], coeffs: &DurationMagnitude) -> EventMagnitude {
    let mut stations = Vec::new();
    for reading in readings {
        if let Some(amp) = &reading.amplitude {
            let r = reading.distance.hypot(reading.depth);
            if let Some(value) = amplitude_magnitude(amp, reading.calibration, r) {
                stations.push(StationMagnitude {
                    station: reading.station.to_string(),
                    kind: MagnitudeKind::Amplitude,
                    value,
                    weight: reading.weight,
                });
            }
        }
        if let Some(tau) = reading.coda_duration {
            if let Some(value) = duration_magnitude(tau, reading.distance, coeffs) {
                stations.push(StationMagnitude {
                    station: reading.station.to_string(),
                    kind: MagnitudeKind::Duration,
                    value,
                    weight: reading.weight,
                });
            }
        }
    }

    let of_kind = |kind: MagnitudeKind| -> Vec<(f64, f64)> {
        stations
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.value, s.weight))
            .collect()
    };
    let amplitude = aggregate(&of_kind(MagnitudeKind::Amplitude));
    let duration = aggregate(&of_kind(MagnitudeKind::Duration));

    EventMagnitude {
        amplitude,
        duration,
        stations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_formula() {
        let cal = MagnitudeCalibration {
            log_distance: 1.0,
            linear_distance: 0.01,
            constant: 0.5,
            station_correction: -0.1,
        };
        let amp = Amplitude {
            amplitude: 20.0,
            period: 0.2,
        };
        let m = amplitude_magnitude(&amp, &cal, 10.0).unwrap();
        // log10(100) + 1 + 0.1 + 0.5 - 0.1
        assert!((m - 3.5).abs() < 1e-12);
    }

    #[test]
    fn amplitude_grows_with_distance() {
        let cal = MagnitudeCalibration::default();
        let amp = Amplitude {
            amplitude: 1.0,
            period: 0.1,
        };
        let near = amplitude_magnitude(&amp, &cal, 10.0).unwrap();
        let far = amplitude_magnitude(&amp, &cal, 80.0).unwrap();
        assert!(far > near);
        assert!(amplitude_magnitude(&Amplitude { amplitude: 0.0, period: 0.1 }, &cal, 10.0).is_none());
    }

    #[test]
    fn duration_formula() {
        let m = duration_magnitude(10.0, 20.0, &DurationMagnitude::default()).unwrap();
        assert!((m - (-0.87 + 2.0 + 0.07)).abs() < 1e-12);
        assert!(duration_magnitude(0.0, 20.0, &DurationMagnitude::default()).is_none());
    }

    #[test]
    fn weighted_mean_and_spread() {
        let est = aggregate(&[(1.0, 1.0), (2.0, 1.0), (4.0, 0.0)]).unwrap();
        assert!((est.mean - 1.5).abs() < 1e-12);
        assert!((est.spread - 0.5).abs() < 1e-12);
        assert_eq!(est.count, 3);
        assert!(aggregate(&[]).is_none());
    }

    #[test]
    fn zero_weights_count_equally() {
        let est = aggregate(&[(1.0, 0.0), (3.0, 0.0)]).unwrap();
        assert!((est.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn stations_without_data_are_excluded() {
        let cal = MagnitudeCalibration::default();
        let readings = [
            MagnitudeReading {
                station: "AAA",
                calibration: &cal,
                amplitude: Some(Amplitude {
                    amplitude: 5.0,
                    period: 0.1,
                }),
                coda_duration: None,
                distance: 10.0,
                depth: 5.0,
                weight: 1.0,
            },
            MagnitudeReading {
                station: "BBB",
                calibration: &cal,
                amplitude: None,
                coda_duration: None,
                distance: 20.0,
                depth: 5.0,
                weight: 1.0,
            },
        ];
        let mag = estimate(&readings, &DurationMagnitude::default());
        assert_eq!(mag.stations.len(), 1);
        let amp = mag.amplitude.unwrap();
        assert_eq!(amp.count, 1);
        assert_eq!(amp.spread, 0.0);
        assert!(mag.duration.is_none());
        assert_eq!(mag.preferred(), Some(amp));
    }

    #[test]
    fn duration_used_when_no_amplitude() {
        let cal = MagnitudeCalibration::default();
        let readings = [MagnitudeReading {
            station: "AAA",
            calibration: &cal,
            amplitude: None,
            coda_duration: Some(30.0),
            distance: 10.0,
            depth: 5.0,
            weight: 0.5,
        }];
        let mag = estimate(&readings, &DurationMagnitude::default());
        assert!(mag.amplitude.is_none());
        assert_eq!(mag.preferred(), mag.duration);
    }
}
