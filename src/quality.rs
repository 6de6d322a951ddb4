// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Letter grade for a solution, A best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum QualityClass {
    /// Excellent.
    A,
    /// Good.
    B,
    /// Fair.
    C,
    /// Poor.
    #[default]
    D,
}

impl QualityClass {
    const ORDER: [QualityClass; 4] = [
        QualityClass::A,
        QualityClass::B,
        QualityClass::C,
        QualityClass::D,
    ];

    /// Zero-based rank, A = 0.
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Class for a rank, saturating at D.
    pub fn from_rank(rank: usize) -> Self {
        Self::ORDER[rank.min(3)]
    }

    /// One class worse, saturating at D.
    pub fn degraded(self) -> Self {
        Self::from_rank(self.rank() + 1)
    }

    /// True if this class is at least as good as `other`.
    pub fn at_least(self, other: QualityClass) -> bool {
        self <= other
    }
}

impl fmt::Display for QualityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            QualityClass::A => "A",
            QualityClass::B => "B",
            QualityClass::C => "C",
            QualityClass::D => "D",
        };
        f.write_str(letter)
    }
}

/// One row of the solution table. A row matches when every bound holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolutionThreshold {
    /// Grade awarded.
    pub class: QualityClass,
    /// RMS residual must be strictly below this, seconds.
    pub max_rms: f64,
    /// Horizontal standard error bound, km.
    pub max_horizontal_error: Option<f64>,
    /// Depth standard error bound, km.
    pub max_depth_error: Option<f64>,
}

/// One row of the station-distribution (depth control) table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionThreshold {
    /// Grade awarded.
    pub class: QualityClass,
    /// Minimum number of weighted readings.
    pub min_observations: usize,
    /// Maximum azimuthal gap, degrees.
    pub max_gap: f64,
    /// Nearest station must lie within `max(depth_factor·depth, floor)` km.
    pub depth_factor: f64,
    /// Lower bound on the nearest-station allowance, km.
    pub floor: f64,
}

/// Ordered threshold tables, strictest first. Falling through every row
/// grades D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityTables {
    /// Solution quality rows.
    pub solution: Vec<SolutionThreshold>,
    /// Depth-control rows.
    pub distribution: Vec<DistributionThreshold>,
}

impl Default for QualityTables {
    fn default() -> Self {
        QualityTables {
            solution: vec![
                SolutionThreshold {
                    class: QualityClass::A,
                    max_rms: 0.15,
                    max_horizontal_error: Some(1.0),
                    max_depth_error: Some(2.0),
                },
                SolutionThreshold {
                    class: QualityClass::B,
                    max_rms: 0.30,
                    max_horizontal_error: Some(2.5),
                    max_depth_error: Some(5.0),
                },
                SolutionThreshold {
                    class: QualityClass::C,
                    max_rms: 0.50,
                    max_horizontal_error: Some(5.0),
                    max_depth_error: None,
                },
            ],
            distribution: vec![
                DistributionThreshold {
                    class: QualityClass::A,
                    min_observations: 6,
                    max_gap: 90.0,
                    depth_factor: 1.0,
                    floor: 5.0,
                },
                DistributionThreshold {
                    class: QualityClass::B,
                    min_observations: 6,
                    max_gap: 135.0,
                    depth_factor: 2.0,
                    floor: 10.0,
                },
                DistributionThreshold {
                    class: QualityClass::C,
                    min_observations: 6,
                    max_gap: 180.0,
                    depth_factor: 0.0,
                    floor: 50.0,
                },
            ],
        }
    }
}

/// Final-state figures the grades are computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityInputs {
    /// Weighted RMS residual, seconds.
    pub rms: f64,
    /// Azimuthal gap, degrees.
    pub gap: f64,
    /// Number of weighted readings.
    pub observations: usize,
    /// Distance to the nearest weighted station, km.
    pub nearest_distance: f64,
    /// Focal depth, km.
    pub depth: f64,
    /// Horizontal standard error, km, when it could be estimated.
    pub horizontal_error: Option<f64>,
    /// Depth standard error, km, when it could be estimated.
    pub depth_error: Option<f64>,
    /// Depth was held fixed rather than solved for.
    pub depth_frozen: bool,
    /// The iteration ended without converging.
    pub degraded: bool,
}

/// The three grades reported with a hypocenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCodes {
    /// Combined grade.
    pub overall: QualityClass,
    /// Station distribution / depth control grade.
    pub depth: QualityClass,
    /// Fit and error-estimate grade.
    pub solution: QualityClass,
}

fn within(bound: Option<f64>, value: Option<f64>) -> bool {
    match (bound, value) {
        (Some(bound), Some(value)) => value <= bound,
        _ => true,
    }
}

/// Grade the fit: first matching row wins.
pub fn solution_quality(tables: &QualityTables, inputs: &QualityInputs) -> QualityClass {
    let class = tables
        .solution
        .iter()
        .find(|t| {
            inputs.rms < t.max_rms
                && within(t.max_horizontal_error, inputs.horizontal_error)
                && within(t.max_depth_error, inputs.depth_error)
        })
        .map_or(QualityClass::D, |t| t.class);
    if inputs.degraded {
        class.degraded()
    } else {
        class
    }
}

/// Grade the station distribution; a frozen depth is always D.
pub fn depth_quality(tables: &QualityTables, inputs: &QualityInputs) -> QualityClass {
    if inputs.depth_frozen {
        return QualityClass::D;
    }
    tables
        .distribution
        .iter()
        .find(|t| {
            inputs.observations >= t.min_observations
                && inputs.gap <= t.max_gap
                && inputs.nearest_distance <= (t.depth_factor * inputs.depth).max(t.floor)
        })
        .map_or(QualityClass::D, |t| t.class)
}

/// Grade a solution. The overall class is the mean of the other two,
/// rounded toward the worse grade.
pub fn classify(tables: &QualityTables, inputs: &QualityInputs) -> QualityCodes {
    let solution = solution_quality(tables, inputs);
    let depth = depth_quality(tables, inputs);
    let overall = QualityClass::from_rank((solution.rank() + depth.rank() + 1) / 2);
    QualityCodes {
        overall,
        depth,
        solution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good() -> QualityInputs {
        QualityInputs {
            rms: 0.05,
            gap: 60.0,
            observations: 12,
            nearest_distance: 3.0,
            depth: 8.0,
            horizontal_error: Some(0.4),
            depth_error: Some(0.9),
            depth_frozen: false,
            degraded: false,
        }
    }

    #[test]
    fn best_solution_grades_a() {
        let codes = classify(&QualityTables::default(), &good());
        assert_eq!(codes.solution, QualityClass::A);
        assert_eq!(codes.depth, QualityClass::A);
        assert_eq!(codes.overall, QualityClass::A);
    }

    #[test]
    fn first_matching_row_wins() {
        let tables = QualityTables::default();
        let mut inputs = good();
        inputs.rms = 0.2;
        assert_eq!(solution_quality(&tables, &inputs), QualityClass::B);
        inputs.horizontal_error = Some(3.0);
        assert_eq!(solution_quality(&tables, &inputs), QualityClass::C);
        inputs.rms = 0.9;
        assert_eq!(solution_quality(&tables, &inputs), QualityClass::D);
    }

    #[test]
    fn missing_errors_do_not_disqualify() {
        let mut inputs = good();
        inputs.horizontal_error = None;
        inputs.depth_error = None;
        assert_eq!(
            solution_quality(&QualityTables::default(), &inputs),
            QualityClass::A
        );
    }

    #[test]
    fn distribution_grades() {
        let tables = QualityTables::default();
        let mut inputs = good();
        inputs.gap = 120.0;
        assert_eq!(depth_quality(&tables, &inputs), QualityClass::B);
        inputs.gap = 170.0;
        assert_eq!(depth_quality(&tables, &inputs), QualityClass::C);
        inputs.gap = 200.0;
        assert_eq!(depth_quality(&tables, &inputs), QualityClass::D);

        // Nearest station too far for the depth
        let mut inputs = good();
        inputs.nearest_distance = 12.0;
        assert_eq!(depth_quality(&tables, &inputs), QualityClass::B);
        inputs.nearest_distance = 30.0;
        assert_eq!(depth_quality(&tables, &inputs), QualityClass::C);

        let mut inputs = good();
        inputs.observations = 5;
        assert_eq!(depth_quality(&tables, &inputs), QualityClass::D);
    }

    #[test]
    fn narrow_arc_is_poor() {
        let mut inputs = good();
        inputs.gap = 355.0;
        assert_eq!(
            depth_quality(&QualityTables::default(), &inputs),
            QualityClass::D
        );
    }

    #[test]
    fn frozen_depth_is_poor() {
        let mut inputs = good();
        inputs.depth_frozen = true;
        let codes = classify(&QualityTables::default(), &inputs);
        assert_eq!(codes.depth, QualityClass::D);
        // A and D average to C when rounding toward the worse grade
        assert_eq!(codes.overall, QualityClass::C);
    }

    #[test]
    fn degraded_drops_one_class() {
        let mut inputs = good();
        inputs.degraded = true;
        let codes = classify(&QualityTables::default(), &inputs);
        assert_eq!(codes.solution, QualityClass::B);
        assert_eq!(codes.overall, QualityClass::B);
        assert_eq!(QualityClass::D.degraded(), QualityClass::D);
    }

    #[test]
    fn class_ordering() {
        assert!(QualityClass::A.at_least(QualityClass::C));
        assert!(QualityClass::C.at_least(QualityClass::C));
        assert!(!QualityClass::D.at_least(QualityClass::C));
        assert_eq!(QualityClass::B.to_string(), "B");
    }
}
