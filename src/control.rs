// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};

use crate::core::GeoAngle;
use crate::error::{HypoError, Result};
use crate::magnitude::DurationMagnitude;
use crate::quality::{QualityClass, QualityTables};
use crate::weighting::WeightingPolicy;

/// Tunable thresholds of the Geiger iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationPolicy {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Largest epicentral move per iteration, km.
    pub max_horizontal_step: f64,
    /// Largest depth move per iteration, km.
    pub max_depth_step: f64,
    /// Factor the step is multiplied by while it exceeds a limit, in (0, 1).
    pub damping_factor: f64,
    /// Converged when the RMS changes by less than this, seconds...
    pub rms_tolerance: f64,
    /// ...and the hypocenter moves by less than this, km.
    pub step_tolerance: f64,
    /// Consecutive RMS increases that count as divergence.
    pub divergence_limit: usize,
    /// Pivot rejection threshold relative to the largest diagonal.
    pub pivot_tolerance: f64,
    /// A step that would lift the focus above the surface instead scales
    /// the depth by this factor, in (0, 1).
    pub depth_reflection: f64,
}

impl Default for IterationPolicy {
    fn default() -> Self {
        IterationPolicy {
            max_iterations: 20,
            max_horizontal_step: 25.0,
            max_depth_step: 5.0,
            damping_factor: 0.5,
            rms_tolerance: 1e-4,
            step_tolerance: 0.05,
            divergence_limit: 3,
            pivot_tolerance: 1e-6,
            depth_reflection: 0.5,
        }
    }
}

/// A starting epicenter for the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Epicenter {
    /// Latitude.
    pub latitude: GeoAngle,
    /// Longitude.
    pub longitude: GeoAngle,
}

/// Run-wide parameters, fixed for a batch of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunControl {
    /// Starting focal depth, km.
    pub trial_depth: f64,
    /// Full-weight distance, km.
    pub near_distance: f64,
    /// Zero-weight distance, km.
    pub far_distance: f64,
    /// P to S velocity ratio.
    pub vp_vs_ratio: f64,
    /// Poorest overall grade counted in station residual summaries.
    pub min_summary_quality: QualityClass,
    /// Down-weight stations crowded in azimuth.
    pub azimuthal_weighting: bool,
    /// Report arrivals ordered by distance.
    pub sort_stations: bool,
    /// Log every iteration at info level.
    pub print_iterations: bool,
    /// Hold depth at the trial depth.
    pub fixed_depth: bool,
    /// Starting epicenter; the earliest station is used when absent.
    pub initial_epicenter: Option<Epicenter>,
    /// Iteration thresholds.
    pub policy: IterationPolicy,
    /// Observation weighting.
    pub weighting: WeightingPolicy,
    /// Duration magnitude coefficients.
    pub duration_magnitude: DurationMagnitude,
    /// Quality threshold tables.
    pub quality: QualityTables,
}

impl Default for RunControl {
    fn default() -> Self {
        RunControl {
            trial_depth: 5.0,
            near_distance: 50.0,
            far_distance: 100.0,
            vp_vs_ratio: 1.78,
            min_summary_quality: QualityClass::C,
            azimuthal_weighting: false,
            sort_stations: false,
            print_iterations: false,
            fixed_depth: false,
            initial_epicenter: None,
            policy: IterationPolicy::default(),
            weighting: WeightingPolicy::default(),
            duration_magnitude: DurationMagnitude::default(),
            quality: QualityTables::default(),
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(HypoError::InvalidRunControl {
            field,
            reason: format!("{} (must be positive and finite)", value),
        });
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f64) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(HypoError::InvalidRunControl {
            field,
            reason: format!("{} (must lie strictly between 0 and 1)", value),
        });
    }
    Ok(())
}

impl RunControl {
    /// Set the trial depth (builder method).
    pub fn with_trial_depth(mut self, depth: f64) -> Self {
        self.trial_depth = depth;
        self
    }

    /// Set the near and far weighting distances (builder method).
    pub fn with_distance_weighting(mut self, near: f64, far: f64) -> Self {
        self.near_distance = near;
        self.far_distance = far;
        self
    }

    /// Set the Vp/Vs ratio (builder method).
    pub fn with_vp_vs_ratio(mut self, ratio: f64) -> Self {
        self.vp_vs_ratio = ratio;
        self
    }

    /// Set the starting epicenter (builder method).
    pub fn with_initial_epicenter(mut self, latitude: GeoAngle, longitude: GeoAngle) -> Self {
        self.initial_epicenter = Some(Epicenter {
            latitude,
            longitude,
        });
        self
    }

    /// Hold depth fixed at the trial depth (builder method).
    pub fn with_fixed_depth(mut self, fixed: bool) -> Self {
        self.fixed_depth = fixed;
        self
    }

    /// Enable azimuthal weighting (builder method).
    pub fn with_azimuthal_weighting(mut self, enabled: bool) -> Self {
        self.azimuthal_weighting = enabled;
        self
    }

    /// Replace the iteration thresholds (builder method).
    pub fn with_policy(mut self, policy: IterationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check every parameter.
    ///
    /// # Errors
    /// Returns `InvalidRunControl` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.trial_depth.is_finite() || self.trial_depth < 0.0 {
            return Err(HypoError::InvalidRunControl {
                field: "trial_depth",
                reason: format!("{} (must be non-negative and finite)", self.trial_depth),
            });
        }
        if !self.near_distance.is_finite() || self.near_distance < 0.0 {
            return Err(HypoError::InvalidRunControl {
                field: "near_distance",
                reason: format!("{} (must be non-negative and finite)", self.near_distance),
            });
        }
        positive("far_distance", self.far_distance)?;
        if self.near_distance > self.far_distance {
            return Err(HypoError::InvalidRunControl {
                field: "near_distance",
                reason: format!(
                    "{} exceeds far_distance {}",
                    self.near_distance, self.far_distance
                ),
            });
        }
        if !self.vp_vs_ratio.is_finite() || self.vp_vs_ratio <= 1.0 {
            return Err(HypoError::InvalidRunControl {
                field: "vp_vs_ratio",
                reason: format!("{} (must exceed 1)", self.vp_vs_ratio),
            });
        }
        if let Some(epicenter) = &self.initial_epicenter {
            epicenter.latitude.validate()?;
            epicenter.longitude.validate()?;
        }

        let p = &self.policy;
        if p.max_iterations == 0 {
            return Err(HypoError::InvalidRunControl {
                field: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if p.divergence_limit == 0 {
            return Err(HypoError::InvalidRunControl {
                field: "divergence_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        positive("max_horizontal_step", p.max_horizontal_step)?;
        positive("max_depth_step", p.max_depth_step)?;
        positive("rms_tolerance", p.rms_tolerance)?;
        positive("step_tolerance", p.step_tolerance)?;
        positive("pivot_tolerance", p.pivot_tolerance)?;
        unit_interval("damping_factor", p.damping_factor)?;
        unit_interval("depth_reflection", p.depth_reflection)?;

        if self
            .weighting
            .quality_weights
            .iter()
            .any(|w| !(0.0..=1.0).contains(w))
        {
            return Err(HypoError::InvalidRunControl {
                field: "quality_weights",
                reason: "weights must lie in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RunControl::default().validate().unwrap();
    }

    #[test]
    fn near_beyond_far_rejected() {
        let control = RunControl::default().with_distance_weighting(120.0, 100.0);
        assert!(matches!(
            control.validate(),
            Err(HypoError::InvalidRunControl {
                field: "near_distance",
                ..
            })
        ));
    }

    #[test]
    fn bad_ratio_and_depth_rejected() {
        assert!(RunControl::default()
            .with_vp_vs_ratio(0.9)
            .validate()
            .is_err());
        assert!(RunControl::default()
            .with_trial_depth(-2.0)
            .validate()
            .is_err());
    }

    #[test]
    fn policy_limits_checked() {
        let policy = IterationPolicy {
            damping_factor: 1.0,
            ..IterationPolicy::default()
        };
        let err = RunControl::default().with_policy(policy).validate();
        assert!(matches!(
            err,
            Err(HypoError::InvalidRunControl {
                field: "damping_factor",
                ..
            })
        ));

        let policy = IterationPolicy {
            max_iterations: 0,
            ..IterationPolicy::default()
        };
        assert!(RunControl::default().with_policy(policy).validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let control: RunControl = toml::from_str(
            r#"
            trial_depth = 7.5
            fixed_depth = true

            [policy]
            max_iterations = 12
            "#,
        )
        .unwrap();
        assert_eq!(control.trial_depth, 7.5);
        assert!(control.fixed_depth);
        assert_eq!(control.policy.max_iterations, 12);
        assert_eq!(control.policy.max_depth_step, 5.0);
        assert_eq!(control.far_distance, 100.0);
        control.validate().unwrap();
    }
}
