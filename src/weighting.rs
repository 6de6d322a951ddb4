// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::core::WORST_READING_QUALITY;

/// Shape of the distance taper between the near and far thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taper {
    /// Straight line from 1 at near to 0 at far.
    #[default]
    Linear,
    /// Half cosine from 1 at near to 0 at far.
    Cosine,
}

/// Observation weighting by distance, reading quality and azimuth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightingPolicy {
    /// Distance taper shape.
    pub taper: Taper,
    /// Weight per reading quality class 0..=4.
    pub quality_weights: [f64; 5],
}

impl Default for WeightingPolicy {
    fn default() -> Self {
        WeightingPolicy {
            taper: Taper::Linear,
            quality_weights: [1.0, 0.75, 0.5, 0.25, 0.0],
        }
    }
}

impl WeightingPolicy {
    /// Distance factor: 1 inside `near`, 0 at or beyond `far`, tapered between.
    pub fn distance_factor(&self, distance: f64, near: f64, far: f64) -> f64 {
        if distance <= near {
            return 1.0;
        }
        if distance >= far {
            return 0.0;
        }
        let x = (distance - near) / (far - near);
        match self.taper {
            Taper::Linear => 1.0 - x,
            Taper::Cosine => 0.5 * (1.0 + (PI * x).cos()),
        }
    }

    /// Quality factor for a reading class; classes past the table weigh 0.
    pub fn quality_factor(&self, quality: u8) -> f64 {
        if quality > WORST_READING_QUALITY {
            return 0.0;
        }
        self.quality_weights[quality as usize].clamp(0.0, 1.0)
    }

    /// Product of the distance and quality factors.
    pub fn weight(&self, distance: f64, quality: u8, near: f64, far: f64) -> f64 {
        self.distance_factor(distance, near, far) * self.quality_factor(quality)
    }
}

/// Azimuthal down-weighting factors, one per entry of `azimuths`.
///
/// Each station is credited with half the angle to each neighbour in sorted
/// azimuth order; the factor is that share scaled so an even spread gives 1,
/// capped at 1. Stations that crowd together share a small span and are
/// down-weighted.
pub fn azimuthal_factors(azimuths: &[f64]) -> Vec<f64> {
    let n = azimuths.len();
    if n < 3 {
        return vec![1.0; n];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        azimuths[a]
            .partial_cmp(&azimuths[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut factors = vec![1.0; n];
    for (rank, &i) in order.iter().enumerate() {
        let next = if rank + 1 < n {
            azimuths[order[rank + 1]]
        } else {
            azimuths[order[0]] + 360.0
        };
        let prev = if rank > 0 {
            azimuths[order[rank - 1]]
        } else {
            azimuths[order[n - 1]] - 360.0
        };
        let span = 0.5 * (next - prev);
        factors[i] = (n as f64 * span / 360.0).min(1.0);
    }
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_factor_bounds_and_monotonic() {
        for taper in [Taper::Linear, Taper::Cosine] {
            let policy = WeightingPolicy {
                taper,
                ..WeightingPolicy::default()
            };
            assert_eq!(policy.distance_factor(0.0, 50.0, 100.0), 1.0);
            assert_eq!(policy.distance_factor(100.0, 50.0, 100.0), 0.0);
            assert_eq!(policy.distance_factor(250.0, 50.0, 100.0), 0.0);
            let mut prev = 1.0;
            for i in 0..=300 {
                let w = policy.distance_factor(i as f64 * 0.5, 50.0, 100.0);
                assert!((0.0..=1.0).contains(&w));
                assert!(w <= prev + 1e-15, "{:?} increased at {}", taper, i);
                prev = w;
            }
        }
    }

    #[test]
    fn linear_taper_midpoint() {
        let policy = WeightingPolicy::default();
        assert!((policy.distance_factor(75.0, 50.0, 100.0) - 0.5).abs() < 1e-12);
        let cosine = WeightingPolicy {
            taper: Taper::Cosine,
            ..WeightingPolicy::default()
        };
        assert!((cosine.distance_factor(75.0, 50.0, 100.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn equal_thresholds_are_a_step() {
        let policy = WeightingPolicy::default();
        assert_eq!(policy.distance_factor(50.0, 50.0, 50.0), 1.0);
        assert_eq!(policy.distance_factor(50.1, 50.0, 50.0), 0.0);
    }

    #[test]
    fn quality_factors_decrease() {
        let policy = WeightingPolicy::default();
        let w: Vec<f64> = (0..=5).map(|q| policy.quality_factor(q)).collect();
        assert_eq!(w, vec![1.0, 0.75, 0.5, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn combined_weight() {
        let policy = WeightingPolicy::default();
        assert!((policy.weight(75.0, 1, 50.0, 100.0) - 0.375).abs() < 1e-12);
        assert_eq!(policy.weight(10.0, 4, 50.0, 100.0), 0.0);
    }

    #[test]
    fn even_spread_keeps_full_weight() {
        let f = azimuthal_factors(&[0.0, 90.0, 180.0, 270.0]);
        assert!(f.iter().all(|&x| (x - 1.0).abs() < 1e-12));
    }

    #[test]
    fn clustered_station_is_downweighted() {
        let f = azimuthal_factors(&[0.0, 1.0, 2.0, 180.0]);
        assert!(f[1] < 0.05);
        assert!(f[0] > 0.99);
        assert_eq!(f[3], 1.0);
        assert!(f.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn few_stations_untouched() {
        assert_eq!(azimuthal_factors(&[10.0, 11.0]), vec![1.0, 1.0]);
        assert!(azimuthal_factors(&[]).is_empty());
    }
}
