// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};

use crate::error::{HypoError, Result};

/// Number of bisection steps when searching the direct-ray parameter.
const RAY_PARAMETER_STEPS: usize = 100;

/// Upper bound on `p·v_max` for the direct ray, just short of grazing.
const GRAZING_LIMIT: f64 = 1.0 - 1e-12;

/// One constant-velocity layer of a flat-layered crust.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityLayer {
    /// P-wave velocity in km/s.
    pub velocity: f64,
    /// Depth of the top of the layer in km.
    pub top: f64,
}

impl VelocityLayer {
    /// Create a layer.
    pub fn new(velocity: f64, top: f64) -> Self {
        VelocityLayer { velocity, top }
    }
}

/// Which ray produced the first arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RayPath {
    /// Direct ray from the source up to the surface.
    Direct,
    /// Head wave refracted along the top of the given layer.
    Refracted(usize),
}

/// First-arrival travel time with its partial derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelTime {
    /// Travel time in seconds.
    pub time: f64,
    /// Derivative with respect to epicentral distance (s/km).
    pub dt_ddistance: f64,
    /// Derivative with respect to source depth (s/km).
    pub dt_ddepth: f64,
    /// Angle of incidence at the surface, degrees from vertical.
    pub incidence: f64,
    /// Take-off angle at the source, degrees from downward vertical.
    pub takeoff: f64,
    /// The ray that arrives first.
    pub path: RayPath,
}

impl TravelTime {
    /// Scale time and derivatives, e.g. by Vp/Vs for an S reading.
    pub fn scaled(self, factor: f64) -> Self {
        TravelTime {
            time: self.time * factor,
            dt_ddistance: self.dt_ddistance * factor,
            dt_ddepth: self.dt_ddepth * factor,
            ..self
        }
    }
}

/// Forward model for P-wave travel times from a buried source to a surface
/// receiver.
pub trait TravelTimeModel {
    /// First-arrival P travel time and derivatives for the given epicentral
    /// distance and source depth (both km).
    fn p_wave(&self, distance: f64, depth: f64) -> Result<TravelTime>;
}

/// A horizontally layered velocity model over a half-space.
///
/// The last layer extends to infinite depth.
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredModel {
    layers: Vec<VelocityLayer>,
}

impl LayeredModel {
    /// Build a model from layers ordered top-down.
    ///
    /// # Errors
    /// Returns an error if the list is empty, the first top is not at the
    /// surface, tops are not strictly increasing, or a velocity is not
    /// positive and finite.
    pub fn new(layers: Vec<VelocityLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(HypoError::InvalidLayers {
                index: 0,
                reason: "at least one layer is required".to_string(),
            });
        }
        if layers[0].top != 0.0 {
            return Err(HypoError::InvalidLayers {
                index: 0,
                reason: format!("first layer top is {} km, must be 0", layers[0].top),
            });
        }
        for (index, layer) in layers.iter().enumerate() {
            if !layer.velocity.is_finite() || layer.velocity <= 0.0 {
                return Err(HypoError::InvalidVelocity {
                    index,
                    value: layer.velocity,
                });
            }
            if !layer.top.is_finite() {
                return Err(HypoError::InvalidLayers {
                    index,
                    reason: "layer top is not finite".to_string(),
                });
            }
            if index > 0 && layer.top <= layers[index - 1].top {
                return Err(HypoError::InvalidLayers {
                    index,
                    reason: format!(
                        "layer top {} km does not lie below {} km",
                        layer.top,
                        layers[index - 1].top
                    ),
                });
            }
        }
        let model = LayeredModel { layers };
        if let Some(index) = model.velocity_inversion() {
            tracing::warn!(
                layer = index,
                "velocity decreases with depth; refracted paths through this layer are skipped"
            );
        }
        Ok(model)
    }

    /// The layers, top-down.
    pub fn layers(&self) -> &[VelocityLayer] {
        &self.layers
    }

    /// True if some layer is slower than the one above it.
    pub fn has_velocity_inversion(&self) -> bool {
        self.velocity_inversion().is_some()
    }

    fn velocity_inversion(&self) -> Option<usize> {
        (1..self.layers.len()).find(|&k| self.layers[k].velocity < self.layers[k - 1].velocity)
    }

    /// Index of the layer containing `depth`. A source exactly on an
    /// interface belongs to the layer above it.
    pub fn layer_index(&self, depth: f64) -> usize {
        self.layers
            .iter()
            .rposition(|layer| layer.top < depth)
            .unwrap_or(0)
    }

    /// Velocity at `depth`; below the deepest top the half-space velocity.
    pub fn velocity_at(&self, depth: f64) -> f64 {
        self.layers[self.layer_index(depth)].velocity
    }

    fn thickness(&self, k: usize) -> f64 {
        self.layers[k + 1].top - self.layers[k].top
    }

    /// Vertical thickness and velocity of each layer the upgoing ray
    /// crosses, 0..=src. Empty legs are left out.
    fn upgoing_legs(&self, depth: f64, src: usize) -> Vec<(f64, f64)> {
        (0..src)
            .map(|k| (self.thickness(k), self.layers[k].velocity))
            .chain(std::iter::once((
                depth - self.layers[src].top,
                self.layers[src].velocity,
            )))
            .filter(|&(d, _)| d > 0.0)
            .collect()
    }

    /// Direct ray through the layers above the source.
    ///
    /// The time is taken as `p·x + τ(p)`. When the ray reaches the station
    /// this is the ray time; when even a grazing ray falls short, it is the
    /// grazing limit along the fastest layer crossed.
    fn direct(&self, distance: f64, depth: f64, src: usize) -> TravelTime {
        let v_src = self.layers[src].velocity;
        let v_top = self.layers[0].velocity;
        let legs = self.upgoing_legs(depth, src);

        let v_max = legs.iter().map(|&(_, v)| v).fold(0.0_f64, f64::max);

        // Source at the surface: the ray runs along the top layer.
        if v_max == 0.0 {
            return TravelTime {
                time: distance / v_src,
                dt_ddistance: 1.0 / v_src,
                dt_ddepth: 0.0,
                incidence: 90.0,
                takeoff: 90.0,
                path: RayPath::Direct,
            };
        }

        let offset = |p: f64| -> f64 {
            legs.iter()
                .map(|&(d, v)| {
                    let s = p * v;
                    d * s / (1.0 - s * s).sqrt()
                })
                .sum()
        };

        let p = if distance == 0.0 {
            0.0
        } else {
            let mut lo = 0.0;
            let mut hi = GRAZING_LIMIT / v_max;
            for _ in 0..RAY_PARAMETER_STEPS {
                let mid = 0.5 * (lo + hi);
                if offset(mid) < distance {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            0.5 * (lo + hi)
        };

        let tau: f64 = legs
            .iter()
            .map(|&(d, v)| {
                let s = p * v;
                d * (1.0 - s * s).sqrt() / v
            })
            .sum();

        let sin_src = (p * v_src).min(1.0);
        let cos_src = (1.0 - sin_src * sin_src).sqrt();
        TravelTime {
            time: p * distance + tau,
            dt_ddistance: p,
            dt_ddepth: cos_src / v_src,
            incidence: (p * v_top).min(1.0).asin().to_degrees(),
            takeoff: 180.0 - sin_src.asin().to_degrees(),
            path: RayPath::Direct,
        }
    }

    /// Head wave along the top of layer `m`, if it exists at this distance.
    fn refracted(&self, distance: f64, depth: f64, src: usize, m: usize) -> Option<TravelTime> {
        let v_m = self.layers[m].velocity;
        if self.layers[..m].iter().any(|layer| layer.velocity >= v_m) {
            return None;
        }

        let mut time = distance / v_m;
        let mut critical = 0.0;
        let mut leg = |d: f64, v: f64| {
            let sin = v / v_m;
            let cos = (1.0 - sin * sin).sqrt();
            time += d * cos / v;
            critical += d * sin / cos;
        };

        // Up from the refractor to the surface
        for k in 0..m {
            leg(self.thickness(k), self.layers[k].velocity);
        }
        // Down from the source to the refractor
        leg(self.layers[src + 1].top - depth, self.layers[src].velocity);
        for k in src + 1..m {
            leg(self.thickness(k), self.layers[k].velocity);
        }

        if distance < critical {
            return None;
        }

        let v_src = self.layers[src].velocity;
        let sin_src = v_src / v_m;
        let cos_src = (1.0 - sin_src * sin_src).sqrt();
        Some(TravelTime {
            time,
            dt_ddistance: 1.0 / v_m,
            dt_ddepth: -cos_src / v_src,
            incidence: (self.layers[0].velocity / v_m).asin().to_degrees(),
            takeoff: sin_src.asin().to_degrees(),
            path: RayPath::Refracted(m),
        })
    }
}

impl TravelTimeModel for LayeredModel {
    fn p_wave(&self, distance: f64, depth: f64) -> Result<TravelTime> {
        if !depth.is_finite() || depth < 0.0 || !distance.is_finite() || distance < 0.0 {
            return Err(HypoError::Geometry {
                station: String::new(),
                depth,
            });
        }
        let src = self.layer_index(depth);
        let mut best = self.direct(distance, depth, src);
        for m in src + 1..self.layers.len() {
            if let Some(head) = self.refracted(distance, depth, src, m) {
                if head.time < best.time {
                    best = head;
                }
            }
        }
        Ok(best)
    }
}
