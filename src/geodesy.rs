// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Short-distance conversion between geographic and local flat coordinates.
//!
//! Distances are computed on a plane tangent at the mean latitude of the two
//! points, which is adequate for the few hundred kilometres a local network
//! spans.

/// Kilometres per degree of latitude at latitude `lat` (degrees).
pub fn km_per_degree_latitude(lat: f64) -> f64 {
    let phi = lat.to_radians();
    111.132_954 - 0.559_822 * (2.0 * phi).cos() + 0.001_175 * (4.0 * phi).cos()
}

/// Kilometres per degree of longitude at latitude `lat` (degrees).
pub fn km_per_degree_longitude(lat: f64) -> f64 {
    let phi = lat.to_radians();
    111.412_84 * phi.cos() - 0.093_5 * (3.0 * phi).cos()
}

/// East and north offsets in km of a station from an epicenter, plus the
/// derived epicentral distance and azimuth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    /// Eastward offset in km.
    pub east: f64,
    /// Northward offset in km.
    pub north: f64,
    /// Epicentral distance in km.
    pub distance: f64,
    /// Azimuth from epicenter to station, degrees clockwise from north in [0, 360).
    pub azimuth: f64,
}

/// Offset of the point (`lat`, `lon`) as seen from (`lat0`, `lon0`).
pub fn offset(lat0: f64, lon0: f64, lat: f64, lon: f64) -> Offset {
    let mid = 0.5 * (lat0 + lat);
    let mut dlon = lon - lon0;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let east = dlon * km_per_degree_longitude(mid);
    let north = (lat - lat0) * km_per_degree_latitude(mid);
    let distance = east.hypot(north);
    Offset {
        east,
        north,
        distance,
        azimuth: azimuth_of(east, north),
    }
}

/// Azimuth in degrees [0, 360) of an (east, north) vector.
pub fn azimuth_of(east: f64, north: f64) -> f64 {
    if east == 0.0 && north == 0.0 {
        return 0.0;
    }
    let az = east.atan2(north).to_degrees();
    if az < 0.0 {
        az + 360.0
    } else {
        az
    }
}

/// Move a point by `east`/`north` km, returning the new (lat, lon).
pub fn displace(lat: f64, lon: f64, east: f64, north: f64) -> (f64, f64) {
    let new_lat = lat + north / km_per_degree_latitude(lat);
    let mid = 0.5 * (lat + new_lat);
    let new_lon = lon + east / km_per_degree_longitude(mid);
    (new_lat, new_lon)
}

/// Largest angular span, in degrees, not covered by any azimuth.
///
/// Returns 360 when fewer than two azimuths are given.
pub fn azimuthal_gap(azimuths: &[f64]) -> f64 {
    if azimuths.len() < 2 {
        return 360.0;
    }
    let mut sorted = azimuths.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let wrap = sorted[0] + 360.0 - sorted[sorted.len() - 1];
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(wrap, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_lengths() {
        assert!((km_per_degree_latitude(0.0) - 110.574).abs() < 0.01);
        assert!((km_per_degree_latitude(45.0) - 111.132).abs() < 0.01);
        assert!((km_per_degree_longitude(0.0) - 111.319).abs() < 0.01);
        assert!((km_per_degree_longitude(45.0) - 78.847).abs() < 0.01);
    }

    #[test]
    fn offset_cardinal_directions() {
        let east = offset(45.0, -121.0, 45.0, -120.9);
        assert!((east.azimuth - 90.0).abs() < 0.1);
        assert!(east.north.abs() < 1e-9);

        let north = offset(45.0, -121.0, 45.1, -121.0);
        assert!(north.azimuth.abs() < 1e-9);
        assert!((north.distance - 11.113).abs() < 0.01);

        let sw = offset(45.0, -121.0, 44.9, -121.1);
        assert!(sw.azimuth > 180.0 && sw.azimuth < 270.0);
    }

    #[test]
    fn displace_inverts_offset() {
        let (lat, lon) = displace(45.36, -121.69, 12.0, -7.5);
        let o = offset(45.36, -121.69, lat, lon);
        assert!((o.east - 12.0).abs() < 1e-3);
        assert!((o.north + 7.5).abs() < 1e-3);
    }

    #[test]
    fn dateline_wrap() {
        let o = offset(0.0, 179.95, 0.0, -179.95);
        assert!(o.distance < 12.0);
        assert!((o.azimuth - 90.0).abs() < 1e-6);
    }

    #[test]
    fn gap_of_even_spread() {
        let gap = azimuthal_gap(&[0.0, 90.0, 180.0, 270.0]);
        assert!((gap - 90.0).abs() < 1e-12);
    }

    #[test]
    fn gap_wraps_through_north() {
        let gap = azimuthal_gap(&[350.0, 10.0, 30.0]);
        assert!((gap - 320.0).abs() < 1e-12);
    }

    #[test]
    fn gap_of_narrow_arc() {
        let gap = azimuthal_gap(&[40.0, 41.0, 42.5, 43.0]);
        assert!(gap > 356.0);
        assert_eq!(azimuthal_gap(&[12.0]), 360.0);
        assert_eq!(azimuthal_gap(&[]), 360.0);
    }
}
