// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{HypoError, Result};

/// Hemisphere marker for a degree/minute angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    /// North latitude.
    #[serde(rename = "N")]
    North,
    /// South latitude.
    #[serde(rename = "S")]
    South,
    /// East longitude.
    #[serde(rename = "E")]
    East,
    /// West longitude.
    #[serde(rename = "W")]
    West,
}

/// A latitude or longitude in the split degree/minute form that station
/// lists and hypocenter summaries are exchanged in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoAngle {
    /// Whole degrees.
    pub degrees: u32,
    /// Decimal minutes, in [0, 60).
    pub minutes: f64,
    /// Hemisphere of the angle.
    pub hemisphere: Hemisphere,
}

impl GeoAngle {
    /// Create an angle from its split components.
    pub fn new(degrees: u32, minutes: f64, hemisphere: Hemisphere) -> Self {
        GeoAngle {
            degrees,
            minutes,
            hemisphere,
        }
    }

    /// Signed decimal degrees, north and east positive.
    pub fn to_decimal(&self) -> f64 {
        let magnitude = self.degrees as f64 + self.minutes / 60.0;
        match self.hemisphere {
            Hemisphere::North | Hemisphere::East => magnitude,
            Hemisphere::South | Hemisphere::West => -magnitude,
        }
    }

    /// Build a latitude from signed decimal degrees.
    ///
    /// # Errors
    /// Returns an error if the value is not finite or exceeds 90 degrees.
    pub fn from_decimal_latitude(value: f64) -> Result<Self> {
        if !value.is_finite() || value.abs() > 90.0 {
            return Err(HypoError::InvalidCoordinate {
                value,
                reason: "latitude must be within [-90, 90]",
            });
        }
        let hemisphere = if value < 0.0 {
            Hemisphere::South
        } else {
            Hemisphere::North
        };
        Ok(Self::split(value.abs(), hemisphere))
    }

    /// Build a longitude from signed decimal degrees, normalized to (-180, 180].
    ///
    /// # Errors
    /// Returns an error if the value is not finite.
    pub fn from_decimal_longitude(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(HypoError::InvalidCoordinate {
                value,
                reason: "longitude must be finite",
            });
        }
        let mut lon = value % 360.0;
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon <= -180.0 {
            lon += 360.0;
        }
        let hemisphere = if lon < 0.0 {
            Hemisphere::West
        } else {
            Hemisphere::East
        };
        Ok(Self::split(lon.abs(), hemisphere))
    }

    /// Check the minutes field and the overall range for the hemisphere kind.
    pub fn validate(&self) -> Result<()> {
        if !self.minutes.is_finite() || self.minutes < 0.0 || self.minutes >= 60.0 {
            return Err(HypoError::InvalidCoordinate {
                value: self.minutes,
                reason: "minutes must be within [0, 60)",
            });
        }
        let limit = match self.hemisphere {
            Hemisphere::North | Hemisphere::South => 90.0,
            Hemisphere::East | Hemisphere::West => 180.0,
        };
        let value = self.to_decimal();
        if value.abs() > limit {
            return Err(HypoError::InvalidCoordinate {
                value,
                reason: "angle exceeds the hemisphere range",
            });
        }
        Ok(())
    }

    fn split(magnitude: f64, hemisphere: Hemisphere) -> Self {
        let mut degrees = magnitude.floor();
        let mut minutes = (magnitude - degrees) * 60.0;
        // Round-off can push minutes to 60.0
        if minutes >= 60.0 - 1e-9 {
            degrees += 1.0;
            minutes = 0.0;
        }
        GeoAngle {
            degrees: degrees as u32,
            minutes,
            hemisphere,
        }
    }
}

/// A calendar time split into date, hour, minute and decimal seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStamp {
    /// Calendar date.
    pub date: NaiveDate,
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Minute of hour, 0-59.
    pub minute: u32,
    /// Seconds past the minute. May exceed 60 or be negative for readings
    /// that roll over the minute of the card.
    pub seconds: f64,
}

impl TimeStamp {
    /// Create a time stamp from its split components.
    pub fn new(date: NaiveDate, hour: u32, minute: u32, seconds: f64) -> Self {
        TimeStamp {
            date,
            hour,
            minute,
            seconds,
        }
    }

    /// The start of this time stamp's minute, if it is a valid clock time.
    pub fn minute_start(&self) -> Option<NaiveDateTime> {
        self.date.and_hms_opt(self.hour, self.minute, 0)
    }

    /// Seconds elapsed from `reference` to this time stamp.
    pub fn offset_from(&self, reference: NaiveDateTime) -> Option<f64> {
        if !self.seconds.is_finite() {
            return None;
        }
        let start = self.minute_start()?;
        Some((start - reference).num_seconds() as f64 + self.seconds)
    }

    /// Rebuild a normalized time stamp `offset` seconds after `reference`.
    pub fn from_offset(reference: NaiveDateTime, offset: f64) -> Self {
        let whole_minutes = (offset / 60.0).floor();
        let seconds = offset - whole_minutes * 60.0;
        let t = reference + Duration::minutes(whole_minutes as i64);
        TimeStamp {
            date: t.date(),
            hour: t.hour(),
            minute: t.minute(),
            seconds,
        }
    }
}

/// Seismic phase carried by a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Compressional first arrival.
    P,
    /// Shear arrival.
    S,
}

/// Sharpness of the onset as read by the analyst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Onset {
    /// Sharp, impulsive onset.
    Impulsive,
    /// Gradual, emergent onset.
    #[default]
    Emergent,
}

/// First-motion polarity of a P reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirstMotion {
    /// Compression.
    Up,
    /// Dilatation.
    Down,
}

/// Maximum trace amplitude and its period, used for magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Amplitude {
    /// Ground amplitude in the units the station calibration assumes.
    pub amplitude: f64,
    /// Period of the measured wave, in seconds.
    pub period: f64,
}

/// Worst reading quality class; readings of this class carry no weight.
pub const WORST_READING_QUALITY: u8 = 4;

/// One phase reading at one station for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseObservation {
    /// Station code, resolved against the roster.
    pub station: String,
    /// Phase type.
    pub phase: Phase,
    /// Onset character.
    #[serde(default)]
    pub onset: Onset,
    /// First-motion polarity, if read.
    #[serde(default)]
    pub first_motion: Option<FirstMotion>,
    /// Reading quality class, 0 (best) to 4 (unusable).
    pub quality: u8,
    /// Arrival time.
    pub arrival: TimeStamp,
    /// Amplitude reading for magnitude.
    #[serde(default)]
    pub amplitude: Option<Amplitude>,
    /// Signal duration (F-P) in seconds for duration magnitude.
    #[serde(default)]
    pub coda_duration: Option<f64>,
}

impl PhaseObservation {
    /// A plain reading with no magnitude data.
    pub fn new(station: &str, phase: Phase, quality: u8, arrival: TimeStamp) -> Self {
        PhaseObservation {
            station: station.to_string(),
            phase,
            onset: Onset::default(),
            first_motion: None,
            quality,
            arrival,
            amplitude: None,
            coda_duration: None,
        }
    }

    /// Attach an amplitude reading (builder method).
    pub fn with_amplitude(mut self, amplitude: f64, period: f64) -> Self {
        self.amplitude = Some(Amplitude { amplitude, period });
        self
    }

    /// Attach a signal duration (builder method).
    pub fn with_coda_duration(mut self, seconds: f64) -> Self {
        self.coda_duration = Some(seconds);
        self
    }
}

/// The readings for one earthquake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Caller-chosen event label, echoed on the result.
    pub label: String,
    /// Phase readings, any order.
    pub phases: Vec<PhaseObservation>,
}

impl Event {
    /// Create an event from its label and readings.
    pub fn new(label: &str, phases: Vec<PhaseObservation>) -> Self {
        Event {
            label: label.to_string(),
            phases,
        }
    }
}

/// Attenuation coefficients for the amplitude magnitude at one station:
/// `M = log10(A/T) + log_distance·log10(R) + linear_distance·R + constant + station_correction`
/// with R the hypocentral distance in km.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnitudeCalibration {
    /// Coefficient of log10 of hypocentral distance.
    pub log_distance: f64,
    /// Coefficient of hypocentral distance.
    pub linear_distance: f64,
    /// Network constant.
    pub constant: f64,
    /// Per-station correction.
    pub station_correction: f64,
}

impl Default for MagnitudeCalibration {
    fn default() -> Self {
        // Local-magnitude attenuation referenced to 100 km
        MagnitudeCalibration {
            log_distance: 1.11,
            linear_distance: 0.00189,
            constant: -2.09,
            station_correction: 0.0,
        }
    }
}

/// A seismic station and its static corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    /// Station code.
    pub code: String,
    /// Station latitude.
    pub latitude: GeoAngle,
    /// Station longitude.
    pub longitude: GeoAngle,
    /// Elevation in metres.
    #[serde(default)]
    pub elevation: f64,
    /// Time correction in seconds added to predicted arrivals.
    #[serde(default)]
    pub delay: f64,
    /// Magnitude calibration constants.
    #[serde(default)]
    pub calibration: MagnitudeCalibration,
}

impl StationRecord {
    /// Create a station with no delay and default magnitude calibration.
    pub fn new(code: &str, latitude: GeoAngle, longitude: GeoAngle) -> Self {
        StationRecord {
            code: code.to_string(),
            latitude,
            longitude,
            elevation: 0.0,
            delay: 0.0,
            calibration: MagnitudeCalibration::default(),
        }
    }

    /// Set the station delay (builder method).
    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    /// Set the magnitude calibration (builder method).
    pub fn with_calibration(mut self, calibration: MagnitudeCalibration) -> Self {
        self.calibration = calibration;
        self
    }
}

/// Immutable station list indexed by code.
#[derive(Debug, Clone)]
pub struct StationRoster {
    stations: Vec<StationRecord>,
    index: HashMap<String, usize>,
}

impl StationRoster {
    /// Index a station list.
    ///
    /// # Errors
    /// Returns an error on duplicate codes or invalid coordinates.
    pub fn new(stations: Vec<StationRecord>) -> Result<Self> {
        let mut index = HashMap::with_capacity(stations.len());
        for (i, station) in stations.iter().enumerate() {
            station.latitude.validate()?;
            station.longitude.validate()?;
            if index.insert(station.code.clone(), i).is_some() {
                return Err(HypoError::DuplicateStation(station.code.clone()));
            }
        }
        Ok(StationRoster { stations, index })
    }

    /// Look a station up by code.
    pub fn get(&self, code: &str) -> Option<&StationRecord> {
        self.index.get(code).map(|&i| &self.stations[i])
    }

    /// All stations in load order.
    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    /// Number of stations.
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// True if the roster has no stations.
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_angle_decimal_roundtrip() {
        let lat = GeoAngle::new(45, 21.73, Hemisphere::North);
        let back = GeoAngle::from_decimal_latitude(lat.to_decimal()).unwrap();
        assert_eq!(back.degrees, 45);
        assert!((back.minutes - 21.73).abs() < 1e-9);
        assert_eq!(back.hemisphere, Hemisphere::North);

        let lon = GeoAngle::new(121, 41.30, Hemisphere::West);
        assert!((lon.to_decimal() + 121.688_333_333).abs() < 1e-6);
        let back = GeoAngle::from_decimal_longitude(lon.to_decimal()).unwrap();
        assert_eq!(back.hemisphere, Hemisphere::West);
        assert_eq!(back.degrees, 121);
        assert!((back.minutes - 41.30).abs() < 1e-9);
    }

    #[test]
    fn geo_angle_minute_rollover() {
        let a = GeoAngle::from_decimal_latitude(10.999_999_999_999).unwrap();
        assert_eq!(a.degrees, 11);
        assert_eq!(a.minutes, 0.0);
    }

    #[test]
    fn geo_angle_rejects_out_of_range() {
        assert!(GeoAngle::from_decimal_latitude(91.0).is_err());
        assert!(GeoAngle::from_decimal_longitude(f64::NAN).is_err());
        assert!(GeoAngle::new(10, 61.0, Hemisphere::East).validate().is_err());
        assert!(GeoAngle::new(95, 0.0, Hemisphere::North).validate().is_err());
    }

    #[test]
    fn longitude_normalized() {
        let a = GeoAngle::from_decimal_longitude(190.0).unwrap();
        assert_eq!(a.hemisphere, Hemisphere::West);
        assert_eq!(a.degrees, 170);
    }

    #[test]
    fn time_stamp_offsets() {
        let date = NaiveDate::from_ymd_opt(1979, 4, 13).unwrap();
        let reference = date.and_hms_opt(12, 30, 0).unwrap();
        let t = TimeStamp::new(date, 12, 31, 5.25);
        assert!((t.offset_from(reference).unwrap() - 65.25).abs() < 1e-12);

        let rebuilt = TimeStamp::from_offset(reference, 65.25);
        assert_eq!(rebuilt.hour, 12);
        assert_eq!(rebuilt.minute, 31);
        assert!((rebuilt.seconds - 5.25).abs() < 1e-12);

        // Negative offsets borrow from the previous minute
        let early = TimeStamp::from_offset(reference, -2.5);
        assert_eq!(early.minute, 29);
        assert!((early.seconds - 57.5).abs() < 1e-12);
    }

    #[test]
    fn time_stamp_crosses_midnight() {
        let date = NaiveDate::from_ymd_opt(2001, 12, 31).unwrap();
        let reference = date.and_hms_opt(23, 59, 0).unwrap();
        let t = TimeStamp::from_offset(reference, 75.0);
        assert_eq!(t.date, NaiveDate::from_ymd_opt(2002, 1, 1).unwrap());
        assert_eq!((t.hour, t.minute), (0, 0));
        assert!((t.seconds - 15.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_clock_time() {
        let date = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let t = TimeStamp::new(date, 25, 0, 0.0);
        assert!(t.minute_start().is_none());
        assert!(t.offset_from(date.and_hms_opt(0, 0, 0).unwrap()).is_none());
    }

    #[test]
    fn roster_rejects_duplicates() {
        let lat = GeoAngle::new(45, 0.0, Hemisphere::North);
        let lon = GeoAngle::new(121, 0.0, Hemisphere::West);
        let result = StationRoster::new(vec![
            StationRecord::new("AAA", lat, lon),
            StationRecord::new("AAA", lat, lon),
        ]);
        assert!(matches!(result, Err(HypoError::DuplicateStation(code)) if code == "AAA"));
    }

    #[test]
    fn roster_lookup() {
        let lat = GeoAngle::new(45, 0.0, Hemisphere::North);
        let lon = GeoAngle::new(121, 0.0, Hemisphere::West);
        let roster = StationRoster::new(vec![
            StationRecord::new("AAA", lat, lon),
            StationRecord::new("BBB", lat, lon).with_delay(0.2),
        ])
        .unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get("BBB").unwrap().delay, 0.2);
        assert!(roster.get("CCC").is_none());
    }
}
