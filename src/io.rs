// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::control::RunControl;
use crate::core::{Event, StationRecord, StationRoster};
use crate::error::{HypoError, Result};
use crate::velocity::{LayeredModel, VelocityLayer};

/// Everything needed to locate a batch of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    /// Run control; omitted fields take their defaults.
    #[serde(default)]
    pub control: RunControl,
    /// Velocity layers, top down.
    pub layers: Vec<VelocityLayer>,
    /// Station roster.
    pub stations: Vec<StationRecord>,
    /// Events to locate.
    #[serde(default)]
    pub events: Vec<Event>,
}

impl RunFile {
    /// Build the validated velocity model.
    pub fn model(&self) -> Result<LayeredModel> {
        LayeredModel::new(self.layers.clone())
    }

    /// Build the validated station roster.
    pub fn roster(&self) -> Result<StationRoster> {
        StationRoster::new(self.stations.clone())
    }
}

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// TOML document.
    Toml,
    /// JSON document.
    Json,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(FileFormat::Toml),
        Some("json") => Ok(FileFormat::Json),
        Some(ext) => Err(HypoError::UnsupportedFileFormat(ext.to_string())),
        None => Err(HypoError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Load a run file, inferring the format from the extension.
pub fn load_run(path: &Path) -> Result<RunFile> {
    let format = infer_format(path)?;
    let text = std::fs::read_to_string(path)?;
    let run: RunFile = match format {
        FileFormat::Toml => toml::from_str(&text).map_err(|e| HypoError::Parse(e.to_string()))?,
        FileFormat::Json => {
            serde_json::from_str(&text).map_err(|e| HypoError::Parse(e.to_string()))?
        }
    };
    tracing::debug!(
        path = %path.display(),
        layers = run.layers.len(),
        stations = run.stations.len(),
        events = run.events.len(),
        "loaded run file"
    );
    Ok(run)
}

/// Write any serializable value as pretty-printed JSON.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| HypoError::Parse(e.to_string()))?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(text.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phase;

    const RUN_TOML: &str = r#"
[control]
trial_depth = 6.0
near_distance = 40.0
far_distance = 90.0

[[layers]]
velocity = 5.0
top = 0.0

[[layers]]
velocity = 6.5
top = 12.0

[[stations]]
code = "AAA"
latitude = { degrees = 45, minutes = 12.5, hemisphere = "N" }
longitude = { degrees = 121, minutes = 3.0, hemisphere = "W" }
delay = 0.05

[[events]]
label = "ev1"

[[events.phases]]
station = "AAA"
phase = "P"
quality = 0
arrival = { date = "1999-03-02", hour = 4, minute = 17, seconds = 12.34 }
amplitude = { amplitude = 3.2, period = 0.15 }
"#;

    #[test]
    fn load_toml_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, RUN_TOML).unwrap();

        let run = load_run(&path).unwrap();
        assert_eq!(run.control.trial_depth, 6.0);
        assert_eq!(run.control.vp_vs_ratio, 1.78);
        assert_eq!(run.model().unwrap().layers().len(), 2);
        let roster = run.roster().unwrap();
        assert_eq!(roster.get("AAA").unwrap().delay, 0.05);
        assert_eq!(run.events[0].phases[0].phase, Phase::P);
        assert!(run.events[0].phases[0].amplitude.is_some());
    }

    #[test]
    fn json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("run.toml");
        std::fs::write(&toml_path, RUN_TOML).unwrap();
        let run = load_run(&toml_path).unwrap();

        let json_path = dir.path().join("run.json");
        save_json(&json_path, &run).unwrap();
        let back = load_run(&json_path).unwrap();
        assert_eq!(back.layers, run.layers);
        assert_eq!(back.stations[0].code, "AAA");
        assert_eq!(back.events[0].label, "ev1");
        assert_eq!(back.control.policy.max_iterations, 20);
        let arrival = back.events[0].phases[0].arrival;
        assert_eq!((arrival.hour, arrival.minute), (4, 17));
        assert!((arrival.seconds - 12.34).abs() < 1e-12);
    }

    #[test]
    fn malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_run(&path), Err(HypoError::Parse(_))));
    }

    #[test]
    fn missing_file() {
        let result = load_run(Path::new("/nonexistent/run.toml"));
        assert!(matches!(result, Err(HypoError::IoError(_))));
    }

    #[test]
    fn unsupported_format() {
        let path = Path::new("test.xyz");
        let result = infer_format(path);
        assert!(matches!(
            result,
            Err(HypoError::UnsupportedFileFormat(_))
        ));
    }
}
