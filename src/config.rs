// Process-level settings. Every section deserializes with defaults so a JSON
// file only needs the fields it changes.

use crate::error::{Error, Result};
use crate::pipeline::PipelineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub capture: CaptureConfig,
    pub serial: SerialConfig,
    pub display: DisplayConfig,
}

/// Hints for the capture device. Drivers may ignore them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: i32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Replay an image sequence from this directory instead of a camera.
    pub replay_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            fps: 15.0,
            replay_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the servo controller, e.g. `/dev/ttyACM0`.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    /// Pause after opening while the controller resets.
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            timeout_ms: 1000,
            settle_ms: 2000,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Run without windows.
    pub headless: bool,
    /// Bounded wait for a key press per frame.
    pub poll_wait_ms: u64,
    pub quit_key: char,
    /// Headless only: write annotated frames and masks here.
    pub dump_dir: Option<PathBuf>,
    /// Headless only: dump every n-th frame. Zero dumps nothing.
    pub dump_every: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            headless: false,
            poll_wait_ms: 30,
            quit_key: 'q',
            dump_dir: None,
            dump_every: 1,
        }
    }
}

impl DisplayConfig {
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.refiner.kernel_size == 0 {
            return Err(Error::Config("refiner.kernel_size must be at least 1".into()));
        }
        if pipeline.background.max_modes == 0 {
            return Err(Error::Config("background.max_modes must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&pipeline.background.background_ratio) {
            return Err(Error::Config("background.background_ratio must lie in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&pipeline.background.max_learning_rate) {
            return Err(Error::Config("background.max_learning_rate must lie in [0, 1]".into()));
        }
        if pipeline.min_area < 0.0 {
            return Err(Error::Config("min_area must not be negative".into()));
        }
        if pipeline.bearing.angle_min == pipeline.bearing.angle_max {
            return Err(Error::Config("bearing.angle_min and angle_max must differ".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("serial.baud_rate must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = AppConfig::from_json("{}").expect("config");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.display.poll_wait(), Duration::from_millis(30));
        assert_eq!(config.pipeline.dispatch.send_interval_ms, 50);
        assert_eq!(config.pipeline.governor.cleanup_interval, 30);
    }

    #[test]
    fn nested_fields_override_selectively() {
        let config = AppConfig::from_json(
            r#"{
                "pipeline": { "min_area": 1500, "refiner": { "kernel_size": 5 } },
                "serial": { "port": "/dev/ttyACM0" },
                "display": { "headless": true }
            }"#,
        )
        .expect("config");
        assert_eq!(config.pipeline.min_area, 1500.0);
        assert_eq!(config.pipeline.refiner.kernel_size, 5);
        assert_eq!(config.pipeline.refiner.dilate_iterations, 2);
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.serial.settle_ms, 2000);
        assert!(config.display.headless);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = AppConfig::from_json(r#"{ "pipeline": { "refiner": { "kernel_size": 0 } } }"#).expect_err("kernel");
        assert!(matches!(err, Error::Config(_)));
        assert!(AppConfig::from_json(r#"{ "pipeline": { "min_area": "big" } }"#).is_err());
        let err = AppConfig::from_json(r#"{ "pipeline": { "background": { "max_learning_rate": 2.0 } } }"#)
            .expect_err("rate cap");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.json");
        match AppConfig::load(&path) {
            Err(Error::ConfigFile { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_round_trips_through_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sentry.json");
        std::fs::write(&path, r#"{ "capture": { "camera_index": 2, "fps": 30.0 } }"#).expect("write");
        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.capture.camera_index, 2);
        assert_eq!(config.capture.width, 640);
    }
}
