//! Pipeline and sensor configuration.
//!
//! Configuration is read before `start()` and copied into the acquisition
//! thread, which only ever reads it.

use super::SourceSelection;
use crate::mapping::Calibration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for synchronization and point cloud conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Re-project each depth point into the color image to pick its color.
    pub align_to_color: bool,
    /// Color and depth already share pixel indexing.
    pub preregistered: bool,
    /// Emit one point per depth pixel. When false, only every
    /// `normal_cloud_stride`-th pixel in each axis is converted.
    pub large_cloud: bool,
    /// Subsampling stride used when `large_cloud` is false.
    pub normal_cloud_stride: usize,
    /// Nominal sensor frame rate.
    pub expected_fps: f64,
    /// Accepted color/depth skew, in frame intervals.
    pub skew_tolerance_frames: f64,
    /// Number of recent matches averaged for the FPS estimate.
    pub fps_window: usize,
    /// Ask the driver to open its infrared reader.
    pub infrared: bool,
    /// Ask the driver to open its body-index (person) reader.
    pub person: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            align_to_color: true,
            preregistered: false,
            large_cloud: true,
            normal_cloud_stride: 2,
            expected_fps: 30.0,
            skew_tolerance_frames: 1.0,
            fps_window: 30,
            infrared: false,
            person: false,
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normal_cloud_stride == 0 {
            return Err(ConfigError::InvalidStride);
        }
        if !(self.expected_fps > 0.0 && self.expected_fps <= 120.0) {
            return Err(ConfigError::InvalidFrameRate);
        }
        if !(self.skew_tolerance_frames > 0.0 && self.skew_tolerance_frames.is_finite()) {
            return Err(ConfigError::InvalidTolerance);
        }
        if self.fps_window < 2 {
            return Err(ConfigError::InvalidFpsWindow);
        }
        Ok(())
    }

    /// Optional readers to open next to color and depth.
    pub fn sources(&self) -> SourceSelection {
        SourceSelection {
            infrared: self.infrared,
            person: self.person,
        }
    }

    /// Maximum timestamp difference for a color and depth frame to match.
    pub fn skew_tolerance(&self) -> Duration {
        Duration::from_secs_f64(self.skew_tolerance_frames / self.expected_fps)
    }
}

/// Settings for the built-in synthetic sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSensorConfig {
    /// Frames generated per second.
    pub fps: u32,
    /// Distance of the simulated wall.
    pub plane_depth_mm: u16,
    /// Peak amplitude of uniform depth noise.
    pub noise_mm: u16,
    /// Seed for the noise generator.
    pub seed: u64,
    /// Delay applied to the color timestamp relative to depth.
    pub color_lag_ms: u64,
}

impl Default for SyntheticSensorConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            plane_depth_mm: 1500,
            noise_mm: 4,
            seed: 0x5eed,
            color_lag_ms: 2,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("normal cloud stride must be at least 1")]
    InvalidStride,
    #[error("invalid frame rate (must be 0-120 fps)")]
    InvalidFrameRate,
    #[error("skew tolerance must be a positive number of frames")]
    InvalidTolerance,
    #[error("fps window must hold at least 2 samples")]
    InvalidFpsWindow,
    #[error("invalid calibration: {0}")]
    InvalidCalibration(&'static str),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub sensor: SyntheticSensorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Stop after this many fused frames (0 runs until interrupted).
    pub frame_count: u64,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frame_count: 90,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.pipeline.validate()?;
        config.calibration.validate()?;
        Ok(config)
    }
}
