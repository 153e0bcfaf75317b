//! Pinhole calibration and the precomputed depth ray table.

use super::{CameraSpacePoint, ColorSpacePoint, CoordinateMapper};
use crate::capture::{ConfigError, COLOR_HEIGHT, COLOR_WIDTH, DEPTH_HEIGHT, DEPTH_WIDTH};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Focal length x (pixels).
    pub fx: f32,
    /// Focal length y (pixels).
    pub fy: f32,
    /// Principal point x (pixels).
    pub cx: f32,
    /// Principal point y (pixels).
    pub cy: f32,
}

/// Factory calibration for a color + depth sensor pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub depth: Intrinsics,
    pub color: Intrinsics,
    /// Translation from the depth camera origin to the color camera origin
    /// in metres, expressed in the depth camera frame.
    pub depth_to_color_m: [f32; 3],
    /// Readings below this are treated as unknown.
    pub min_depth_mm: u16,
    /// Readings above this are treated as unknown.
    pub max_depth_mm: u16,
}

impl Default for Calibration {
    /// Typical factory values for a 512x424 time-of-flight depth sensor
    /// paired with a 1920x1080 color camera.
    fn default() -> Self {
        Self {
            depth: Intrinsics {
                width: DEPTH_WIDTH,
                height: DEPTH_HEIGHT,
                fx: 365.456,
                fy: 365.456,
                cx: 254.878,
                cy: 205.395,
            },
            color: Intrinsics {
                width: COLOR_WIDTH,
                height: COLOR_HEIGHT,
                fx: 1081.372,
                fy: 1081.372,
                cx: 959.5,
                cy: 539.5,
            },
            depth_to_color_m: [-0.052, 0.0, 0.0],
            min_depth_mm: 1,
            max_depth_mm: 8000,
        }
    }
}

impl Calibration {
    /// Validates the calibration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for intr in [&self.depth, &self.color] {
            if intr.width == 0 || intr.height == 0 {
                return Err(ConfigError::InvalidCalibration("zero resolution"));
            }
            if !(intr.fx > 0.0 && intr.fy > 0.0) {
                return Err(ConfigError::InvalidCalibration("focal length must be positive"));
            }
        }
        if self.min_depth_mm == 0 || self.min_depth_mm > self.max_depth_mm {
            return Err(ConfigError::InvalidCalibration("empty depth range"));
        }
        Ok(())
    }
}

/// Coordinate mapper built from a [`Calibration`].
///
/// Holds a per-pixel ray table for the depth camera so that projecting a
/// depth sample is one multiply per axis.
pub struct CalibratedMapper {
    calibration: Calibration,
    rays: Vec<Vec2>,
    translation: Vec3,
}

impl CalibratedMapper {
    pub fn new(calibration: Calibration) -> Self {
        let d = &calibration.depth;
        let mut rays = Vec::with_capacity(d.width as usize * d.height as usize);
        for v in 0..d.height {
            for u in 0..d.width {
                rays.push(Vec2::new(
                    (u as f32 - d.cx) / d.fx,
                    (v as f32 - d.cy) / d.fy,
                ));
            }
        }
        let translation = Vec3::from_array(calibration.depth_to_color_m);

        tracing::debug!(
            depth_width = d.width,
            depth_height = d.height,
            "Built depth ray table"
        );

        Self {
            calibration,
            rays,
            translation,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
}

impl Default for CalibratedMapper {
    fn default() -> Self {
        Self::new(Calibration::default())
    }
}

impl CoordinateMapper for CalibratedMapper {
    fn depth_resolution(&self) -> (u32, u32) {
        (self.calibration.depth.width, self.calibration.depth.height)
    }

    fn depth_to_camera(&self, x: usize, y: usize, depth_mm: u16) -> CameraSpacePoint {
        let cal = &self.calibration;
        if depth_mm < cal.min_depth_mm || depth_mm > cal.max_depth_mm {
            return CameraSpacePoint::INVALID;
        }
        let width = cal.depth.width as usize;
        if x >= width || y >= cal.depth.height as usize {
            return CameraSpacePoint::INVALID;
        }
        let ray = self.rays[y * width + x];
        let z = depth_mm as f32 / 1000.0;
        CameraSpacePoint::new(ray.x * z, ray.y * z, z)
    }

    fn camera_to_color(&self, point: CameraSpacePoint) -> ColorSpacePoint {
        if !point.is_valid() {
            return ColorSpacePoint::INVALID;
        }
        let p = Vec3::from(point) + self.translation;
        if p.z <= 0.0 {
            return ColorSpacePoint::INVALID;
        }
        let c = &self.calibration.color;
        ColorSpacePoint {
            x: c.fx * p.x / p.z + c.cx,
            y: c.fy * p.y / p.z + c.cy,
        }
    }
}
