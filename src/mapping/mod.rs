//! Projective geometry between depth pixels, camera space and color pixels.
//!
//! The sensor's calibration is turned into a [`CalibratedMapper`] once per
//! device start and shared read-only with the converter. Camera space uses
//! the optical convention: metres, x right, y down, z forward.

mod calibration;

pub use calibration::{CalibratedMapper, Calibration, Intrinsics};

use glam::Vec3;

/// A 3D point in the depth camera's coordinate frame (metres).
///
/// Invalid points carry NaN in every component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSpacePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CameraSpacePoint {
    /// Marker for depth pixels without a usable reading.
    pub const INVALID: Self = Self {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vec3> for CameraSpacePoint {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<CameraSpacePoint> for Vec3 {
    fn from(p: CameraSpacePoint) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

/// A sub-pixel position in the color image.
///
/// Points that cannot be projected carry negative infinity, matching the
/// sensor driver convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSpacePoint {
    pub x: f32,
    pub y: f32,
}

impl ColorSpacePoint {
    pub const INVALID: Self = Self {
        x: f32::NEG_INFINITY,
        y: f32::NEG_INFINITY,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Nearest integer pixel if it lies inside a `width` x `height` image.
    pub fn pixel(&self, width: u32, height: u32) -> Option<(usize, usize)> {
        if !self.is_valid() {
            return None;
        }
        let px = (self.x + 0.5).floor();
        let py = (self.y + 0.5).floor();
        if px < 0.0 || py < 0.0 || px >= width as f32 || py >= height as f32 {
            return None;
        }
        Some((px as usize, py as usize))
    }
}

/// Calibration-driven mapping routines supplied by the sensor.
///
/// Implementations are immutable after construction and shared between
/// threads without locking.
pub trait CoordinateMapper: Send + Sync {
    /// Resolution of the depth image the mapper was calibrated for.
    fn depth_resolution(&self) -> (u32, u32);

    /// Projects a depth pixel into camera space.
    ///
    /// Returns [`CameraSpacePoint::INVALID`] for zero or out-of-range depth
    /// and for pixels outside the calibrated resolution.
    fn depth_to_camera(&self, x: usize, y: usize, depth_mm: u16) -> CameraSpacePoint;

    /// Projects a camera-space point into the color image.
    fn camera_to_color(&self, point: CameraSpacePoint) -> ColorSpacePoint;

    /// Convenience composition of [`depth_to_camera`](Self::depth_to_camera)
    /// and [`camera_to_color`](Self::camera_to_color).
    fn depth_to_color(&self, x: usize, y: usize, depth_mm: u16) -> ColorSpacePoint {
        let point = self.depth_to_camera(x, y, depth_mm);
        if point.is_valid() {
            self.camera_to_color(point)
        } else {
            ColorSpacePoint::INVALID
        }
    }
}
