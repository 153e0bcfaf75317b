//! Organized XYZRGBA point cloud.

use crate::mapping::CameraSpacePoint;

/// A colored 3D point. Position in metres, color in 8-bit RGBA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointXYZRGBA {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl PointXYZRGBA {
    /// Hole marker: NaN position, fully transparent black.
    pub const INVALID: Self = Self {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Builds a point from a camera-space position and a BGRA sample.
    #[inline]
    pub fn from_bgra(p: CameraSpacePoint, bgra: [u8; 4]) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            r: bgra[2],
            g: bgra[1],
            b: bgra[0],
            a: bgra[3],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Row-major organized point cloud. Holes stay in place so the point
/// count only depends on the grid size.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    /// True when no point is a hole.
    pub is_dense: bool,
    pub points: Vec<PointXYZRGBA>,
}

impl PointCloud {
    pub fn with_capacity(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            is_dense: true,
            points: Vec::with_capacity(width as usize * height as usize),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at grid position `(col, row)`.
    pub fn at(&self, col: u32, row: u32) -> Option<&PointXYZRGBA> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.points
            .get(row as usize * self.width as usize + col as usize)
    }

    pub fn valid_points(&self) -> impl Iterator<Item = &PointXYZRGBA> {
        self.points.iter().filter(|p| p.is_valid())
    }

    pub fn valid_count(&self) -> usize {
        self.valid_points().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_channel_order() {
        let p = PointXYZRGBA::from_bgra(CameraSpacePoint::new(1.0, 2.0, 3.0), [10, 20, 30, 40]);
        assert_eq!((p.r, p.g, p.b, p.a), (30, 20, 10, 40));
        assert!(p.is_valid());
    }

    #[test]
    fn test_invalid_marker() {
        let p = PointXYZRGBA::INVALID;
        assert!(!p.is_valid());
        assert_eq!(p.a, 0);
    }

    #[test]
    fn test_grid_access() {
        let mut cloud = PointCloud::with_capacity(2, 2);
        for i in 0..4 {
            let z = i as f32;
            cloud
                .points
                .push(PointXYZRGBA::from_bgra(CameraSpacePoint::new(0.0, 0.0, z), [0; 4]));
        }
        assert_eq!(cloud.at(1, 1).map(|p| p.z), Some(3.0));
        assert!(cloud.at(2, 0).is_none());
    }
}
