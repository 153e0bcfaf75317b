//! Depth + color to organized point cloud conversion.

use super::{PointCloud, PointXYZRGBA};
use crate::capture::{ColorFrame, DepthFrame, PipelineConfig};
use crate::mapping::CoordinateMapper;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Color given to valid points when no color lookup is requested.
const UNCOLORED: [u8; 4] = [0, 0, 0, 255];

/// How many depth pixels become points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudDensity {
    /// One point per depth pixel.
    Large,
    /// One point per `stride` pixels along each axis.
    Normal { stride: usize },
}

impl CloudDensity {
    #[inline]
    pub fn stride(&self) -> usize {
        match *self {
            CloudDensity::Large => 1,
            CloudDensity::Normal { stride } => stride.max(1),
        }
    }

    /// Grid size produced from a `width` x `height` depth image.
    pub fn grid(&self, width: u32, height: u32) -> (u32, u32) {
        let s = self.stride() as u32;
        (width.div_ceil(s), height.div_ceil(s))
    }
}

/// Per-call conversion switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub align_to_color: bool,
    pub preregistered: bool,
    pub density: CloudDensity,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl ConvertOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let density = if config.large_cloud {
            CloudDensity::Large
        } else {
            CloudDensity::Normal {
                stride: config.normal_cloud_stride,
            }
        };
        Self {
            align_to_color: config.align_to_color,
            preregistered: config.preregistered,
            density,
        }
    }
}

/// Projects depth pixels into camera space and colors them.
///
/// * `preregistered`: color is read at the same (scaled) pixel index.
/// * `align_to_color`: each point is re-projected into the color image;
///   points landing outside it become holes.
/// * neither: geometry only, valid points are opaque black.
///
/// Zero or out-of-range depth always yields a hole.
pub struct PointCloudConverter {
    mapper: Arc<dyn CoordinateMapper>,
    clouds_built: AtomicU64,
}

impl PointCloudConverter {
    pub fn new(mapper: Arc<dyn CoordinateMapper>) -> Self {
        Self {
            mapper,
            clouds_built: AtomicU64::new(0),
        }
    }

    pub fn mapper(&self) -> &Arc<dyn CoordinateMapper> {
        &self.mapper
    }

    /// Number of clouds produced so far.
    pub fn clouds_built(&self) -> u64 {
        self.clouds_built.load(Ordering::Relaxed)
    }

    pub fn convert(
        &self,
        color: &ColorFrame,
        depth: &DepthFrame,
        options: &ConvertOptions,
    ) -> PointCloud {
        let stride = options.density.stride();
        let (grid_w, grid_h) = options.density.grid(depth.width(), depth.height());
        let mut cloud = PointCloud::with_capacity(grid_w, grid_h);

        for gy in 0..grid_h as usize {
            let y = gy * stride;
            for gx in 0..grid_w as usize {
                let x = gx * stride;
                let point = self.convert_pixel(color, depth, x, y, options);
                if !point.is_valid() {
                    cloud.is_dense = false;
                }
                cloud.points.push(point);
            }
        }

        self.clouds_built.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            width = cloud.width,
            height = cloud.height,
            dense = cloud.is_dense,
            "Converted point cloud"
        );
        cloud
    }

    #[inline]
    fn convert_pixel(
        &self,
        color: &ColorFrame,
        depth: &DepthFrame,
        x: usize,
        y: usize,
        options: &ConvertOptions,
    ) -> PointXYZRGBA {
        let depth_mm = depth.at(x, y).unwrap_or(0);
        let position = self.mapper.depth_to_camera(x, y, depth_mm);
        if !position.is_valid() {
            return PointXYZRGBA::INVALID;
        }

        let bgra = if options.preregistered {
            registered_lookup(color, depth, x, y)
        } else if options.align_to_color {
            self.mapper
                .camera_to_color(position)
                .pixel(color.width(), color.height())
                .and_then(|(u, v)| color.bgra(u, v))
        } else {
            Some(UNCOLORED)
        };

        match bgra {
            Some(bgra) => PointXYZRGBA::from_bgra(position, bgra),
            None => PointXYZRGBA::INVALID,
        }
    }
}

/// Color at the depth pixel's index, scaled when the two images differ in
/// size. Identity for equal resolutions.
#[inline]
fn registered_lookup(color: &ColorFrame, depth: &DepthFrame, x: usize, y: usize) -> Option<[u8; 4]> {
    let u = x * color.width() as usize / depth.width().max(1) as usize;
    let v = y * color.height() as usize / depth.height().max(1) as usize;
    color.bgra(u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Timestamp;
    use crate::mapping::{
        CalibratedMapper, Calibration, CameraSpacePoint, ColorSpacePoint, Intrinsics,
    };
    use proptest::prelude::*;

    /// Wraps a mapper and counts color projections.
    struct CountingMapper {
        inner: CalibratedMapper,
        color_calls: AtomicU64,
    }

    impl CoordinateMapper for CountingMapper {
        fn depth_resolution(&self) -> (u32, u32) {
            self.inner.depth_resolution()
        }

        fn depth_to_camera(&self, x: usize, y: usize, depth_mm: u16) -> CameraSpacePoint {
            self.inner.depth_to_camera(x, y, depth_mm)
        }

        fn camera_to_color(&self, point: CameraSpacePoint) -> ColorSpacePoint {
            self.color_calls.fetch_add(1, Ordering::Relaxed);
            self.inner.camera_to_color(point)
        }
    }

    fn small_calibration() -> Calibration {
        Calibration {
            depth: Intrinsics {
                width: 16,
                height: 12,
                fx: 12.0,
                fy: 12.0,
                cx: 8.0,
                cy: 6.0,
            },
            color: Intrinsics {
                width: 32,
                height: 24,
                fx: 24.0,
                fy: 24.0,
                cx: 16.0,
                cy: 12.0,
            },
            depth_to_color_m: [0.0, 0.0, 0.0],
            min_depth_mm: 1,
            max_depth_mm: 8000,
        }
    }

    fn patterned_color(width: u32, height: u32) -> ColorFrame {
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[x as u8, y as u8, (x + y) as u8, 255]);
            }
        }
        ColorFrame::new(pixels, width, height, Timestamp::default())
    }

    fn converter(cal: Calibration) -> PointCloudConverter {
        PointCloudConverter::new(Arc::new(CalibratedMapper::new(cal)))
    }

    fn options(align: bool, prereg: bool, density: CloudDensity) -> ConvertOptions {
        ConvertOptions {
            align_to_color: align,
            preregistered: prereg,
            density,
        }
    }

    #[test]
    fn test_full_resolution_grid() {
        let conv = converter(Calibration::default());
        let color = ColorFrame::filled(1920, 1080, [1, 2, 3, 255], Timestamp::default());
        let depth = DepthFrame::uniform(512, 424, 1500, Timestamp::default());
        let cloud = conv.convert(&color, &depth, &ConvertOptions::default());

        assert_eq!((cloud.width, cloud.height), (512, 424));
        assert_eq!(cloud.len(), 512 * 424);
        assert_eq!(conv.clouds_built(), 1);
    }

    #[test]
    fn test_normal_cloud_subsamples() {
        let conv = converter(small_calibration());
        let color = patterned_color(32, 24);
        let depth = DepthFrame::uniform(16, 12, 1000, Timestamp::default());

        let cloud = conv.convert(&color, &depth, &options(true, false, CloudDensity::Normal { stride: 3 }));
        assert_eq!((cloud.width, cloud.height), (6, 4));
        assert_eq!(cloud.len(), 24);

        // Grid cell (1, 1) samples depth pixel (3, 3).
        let expected = conv.mapper().depth_to_camera(3, 3, 1000);
        let p = cloud.at(1, 1).unwrap();
        assert_eq!((p.x, p.y, p.z), (expected.x, expected.y, expected.z));
    }

    #[test]
    fn test_zero_depth_everywhere_is_all_holes() {
        let conv = converter(Calibration::default());
        let color = ColorFrame::filled(1920, 1080, [9, 9, 9, 255], Timestamp::default());
        let depth = DepthFrame::uniform(512, 424, 0, Timestamp::default());

        for opts in [
            options(true, false, CloudDensity::Large),
            options(false, true, CloudDensity::Large),
            options(false, false, CloudDensity::Normal { stride: 2 }),
        ] {
            let cloud = conv.convert(&color, &depth, &opts);
            assert!(!cloud.is_dense);
            assert_eq!(cloud.valid_count(), 0);
            assert!(cloud.points.iter().all(|p| p.z.is_nan() && p.a == 0));
        }
    }

    #[test]
    fn test_alignment_outside_color_frame_leaves_holes() {
        let mut cal = small_calibration();
        // A color camera shifted far to the side sees only part of the wall.
        cal.depth_to_color_m = [0.4, 0.0, 0.0];
        let conv = converter(cal);
        let color = patterned_color(32, 24);
        let depth = DepthFrame::uniform(16, 12, 1000, Timestamp::default());

        let cloud = conv.convert(&color, &depth, &options(true, false, CloudDensity::Large));
        assert_eq!(cloud.len(), 16 * 12);
        assert!(!cloud.is_dense);
        assert!(cloud.valid_count() > 0);
        assert!(cloud.valid_count() < cloud.len());
        // The right-hand columns project past the color image.
        assert!(!cloud.at(15, 6).unwrap().is_valid());
        assert!(cloud.at(0, 6).unwrap().is_valid());
    }

    #[test]
    fn test_alignment_samples_projected_pixel() {
        let conv = converter(small_calibration());
        let color = patterned_color(32, 24);
        let depth = DepthFrame::uniform(16, 12, 1000, Timestamp::default());
        let cloud = conv.convert(&color, &depth, &options(true, false, CloudDensity::Large));

        // Color focal length is doubled, so depth pixel (10, 6) lands on (20, 12).
        let p = cloud.at(10, 6).unwrap();
        assert_eq!((p.b, p.g, p.r), (20, 12, 32));
    }

    #[test]
    fn test_geometry_only_mode_is_uncolored() {
        let conv = converter(small_calibration());
        let color = patterned_color(32, 24);
        let depth = DepthFrame::uniform(16, 12, 1000, Timestamp::default());
        let cloud = conv.convert(&color, &depth, &options(false, false, CloudDensity::Large));

        assert!(cloud.is_dense);
        assert!(cloud
            .points
            .iter()
            .all(|p| (p.r, p.g, p.b, p.a) == (0, 0, 0, 255)));
    }

    #[test]
    fn test_preregistered_matches_direct_lookup() {
        let mapper = Arc::new(CountingMapper {
            inner: CalibratedMapper::new(small_calibration()),
            color_calls: AtomicU64::new(0),
        });
        let conv = PointCloudConverter::new(mapper.clone());
        let color = patterned_color(16, 12);
        let depth_samples: Vec<u16> = (0..16 * 12).map(|i| 500 + (i as u16 % 7) * 100).collect();
        let depth = DepthFrame::new(depth_samples, 16, 12, Timestamp::default());

        let cloud = conv.convert(&color, &depth, &options(true, true, CloudDensity::Large));

        for y in 0..12usize {
            for x in 0..16usize {
                let position = mapper.depth_to_camera(x, y, depth.at(x, y).unwrap());
                let expected = PointXYZRGBA::from_bgra(position, color.bgra(x, y).unwrap());
                assert_eq!(cloud.at(x as u32, y as u32), Some(&expected));
            }
        }
        assert_eq!(mapper.color_calls.load(Ordering::Relaxed), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn uniform_depth_lies_on_plane(depth_mm in 500u16..4500) {
            let conv = converter(Calibration::default());
            let color = ColorFrame::filled(1920, 1080, [50, 60, 70, 255], Timestamp::default());
            let depth = DepthFrame::uniform(512, 424, depth_mm, Timestamp::default());
            let cloud = conv.convert(&color, &depth, &options(true, false, CloudDensity::Normal { stride: 8 }));

            let plane_z = depth_mm as f32 / 1000.0;
            prop_assert!(cloud.valid_count() > 0);
            for p in cloud.valid_points() {
                prop_assert!((p.z - plane_z).abs() < 1e-5);
            }
        }
    }
}
