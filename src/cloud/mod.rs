//! Point cloud types and depth-to-cloud conversion.

mod converter;
mod point;

pub use converter::{CloudDensity, ConvertOptions, PointCloudConverter};
pub use point::{PointCloud, PointXYZRGBA};
