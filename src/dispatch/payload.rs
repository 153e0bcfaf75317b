//! Callback kinds and the payloads they receive.

use crate::capture::{ColorFrame, DepthFrame};
use crate::cloud::PointCloud;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Error type returned by subscriber handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by subscriber handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// The five data shapes an application can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    RawImage,
    RawDepth,
    ImageDepthWithFps,
    PointCloudRgba,
    AllData,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 5] = [
        CallbackKind::RawImage,
        CallbackKind::RawDepth,
        CallbackKind::ImageDepthWithFps,
        CallbackKind::PointCloudRgba,
        CallbackKind::AllData,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether payloads of this kind contain a point cloud.
    pub fn needs_cloud(self) -> bool {
        matches!(self, CallbackKind::PointCloudRgba | CallbackKind::AllData)
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackKind::RawImage => "raw_image",
            CallbackKind::RawDepth => "raw_depth",
            CallbackKind::ImageDepthWithFps => "image_depth_fps",
            CallbackKind::PointCloudRgba => "point_cloud_rgba",
            CallbackKind::AllData => "all_data",
        };
        f.write_str(name)
    }
}

/// Image, depth and cloud from one synchronized instant.
#[derive(Debug, Clone)]
pub struct FusedFrame {
    pub image: Arc<ColorFrame>,
    pub depth: Arc<DepthFrame>,
    pub cloud: Arc<PointCloud>,
    /// Wall-clock time the bundle was assembled.
    pub captured_at: DateTime<Utc>,
}

type RawImageFn = dyn Fn(&Arc<ColorFrame>) -> HandlerResult + Send + Sync;
type RawDepthFn = dyn Fn(&Arc<DepthFrame>) -> HandlerResult + Send + Sync;
type ImageDepthFn = dyn Fn(&Arc<ColorFrame>, &Arc<DepthFrame>, f32) -> HandlerResult + Send + Sync;
type CloudFn = dyn Fn(&Arc<PointCloud>) -> HandlerResult + Send + Sync;
type AllDataFn = dyn Fn(&Arc<FusedFrame>) -> HandlerResult + Send + Sync;

/// A typed subscriber handler. The variant determines its kind.
pub enum Callback {
    RawImage(Box<RawImageFn>),
    RawDepth(Box<RawDepthFn>),
    ImageDepthWithFps(Box<ImageDepthFn>),
    PointCloudRgba(Box<CloudFn>),
    AllData(Box<AllDataFn>),
}

impl Callback {
    pub fn raw_image<F>(f: F) -> Self
    where
        F: Fn(&Arc<ColorFrame>) -> HandlerResult + Send + Sync + 'static,
    {
        Callback::RawImage(Box::new(f))
    }

    pub fn raw_depth<F>(f: F) -> Self
    where
        F: Fn(&Arc<DepthFrame>) -> HandlerResult + Send + Sync + 'static,
    {
        Callback::RawDepth(Box::new(f))
    }

    pub fn image_depth_with_fps<F>(f: F) -> Self
    where
        F: Fn(&Arc<ColorFrame>, &Arc<DepthFrame>, f32) -> HandlerResult + Send + Sync + 'static,
    {
        Callback::ImageDepthWithFps(Box::new(f))
    }

    pub fn point_cloud_rgba<F>(f: F) -> Self
    where
        F: Fn(&Arc<PointCloud>) -> HandlerResult + Send + Sync + 'static,
    {
        Callback::PointCloudRgba(Box::new(f))
    }

    pub fn all_data<F>(f: F) -> Self
    where
        F: Fn(&Arc<FusedFrame>) -> HandlerResult + Send + Sync + 'static,
    {
        Callback::AllData(Box::new(f))
    }

    pub fn kind(&self) -> CallbackKind {
        match self {
            Callback::RawImage(_) => CallbackKind::RawImage,
            Callback::RawDepth(_) => CallbackKind::RawDepth,
            Callback::ImageDepthWithFps(_) => CallbackKind::ImageDepthWithFps,
            Callback::PointCloudRgba(_) => CallbackKind::PointCloudRgba,
            Callback::AllData(_) => CallbackKind::AllData,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.kind()).finish()
    }
}
