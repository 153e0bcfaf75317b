//! Sensor driver abstraction.
//!
//! A [`SensorDriver`] opens the device and hands back a [`SensorReader`]
//! that owns the color and depth streams. Dropping the reader releases
//! them, so every exit path of the acquisition loop closes the device.

use super::{ColorFrame, DepthFrame, Stream};
use crate::mapping::CoordinateMapper;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during sensor operations.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open sensor: {0}")]
    OpenFailed(String),
    #[error("{0} frame not available")]
    FrameUnavailable(Stream),
    #[error("sensor is not streaming")]
    NotStreaming,
    #[error("sensor disconnected: {0}")]
    Disconnected(String),
}

/// Readers a driver opens next to color and depth, which are always on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSelection {
    pub infrared: bool,
    /// Body-index frames marking which depth pixels belong to a person.
    pub person: bool,
}

/// Opens sensor streams.
pub trait SensorDriver: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Opens the color and depth readers plus any selected extra sources,
    /// and arms the frame-arrived handle.
    fn open(&self, sources: &SourceSelection) -> Result<Box<dyn SensorReader>, SensorError>;
}

/// An open sensor session.
pub trait SensorReader: Send {
    /// Wait handle that yields once per frame-arrived event.
    ///
    /// The channel disconnecting means the device went away.
    fn frame_arrived(&self) -> Receiver<Instant>;

    /// Fetches the newest multi-source frame.
    fn acquire_latest(&mut self) -> Result<MultiSourceFrame, SensorError>;

    /// Calibration-backed mapper, valid for the lifetime of the session.
    fn coordinate_mapper(&self) -> Arc<dyn CoordinateMapper>;
}

/// One sensor event carrying whichever sub-frames the driver delivered.
#[derive(Debug, Default)]
pub struct MultiSourceFrame {
    color: Option<ColorFrame>,
    depth: Option<DepthFrame>,
}

impl MultiSourceFrame {
    pub fn new(color: Option<ColorFrame>, depth: Option<DepthFrame>) -> Self {
        Self { color, depth }
    }

    /// A frame with both streams present.
    pub fn complete(color: ColorFrame, depth: DepthFrame) -> Self {
        Self::new(Some(color), Some(depth))
    }

    /// Extracts the color sub-frame.
    ///
    /// Fails if the driver did not deliver one or its buffer is malformed.
    pub fn color_frame(&mut self) -> Result<ColorFrame, SensorError> {
        self.color
            .take()
            .filter(ColorFrame::is_valid)
            .ok_or(SensorError::FrameUnavailable(Stream::Color))
    }

    /// Extracts the depth sub-frame.
    pub fn depth_frame(&mut self) -> Result<DepthFrame, SensorError> {
        self.depth
            .take()
            .filter(DepthFrame::is_valid)
            .ok_or(SensorError::FrameUnavailable(Stream::Depth))
    }
}
