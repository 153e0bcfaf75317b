//! RGB-D Fusion Library
//!
//! Acquires color and depth streams from an RGB-D sensor, pairs frames that
//! show the same instant, and delivers raw images, depth maps and colored
//! point clouds to application callbacks.
//!
//! # Architecture
//!
//! The system follows an explicit data flow on one acquisition thread:
//!
//! ```text
//! capture → sync → cloud → dispatch
//!    ↓               ↑
//!  mapping ──────────┘
//! ```
//!
//! - [`capture`]: sensor boundary, frame types, configuration, mock sensor
//! - [`mapping`]: depth-to-camera and camera-to-color coordinate mapping
//! - [`sync`]: latest-frame buffers and timestamp matching
//! - [`cloud`]: point cloud construction
//! - [`dispatch`]: typed callback registry with lazy payloads
//! - [`pipeline`]: lifecycle and the acquisition thread
//! - [`metrics`]: Prometheus export of pipeline counters
//!
//! # Design Principles
//!
//! - **Never fuse mismatched instants**: pairs beyond the skew tolerance are dropped
//! - **Pay only for what is consumed**: no cloud is built without a cloud subscriber
//! - **Released on every path**: the sensor session is owned by the loop thread
//!
//! # Example
//!
//! ```no_run
//! use rgbd_fusion::{
//!     capture::{MockSensor, SyntheticSensorConfig},
//!     mapping::Calibration,
//!     Callback, FusionPipeline,
//! };
//!
//! let (sensor, _handle) =
//!     MockSensor::synthetic(Calibration::default(), SyntheticSensorConfig::default());
//! let pipeline = FusionPipeline::new(sensor);
//!
//! pipeline.callbacks().register(Callback::all_data(|frame| {
//!     println!(
//!         "{}x{} cloud, {} valid points",
//!         frame.cloud.width,
//!         frame.cloud.height,
//!         frame.cloud.valid_count()
//!     );
//!     Ok(())
//! }));
//!
//! pipeline.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! pipeline.stop().unwrap();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod cloud;
pub mod dispatch;
pub mod mapping;
pub mod metrics;
pub mod pipeline;
pub mod sync;

// Re-export commonly used types at crate root
pub use capture::{
    ColorFrame, DepthFrame, FileConfig, MockSensor, MockSensorHandle, PipelineConfig,
    SensorDriver, SensorError, SourceSelection, Timestamp,
};
pub use cloud::{PointCloud, PointXYZRGBA};
pub use dispatch::{Callback, CallbackKind, FusedFrame, SubscriptionHandle};
pub use mapping::{Calibration, CoordinateMapper};
pub use pipeline::{FusionPipeline, PipelineError, PipelineState, PipelineStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
