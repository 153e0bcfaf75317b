//! Prometheus metrics for pipeline monitoring.
//!
//! # Metrics Exposed
//!
//! ## Acquisition
//! - `rgbd_fusion_frames_acquired_total` - Frame pairs read from the sensor
//! - `rgbd_fusion_extraction_failures_total` - Events skipped for missing sub-frames
//!
//! ## Synchronization
//! - `rgbd_fusion_pairs_matched_total` - Pairs matched within tolerance
//! - `rgbd_fusion_pairs_dropped_total` - Frames discarded for excessive skew
//! - `rgbd_fusion_frames_per_second` - Matched pair rate
//!
//! ## Dispatch
//! - `rgbd_fusion_clouds_built_total` - Point clouds computed
//! - `rgbd_fusion_callbacks_invoked_total` - Handler invocations
//! - `rgbd_fusion_callback_failures_total` - Handlers that failed or panicked
//! - `rgbd_fusion_running` - Acquisition thread status
//!
//! With the `metrics` feature, [`MetricsServer`] serves them over HTTP at
//! `/metrics`, pulling a snapshot from the pipeline on each scrape.
//! `/health` answers 200 only while the acquisition thread is running and
//! reports the lifecycle state in the body.
//!
//! # Example
//!
//! ```no_run
//! use rgbd_fusion::metrics::MetricsRegistry;
//! use rgbd_fusion::{FusionPipeline, MockSensor};
//!
//! let (sensor, _handle) = MockSensor::new();
//! let pipeline = FusionPipeline::new(sensor);
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! registry.update(&pipeline.stats());
//! println!("{}", registry.encode().expect("Failed to encode"));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, ServerError, StatsSource};
