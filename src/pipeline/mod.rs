//! Pipeline lifecycle and the acquisition thread.
//!
//! [`FusionPipeline`] ties the sensor, the synchronizer, the converter and
//! the callback registry together. One background thread per run waits
//! for frame-arrived events, buffers the newest color and depth frames,
//! matches them by timestamp and hands matched pairs to subscribers.

mod acquisition;
mod error;
mod grabber;
mod state;

pub use error::PipelineError;
pub use grabber::FusionPipeline;
pub use state::{PipelineState, PipelineStats};

pub(crate) use state::Shared;
