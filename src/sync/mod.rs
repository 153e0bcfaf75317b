//! Cross-thread frame buffering and timestamp synchronization.

mod buffers;
mod fps;
mod synchronizer;

pub use buffers::FrameBuffers;
pub use fps::FpsEstimator;
pub use synchronizer::{FrameSynchronizer, MatchedPair, SyncStats};
