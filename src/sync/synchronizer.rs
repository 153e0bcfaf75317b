//! Timestamp matching of color and depth frames.

use super::{FpsEstimator, FrameBuffers};
use crate::capture::{ColorFrame, DepthFrame, PipelineConfig, Stream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A color and depth frame judged to show the same instant.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub color: Arc<ColorFrame>,
    pub depth: Arc<DepthFrame>,
    /// Absolute timestamp difference between the two frames.
    pub skew: Duration,
}

/// Counters kept by the synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pairs emitted.
    pub matched: u64,
    /// Frames discarded for exceeding the skew tolerance.
    pub dropped: u64,
}

/// Pairs buffered frames whose timestamps lie within the skew tolerance.
///
/// Mismatched instants are never fused: when the skew is too large the
/// older frame is discarded and the newer one waits for a fresher
/// counterpart.
pub struct FrameSynchronizer {
    tolerance: Duration,
    matched: AtomicU64,
    dropped: AtomicU64,
    fps: Mutex<FpsEstimator>,
}

impl FrameSynchronizer {
    pub fn new(tolerance: Duration, fps_window: usize) -> Self {
        Self {
            tolerance,
            matched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            fps: Mutex::new(FpsEstimator::new(fps_window)),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.skew_tolerance(), config.fps_window)
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Takes the buffered snapshot, if any, and tries to match it.
    pub fn poll(&self, buffers: &FrameBuffers) -> Option<MatchedPair> {
        let (color, depth) = buffers.try_take_matchable()?;
        self.match_frames(color, depth, buffers)
    }

    fn match_frames(
        &self,
        color: Arc<ColorFrame>,
        depth: Arc<DepthFrame>,
        buffers: &FrameBuffers,
    ) -> Option<MatchedPair> {
        let skew = color.timestamp().abs_diff(depth.timestamp());

        if skew > self.tolerance {
            let (discarded, kept) = if color.timestamp() > depth.timestamp() {
                (Stream::Depth, Stream::Color)
            } else {
                (Stream::Color, Stream::Depth)
            };
            buffers.mark_pending(kept);
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(
                skew_ms = skew.as_secs_f64() * 1000.0,
                tolerance_ms = self.tolerance.as_secs_f64() * 1000.0,
                %discarded,
                dropped,
                "Discarded frame outside skew tolerance"
            );
            return None;
        }

        self.matched.fetch_add(1, Ordering::Relaxed);
        self.fps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(Instant::now());

        tracing::trace!(
            skew_us = skew.as_micros() as u64,
            color_ticks = color.timestamp().ticks(),
            depth_ticks = depth.timestamp().ticks(),
            "Matched frame pair"
        );

        Some(MatchedPair { color, depth, skew })
    }

    /// Rolling average of the match rate; zero when stalled.
    pub fn frames_per_second(&self) -> f32 {
        self.fps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fps_at(Instant::now())
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            matched: self.matched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Forgets the rate history, e.g. at restart.
    pub fn reset_rate(&self) {
        self.fps.lock().unwrap_or_else(|e| e.into_inner()).reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Timestamp;
    use proptest::prelude::*;

    fn color(ticks: u64) -> ColorFrame {
        ColorFrame::filled(2, 2, [0, 0, 0, 255], Timestamp::from_ticks(ticks))
    }

    fn depth(ticks: u64) -> DepthFrame {
        DepthFrame::uniform(2, 2, 1000, Timestamp::from_ticks(ticks))
    }

    fn sync() -> FrameSynchronizer {
        FrameSynchronizer::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_close_timestamps_match() {
        let sync = sync();
        let buffers = FrameBuffers::new();
        buffers.write_color(ColorFrame::filled(2, 2, [0; 4], Timestamp::from_millis(0)));
        buffers.write_depth(DepthFrame::uniform(2, 2, 1000, Timestamp::from_millis(1)));

        let pair = sync.poll(&buffers).unwrap();
        assert_eq!(pair.skew, Duration::from_millis(1));
        assert_eq!(sync.stats(), SyncStats { matched: 1, dropped: 0 });
    }

    #[test]
    fn test_skewed_pair_drops_older_frame() {
        let sync = sync();
        let buffers = FrameBuffers::new();
        buffers.write_depth(DepthFrame::uniform(2, 2, 1000, Timestamp::from_millis(0)));
        buffers.write_color(ColorFrame::filled(2, 2, [0; 4], Timestamp::from_millis(50)));

        assert!(sync.poll(&buffers).is_none());
        assert_eq!(sync.stats(), SyncStats { matched: 0, dropped: 1 });

        // The newer color frame pairs with the next depth frame.
        buffers.write_depth(DepthFrame::uniform(2, 2, 1000, Timestamp::from_millis(52)));
        let pair = sync.poll(&buffers).unwrap();
        assert_eq!(pair.color.timestamp(), Timestamp::from_millis(50));
        assert_eq!(sync.stats(), SyncStats { matched: 1, dropped: 1 });
    }

    #[test]
    fn test_nothing_buffered_is_not_a_drop() {
        let sync = sync();
        assert!(sync.poll(&FrameBuffers::new()).is_none());
        assert_eq!(sync.stats(), SyncStats::default());
    }

    proptest! {
        #[test]
        fn never_fuses_beyond_tolerance(
            events in prop::collection::vec((any::<bool>(), 0u64..5_000_000), 1..60)
        ) {
            let sync = sync();
            let buffers = FrameBuffers::new();
            for (is_color, ticks) in events {
                if is_color {
                    buffers.write_color(color(ticks));
                } else {
                    buffers.write_depth(depth(ticks));
                }
                if let Some(pair) = sync.poll(&buffers) {
                    let skew = pair.color.timestamp().abs_diff(pair.depth.timestamp());
                    prop_assert!(skew <= sync.tolerance());
                }
            }
        }
    }
}
