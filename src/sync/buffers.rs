//! Latest-frame slots shared between the sensor writer and the matcher.

use crate::capture::{ColorFrame, DepthFrame, Stream, Timestamp};
use std::sync::{Arc, Mutex, MutexGuard};

struct Slot<T> {
    frame: Option<Arc<T>>,
    updated: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            frame: None,
            updated: false,
        }
    }
}

/// Double-buffered storage for the newest color and depth frames.
///
/// Writers build the shared frame outside the lock; the critical section
/// is a pointer swap plus a flag update, so a write never waits on a
/// reader doing conversion work. An unconsumed frame is simply replaced.
#[derive(Default)]
pub struct FrameBuffers {
    color: Mutex<Slot<ColorFrame>>,
    depth: Mutex<Slot<DepthFrame>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl FrameBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored color frame and flags it as updated.
    pub fn write_color(&self, frame: ColorFrame) {
        let frame = Arc::new(frame);
        let previous = {
            let mut slot = lock(&self.color);
            slot.updated = true;
            slot.frame.replace(frame)
        };
        // The old frame is released outside the critical section.
        drop(previous);
    }

    /// Replaces the stored depth frame and flags it as updated.
    pub fn write_depth(&self, frame: DepthFrame) {
        let frame = Arc::new(frame);
        let previous = {
            let mut slot = lock(&self.depth);
            slot.updated = true;
            slot.frame.replace(frame)
        };
        drop(previous);
    }

    /// Returns the current color + depth snapshot when both streams have
    /// been updated since the last take, clearing both flags.
    pub fn try_take_matchable(&self) -> Option<(Arc<ColorFrame>, Arc<DepthFrame>)> {
        // Lock order is always color then depth.
        let mut color = lock(&self.color);
        let mut depth = lock(&self.depth);
        if !(color.updated && depth.updated) {
            return None;
        }
        let pair = (color.frame.clone()?, depth.frame.clone()?);
        color.updated = false;
        depth.updated = false;
        Some(pair)
    }

    /// Re-arms one stream so its stored frame takes part in the next match.
    pub fn mark_pending(&self, stream: Stream) {
        match stream {
            Stream::Color => {
                let mut slot = lock(&self.color);
                slot.updated = slot.frame.is_some();
            }
            Stream::Depth => {
                let mut slot = lock(&self.depth);
                slot.updated = slot.frame.is_some();
            }
        }
    }

    /// Timestamps of the stored frames.
    pub fn latest_timestamps(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        let color = lock(&self.color).frame.as_ref().map(|f| f.timestamp());
        let depth = lock(&self.depth).frame.as_ref().map(|f| f.timestamp());
        (color, depth)
    }

    /// Drops both stored frames.
    pub fn clear(&self) {
        *lock(&self.color) = Slot::default();
        *lock(&self.depth) = Slot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(ms: u64) -> ColorFrame {
        ColorFrame::filled(2, 2, [0, 0, 0, 255], Timestamp::from_millis(ms))
    }

    fn depth(ms: u64) -> DepthFrame {
        DepthFrame::uniform(2, 2, 1000, Timestamp::from_millis(ms))
    }

    #[test]
    fn test_empty_until_both_updated() {
        let buffers = FrameBuffers::new();
        assert!(buffers.try_take_matchable().is_none());

        buffers.write_color(color(0));
        assert!(buffers.try_take_matchable().is_none());

        buffers.write_depth(depth(1));
        let (c, d) = buffers.try_take_matchable().unwrap();
        assert_eq!(c.timestamp(), Timestamp::from_millis(0));
        assert_eq!(d.timestamp(), Timestamp::from_millis(1));
    }

    #[test]
    fn test_take_clears_both_flags() {
        let buffers = FrameBuffers::new();
        buffers.write_color(color(0));
        buffers.write_depth(depth(0));
        assert!(buffers.try_take_matchable().is_some());
        assert!(buffers.try_take_matchable().is_none());

        // One fresh stream is not enough.
        buffers.write_depth(depth(33));
        assert!(buffers.try_take_matchable().is_none());
    }

    #[test]
    fn test_latest_frame_wins() {
        let buffers = FrameBuffers::new();
        buffers.write_color(color(0));
        buffers.write_color(color(33));
        buffers.write_depth(depth(34));
        let (c, _) = buffers.try_take_matchable().unwrap();
        assert_eq!(c.timestamp(), Timestamp::from_millis(33));
    }

    #[test]
    fn test_mark_pending_rearms_stream() {
        let buffers = FrameBuffers::new();
        buffers.write_color(color(50));
        buffers.write_depth(depth(0));
        assert!(buffers.try_take_matchable().is_some());

        buffers.mark_pending(Stream::Color);
        buffers.write_depth(depth(51));
        let (c, d) = buffers.try_take_matchable().unwrap();
        assert_eq!(c.timestamp(), Timestamp::from_millis(50));
        assert_eq!(d.timestamp(), Timestamp::from_millis(51));
    }

    #[test]
    fn test_concurrent_writers_and_reader() {
        let buffers = Arc::new(FrameBuffers::new());
        let writer = {
            let buffers = Arc::clone(&buffers);
            std::thread::spawn(move || {
                for i in 0..200 {
                    buffers.write_color(color(i));
                    buffers.write_depth(depth(i));
                }
            })
        };
        let mut taken = 0;
        while !writer.is_finished() {
            if buffers.try_take_matchable().is_some() {
                taken += 1;
            }
        }
        writer.join().unwrap();
        assert!(taken <= 200);
        assert_eq!(
            buffers.latest_timestamps(),
            (Some(Timestamp::from_millis(199)), Some(Timestamp::from_millis(199)))
        );
    }
}
