//! Color and depth frame types with device timestamps.

use std::fmt;
use std::time::Duration;

/// Native color stream resolution.
pub const COLOR_WIDTH: u32 = 1920;
/// Native color stream resolution.
pub const COLOR_HEIGHT: u32 = 1080;
/// Native depth stream resolution.
pub const DEPTH_WIDTH: u32 = 512;
/// Native depth stream resolution.
pub const DEPTH_HEIGHT: u32 = 424;

/// Bytes per color pixel (BGRA, 8 bits per channel).
pub const COLOR_BYTES_PER_PIXEL: usize = 4;

const TICKS_PER_SECOND: u64 = 10_000_000;
const NANOS_PER_TICK: u64 = 100;

/// Identifies one of the two fused streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Color,
    Depth,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Color => f.write_str("color"),
            Stream::Depth => f.write_str("depth"),
        }
    }
}

/// Monotonic device timestamp in 100 ns ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from a raw tick count.
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Creates a timestamp from milliseconds since the device epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(TICKS_PER_SECOND / 1000))
    }

    /// Creates a timestamp from an elapsed duration since the device epoch.
    pub fn from_duration(elapsed: Duration) -> Self {
        Self((elapsed.as_nanos() / NANOS_PER_TICK as u128) as u64)
    }

    /// Returns the raw tick count.
    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Absolute distance between two timestamps, saturating at the largest
    /// representable span.
    pub fn abs_diff(self, other: Timestamp) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0).saturating_mul(NANOS_PER_TICK))
    }
}

/// A BGRA color frame.
#[derive(Clone)]
pub struct ColorFrame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    timestamp: Timestamp,
}

impl ColorFrame {
    /// Creates a frame from raw BGRA bytes.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, timestamp: Timestamp) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp,
        }
    }

    /// Creates a frame filled with one BGRA value.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4], timestamp: Timestamp) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * COLOR_BYTES_PER_PIXEL);
        for _ in 0..count {
            pixels.extend_from_slice(&bgra);
        }
        Self::new(pixels, width, height, timestamp)
    }

    /// Raw BGRA bytes, row-major.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// BGRA value at `(x, y)`, or `None` outside the frame.
    #[inline]
    pub fn bgra(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width as usize || y >= self.height as usize {
            return None;
        }
        let offset = (y * self.width as usize + x) * COLOR_BYTES_PER_PIXEL;
        let px = self.pixels.get(offset..offset + COLOR_BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count() * COLOR_BYTES_PER_PIXEL
    }
}

impl fmt::Debug for ColorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

/// A depth frame in millimetres. Zero means no reading.
#[derive(Clone)]
pub struct DepthFrame {
    depth: Vec<u16>,
    width: u32,
    height: u32,
    timestamp: Timestamp,
}

impl DepthFrame {
    /// Creates a frame from row-major millimetre samples.
    pub fn new(depth: Vec<u16>, width: u32, height: u32, timestamp: Timestamp) -> Self {
        Self {
            depth,
            width,
            height,
            timestamp,
        }
    }

    /// Creates a frame where every pixel reads `depth_mm`.
    pub fn uniform(width: u32, height: u32, depth_mm: u16, timestamp: Timestamp) -> Self {
        let count = width as usize * height as usize;
        Self::new(vec![depth_mm; count], width, height, timestamp)
    }

    #[inline]
    pub fn data(&self) -> &[u16] {
        &self.depth
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Depth at `(x, y)` in millimetres, or `None` outside the frame.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width as usize || y >= self.height as usize {
            return None;
        }
        self.depth.get(y * self.width as usize + x).copied()
    }

    /// Validates that the sample buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.depth.len() == self.pixel_count()
    }
}

impl fmt::Debug for DepthFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("samples", &self.depth.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_units() {
        let a = Timestamp::from_millis(0);
        let b = Timestamp::from_millis(50);
        assert_eq!(b.ticks(), 500_000);
        assert_eq!(a.abs_diff(b), Duration::from_millis(50));
        assert_eq!(b.abs_diff(a), Duration::from_millis(50));
        assert_eq!(
            Timestamp::from_duration(Duration::from_micros(1500)),
            Timestamp::from_ticks(15_000)
        );
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        assert_eq!(Timestamp::from_millis(u64::MAX), Timestamp::from_ticks(u64::MAX));

        let far = Timestamp::from_ticks(0).abs_diff(Timestamp::from_ticks(u64::MAX));
        assert_eq!(far, Duration::from_nanos(u64::MAX));
        assert!(far > Duration::from_millis(34));
    }

    #[test]
    fn test_color_frame_pixel_access() {
        let frame = ColorFrame::filled(4, 3, [1, 2, 3, 255], Timestamp::default());
        assert!(frame.is_valid());
        assert_eq!(frame.bgra(3, 2), Some([1, 2, 3, 255]));
        assert_eq!(frame.bgra(4, 0), None);
    }

    #[test]
    fn test_frame_invalid_size() {
        let color = ColorFrame::new(vec![0u8; 10], 4, 4, Timestamp::default());
        assert!(!color.is_valid());

        let depth = DepthFrame::new(vec![0u16; 10], 4, 4, Timestamp::default());
        assert!(!depth.is_valid());
    }

    #[test]
    fn test_depth_frame_access() {
        let mut samples = vec![0u16; 6];
        samples[4] = 1200;
        let frame = DepthFrame::new(samples, 3, 2, Timestamp::from_millis(5));
        assert_eq!(frame.at(1, 1), Some(1200));
        assert_eq!(frame.at(0, 2), None);
        assert_eq!(frame.timestamp(), Timestamp::from_millis(5));
    }
}
