//! Synthetic scene generator: a flat wall with a color gradient.

use super::{ColorFrame, DepthFrame, SyntheticSensorConfig, Timestamp};
use crate::mapping::Calibration;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

/// Produces frame pairs of a wall facing the sensor.
///
/// Depth readings carry seeded uniform noise so runs are reproducible.
/// Pixels outside the depth sensor's circular field of view read zero,
/// the way time-of-flight sensors report their vignetted corners.
pub struct SyntheticScene {
    calibration: Calibration,
    plane_depth_mm: u16,
    noise_mm: u16,
    rng: ChaCha8Rng,
}

impl SyntheticScene {
    pub fn new(calibration: Calibration, config: &SyntheticSensorConfig) -> Self {
        Self {
            calibration,
            plane_depth_mm: config.plane_depth_mm,
            noise_mm: config.noise_mm,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    pub fn depth_frame(&mut self, timestamp: Timestamp) -> DepthFrame {
        let (width, height, cx, cy) = {
            let d = &self.calibration.depth;
            (d.width, d.height, d.cx, d.cy)
        };
        let (w, h) = (width as usize, height as usize);
        let radius_sq = {
            let r = (w.max(h) as f32) * 0.55;
            r * r
        };

        let mut samples = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy > radius_sq {
                    samples.push(0);
                    continue;
                }
                samples.push(self.noisy_depth());
            }
        }
        DepthFrame::new(samples, width, height, timestamp)
    }

    pub fn color_frame(&mut self, timestamp: Timestamp) -> ColorFrame {
        let c = &self.calibration.color;
        let (w, h) = (c.width as usize, c.height as usize);
        let mut pixels = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            let g = (y * 255 / h.max(1)) as u8;
            for x in 0..w {
                let r = (x * 255 / w.max(1)) as u8;
                pixels.extend_from_slice(&[128, g, r, 255]);
            }
        }
        ColorFrame::new(pixels, c.width, c.height, timestamp)
    }

    fn noisy_depth(&mut self) -> u16 {
        if self.noise_mm == 0 {
            return self.plane_depth_mm;
        }
        let span = 2 * self.noise_mm as u32 + 1;
        let offset = (self.rng.next_u32() % span) as i32 - self.noise_mm as i32;
        (self.plane_depth_mm as i32 + offset).clamp(0, u16::MAX as i32) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_within_noise_band() {
        let config = SyntheticSensorConfig {
            plane_depth_mm: 1000,
            noise_mm: 5,
            ..Default::default()
        };
        let mut scene = SyntheticScene::new(Calibration::default(), &config);
        let frame = scene.depth_frame(Timestamp::default());

        assert!(frame.is_valid());
        assert!(frame
            .data()
            .iter()
            .all(|&d| d == 0 || (995..=1005).contains(&d)));
        // Center of the field of view is always populated.
        assert_ne!(frame.at(256, 212), Some(0));
    }

    #[test]
    fn test_same_seed_same_frames() {
        let config = SyntheticSensorConfig::default();
        let mut a = SyntheticScene::new(Calibration::default(), &config);
        let mut b = SyntheticScene::new(Calibration::default(), &config);
        assert_eq!(
            a.depth_frame(Timestamp::default()).data(),
            b.depth_frame(Timestamp::default()).data()
        );
    }
}
