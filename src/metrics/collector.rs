//! Metrics collection and registry.

use crate::pipeline::PipelineStats;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry mirroring [`PipelineStats`].
pub struct MetricsRegistry {
    registry: Registry,

    // Acquisition
    frames_acquired: IntCounter,
    extraction_failures: IntCounter,

    // Synchronization
    pairs_matched: IntCounter,
    pairs_dropped: IntCounter,
    frames_per_second: Gauge,

    // Dispatch
    clouds_built: IntCounter,
    callbacks_invoked: IntCounter,
    callback_failures: IntCounter,

    running: IntGauge,

    last: Mutex<PipelineStats>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(format!("rgbd_fusion_{name}"), help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn advance(counter: &IntCounter, baseline: u64, observed: u64) {
    let delta = observed.saturating_sub(baseline);
    if delta > 0 {
        counter.inc_by(delta);
    }
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_acquired = counter(
            &registry,
            "frames_acquired_total",
            "Color and depth frame pairs read from the sensor",
        )?;
        let extraction_failures = counter(
            &registry,
            "extraction_failures_total",
            "Frame-arrived events skipped because a sub-frame was unavailable",
        )?;
        let pairs_matched = counter(
            &registry,
            "pairs_matched_total",
            "Color and depth pairs matched within the skew tolerance",
        )?;
        let pairs_dropped = counter(
            &registry,
            "pairs_dropped_total",
            "Frames discarded for exceeding the skew tolerance",
        )?;
        let clouds_built = counter(
            &registry,
            "clouds_built_total",
            "Point clouds computed",
        )?;
        let callbacks_invoked = counter(
            &registry,
            "callbacks_invoked_total",
            "Subscriber handler invocations",
        )?;
        let callback_failures = counter(
            &registry,
            "callback_failures_total",
            "Subscriber handlers that returned an error or panicked",
        )?;

        let frames_per_second = Gauge::new(
            "rgbd_fusion_frames_per_second",
            "Matched pairs per second over the recent window",
        )?;
        let running = IntGauge::new(
            "rgbd_fusion_running",
            "Acquisition thread status (1=running, 0=stopped)",
        )?;
        registry.register(Box::new(frames_per_second.clone()))?;
        registry.register(Box::new(running.clone()))?;

        Ok(Self {
            registry,
            frames_acquired,
            extraction_failures,
            pairs_matched,
            pairs_dropped,
            frames_per_second,
            clouds_built,
            callbacks_invoked,
            callback_failures,
            running,
            last: Mutex::new(PipelineStats::default()),
        })
    }

    /// Updates all metrics from a stats snapshot.
    ///
    /// Stats are per run; a snapshot from a new run counts from zero.
    pub fn update(&self, stats: &PipelineStats) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.run != stats.run {
            *last = PipelineStats {
                run: stats.run,
                ..Default::default()
            };
        }

        advance(&self.frames_acquired, last.frames_acquired, stats.frames_acquired);
        advance(
            &self.extraction_failures,
            last.extraction_failures,
            stats.extraction_failures,
        );
        advance(&self.pairs_matched, last.pairs_matched, stats.pairs_matched);
        advance(&self.pairs_dropped, last.pairs_dropped, stats.pairs_dropped);
        advance(&self.clouds_built, last.clouds_built, stats.clouds_built);
        advance(
            &self.callbacks_invoked,
            last.callbacks_invoked,
            stats.callbacks_invoked,
        );
        advance(
            &self.callback_failures,
            last.callback_failures,
            stats.callback_failures,
        );
        *last = *stats;

        self.frames_per_second.set(f64::from(stats.frames_per_second));
        self.running.set(i64::from(stats.running));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
