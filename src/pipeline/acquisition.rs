//! The acquisition loop: sensor wait, buffering, matching, conversion and
//! dispatch, all on one thread.

use super::state::{Counters, LivenessGuard, Run, Shared};
use crate::capture::{ColorFrame, DepthFrame, SensorError, SensorReader};
use crate::cloud::{ConvertOptions, PointCloudConverter};
use crate::dispatch::CallbackRegistry;
use crate::sync::FrameBuffers;
use crossbeam_channel::{select, Receiver, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Everything the acquisition thread owns for one run.
///
/// The sensor reader lives here, so the device is released whenever the
/// loop returns or unwinds.
pub(crate) struct Acquisition {
    pub reader: Box<dyn SensorReader>,
    pub buffers: FrameBuffers,
    pub converter: PointCloudConverter,
    pub options: ConvertOptions,
    pub callbacks: CallbackRegistry,
    pub shared: Arc<Shared>,
    pub run: Arc<Run>,
}

impl Acquisition {
    /// Runs until `stop` fires, the sensor disconnects, or the run is
    /// cancelled. `ready` is signalled right before the first wait.
    pub fn run(mut self, stop: Receiver<()>, ready: Sender<()>) {
        let guard = LivenessGuard {
            shared: Arc::clone(&self.shared),
            run: Arc::clone(&self.run),
        };
        let frames = self.reader.frame_arrived();

        tracing::info!(
            run = self.run.id,
            align_to_color = self.options.align_to_color,
            preregistered = self.options.preregistered,
            stride = self.options.density.stride(),
            tolerance_ms = self.run.synchronizer.tolerance().as_secs_f64() * 1000.0,
            "Acquisition loop started"
        );
        // Nobody waiting means start() already gave up on us.
        let _ = ready.send(());

        loop {
            select! {
                recv(stop) -> _ => break,
                recv(frames) -> event => {
                    if event.is_err() {
                        tracing::warn!("Sensor event stream closed");
                        break;
                    }
                }
            }
            if self.run.is_cancelled() {
                break;
            }
            self.process_event();
        }

        let counters = &self.run.counters;
        let sync = self.run.synchronizer.stats();
        tracing::info!(
            run = self.run.id,
            events = counters.events.load(Ordering::Relaxed),
            extraction_failures = counters.extraction_failures.load(Ordering::Relaxed),
            matched = sync.matched,
            dropped = sync.dropped,
            "Acquisition loop exiting"
        );

        // Release the sensor before reporting the thread as gone.
        drop(self);
        drop(guard);
    }

    fn process_event(&mut self) {
        match self.acquire() {
            Ok((color, depth)) => {
                self.buffers.write_color(color);
                self.buffers.write_depth(depth);
                Counters::bump(&self.run.counters.frames_acquired);
                self.fuse();
            }
            Err(error) => {
                Counters::bump(&self.run.counters.extraction_failures);
                tracing::debug!(%error, "Dropped sensor frame");
            }
        }

        Counters::bump(&self.run.counters.events);
    }

    /// Pulls the newest multi-source frame and splits it.
    fn acquire(&mut self) -> Result<(ColorFrame, DepthFrame), SensorError> {
        let mut frame = self.reader.acquire_latest()?;
        let color = frame.color_frame()?;
        let depth = frame.depth_frame()?;
        Ok((color, depth))
    }

    fn fuse(&self) {
        let Some(pair) = self.run.synchronizer.poll(&self.buffers) else {
            return;
        };
        let fps = self.run.synchronizer.frames_per_second();
        let counters = &self.run.counters;

        let report = self
            .callbacks
            .dispatch(&pair, fps, &self.run.cancelled, || {
                Counters::bump(&counters.clouds_built);
                self.converter
                    .convert(&pair.color, &pair.depth, &self.options)
            });

        counters
            .callbacks_invoked
            .fetch_add(report.invoked as u64, Ordering::Relaxed);
        counters
            .callback_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        tracing::trace!(
            invoked = report.invoked,
            failed = report.failed,
            cloud = report.cloud_built,
            fps,
            "Dispatched matched pair"
        );
    }
}
