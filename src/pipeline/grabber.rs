//! The pipeline control surface.

use super::acquisition::Acquisition;
use super::error::precondition_violation;
use super::state::Run;
use super::{PipelineError, PipelineState, PipelineStats, Shared};
use crate::capture::{PipelineConfig, SensorDriver};
use crate::cloud::{ConvertOptions, PointCloudConverter};
use crate::dispatch::CallbackRegistry;
use crate::sync::{FrameBuffers, FrameSynchronizer};
use crossbeam_channel::Sender;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
    thread_id: ThreadId,
    run: Arc<Run>,
}

/// RGB-D acquisition and fusion pipeline.
///
/// Owns a sensor driver, a callback registry and at most one acquisition
/// thread. Every control method takes `&self`, so a pipeline can be shared
/// across threads and stopped from inside one of its own callbacks.
///
/// # Example
///
/// ```no_run
/// use rgbd_fusion::{Callback, FusionPipeline, MockSensor};
///
/// let (sensor, _handle) = MockSensor::new();
/// let pipeline = FusionPipeline::new(sensor);
/// pipeline.callbacks().register(Callback::point_cloud_rgba(|cloud| {
///     println!("{} valid points", cloud.valid_count());
///     Ok(())
/// }));
/// pipeline.start()?;
/// pipeline.stop()?;
/// # Ok::<(), rgbd_fusion::PipelineError>(())
/// ```
pub struct FusionPipeline {
    driver: Box<dyn SensorDriver>,
    config: Mutex<PipelineConfig>,
    callbacks: CallbackRegistry,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    /// Thread that was told to stop from inside its own callback.
    detached: Mutex<Option<Worker>>,
}

impl FusionPipeline {
    /// Creates a stopped pipeline with the default configuration.
    pub fn new(driver: impl SensorDriver + 'static) -> Self {
        Self::build(Box::new(driver), PipelineConfig::default())
    }

    /// Creates a stopped pipeline with a validated configuration.
    pub fn with_config(
        driver: impl SensorDriver + 'static,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self::build(Box::new(driver), config))
    }

    fn build(driver: Box<dyn SensorDriver>, config: PipelineConfig) -> Self {
        Self {
            driver,
            config: Mutex::new(config),
            callbacks: CallbackRegistry::new(),
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
            detached: Mutex::new(None),
        }
    }

    fn config_guard(&self) -> MutexGuard<'_, PipelineConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn worker_guard(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens the sensor and starts the acquisition thread.
    ///
    /// Returns once the thread is waiting for frames. On any failure the
    /// pipeline is left stopped with the sensor released.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut worker = self.worker_guard();

        let config = {
            let config = self.config_guard();
            let mut state = self.shared.state_guard();
            // A run whose thread died on its own can be restarted.
            if *state == PipelineState::Running && !self.shared.current_alive() {
                *state = PipelineState::Stopped;
            }
            if *state != PipelineState::Stopped {
                drop(state);
                return precondition_violation(PipelineError::AlreadyRunning);
            }
            *state = PipelineState::Starting;
            config.clone()
        };

        let detached = self
            .detached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        for stale in worker.take().into_iter().chain(detached) {
            if stale.thread_id == thread::current().id() {
                continue;
            }
            if stale.handle.join().is_err() {
                tracing::warn!("Previous acquisition thread had panicked");
            }
        }

        match self.launch(config) {
            Ok(next) => {
                *worker = Some(next);
                self.shared.set_state(PipelineState::Running);
                tracing::info!(sensor = %self.driver.name(), "Pipeline started");
                Ok(())
            }
            Err(error) => {
                self.shared.set_state(PipelineState::Stopped);
                tracing::error!(%error, "Pipeline failed to start");
                Err(error)
            }
        }
    }

    fn launch(&self, config: PipelineConfig) -> Result<Worker, PipelineError> {
        config.validate()?;
        let sources = config.sources();
        let reader = self.driver.open(&sources)?;

        let synchronizer = Arc::new(FrameSynchronizer::from_config(&config));
        let run = self.shared.begin_run(synchronizer);
        tracing::debug!(run = run.id, ?sources, "Sensor opened");

        let acquisition = Acquisition {
            converter: PointCloudConverter::new(reader.coordinate_mapper()),
            reader,
            buffers: FrameBuffers::new(),
            options: ConvertOptions::from_config(&config),
            callbacks: self.callbacks.clone(),
            shared: Arc::clone(&self.shared),
            run: Arc::clone(&run),
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let handle = match thread::Builder::new()
            .name("rgbd-acquisition".into())
            .spawn(move || acquisition.run(stop_rx, ready_tx))
        {
            Ok(handle) => handle,
            Err(error) => {
                run.alive.store(false, Ordering::SeqCst);
                return Err(PipelineError::Spawn(error));
            }
        };

        if ready_rx.recv().is_err() {
            let _ = handle.join();
            return Err(PipelineError::StartupAborted);
        }

        Ok(Worker {
            stop: stop_tx,
            thread_id: handle.thread().id(),
            handle,
            run,
        })
    }

    /// Stops the acquisition thread and releases the sensor.
    ///
    /// No callback is invoked once this returns. Called from inside a
    /// callback, the loop is signalled and the thread finishes on its own
    /// after the current handler returns.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let Some(worker) = self.worker_guard().take() else {
            return precondition_violation(PipelineError::NotRunning);
        };

        self.shared.set_state(PipelineState::Stopping);
        worker.run.cancel();
        let _ = worker.stop.try_send(());

        if thread::current().id() == worker.thread_id {
            tracing::debug!("Stop requested from acquisition thread, detaching");
            *self.detached.lock().unwrap_or_else(|e| e.into_inner()) = Some(worker);
        } else if worker.handle.join().is_err() {
            tracing::error!("Acquisition thread panicked");
        }

        self.shared.set_state(PipelineState::Stopped);
        tracing::info!(sensor = %self.driver.name(), "Pipeline stopped");
        Ok(())
    }

    /// True while the acquisition thread is alive and running.
    pub fn is_running(&self) -> bool {
        self.shared.effective_state() == PipelineState::Running
    }

    pub fn state(&self) -> PipelineState {
        self.shared.effective_state()
    }

    /// Rate of matched pairs over the recent window, 0 when idle.
    pub fn frames_per_second(&self) -> f32 {
        self.shared
            .current()
            .map(|run| run.synchronizer.frames_per_second())
            .unwrap_or(0.0)
    }

    /// Sensor name as reported by the driver.
    pub fn name(&self) -> String {
        self.driver.name().to_string()
    }

    /// Subscriber registry. Registration is allowed in any state.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn config(&self) -> PipelineConfig {
        self.config_guard().clone()
    }

    /// Counters for the current (or last) run.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = PipelineStats {
            running: self.is_running(),
            ..Default::default()
        };
        if let Some(run) = self.shared.current() {
            let counters = &run.counters;
            let sync = run.synchronizer.stats();
            stats.run = run.id;
            stats.events = counters.events.load(Ordering::Relaxed);
            stats.frames_acquired = counters.frames_acquired.load(Ordering::Relaxed);
            stats.extraction_failures = counters.extraction_failures.load(Ordering::Relaxed);
            stats.pairs_matched = sync.matched;
            stats.pairs_dropped = sync.dropped;
            stats.clouds_built = counters.clouds_built.load(Ordering::Relaxed);
            stats.callbacks_invoked = counters.callbacks_invoked.load(Ordering::Relaxed);
            stats.callback_failures = counters.callback_failures.load(Ordering::Relaxed);
            stats.frames_per_second = run.synchronizer.frames_per_second();
        }
        stats
    }

    /// Full-resolution cloud, one point per depth pixel.
    pub fn set_large_cloud(&self) -> Result<(), PipelineError> {
        self.update_config(|c| c.large_cloud = true)
    }

    /// Decimated cloud using the configured stride.
    pub fn set_normal_cloud(&self) -> Result<(), PipelineError> {
        self.update_config(|c| c.large_cloud = false)
    }

    pub fn set_align_to_color(&self, enabled: bool) -> Result<(), PipelineError> {
        self.update_config(|c| c.align_to_color = enabled)
    }

    pub fn set_preregistered(&self, enabled: bool) -> Result<(), PipelineError> {
        self.update_config(|c| c.preregistered = enabled)
    }

    /// Opens the infrared reader alongside color and depth.
    pub fn set_infrared(&self, enabled: bool) -> Result<(), PipelineError> {
        self.update_config(|c| c.infrared = enabled)
    }

    /// Opens the body-index (person) reader alongside color and depth.
    pub fn set_person(&self, enabled: bool) -> Result<(), PipelineError> {
        self.update_config(|c| c.person = enabled)
    }

    /// Replaces the whole configuration.
    pub fn set_config(&self, config: PipelineConfig) -> Result<(), PipelineError> {
        self.update_config(move |c| *c = config)
    }

    // Configuration is read once per run, so changes are only accepted
    // while stopped.
    fn update_config<F>(&self, apply: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut PipelineConfig),
    {
        let mut config = self.config_guard();
        if self.shared.effective_state() != PipelineState::Stopped {
            drop(config);
            return precondition_violation(PipelineError::ConfigWhileRunning);
        }

        let mut next = config.clone();
        apply(&mut next);
        next.validate()?;
        tracing::debug!(?next, "Pipeline configuration updated");
        *config = next;
        Ok(())
    }
}

impl Drop for FusionPipeline {
    fn drop(&mut self) {
        let running = self.worker_guard().is_some();
        if running {
            let _ = self.stop();
        }
    }
}
