//! In-process sensor used by tests and the demonstration binary.

use super::{
    MultiSourceFrame, SensorDriver, SensorError, SensorReader, SourceSelection, SyntheticScene,
    SyntheticSensorConfig, Timestamp,
};
use crate::mapping::{CalibratedMapper, Calibration, CoordinateMapper};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Mock sensor that either replays injected frames or generates a
/// synthetic scene at a fixed rate.
pub struct MockSensor {
    name: String,
    calibration: Calibration,
    mode: Mode,
    shared: Arc<Shared>,
}

#[derive(Clone)]
enum Mode {
    Injected,
    Synthetic(SyntheticSensorConfig),
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<MultiSourceFrame>>,
    events: Mutex<Option<Sender<Instant>>>,
    /// Id of the newest reader; only that reader may close the device.
    session: AtomicU64,
    sources: Mutex<Option<SourceSelection>>,
    fail_next_open: AtomicBool,
    open: AtomicBool,
    opens: AtomicUsize,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<MultiSourceFrame>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn events(&self) -> MutexGuard<'_, Option<Sender<Instant>>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Closes the device on behalf of `session`. A reader superseded by a
    /// newer open leaves the newer session untouched.
    fn release(&self, session: u64) -> bool {
        let mut events = self.events();
        if self.session.load(Ordering::SeqCst) != session {
            return false;
        }
        events.take();
        self.queue().clear();
        self.open.store(false, Ordering::SeqCst);
        true
    }
}

/// Test-side control over a [`MockSensor`].
#[derive(Clone)]
pub struct MockSensorHandle {
    shared: Arc<Shared>,
}

impl MockSensor {
    /// Sensor that only delivers frames pushed through the returned handle.
    pub fn new() -> (Self, MockSensorHandle) {
        Self::with_mode("Mock RGB-D Sensor", Calibration::default(), Mode::Injected)
    }

    /// Injection sensor with custom calibration.
    pub fn with_calibration(calibration: Calibration) -> (Self, MockSensorHandle) {
        Self::with_mode("Mock RGB-D Sensor", calibration, Mode::Injected)
    }

    /// Sensor that emits a synthetic wall scene at `config.fps`.
    pub fn synthetic(
        calibration: Calibration,
        config: SyntheticSensorConfig,
    ) -> (Self, MockSensorHandle) {
        Self::with_mode("Synthetic RGB-D Sensor", calibration, Mode::Synthetic(config))
    }

    fn with_mode(name: &str, calibration: Calibration, mode: Mode) -> (Self, MockSensorHandle) {
        let shared = Arc::new(Shared::default());
        let handle = MockSensorHandle {
            shared: Arc::clone(&shared),
        };
        let sensor = Self {
            name: name.to_string(),
            calibration,
            mode,
            shared,
        };
        (sensor, handle)
    }
}

impl SensorDriver for MockSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, sources: &SourceSelection) -> Result<Box<dyn SensorReader>, SensorError> {
        if self.shared.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(SensorError::OpenFailed("injected open failure".into()));
        }

        let mapper: Arc<dyn CoordinateMapper> =
            Arc::new(CalibratedMapper::new(self.calibration.clone()));

        let mut events = self.shared.events();
        let session = self.shared.session.fetch_add(1, Ordering::SeqCst) + 1;
        let reader: Box<dyn SensorReader> = match &self.mode {
            Mode::Injected => {
                let (tx, rx) = crossbeam_channel::unbounded();
                *events = Some(tx);
                Box::new(InjectedReader {
                    shared: Arc::clone(&self.shared),
                    session,
                    events: rx,
                    mapper,
                })
            }
            Mode::Synthetic(config) => {
                let fps = config.fps.max(1);
                Box::new(SyntheticReader {
                    shared: Arc::clone(&self.shared),
                    session,
                    ticker: crossbeam_channel::tick(Duration::from_secs(1) / fps),
                    scene: SyntheticScene::new(self.calibration.clone(), config),
                    color_lag: Duration::from_millis(config.color_lag_ms),
                    opened_at: Instant::now(),
                    mapper,
                })
            }
        };

        drop(events);

        *self.shared.sources.lock().unwrap_or_else(|e| e.into_inner()) = Some(*sources);
        self.shared.open.store(true, Ordering::SeqCst);
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            sensor = %self.name,
            session,
            infrared = sources.infrared,
            person = sources.person,
            "Mock sensor opened"
        );
        Ok(reader)
    }
}

impl MockSensorHandle {
    /// Queues a frame and raises the frame-arrived event.
    pub fn inject(&self, frame: MultiSourceFrame) -> Result<(), SensorError> {
        let events = self.shared.events();
        let tx = events.as_ref().ok_or(SensorError::NotStreaming)?;
        self.shared.queue().push_back(frame);
        tx.send(Instant::now())
            .map_err(|_| SensorError::NotStreaming)
    }

    /// Convenience for injecting a complete color + depth pair.
    pub fn inject_pair(
        &self,
        color: super::ColorFrame,
        depth: super::DepthFrame,
    ) -> Result<(), SensorError> {
        self.inject(MultiSourceFrame::complete(color, depth))
    }

    /// Raises a frame-arrived event with no retrievable frame behind it.
    pub fn inject_spurious_event(&self) -> Result<(), SensorError> {
        let events = self.shared.events();
        let tx = events.as_ref().ok_or(SensorError::NotStreaming)?;
        tx.send(Instant::now())
            .map_err(|_| SensorError::NotStreaming)
    }

    /// Makes the next `open()` fail as if the device were unplugged.
    pub fn fail_next_open(&self) {
        self.shared.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Closes the event stream as a device disconnect would.
    pub fn disconnect(&self) {
        self.shared.events().take();
    }

    /// True while a reader holds the device.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Extra sources requested by the most recent successful open.
    pub fn opened_sources(&self) -> Option<SourceSelection> {
        *self.shared.sources.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

struct InjectedReader {
    shared: Arc<Shared>,
    session: u64,
    events: Receiver<Instant>,
    mapper: Arc<dyn CoordinateMapper>,
}

impl SensorReader for InjectedReader {
    fn frame_arrived(&self) -> Receiver<Instant> {
        self.events.clone()
    }

    // Injected frames are replayed in order so each event maps to one frame.
    fn acquire_latest(&mut self) -> Result<MultiSourceFrame, SensorError> {
        self.shared
            .queue()
            .pop_front()
            .ok_or_else(|| SensorError::Disconnected("no frame behind event".into()))
    }

    fn coordinate_mapper(&self) -> Arc<dyn CoordinateMapper> {
        Arc::clone(&self.mapper)
    }
}

impl Drop for InjectedReader {
    fn drop(&mut self) {
        if self.shared.release(self.session) {
            tracing::info!(session = self.session, "Mock sensor closed");
        }
    }
}

struct SyntheticReader {
    shared: Arc<Shared>,
    session: u64,
    ticker: Receiver<Instant>,
    scene: SyntheticScene,
    color_lag: Duration,
    opened_at: Instant,
    mapper: Arc<dyn CoordinateMapper>,
}

impl SensorReader for SyntheticReader {
    fn frame_arrived(&self) -> Receiver<Instant> {
        self.ticker.clone()
    }

    fn acquire_latest(&mut self) -> Result<MultiSourceFrame, SensorError> {
        let elapsed = self.opened_at.elapsed();
        let depth = self.scene.depth_frame(Timestamp::from_duration(elapsed));
        let color = self
            .scene
            .color_frame(Timestamp::from_duration(elapsed + self.color_lag));
        Ok(MultiSourceFrame::complete(color, depth))
    }

    fn coordinate_mapper(&self) -> Arc<dyn CoordinateMapper> {
        Arc::clone(&self.mapper)
    }
}

impl Drop for SyntheticReader {
    fn drop(&mut self) {
        if self.shared.release(self.session) {
            tracing::info!(session = self.session, "Synthetic sensor closed");
        }
    }
}
