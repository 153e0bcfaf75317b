//! Lifecycle state and run counters shared with the acquisition thread.

use crate::sync::FrameSynchronizer;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of the acquisition thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Counters for one run.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub events: AtomicU64,
    pub frames_acquired: AtomicU64,
    pub extraction_failures: AtomicU64,
    pub clouds_built: AtomicU64,
    pub callbacks_invoked: AtomicU64,
    pub callback_failures: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of pipeline activity for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    /// Sequence number of the run these counters belong to, 0 before the
    /// first start.
    pub run: u64,
    /// Frame-arrived events fully processed.
    pub events: u64,
    /// Color + depth pairs written into the frame buffers.
    pub frames_acquired: u64,
    /// Events skipped because a sub-frame could not be extracted.
    pub extraction_failures: u64,
    /// Pairs emitted by the synchronizer.
    pub pairs_matched: u64,
    /// Frames discarded by the synchronizer for excessive skew.
    pub pairs_dropped: u64,
    /// Point clouds computed.
    pub clouds_built: u64,
    /// Subscriber invocations.
    pub callbacks_invoked: u64,
    /// Subscriber invocations that returned an error or panicked.
    pub callback_failures: u64,
    pub frames_per_second: f32,
    pub running: bool,
}

/// One start/stop cycle of the acquisition thread.
///
/// Every run owns its flags, so a thread that outlives its run (stopped from
/// inside a callback, then restarted) can only ever touch its own.
pub(crate) struct Run {
    pub id: u64,
    /// Set while the acquisition thread is alive.
    pub alive: AtomicBool,
    /// Set by `stop()`; no handler runs once this is observed.
    pub cancelled: AtomicBool,
    pub counters: Counters,
    pub synchronizer: Arc<FrameSynchronizer>,
}

impl Run {
    pub fn new(id: u64, synchronizer: Arc<FrameSynchronizer>) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
            counters: Counters::default(),
            synchronizer,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// State shared between the control surface and the acquisition threads.
pub(crate) struct Shared {
    state: Mutex<PipelineState>,
    current: Mutex<Option<Arc<Run>>>,
    runs: AtomicU64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: Mutex::new(PipelineState::Stopped),
            current: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }
}

impl Shared {
    pub fn state_guard(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, next: PipelineState) {
        let mut state = self.state_guard();
        if *state != next {
            let from = *state;
            tracing::debug!(%from, to = %next, "Pipeline state transition");
            *state = next;
        }
    }

    /// Lifecycle state as observed from outside; a run whose thread died is
    /// reported as stopped.
    pub fn effective_state(&self) -> PipelineState {
        let state = *self.state_guard();
        if state == PipelineState::Running && !self.current_alive() {
            PipelineState::Stopped
        } else {
            state
        }
    }

    /// Creates the next run and makes it current.
    pub fn begin_run(&self, synchronizer: Arc<FrameSynchronizer>) -> Arc<Run> {
        let id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let run = Arc::new(Run::new(id, synchronizer));
        *self.current_guard() = Some(Arc::clone(&run));
        run
    }

    pub fn current(&self) -> Option<Arc<Run>> {
        self.current_guard().clone()
    }

    pub fn is_current(&self, run: &Arc<Run>) -> bool {
        self.current_guard()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, run))
    }

    pub fn current_alive(&self) -> bool {
        self.current_guard().as_ref().is_some_and(|run| run.is_alive())
    }

    fn current_guard(&self) -> MutexGuard<'_, Option<Arc<Run>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears liveness when the acquisition thread exits by any path.
///
/// The lifecycle state is only touched while the guarded run is still the
/// current one.
pub(crate) struct LivenessGuard {
    pub shared: Arc<Shared>,
    pub run: Arc<Run>,
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.run.alive.store(false, Ordering::SeqCst);
        let mut state = self.shared.state_guard();
        if *state == PipelineState::Running && self.shared.is_current(&self.run) {
            tracing::warn!(run = self.run.id, "Acquisition loop exited without stop request");
            *state = PipelineState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PipelineConfig;

    fn synchronizer() -> Arc<FrameSynchronizer> {
        Arc::new(FrameSynchronizer::from_config(&PipelineConfig::default()))
    }

    #[test]
    fn test_dead_thread_reads_stopped() {
        let shared = Shared::default();
        shared.set_state(PipelineState::Running);
        assert_eq!(shared.effective_state(), PipelineState::Stopped);

        let run = shared.begin_run(synchronizer());
        assert_eq!(shared.effective_state(), PipelineState::Running);

        run.alive.store(false, Ordering::SeqCst);
        assert_eq!(shared.effective_state(), PipelineState::Stopped);
    }

    #[test]
    fn test_runs_are_numbered() {
        let shared = Shared::default();
        let first = shared.begin_run(synchronizer());
        let second = shared.begin_run(synchronizer());
        assert_eq!((first.id, second.id), (1, 2));
        assert!(!shared.is_current(&first));
        assert!(shared.is_current(&second));
    }

    #[test]
    fn test_guard_marks_unexpected_exit() {
        let shared = Arc::new(Shared::default());
        let run = shared.begin_run(synchronizer());
        shared.set_state(PipelineState::Running);

        drop(LivenessGuard {
            shared: Arc::clone(&shared),
            run: Arc::clone(&run),
        });
        assert!(!run.is_alive());
        assert_eq!(*shared.state_guard(), PipelineState::Stopped);
    }

    #[test]
    fn test_guard_leaves_requested_stop_alone() {
        let shared = Arc::new(Shared::default());
        let run = shared.begin_run(synchronizer());
        shared.set_state(PipelineState::Stopping);
        drop(LivenessGuard {
            shared: Arc::clone(&shared),
            run,
        });
        assert_eq!(*shared.state_guard(), PipelineState::Stopping);
    }

    #[test]
    fn test_superseded_run_exit_keeps_new_run() {
        let shared = Arc::new(Shared::default());
        let old = shared.begin_run(synchronizer());
        old.cancel();
        let new = shared.begin_run(synchronizer());
        shared.set_state(PipelineState::Running);

        drop(LivenessGuard {
            shared: Arc::clone(&shared),
            run: Arc::clone(&old),
        });
        assert!(!old.is_alive());
        assert!(new.is_alive());
        assert!(!new.is_cancelled());
        assert_eq!(shared.effective_state(), PipelineState::Running);
    }
}
