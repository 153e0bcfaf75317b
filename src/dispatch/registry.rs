//! Typed publish-subscribe registry with lazy payload construction.

use super::{Callback, CallbackKind, FusedFrame, HandlerResult};
use crate::cloud::PointCloud;
use crate::sync::MatchedPair;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

struct Entry {
    id: u64,
    callback: Arc<Callback>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: Mutex<[Vec<Entry>; 5]>,
    failures: AtomicU64,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, [Vec<Entry>; 5]> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registry of subscribers for every [`CallbackKind`].
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Arc<Inner>,
}

/// Returned by [`CallbackRegistry::register`]; removes the subscriber when
/// [`unsubscribe`](Self::unsubscribe) is called.
///
/// Dropping the handle keeps the subscription alive.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    kind: CallbackKind,
    registry: Weak<Inner>,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Removes the subscriber. Returns false if it was already removed.
    ///
    /// Safe to call while a dispatch is running, including from inside a
    /// handler; a dispatch already in progress may still deliver to it.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut subscribers = inner.subscribers();
        let list = &mut subscribers[self.kind.index()];
        let before = list.len();
        list.retain(|e| e.id != self.id);
        before != list.len()
    }
}

/// Outcome of one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
    pub cloud_built: bool,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber under the kind implied by the callback variant.
    pub fn register(&self, callback: Callback) -> SubscriptionHandle {
        let kind = callback.kind();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers()[kind.index()].push(Entry {
            id,
            callback: Arc::new(callback),
        });
        tracing::debug!(%kind, subscription = id, "Registered callback");
        SubscriptionHandle {
            id,
            kind,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self, kind: CallbackKind) -> usize {
        self.inner.subscribers()[kind.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subscribers().iter().all(Vec::is_empty)
    }

    /// Whether any current subscriber needs a point cloud.
    pub fn wants_cloud(&self) -> bool {
        let subscribers = self.inner.subscribers();
        CallbackKind::ALL
            .iter()
            .any(|k| k.needs_cloud() && !subscribers[k.index()].is_empty())
    }

    /// Total handler failures (errors and panics) observed.
    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Delivers one matched pair to every subscribed kind.
    ///
    /// Subscribers are snapshotted first, so the registry lock is not held
    /// while handlers run. `build_cloud` runs at most once, and only when a
    /// cloud-consuming kind has subscribers. Once `cancelled` is set no
    /// further handler is invoked.
    pub fn dispatch<F>(
        &self,
        pair: &MatchedPair,
        fps: f32,
        cancelled: &AtomicBool,
        build_cloud: F,
    ) -> DispatchReport
    where
        F: FnOnce() -> PointCloud,
    {
        let snapshot: [Vec<(u64, Arc<Callback>)>; 5] = {
            let subscribers = self.inner.subscribers();
            std::array::from_fn(|i| {
                subscribers[i]
                    .iter()
                    .map(|e| (e.id, Arc::clone(&e.callback)))
                    .collect()
            })
        };

        let mut report = DispatchReport::default();
        if snapshot.iter().all(Vec::is_empty) {
            return report;
        }

        let cloud: Option<Arc<PointCloud>> = CallbackKind::ALL
            .iter()
            .any(|k| k.needs_cloud() && !snapshot[k.index()].is_empty())
            .then(|| Arc::new(build_cloud()));
        report.cloud_built = cloud.is_some();

        let mut fused: Option<Arc<FusedFrame>> = None;

        for kind in CallbackKind::ALL {
            for (id, callback) in &snapshot[kind.index()] {
                if cancelled.load(Ordering::SeqCst) {
                    return report;
                }
                let outcome = match &**callback {
                    Callback::RawImage(f) => self.invoke(kind, *id, || f(&pair.color)),
                    Callback::RawDepth(f) => self.invoke(kind, *id, || f(&pair.depth)),
                    Callback::ImageDepthWithFps(f) => {
                        self.invoke(kind, *id, || f(&pair.color, &pair.depth, fps))
                    }
                    Callback::PointCloudRgba(f) => match &cloud {
                        Some(cloud) => self.invoke(kind, *id, || f(cloud)),
                        None => continue,
                    },
                    Callback::AllData(f) => {
                        let Some(cloud) = &cloud else { continue };
                        let bundle: &Arc<FusedFrame> = fused.get_or_insert_with(|| {
                            Arc::new(FusedFrame {
                                image: Arc::clone(&pair.color),
                                depth: Arc::clone(&pair.depth),
                                cloud: Arc::clone(cloud),
                                captured_at: chrono::Utc::now(),
                            })
                        });
                        self.invoke(kind, *id, || f(bundle))
                    }
                };
                report.invoked += 1;
                if !outcome {
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Runs one handler, containing errors and panics.
    fn invoke<F>(&self, kind: CallbackKind, id: u64, f: F) -> bool
    where
        F: FnOnce() -> HandlerResult,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%kind, subscription = id, %error, "Callback failed");
                false
            }
            Err(_) => {
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%kind, subscription = id, "Callback panicked");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ColorFrame, DepthFrame, Timestamp};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pair() -> MatchedPair {
        MatchedPair {
            color: Arc::new(ColorFrame::filled(2, 2, [0, 0, 0, 255], Timestamp::default())),
            depth: Arc::new(DepthFrame::uniform(2, 2, 1000, Timestamp::default())),
            skew: Duration::ZERO,
        }
    }

    fn empty_cloud() -> PointCloud {
        PointCloud::with_capacity(0, 0)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Clone) {
        let count = Arc::new(AtomicUsize::new(0));
        let bump = {
            let count = Arc::clone(&count);
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        (count, bump)
    }

    #[test]
    fn test_kind_follows_variant() {
        let registry = CallbackRegistry::new();
        let handle = registry.register(Callback::raw_depth(|_| Ok(())));
        assert_eq!(handle.kind(), CallbackKind::RawDepth);
        assert_eq!(registry.subscriber_count(CallbackKind::RawDepth), 1);
        assert_eq!(registry.subscriber_count(CallbackKind::RawImage), 0);
    }

    #[test]
    fn test_no_subscribers_builds_nothing() {
        let registry = CallbackRegistry::new();
        let built = AtomicBool::new(false);
        let report = registry.dispatch(&pair(), 30.0, &AtomicBool::new(false), || {
            built.store(true, Ordering::SeqCst);
            empty_cloud()
        });
        assert_eq!(report, DispatchReport::default());
        assert!(!built.load(Ordering::SeqCst));
    }

    #[test]
    fn test_image_only_subscribers_skip_cloud() {
        let registry = CallbackRegistry::new();
        let (count, bump) = counter();
        registry.register(Callback::raw_image(move |_| {
            bump();
            Ok(())
        }));
        registry.register(Callback::image_depth_with_fps(|_, _, fps| {
            assert_eq!(fps, 12.5);
            Ok(())
        }));

        let report = registry.dispatch(&pair(), 12.5, &AtomicBool::new(false), || {
            panic!("cloud must not be built")
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(report.invoked, 2);
        assert!(!report.cloud_built);
    }

    #[test]
    fn test_cloud_built_once_and_shared() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::<usize>::new()));
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            registry.register(Callback::point_cloud_rgba(move |cloud| {
                seen.lock().unwrap().push(Arc::as_ptr(cloud) as usize);
                Ok(())
            }));
        }
        {
            let seen = Arc::clone(&seen);
            registry.register(Callback::all_data(move |data| {
                seen.lock().unwrap().push(Arc::as_ptr(&data.cloud) as usize);
                Ok(())
            }));
        }

        let builds = AtomicUsize::new(0);
        let report = registry.dispatch(&pair(), 0.0, &AtomicBool::new(false), || {
            builds.fetch_add(1, Ordering::SeqCst);
            empty_cloud()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(report.invoked, 3);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|&p| p == seen[0]));
    }

    #[test]
    fn test_failing_subscriber_does_not_stop_others() {
        let registry = CallbackRegistry::new();
        let (count, bump) = counter();

        registry.register(Callback::raw_image(|_| Err("decoder unavailable".into())));
        registry.register(Callback::raw_depth(|_| panic!("subscriber bug")));
        let b = bump.clone();
        registry.register(Callback::raw_depth(move |_| {
            b();
            Ok(())
        }));
        registry.register(Callback::all_data(move |_| {
            bump();
            Ok(())
        }));

        let report = registry.dispatch(&pair(), 0.0, &AtomicBool::new(false), empty_cloud);
        assert_eq!(report.invoked, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(registry.failures(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = CallbackRegistry::new();
        let handle = registry.register(Callback::all_data(|_| Ok(())));
        assert!(registry.wants_cloud());

        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        assert!(registry.is_empty());
        assert!(!registry.wants_cloud());
    }

    #[test]
    fn test_unsubscribe_from_inside_handler() {
        let registry = CallbackRegistry::new();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let (count, bump) = counter();

        let handle = {
            let slot = Arc::clone(&slot);
            registry.register(Callback::raw_image(move |_| {
                bump();
                if let Some(handle) = slot.lock().unwrap().take() {
                    handle.unsubscribe();
                }
                Ok(())
            }))
        };
        *slot.lock().unwrap() = Some(handle);

        registry.dispatch(&pair(), 0.0, &AtomicBool::new(false), empty_cloud);
        registry.dispatch(&pair(), 0.0, &AtomicBool::new(false), empty_cloud);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancellation_stops_delivery() {
        let registry = CallbackRegistry::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (count, bump) = counter();
        {
            let cancelled = Arc::clone(&cancelled);
            let bump = bump.clone();
            registry.register(Callback::raw_image(move |_| {
                bump();
                cancelled.store(true, Ordering::SeqCst);
                Ok(())
            }));
        }
        registry.register(Callback::raw_depth(move |_| {
            bump();
            Ok(())
        }));

        let report = registry.dispatch(&pair(), 0.0, &cancelled, empty_cloud);
        assert_eq!(report.invoked, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
