//! Lifecycle signalling between the capture session and its host.
//!
//! The real mechanism is an OS-wide, payload-free named notification. The
//! session only needs to publish a named event and to be told when one
//! arrives, which is all [`LifecycleNotifier`] exposes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Named lifecycle signals exchanged with the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Published when a capture session starts.
    ExtensionStarted,
    /// Published when capture ended for a reason the host did not initiate.
    CaptureStoppedExternally,
    /// Received when the host asks the session to stop.
    StopRequested,
}

impl LifecycleEvent {
    /// Wire name of the notification.
    pub fn name(self) -> &'static str {
        match self {
            LifecycleEvent::ExtensionStarted => "ScreenCaptureExtensionStarted",
            LifecycleEvent::CaptureStoppedExternally => "ScreenCaptureStoppedBySystemUIOrError",
            LifecycleEvent::StopRequested => "MustStopScreenCapture",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            LifecycleEvent::ExtensionStarted,
            LifecycleEvent::CaptureStoppedExternally,
            LifecycleEvent::StopRequested,
        ]
        .into_iter()
        .find(|event| event.name() == name)
    }
}

/// Observer callback for a lifecycle event.
pub type LifecycleHandler = Box<dyn Fn() + Send + Sync>;

/// Fire-and-forget named event delivery.
pub trait LifecycleNotifier: Send + Sync {
    /// Publish `event` to every interested process.
    fn publish(&self, event: LifecycleEvent);

    /// Run `handler` whenever `event` is delivered.
    fn observe(&self, event: LifecycleEvent, handler: LifecycleHandler);
}

/// In-process notifier.
///
/// `publish` records the event and runs its observers synchronously on the
/// calling thread. Used by the CLI and by tests.
#[derive(Default)]
pub struct LocalNotifier {
    observers: Mutex<HashMap<LifecycleEvent, Vec<Arc<dyn Fn() + Send + Sync>>>>,
    published: Mutex<Vec<LifecycleEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far, in order.
    pub fn published(&self) -> Vec<LifecycleEvent> {
        lock(&self.published).clone()
    }

    /// How many times `event` was published.
    pub fn count(&self, event: LifecycleEvent) -> usize {
        lock(&self.published)
            .iter()
            .filter(|published| **published == event)
            .count()
    }
}

impl LifecycleNotifier for LocalNotifier {
    fn publish(&self, event: LifecycleEvent) {
        debug!(event = event.name(), "publishing lifecycle event");
        lock(&self.published).push(event);
        let observers = lock(&self.observers)
            .get(&event)
            .cloned()
            .unwrap_or_default();
        for observer in observers {
            observer();
        }
    }

    fn observe(&self, event: LifecycleEvent, handler: LifecycleHandler) {
        lock(&self.observers)
            .entry(event)
            .or_default()
            .push(Arc::from(handler));
    }
}
