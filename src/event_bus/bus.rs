use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use super::event::{Event, EventBody};
use super::sink::EventSink;

/// Consecutive delivery failures tolerated before an observer is dropped.
const MAX_SINK_FAILURES: u32 = 3;

/// Handle returned by [`EventManager::register_observer`], used to
/// unregister the observer later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct ObserverEntry {
    id: ObserverId,
    sink: Box<dyn EventSink>,
    failures: u32,
}

struct Dispatch {
    sequence: u64,
    observers: Vec<ObserverEntry>,
}

/// Fan-out point for run events.
///
/// Emission with no registered observers costs one atomic load and never
/// constructs the event payload. With observers present, events are
/// delivered synchronously in registration order under a single lock, so
/// sequence numbers match the true temporal order of emission.
///
/// An observer whose sink fails [`MAX_SINK_FAILURES`] times in a row is
/// unregistered automatically; one bad sink cannot wedge the run loop.
pub struct EventManager {
    inner: Mutex<Dispatch>,
    observer_count: AtomicUsize,
    next_id: AtomicU64,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Dispatch {
                sequence: 0,
                observers: Vec::new(),
            }),
            observer_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach a sink. Events emitted after this call are delivered to it.
    pub fn register_observer<S>(&self, sink: S) -> ObserverId
    where
        S: EventSink + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock();
        inner.observers.push(ObserverEntry {
            id,
            sink: Box::new(sink),
            failures: 0,
        });
        self.observer_count.fetch_add(1, Ordering::Release);
        id
    }

    /// Detach a previously registered sink. Returns false when the id is
    /// unknown or was already dropped.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|entry| entry.id != id);
        let removed = inner.observers.len() < before;
        if removed {
            self.observer_count.fetch_sub(1, Ordering::Release);
        }
        removed
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observer_count.load(Ordering::Acquire)
    }

    /// Emit an event, constructing the payload only if someone is listening.
    ///
    /// Returns the assigned sequence number, or `None` when the event was
    /// skipped because no observers were registered.
    pub fn emit_with<F>(&self, build: F) -> Option<u64>
    where
        F: FnOnce() -> EventBody,
    {
        if self.observer_count.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut inner = self.inner.lock();
        if inner.observers.is_empty() {
            return None;
        }
        let sequence = inner.sequence;
        inner.sequence += 1;
        let event = Event {
            sequence,
            timestamp: Utc::now(),
            body: build(),
        };

        let mut dropped = 0usize;
        inner.observers.retain_mut(|entry| match entry.sink.handle(&event) {
            Ok(()) => {
                entry.failures = 0;
                true
            }
            Err(err) => {
                entry.failures += 1;
                if entry.failures >= MAX_SINK_FAILURES {
                    warn!(observer = entry.id.0, %err, "dropping observer after repeated sink failures");
                    dropped += 1;
                    false
                } else {
                    warn!(observer = entry.id.0, %err, "event sink failed");
                    true
                }
            }
        });
        if dropped > 0 {
            self.observer_count.fetch_sub(dropped, Ordering::Release);
        }
        Some(sequence)
    }

    /// Emit an already-constructed payload.
    pub fn emit(&self, body: EventBody) -> Option<u64> {
        self.emit_with(|| body)
    }

    /// Attach a bounded streaming consumer in one step.
    ///
    /// Equivalent to registering a [`ChannelSink`](super::ChannelSink) of
    /// the given capacity; the receiver yields events as they are emitted,
    /// dropping the oldest unconsumed ones when it falls behind.
    pub fn subscribe(&self, capacity: usize) -> (ObserverId, flume::Receiver<Event>) {
        let (sink, rx) = super::sink::ChannelSink::bounded(capacity);
        (self.register_observer(sink), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::sink::MemorySink;
    use std::io;

    fn start(id: &str) -> EventBody {
        EventBody::BuildStart {
            vertex_id: id.to_string(),
        }
    }

    #[test]
    fn emission_without_observers_skips_payload_construction() {
        let manager = EventManager::new();
        let mut built = false;
        let sequence = manager.emit_with(|| {
            built = true;
            start("A")
        });
        assert_eq!(sequence, None);
        assert!(!built);
    }

    #[test]
    fn sequences_are_monotonic_and_delivered_in_order() {
        let manager = EventManager::new();
        let sink = MemorySink::new();
        manager.register_observer(sink.clone());

        assert_eq!(manager.emit(start("A")), Some(0));
        assert_eq!(manager.emit(start("B")), Some(1));
        assert_eq!(manager.emit(start("C")), Some(2));

        let seqs: Vec<u64> = sink.snapshot().iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let manager = EventManager::new();
        let sink = MemorySink::new();
        let id = manager.register_observer(sink.clone());

        manager.emit(start("A"));
        assert!(manager.unregister_observer(id));
        assert!(!manager.unregister_observer(id));
        manager.emit(start("B"));

        assert_eq!(sink.snapshot().len(), 1);
        assert_eq!(manager.observer_count(), 0);
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn handle(&mut self, _event: &Event) -> io::Result<()> {
            Err(io::Error::other("boom"))
        }
    }

    #[test]
    fn failing_observer_is_dropped_but_others_keep_receiving() {
        let manager = EventManager::new();
        let sink = MemorySink::new();
        manager.register_observer(FailingSink);
        manager.register_observer(sink.clone());

        for i in 0..5 {
            manager.emit(start(&format!("v{i}")));
        }

        // Healthy sink saw everything; the broken one was evicted.
        assert_eq!(sink.snapshot().len(), 5);
        assert_eq!(manager.observer_count(), 1);
    }
}
