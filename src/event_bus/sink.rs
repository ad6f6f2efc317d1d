use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::event::Event;

/// Abstraction over an output target that consumes full Event objects.
pub trait EventSink: Sync + Send {
    /// Handle a structured event. Sink decides how to serialize/format it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Stdout sink emitting one JSON object per line.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl StdOutSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        let line = serde_json::to_string(event).map_err(io::Error::other)?;
        writeln!(self.handle, "{line}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Bounded channel sink for streaming to async consumers (e.g., web clients).
///
/// When the consumer falls behind and the queue is full, the oldest
/// unconsumed event is discarded so emission never blocks the run loop.
pub struct ChannelSink {
    tx: flume::Sender<Event>,
    rx: flume::Receiver<Event>,
}

impl ChannelSink {
    /// Create a sink with the given queue capacity and the receiver to
    /// consume events from.
    ///
    /// # Example
    /// ```no_run
    /// use flowgraph::event_bus::{ChannelSink, EventManager};
    ///
    /// let (sink, rx) = ChannelSink::bounded(256);
    /// let manager = EventManager::new();
    /// manager.register_observer(sink);
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = rx.recv_async().await {
    ///         println!("{event}");
    ///     }
    /// });
    /// ```
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<Event>) {
        let (tx, rx) = flume::bounded(capacity);
        let consumer = rx.clone();
        (Self { tx, rx }, consumer)
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        // The sink holds its own receiver clone for eviction, so try_send
        // never reports Disconnected. A count of one means only that
        // internal handle is left and the consumer is gone.
        if self.tx.receiver_count() == 1 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel receiver dropped",
            ));
        }
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(flume::TrySendError::Full(event)) => {
                // Evict the oldest queued event and retry once.
                if let Ok(dropped) = self.rx.try_recv() {
                    warn!(
                        dropped = dropped.sequence,
                        "event queue full; dropping oldest unconsumed event"
                    );
                }
                self.tx.try_send(event).map_err(|_| {
                    io::Error::new(io::ErrorKind::WouldBlock, "event queue still full")
                })
            }
            Err(flume::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel receiver dropped",
            )),
        }
    }
}
