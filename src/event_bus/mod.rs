//! Run event fan-out, sinks, and offline analysis.
//!
//! The module is organised around the [`EventManager`], which assigns
//! sequence numbers and delivers events to registered [`EventSink`]s, plus
//! the [`EventRecorder`] for capturing and replaying full run logs.

pub mod bus;
pub mod event;
pub mod recorder;
pub mod sink;

pub use bus::{EventManager, ObserverId};
pub use event::{Event, EventBody, RunOutcome};
pub use recorder::{EventRecorder, SortDiff};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
