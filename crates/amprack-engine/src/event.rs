//! Notifications from the engine to the UI.

use crate::slot::SlotId;
use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A deadline was missed; `count` is the running total.
    Xrun { count: u64 },
    /// A reload finished. `path` is the display path, `"None"` when empty.
    SlotChanged { slot: SlotId, path: String },
    LatencyChanged { samples: usize },
    /// Scratch and double buffers now hold `frames`.
    BufferReallocated { frames: usize },
}

/// Bounded event queue. Sending never blocks; events are dropped when the UI
/// is not draining.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: Sender<EngineEvent>,
    rx: Receiver<EngineEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    #[inline]
    pub fn send(&self, event: EngineEvent) {
        let _ = self.tx.try_send(event);
    }

    pub fn receiver(&self) -> Receiver<EngineEvent> {
        self.rx.clone()
    }
}
