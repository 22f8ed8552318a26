//! Observable engine events (§6), delivered on a broadcast channel rather
//! than by reproducing a generic JavaScript-style `EventEmitter`.

use tokio::sync::broadcast;

use crate::error::Error;

/// Capacity of the event broadcast channel. Generous enough that a slow
/// subscriber does not routinely miss events under normal operation;
/// subscribers that fall behind receive `RecvError::Lagged` rather than
/// stalling the engine task, since broadcast sends never block.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One notification the engine can emit to subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// The transport finished opening (initially, or after a reconnect).
    Open,
    /// The transport closed, intentionally or not.
    Close,
    /// A transport-level fault occurred while the port was not open.
    Error(String),
    /// An in-flight exchange failed due to a transport-level fault.
    Failed(Error),
    /// The device reported that it requires its PIN (LOCKED).
    Locked,
    /// The device is waiting on the user to confirm or deny an action.
    WaitUserConfirm,
}

/// Owns the send side of the event broadcast channel. Cloning an
/// `EventSink` shares the same underlying channel.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    pub(crate) fn new() -> (Self, broadcast::Receiver<Event>) {
        let (tx, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emits `event` to every current subscriber. A send with no
    /// subscribers is not an error — events are fire-and-forget.
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
