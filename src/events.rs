//! Broadcast hub for the device's unsolicited traffic.
//!
//! Each event kind gets its own broadcast channel: a subscription is a
//! cloned receiver and lasts until it is dropped, while a one-shot wait is
//! a fresh receiver awaited for a single event. New receivers only observe
//! events published after they were created. Channels run in overflow mode
//! so a stalled subscriber loses its own oldest events instead of wedging
//! the inbound pump or its peers.

use bytes::Bytes;

/// Stream of [`Event`]s for one [`EventKind`]. Dropping it ends the
/// subscription.
pub type Subscription = async_broadcast::Receiver<Event>;

const CAPACITY: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Pong,
    Announcement,
    SystemResponse,
    Trace,
    Status,
}

const KINDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind:    EventKind,
    pub payload: Bytes,
}

impl Event {
    pub(crate) fn pong() -> Self {
        Self {
            kind:    EventKind::Pong,
            payload: Bytes::new(),
        }
    }

    pub(crate) fn announcement(payload: Bytes) -> Self {
        Self {
            kind: EventKind::Announcement,
            payload,
        }
    }

    pub(crate) fn system_response(payload: Bytes) -> Self {
        Self {
            kind: EventKind::SystemResponse,
            payload,
        }
    }

    pub(crate) fn trace(payload: Bytes) -> Self {
        Self {
            kind: EventKind::Trace,
            payload,
        }
    }

    pub(crate) fn status(connected: bool) -> Self {
        Self {
            kind:    EventKind::Status,
            payload: Bytes::from_static(if connected { b"connected" } else { b"disconnected" }),
        }
    }
}

struct Channel {
    tx:         async_broadcast::Sender<Event>,
    _keepalive: async_broadcast::InactiveReceiver<Event>,
}

impl Channel {
    fn new() -> Self {
        let (mut tx, rx) = async_broadcast::broadcast(CAPACITY);
        tx.set_overflow(true);

        Self {
            tx,
            _keepalive: rx.deactivate(),
        }
    }
}

/// Next event on `sub`, skipping the overflow notices a lagging receiver
/// is handed in place of the events it lost.
pub async fn next_event(sub: &mut Subscription) -> Result<Event, async_broadcast::RecvError> {
    loop {
        match sub.recv().await {
            Err(async_broadcast::RecvError::Overflowed(missed)) => {
                tracing::debug!(missed, "subscriber lagged behind the event stream");
            },
            other => return other,
        }
    }
}

pub(crate) struct EventHub {
    channels: [Channel; KINDS],
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| Channel::new()),
        }
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.channels[kind as usize].tx.new_receiver()
    }

    pub fn publish(&self, event: Event) {
        let tx = &self.channels[event.kind as usize].tx;

        if let Err(err) = tx.try_broadcast(event) {
            // nobody listening for this kind right now
            tracing::trace!(error = %err, "event not delivered");
        }
    }
}
