use tokio::sync::{mpsc, oneshot};

/// What a socket reports back to the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    /// Pong control frame with its raw payload.
    Pong(Vec<u8>),
    Closed {
        code: u16,
        reason: String,
    },
    Error(String),
    /// Text frame.
    Message(String),
}

/// Everything the listener task reacts to, in arrival order.
#[derive(Debug)]
pub(crate) enum ListenerEvent {
    Connect,
    Disconnect {
        is_final: bool,
        done: oneshot::Sender<()>,
    },
    ReconnectDue {
        ticket: u64,
    },
    LivenessTick {
        generation: u64,
    },
    Socket {
        generation: u64,
        event: SocketEvent,
    },
    ChannelRefreshFailed {
        generation: u64,
    },
}

/// Delivers events for one socket into the listener queue.
///
/// Events are tagged with the socket's generation; once the listener has
/// moved on to another socket they are dropped on arrival.
#[derive(Debug, Clone)]
pub struct SocketEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl SocketEventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<ListenerEvent>) -> Self {
        Self { generation, tx }
    }

    /// Returns `false` once the listener has stopped.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.tx
            .send(ListenerEvent::Socket {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
