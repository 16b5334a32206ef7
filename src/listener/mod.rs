//! Notification session listener.
//!
//! [`Listener`] owns a notification channel, the call events subscription
//! bound to it, and the WebSocket to the channel URL. It pings the socket to
//! detect silent failures, rebuilds all three when anything goes wrong, and
//! fetches a report for every call events notification it receives.
//!
//! ```rust,ignore
//! let listener = Listener::new(
//!     channels,
//!     subscriptions,
//!     reports,
//!     WsTransport::new(),
//!     ListenerSettings::new(),
//! );
//! let handle = listener.spawn();
//! handle.connect();
//! // ...
//! handle.disconnect(true).await;
//! ```

mod actor;
mod config;
mod event;
mod liveness;
mod message;
mod socket;
mod state;

use tokio::sync::{mpsc, oneshot, watch};

pub use actor::Listener;
pub use config::ListenerSettings;
pub use event::{SocketEvent, SocketEventSink};
pub use liveness::LivenessCounters;
pub use socket::{Connection, Transport, WsConnection, WsTransport};
pub use state::ConnectionState;

use event::ListenerEvent;

/// Control handle for a spawned [`Listener`].
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    events: mpsc::UnboundedSender<ListenerEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl ListenerHandle {
    fn new(
        events: mpsc::UnboundedSender<ListenerEvent>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { events, state }
    }

    /// Asks the listener to establish its channel, subscription and socket.
    ///
    /// Failures are retried by the listener itself.
    pub fn connect(&self) {
        // Err means the listener has stopped.
        let _ = self.events.send(ListenerEvent::Connect);
    }

    /// Tears down the socket, subscription and channel and waits until done.
    ///
    /// A final disconnect also cancels any pending reconnect and stops the
    /// listener for good.
    pub async fn disconnect(&self, is_final: bool) {
        let (done, finished) = oneshot::channel();
        let command = ListenerEvent::Disconnect { is_final, done };
        if self.events.send(command).is_err() {
            return;
        }
        let _ = finished.await;
    }

    /// Observes connection state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}
