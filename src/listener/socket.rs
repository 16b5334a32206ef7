use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::event::{SocketEvent, SocketEventSink};
use crate::error::Error;

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS: u16 = 1005;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens sockets to notification channels.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    /// Connects to `url` and reports everything the socket does to `events`,
    /// starting with [`SocketEvent::Opened`].
    fn open(
        &self,
        url: &Url,
        events: SocketEventSink,
    ) -> impl Future<Output = Result<Self::Connection, Error>> + Send;
}

/// Write side of an open socket.
pub trait Connection: Send + 'static {
    /// Queues a ping control frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Socket`] if the socket is no longer writable.
    fn send_ping(&mut self, payload: Vec<u8>) -> Result<(), Error>;

    /// Starts a close handshake and stops event delivery.
    fn close(&mut self);
}

/// `tokio-tungstenite` transport.
///
/// The opening handshake is abandoned after the connect timeout (15 seconds
/// by default).
#[derive(Debug, Clone, Copy)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WsConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl Transport for WsTransport {
    type Connection = WsConnection;

    async fn open(&self, url: &Url, events: SocketEventSink) -> Result<WsConnection, Error> {
        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| Error::Socket(format!("timed out connecting to {url}")))??;
        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        events.emit(SocketEvent::Opened);

        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::debug!(error = %e, "Websocket write failed");
                    return;
                }
                if closing {
                    return;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        events.emit(SocketEvent::Message(text));
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => {
                            events.emit(SocketEvent::Message(text));
                        }
                        Err(_) => tracing::warn!("Ignoring non UTF-8 binary frame"),
                    },
                    Ok(Message::Pong(payload)) => {
                        events.emit(SocketEvent::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame.map_or((NO_STATUS, String::new()), |f| {
                            (u16::from(f.code), f.reason.into_owned())
                        });
                        events.emit(SocketEvent::Closed { code, reason });
                        return;
                    }
                    // tungstenite answers pings itself
                    Ok(Message::Ping(_) | Message::Frame(_)) => {}
                    Err(e) => {
                        events.emit(SocketEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            events.emit(SocketEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: "stream ended".into(),
            });
        });

        Ok(WsConnection { outgoing, reader })
    }
}

impl Connection for WsConnection {
    fn send_ping(&mut self, payload: Vec<u8>) -> Result<(), Error> {
        self.outgoing
            .send(Message::Ping(payload))
            .map_err(|_| Error::Socket("socket is closed".into()))
    }

    fn close(&mut self) {
        self.reader.abort();
        // Err means the writer already stopped.
        let _ = self.outgoing.send(Message::Close(None));
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
