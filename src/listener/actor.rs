use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use super::ListenerHandle;
use super::config::ListenerSettings;
use super::event::{ListenerEvent, SocketEvent, SocketEventSink};
use super::liveness::{LivenessCounters, LivenessPayload};
use super::message::Notification;
use super::socket::{Connection, Transport};
use super::state::ConnectionState;
use crate::api::{ChannelApi, NotificationChannel, ReportApi, Subscription, SubscriptionApi};
use crate::error::Error;

/// Open socket plus the timer pinging it.
struct ActiveSocket<C> {
    connection: C,
    liveness: LivenessCounters,
    ticker: Option<JoinHandle<()>>,
}

impl<C: Connection> ActiveSocket<C> {
    fn close(mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.connection.close();
    }
}

struct PendingReconnect {
    ticket: u64,
    timer: JoinHandle<()>,
}

/// Keeps one notification channel, its subscription and its socket alive.
///
/// Runs as a single task consuming its events in order; every state
/// change goes through [`handle`](Self::handle). Control it through the
/// [`ListenerHandle`] returned by [`spawn`](Self::spawn).
pub struct Listener<C, S, R, T: Transport> {
    channels: Arc<C>,
    subscriptions: Arc<S>,
    reports: Arc<R>,
    transport: T,
    settings: ListenerSettings,

    events_tx: mpsc::UnboundedSender<ListenerEvent>,
    events_rx: mpsc::UnboundedReceiver<ListenerEvent>,
    state_tx: watch::Sender<ConnectionState>,

    channel: Option<NotificationChannel>,
    subscription: Option<Subscription>,
    socket: Option<ActiveSocket<T::Connection>>,
    /// Bumped whenever the socket goes away; older socket events are dropped.
    generation: u64,
    reconnect: Option<PendingReconnect>,
    next_ticket: u64,
    shut_down: bool,
    background: JoinSet<()>,
}

impl<C, S, R, T> Listener<C, S, R, T>
where
    C: ChannelApi,
    S: SubscriptionApi,
    R: ReportApi,
    T: Transport,
{
    #[must_use]
    pub fn new(
        channels: Arc<C>,
        subscriptions: Arc<S>,
        reports: Arc<R>,
        transport: T,
        settings: ListenerSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            channels,
            subscriptions,
            reports,
            transport,
            settings,
            events_tx,
            events_rx,
            state_tx,
            channel: None,
            subscription: None,
            socket: None,
            generation: 0,
            reconnect: None,
            next_ticket: 0,
            shut_down: false,
            background: JoinSet::new(),
        }
    }

    /// Starts the listener task. It does nothing until told to connect.
    pub fn spawn(self) -> ListenerHandle {
        let handle = ListenerHandle::new(self.events_tx.clone(), self.state_tx.subscribe());
        tokio::spawn(self.run());
        handle
    }

    /// Processes events until a final disconnect.
    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.handle(event).await;
            while self.background.try_join_next().is_some() {}
            if self.shut_down {
                break;
            }
        }
        tracing::debug!("Listener stopped");
    }

    /// The listener's transition function.
    pub(crate) async fn handle(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Connect => self.connect().await,
            ListenerEvent::Disconnect { is_final, done } => {
                self.disconnect(is_final).await;
                let _ = done.send(());
            }
            ListenerEvent::ReconnectDue { ticket } => {
                let due = self
                    .reconnect
                    .as_ref()
                    .is_some_and(|pending| pending.ticket == ticket);
                if !due {
                    tracing::debug!(ticket, "Ignoring superseded reconnect timer");
                    return;
                }
                self.reconnect = None;
                self.connect().await;
            }
            ListenerEvent::LivenessTick { generation } if generation == self.generation => {
                self.check_liveness().await;
            }
            ListenerEvent::Socket { generation, event } if generation == self.generation => {
                self.on_socket_event(event).await;
            }
            ListenerEvent::ChannelRefreshFailed { generation } if generation == self.generation => {
                self.schedule_reconnect(false).await;
            }
            ListenerEvent::LivenessTick { .. }
            | ListenerEvent::Socket { .. }
            | ListenerEvent::ChannelRefreshFailed { .. } => {
                tracing::trace!("Dropping event from a previous socket");
            }
        }
    }

    async fn connect(&mut self) {
        if self.shut_down {
            tracing::debug!("Listener is shut down; not connecting");
            return;
        }
        if self.channel.is_some() {
            tracing::debug!("Listener already holds a channel");
            return;
        }
        self.cancel_reconnect();
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.establish().await {
            tracing::error!(error = %e, "Failed to connect");
            self.schedule_reconnect(false).await;
        }
    }

    /// Channel, then subscription, then socket.
    async fn establish(&mut self) -> Result<(), Error> {
        tracing::debug!("Creating notification channel");
        let channel = self.channels.create_channel().await?;
        tracing::info!(channel_id = %channel.channel_id, "Created notification channel");
        let channel = self.channel.insert(channel).clone();

        tracing::debug!("Creating subscription");
        let subscription = self
            .subscriptions
            .create_subscription(&channel.channel_id, &self.settings.event_types)
            .await?;
        tracing::info!(
            subscription_id = %subscription.subscription_id,
            "Created subscription"
        );
        self.subscription = Some(subscription);

        self.generation += 1;
        let sink = SocketEventSink::new(self.generation, self.events_tx.clone());
        let connection = self.transport.open(&channel.channel_url, sink).await?;
        self.socket = Some(ActiveSocket {
            connection,
            liveness: LivenessCounters::default(),
            ticker: None,
        });
        Ok(())
    }

    /// Tears down socket, subscription and channel. Deletion failures are
    /// logged and otherwise ignored.
    async fn disconnect(&mut self, is_final: bool) {
        if is_final {
            self.shut_down = true;
            self.cancel_reconnect();
            self.set_state(ConnectionState::ShuttingDown);
        }

        self.generation += 1;
        if let Some(socket) = self.socket.take() {
            tracing::info!("Closing websocket");
            socket.close();
        }

        if let Some(subscription) = self.subscription.take() {
            tracing::info!("Deleting subscription");
            if let Err(e) = self
                .subscriptions
                .delete_subscriptions(&subscription.channel_id)
                .await
            {
                tracing::debug!(error = %e, "Failed to delete subscription");
            }
        }

        if let Some(channel) = self.channel.take() {
            tracing::info!("Deleting notification channel");
            if let Err(e) = self.channels.delete_channel(&channel.channel_id).await {
                tracing::debug!(error = %e, "Failed to delete notification channel");
            }
        }

        if !is_final {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Tears everything down and arranges a fresh `connect`.
    ///
    /// At most one reconnect is pending at a time; nothing is scheduled after
    /// a final disconnect.
    async fn schedule_reconnect(&mut self, immediate: bool) {
        if self.reconnect.is_some() || self.shut_down {
            return;
        }
        self.disconnect(false).await;

        let delay = if immediate {
            Duration::ZERO
        } else {
            self.settings.reconnect_delay
        };
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let tx = self.events_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ListenerEvent::ReconnectDue { ticket });
        });

        self.reconnect = Some(PendingReconnect { ticket, timer });
        self.set_state(ConnectionState::ReconnectScheduled);
        tracing::info!(delay = ?delay, "Reconnect scheduled");
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            pending.timer.abort();
        }
    }

    async fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => self.on_open(),
            SocketEvent::Pong(payload) => self.on_pong(&payload),
            SocketEvent::Closed { code, reason } => {
                tracing::info!(code, reason = %reason, "Websocket closed");
                self.schedule_reconnect(false).await;
            }
            SocketEvent::Error(e) => {
                tracing::error!(error = %e, "Websocket error");
                self.schedule_reconnect(false).await;
            }
            SocketEvent::Message(text) => self.dispatch(&text).await,
        }
    }

    fn on_open(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        if let Some(channel) = &self.channel {
            tracing::info!(url = %channel.channel_url, "Connected");
        }

        if let Some(previous) = socket.ticker.take() {
            previous.abort();
        }
        let generation = self.generation;
        let period = self.settings.ping_interval;
        let tx = self.events_tx.clone();
        socket.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(ListenerEvent::LivenessTick { generation }).is_err() {
                    return;
                }
            }
        }));
        self.set_state(ConnectionState::Connected);
    }

    fn on_pong(&mut self, payload: &[u8]) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        match LivenessPayload::decode(payload) {
            Ok(pong) => socket.liveness.record_pong(pong.sequence),
            Err(e) => tracing::warn!(error = %e, "Ignoring unparseable pong"),
        }
    }

    /// Pings the peer and reconnects once too many pings went unanswered.
    async fn check_liveness(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        let sequence = socket.liveness.next_ping();
        if let Err(e) = socket
            .connection
            .send_ping(LivenessPayload { sequence }.encode())
        {
            tracing::warn!(error = %e, sequence, "Failed to send ping");
        }

        let pending = socket.liveness.pending_pongs();
        if pending > self.settings.max_pending_pongs {
            tracing::error!(
                pending_pongs = pending,
                "Websocket liveness check failed: will attempt to reconnect"
            );
            self.schedule_reconnect(false).await;
        }
    }

    async fn dispatch(&mut self, text: &str) {
        let notification = match Notification::parse(text) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::error!(error = %e, "Failed to handle socket message");
                return;
            }
        };
        tracing::debug!(message = %text, "Received socket message");

        match notification {
            Notification::RefreshRequired => self.refresh_channel(),
            Notification::ToBeClosed => {
                tracing::info!("Channel is about to close: recreating connection");
                self.schedule_reconnect(true).await;
            }
            Notification::Report(id) => {
                let reports = Arc::clone(&self.reports);
                self.background.spawn(async move {
                    match reports.fetch_report(&id).await {
                        Ok(report) => {
                            tracing::info!(
                                conversation_space_id = %id,
                                report = %report,
                                "Call events report"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                conversation_space_id = %id,
                                error = %e,
                                "Failed to fetch call events report"
                            );
                        }
                    }
                });
            }
            Notification::Other { kind, source } => {
                tracing::debug!(kind = ?kind, source = ?source, "Ignoring notification");
            }
        }
    }

    fn refresh_channel(&mut self) {
        let Some(channel) = &self.channel else {
            tracing::warn!("Refresh requested without a channel");
            return;
        };
        tracing::debug!(channel_id = %channel.channel_id, "Refreshing notification channel");

        let id = channel.channel_id.clone();
        let channels = Arc::clone(&self.channels);
        let tx = self.events_tx.clone();
        let generation = self.generation;
        self.background.spawn(async move {
            match channels.refresh_channel(&id).await {
                Ok(()) => tracing::info!(channel_id = %id, "Refreshed notification channel"),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Failed to refresh notification channel: will reconnect"
                    );
                    let _ = tx.send(ListenerEvent::ChannelRefreshFailed { generation });
                }
            }
        });
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use url::Url;

    use super::*;
    use crate::types::{ChannelId, ConversationSpaceId, SubscriptionId};

    #[derive(Default)]
    struct FakeApi {
        failing_creates: AtomicUsize,
        fail_refresh: AtomicBool,
        creates: AtomicUsize,
        refreshes: AtomicUsize,
        channel_deletes: AtomicUsize,
        subscribes: AtomicUsize,
        unsubscribes: AtomicUsize,
        reports: Mutex<Vec<ConversationSpaceId>>,
    }

    impl ChannelApi for FakeApi {
        async fn create_channel(&self) -> Result<NotificationChannel, Error> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
            let failing = self.failing_creates.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_creates.store(failing - 1, Ordering::SeqCst);
                return Err(Error::Socket("unreachable".into()));
            }
            Ok(NotificationChannel {
                channel_id: ChannelId::from(format!("ch-{n}")),
                channel_url: Url::parse(&format!("wss://ws.test/ch-{n}")).unwrap(),
                lifetime: None,
            })
        }

        async fn refresh_channel(&self, _id: &ChannelId) -> Result<(), Error> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(Error::Api {
                    operation: "channel refresh",
                    status: 500,
                    detail: String::new(),
                });
            }
            Ok(())
        }

        async fn delete_channel(&self, _id: &ChannelId) -> Result<(), Error> {
            self.channel_deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl SubscriptionApi for FakeApi {
        async fn create_subscription(
            &self,
            channel_id: &ChannelId,
            event_types: &[String],
        ) -> Result<Subscription, Error> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            Ok(Subscription {
                subscription_id: SubscriptionId::from(format!("sub-{channel_id}")),
                channel_id: channel_id.clone(),
                event_types: event_types.to_vec(),
            })
        }

        async fn delete_subscriptions(&self, _channel_id: &ChannelId) -> Result<(), Error> {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                operation: "subscription deletion",
                status: 500,
                detail: "ignored".into(),
            })
        }
    }

    impl ReportApi for FakeApi {
        async fn fetch_report(&self, id: &ConversationSpaceId) -> Result<serde_json::Value, Error> {
            self.reports.lock().push(id.clone());
            Ok(serde_json::json!({ "conversationSpaceId": id }))
        }
    }

    #[derive(Clone, Default)]
    struct FakeTransport {
        answer_pings: bool,
        sinks: Arc<Mutex<Vec<SocketEventSink>>>,
        pings: Arc<Mutex<Vec<Vec<u8>>>>,
        closes: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        fn answering_pings() -> Self {
            Self {
                answer_pings: true,
                ..Self::default()
            }
        }

        fn last_sink(&self) -> SocketEventSink {
            self.sinks.lock().last().cloned().unwrap()
        }

        fn ping_count(&self) -> usize {
            self.pings.lock().len()
        }
    }

    struct FakeConnection {
        events: SocketEventSink,
        answer_pings: bool,
        pings: Arc<Mutex<Vec<Vec<u8>>>>,
        closes: Arc<AtomicUsize>,
    }

    impl Transport for FakeTransport {
        type Connection = FakeConnection;

        async fn open(&self, _url: &Url, events: SocketEventSink) -> Result<FakeConnection, Error> {
            events.emit(SocketEvent::Opened);
            self.sinks.lock().push(events.clone());
            Ok(FakeConnection {
                events,
                answer_pings: self.answer_pings,
                pings: Arc::clone(&self.pings),
                closes: Arc::clone(&self.closes),
            })
        }
    }

    impl Connection for FakeConnection {
        fn send_ping(&mut self, payload: Vec<u8>) -> Result<(), Error> {
            self.pings.lock().push(payload.clone());
            if self.answer_pings {
                self.events.emit(SocketEvent::Pong(payload));
            }
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    type TestListener = Listener<FakeApi, FakeApi, FakeApi, FakeTransport>;

    fn listener(api: &Arc<FakeApi>, transport: &FakeTransport) -> TestListener {
        Listener::new(
            Arc::clone(api),
            Arc::clone(api),
            Arc::clone(api),
            transport.clone(),
            ListenerSettings::new(),
        )
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Lets the listener task drain its queue.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn advance_to(start: Instant, secs: u64) {
        tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
    }

    async fn connected(api: &Arc<FakeApi>, transport: &FakeTransport) -> ListenerHandle {
        let handle = listener(api, transport).spawn();
        handle.connect();
        settle().await;
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
        handle
    }

    fn text(json: serde_json::Value) -> SocketEvent {
        SocketEvent::Message(json.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_creates_channel_subscription_and_socket() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::default();
        let handle = connected(&api, &transport).await;

        assert_eq!(count(&api.creates), 1);
        assert_eq!(count(&api.subscribes), 1);
        assert_eq!(transport.sinks.lock().len(), 1);

        handle.connect();
        settle().await;
        assert_eq!(count(&api.creates), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_carry_increasing_sequence() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let _handle = connected(&api, &transport).await;

        tokio::time::sleep(Duration::from_secs(17)).await;
        let pings = transport.pings.lock().clone();
        assert_eq!(pings, vec![br#"{"sequence":1}"#.to_vec(), br#"{"sequence":2}"#.to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_open_keeps_a_single_ticker() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let _handle = connected(&api, &transport).await;

        transport.last_sink().emit(SocketEvent::Opened);
        settle().await;

        tokio::time::sleep(Duration::from_secs(17)).await;
        assert_eq!(transport.ping_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_pings_never_reconnect() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(transport.ping_count(), 12);
        assert_eq!(count(&api.creates), 1);
        assert_eq!(count(&api.channel_deletes), 0);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_pongs_schedule_one_reconnect() {
        let start = Instant::now();
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::default();
        let handle = connected(&api, &transport).await;

        advance_to(start, 9).await;
        assert_eq!(transport.ping_count(), 1);
        transport
            .last_sink()
            .emit(SocketEvent::Pong(br#"{"sequence":1}"#.to_vec()));

        // Pings 2 to 4 leave at most three pongs outstanding.
        advance_to(start, 39).await;
        assert_eq!(transport.ping_count(), 4);
        assert_eq!(count(&api.channel_deletes), 0);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);

        // Ping 5 with pong 1 makes four.
        advance_to(start, 41).await;
        assert_eq!(transport.ping_count(), 5);
        assert_eq!(count(&api.channel_deletes), 1);
        assert_eq!(count(&api.unsubscribes), 1);
        assert_eq!(count(&transport.closes), 1);
        assert_eq!(*handle.state().borrow(), ConnectionState::ReconnectScheduled);

        advance_to(start, 49).await;
        assert_eq!(count(&api.creates), 1);

        advance_to(start, 52).await;
        assert_eq!(count(&api.creates), 2);
        assert_eq!(transport.ping_count(), 5);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_and_error_schedule_one_reconnect() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;

        let sink = transport.last_sink();
        sink.emit(SocketEvent::Closed {
            code: 1006,
            reason: "gone".into(),
        });
        sink.emit(SocketEvent::Error("reset".into()));
        settle().await;

        assert_eq!(count(&api.channel_deletes), 1);
        assert_eq!(*handle.state().borrow(), ConnectionState::ReconnectScheduled);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count(&api.creates), 2);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_disconnect_suppresses_reconnect() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;
        let sink = transport.last_sink();

        handle.disconnect(true).await;
        assert_eq!(count(&api.unsubscribes), 1);
        assert_eq!(count(&api.channel_deletes), 1);
        assert_eq!(*handle.state().borrow(), ConnectionState::ShuttingDown);

        sink.emit(SocketEvent::Closed {
            code: 1000,
            reason: String::new(),
        });
        sink.emit(SocketEvent::Error("late".into()));
        handle.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(count(&api.creates), 1);
        assert_eq!(count(&api.channel_deletes), 1);
        handle.disconnect(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_final_disconnect_allows_connect() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;

        handle.disconnect(false).await;
        assert_eq!(*handle.state().borrow(), ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count(&api.creates), 1);

        handle.connect();
        settle().await;
        assert_eq!(count(&api.creates), 2);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_to_be_closed_reconnects_immediately() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;

        transport
            .last_sink()
            .emit(text(serde_json::json!({ "data": { "type": "WEBSOCKET_TO_BE_CLOSED" } })));
        settle().await;

        assert_eq!(count(&api.channel_deletes), 1);
        assert_eq!(count(&api.creates), 2);
        assert_eq!(transport.sinks.lock().len(), 2);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_required_refreshes_channel() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;

        transport
            .last_sink()
            .emit(text(serde_json::json!({ "data": { "type": "WEBSOCKET_REFRESH_REQUIRED" } })));
        settle().await;

        assert_eq!(count(&api.refreshes), 1);
        assert_eq!(count(&api.channel_deletes), 0);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_reconnects_once() {
        let api = Arc::new(FakeApi::default());
        api.fail_refresh.store(true, Ordering::SeqCst);
        let transport = FakeTransport::answering_pings();
        let handle = connected(&api, &transport).await;

        transport
            .last_sink()
            .emit(text(serde_json::json!({ "data": { "type": "WEBSOCKET_REFRESH_REQUIRED" } })));
        settle().await;

        assert_eq!(count(&api.refreshes), 1);
        assert_eq!(count(&api.channel_deletes), 1);
        assert_eq!(*handle.state().borrow(), ConnectionState::ReconnectScheduled);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count(&api.creates), 2);
        assert_eq!(count(&api.channel_deletes), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_notification_fetches_report() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::answering_pings();
        let _handle = connected(&api, &transport).await;

        let sink = transport.last_sink();
        sink.emit(SocketEvent::Message("not json".into()));
        sink.emit(text(serde_json::json!({ "data": { "source": "presence" } })));
        sink.emit(text(serde_json::json!({
            "data": {
                "source": "call-events-report",
                "content": { "conversationSpaceId": "X" }
            }
        })));
        settle().await;

        assert_eq!(*api.reports.lock(), vec![ConversationSpaceId::from("X")]);
        assert_eq!(count(&api.creates), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_retries_after_delay() {
        let api = Arc::new(FakeApi::default());
        api.failing_creates.store(1, Ordering::SeqCst);
        let transport = FakeTransport::answering_pings();
        let handle = listener(&api, &transport).spawn();

        handle.connect();
        settle().await;
        assert_eq!(count(&api.creates), 1);
        assert_eq!(count(&api.subscribes), 0);
        assert_eq!(*handle.state().borrow(), ConnectionState::ReconnectScheduled);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count(&api.creates), 2);
        assert_eq!(*handle.state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_schedule_keeps_the_first_timer() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::default();
        let mut listener = listener(&api, &transport);

        listener.schedule_reconnect(false).await;
        listener.schedule_reconnect(true).await;
        assert_eq!(listener.next_ticket, 1);
        assert_eq!(listener.reconnect.as_ref().map(|r| r.ticket), Some(1));

        listener.handle(ListenerEvent::ReconnectDue { ticket: 7 }).await;
        assert_eq!(count(&api.creates), 0);
        assert!(listener.reconnect.is_some());

        listener.handle(ListenerEvent::ReconnectDue { ticket: 1 }).await;
        assert_eq!(count(&api.creates), 1);
        assert!(listener.reconnect.is_none());
        assert!(listener.socket.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_from_old_sockets_are_dropped() {
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::default();
        let mut listener = listener(&api, &transport);

        listener.handle(ListenerEvent::Connect).await;
        let current = listener.generation;

        listener
            .handle(ListenerEvent::Socket {
                generation: current + 1,
                event: SocketEvent::Error("stale".into()),
            })
            .await;
        listener
            .handle(ListenerEvent::ChannelRefreshFailed {
                generation: current - 1,
            })
            .await;
        assert!(listener.reconnect.is_none());
        assert_eq!(count(&api.channel_deletes), 0);

        listener
            .handle(ListenerEvent::Socket {
                generation: current,
                event: SocketEvent::Error("live".into()),
            })
            .await;
        assert!(listener.reconnect.is_some());
    }
}
