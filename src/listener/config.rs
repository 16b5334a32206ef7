use std::time::Duration;

const DEFAULT_EVENT_TYPE: &str = "REPORT-SUMMARY";
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(8);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_MAX_PENDING_PONGS: u64 = 3;

/// Listener timing and subscription settings.
///
/// Defaults match the notification service's expectations; tests shorten them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub(crate) event_types: Vec<String>,
    pub(crate) ping_interval: Duration,
    pub(crate) reconnect_delay: Duration,
    pub(crate) max_pending_pongs: u64,
}

impl ListenerSettings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_types: vec![DEFAULT_EVENT_TYPE.into()],
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_pending_pongs: DEFAULT_MAX_PENDING_PONGS,
        }
    }

    /// Event types requested when subscribing.
    #[must_use]
    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = event_types;
        self
    }

    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Unanswered pings tolerated before the socket is considered dead.
    #[must_use]
    pub fn with_max_pending_pongs(mut self, max: u64) -> Self {
        self.max_pending_pongs = max;
        self
    }

    #[must_use]
    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    #[must_use]
    pub fn max_pending_pongs(&self) -> u64 {
        self.max_pending_pongs
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self::new()
    }
}
