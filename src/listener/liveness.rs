use serde::{Deserialize, Serialize};

/// Ping/pong sequence counters for one socket.
///
/// A fresh socket starts at zero; counters never carry over a reconnect.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LivenessCounters {
    ping_sequence: u64,
    pong_sequence: u64,
}

impl LivenessCounters {
    /// Advances and returns the sequence number for the next ping.
    pub fn next_ping(&mut self) -> u64 {
        self.ping_sequence += 1;
        self.ping_sequence
    }

    /// Latest pong wins, even if it acknowledges an older ping.
    pub fn record_pong(&mut self, sequence: u64) {
        self.pong_sequence = sequence;
    }

    #[must_use]
    pub fn pending_pongs(&self) -> u64 {
        self.ping_sequence.saturating_sub(self.pong_sequence)
    }

    #[must_use]
    pub fn ping_sequence(&self) -> u64 {
        self.ping_sequence
    }

    #[must_use]
    pub fn pong_sequence(&self) -> u64 {
        self.pong_sequence
    }
}

/// Payload carried by ping and pong control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LivenessPayload {
    pub(crate) sequence: u64,
}

impl LivenessPayload {
    pub(crate) fn encode(self) -> Vec<u8> {
        serde_json::json!({ "sequence": self.sequence })
            .to_string()
            .into_bytes()
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
