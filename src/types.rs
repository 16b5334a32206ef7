use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Notification channel identifier assigned by the channel API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ChannelId(pub String);

/// Subscription identifier assigned by the call events report API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

/// Correlation id of a completed conversation; the key of a call events report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ConversationSpaceId(pub String);

/// One-time value binding an authorization request to its redirect (`state` parameter).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Into)]
pub struct Nonce(pub String);

impl Nonce {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against the `state` value echoed back by the redirect.
    #[must_use]
    pub fn matches(&self, state: &str) -> bool {
        self.0 == state
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for ConversationSpaceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_serde_is_transparent() {
        let id = ChannelId::from("ch-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ch-1\"");
        let parsed: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn conversation_space_id_display() {
        let id = ConversationSpaceId::from("X");
        assert_eq!(id.to_string(), "X");
    }

    #[test]
    fn nonce_matches_only_exact_state() {
        let nonce = Nonce::from("abc".to_string());
        assert!(nonce.matches("abc"));
        assert!(!nonce.matches("abd"));
        assert!(!nonce.matches(""));
    }

    #[test]
    fn newtypes_prevent_mixing() {
        fn takes_channel(_: &ChannelId) {}
        fn takes_subscription(_: &SubscriptionId) {}

        let channel = ChannelId::from("id".to_string());
        let subscription = SubscriptionId::from("id".to_string());

        takes_channel(&channel);
        takes_subscription(&subscription);
        // takes_channel(&subscription);  // Compile error!
    }
}
