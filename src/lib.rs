#![doc = include_str!("../README.md")]

pub mod api;
pub mod auth;
pub mod config;
pub mod deferred;
pub mod error;
pub mod listener;
pub mod logging;
pub mod nonce;
pub mod oauth;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use auth::{AuthError, AuthSettings, AuthState, TokenManager};
pub use deferred::Deferred;
pub use error::Error;
pub use listener::{ConnectionState, Listener, ListenerHandle, ListenerSettings};
pub use oauth::{AuthClient, OAuthConfig, TokenEndpoint, TokenResponse};
pub use token::{AccessToken, BearerTokenProvider};
pub use types::{ChannelId, ConversationSpaceId, Nonce, SubscriptionId};
