//! Browser-based `OAuth2` authorization with background token refresh.
//!
//! [`TokenManager`] runs a one-shot loopback listener for the redirect,
//! exchanges the code, and then keeps the access token fresh until shut down.
//!
//! ```rust,ignore
//! use call_events_listener::auth::{AuthSettings, TokenManager};
//! use call_events_listener::oauth::{AuthClient, OAuthConfig};
//!
//! let client = AuthClient::new(OAuthConfig::new(client_id, client_secret)?);
//! let tokens = TokenManager::new(client, AuthSettings::new());
//!
//! tokens.fetch(&scopes).await?;
//! // hand `tokens` to anything needing a bearer header
//! tokens.shutdown();
//! ```

mod config;
mod error;
mod manager;
mod routes;
mod state;

pub use config::{AuthSettings, Prompt};
pub use error::AuthError;
pub use manager::TokenManager;
pub use state::AuthState;
