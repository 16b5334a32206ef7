use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use super::routes::NOT_AUTHORIZED_PAGE;
use super::state::AuthState;

/// Authorization failures. Terminal for the attempt that produced them.
///
/// `Clone` so every reader of a pending token observes the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Redirect `state` did not match the nonce of the pending request.
    #[error("Ignoring authorization code with unexpected state")]
    NonceMismatch,

    /// Redirect lacked a required query parameter.
    #[error("Redirect is missing the `{0}` parameter")]
    MissingParameter(&'static str),

    /// Authorization server reported an error in the redirect.
    #[error("Authorization denied: {0}")]
    Denied(String),

    /// Token endpoint rejected the code or could not be reached.
    #[error("Failed to exchange code for token: {0}")]
    Exchange(String),

    /// Local redirect listener could not be started.
    #[error("Could not listen for the authorization redirect on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    /// Operation is not allowed from the current state.
    #[error("Authorization cannot proceed in state {0:?}")]
    InvalidState(AuthState),

    /// Manager was shut down before a token arrived.
    #[error("Token manager is shut down")]
    ShutDown,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Authorization redirect rejected");
        (StatusCode::FORBIDDEN, Html(NOT_AUTHORIZED_PAGE)).into_response()
    }
}
