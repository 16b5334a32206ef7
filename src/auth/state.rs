use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use super::error::AuthError;
use crate::deferred::Deferred;
use crate::token::AccessToken;
use crate::types::Nonce;

/// Token manager lifecycle.
///
/// `Unauthenticated → AwaitingRedirect → Authenticated → ShutDown`, with
/// `AwaitingRedirect → Failed` on a rejected redirect or bind failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingRedirect,
    Authenticated,
    Failed,
    ShutDown,
}

impl AuthState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::ShutDown)
    }
}

pub(super) type PendingToken = Deferred<Arc<AccessToken>, AuthError>;

/// One `fetch()` call: the nonce it sent and the future waiting on it.
pub(super) struct AuthorizationSession {
    pub(super) nonce: Nonce,
    pub(super) redirect_uri: Url,
    pub(super) pending: PendingToken,
}

/// Running redirect listener.
pub(super) struct CallbackServer {
    pub(super) shutdown: oneshot::Sender<()>,
    pub(super) task: JoinHandle<()>,
}

impl CallbackServer {
    /// Stops accepting connections; in-flight responses finish first.
    pub(super) fn close(self) {
        // Err means the server task already exited.
        let _ = self.shutdown.send(());
        drop(self.task);
    }
}

/// Mutable state guarded by the manager's lock. Never held across an await.
pub(super) struct Lifecycle {
    pub(super) state: AuthState,
    pub(super) session: Option<AuthorizationSession>,
    pub(super) pending: Option<PendingToken>,
    pub(super) server_ready: Option<Deferred<SocketAddr, AuthError>>,
    pub(super) server: Option<CallbackServer>,
    pub(super) refresh: Option<JoinHandle<()>>,
}

impl Lifecycle {
    pub(super) fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            session: None,
            pending: None,
            server_ready: None,
            server: None,
            refresh: None,
        }
    }
}
