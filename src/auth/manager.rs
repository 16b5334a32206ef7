use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use super::config::AuthSettings;
use super::error::AuthError;
use super::routes::{RedirectParams, callback_router};
use super::state::{AuthState, AuthorizationSession, CallbackServer, Lifecycle, PendingToken};
use crate::deferred::Deferred;
use crate::nonce::generate_nonce;
use crate::oauth::TokenEndpoint;
use crate::token::{AccessToken, BearerTokenProvider};

/// Owns the `OAuth2` authorization-code flow and keeps the access token fresh.
///
/// ```rust,ignore
/// let tokens = TokenManager::new(AuthClient::new(config), AuthSettings::new());
/// tokens.fetch(&scopes).await?;
/// let header = tokens.bearer_access_token(); // Some("Bearer ...")
/// tokens.shutdown();
/// ```
pub struct TokenManager<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    endpoint: A,
    settings: AuthSettings,
    token: RwLock<Option<Arc<AccessToken>>>,
    lifecycle: Mutex<Lifecycle>,
}

// Manual Clone: avoid derive adding an `A: Clone` bound.
impl<A> Clone for TokenManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: TokenEndpoint> TokenManager<A> {
    #[must_use]
    pub fn new(endpoint: A, settings: AuthSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                settings,
                token: RwLock::new(None),
                lifecycle: Mutex::new(Lifecycle::new()),
            }),
        }
    }

    /// Runs the authorization-code flow and waits for the resulting token.
    ///
    /// Starts the local redirect listener, surfaces the authorization URL to
    /// the operator, and resolves once the browser redirect has been handled.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Bind`] if the redirect listener cannot be started
    /// - [`AuthError::NonceMismatch`], [`AuthError::Exchange`] and friends if
    ///   the redirect is rejected
    /// - [`AuthError::ShutDown`] if [`shutdown`](Self::shutdown) runs first
    /// - [`AuthError::InvalidState`] if a flow already ran on this manager
    pub async fn fetch(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        let ready = Deferred::new();
        let pending: PendingToken = Deferred::new();
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != AuthState::Unauthenticated {
                return Err(AuthError::InvalidState(lifecycle.state));
            }
            lifecycle.state = AuthState::AwaitingRedirect;
            lifecycle.server_ready = Some(ready.clone());
            lifecycle.pending = Some(pending.clone());
            lifecycle.server = Some(self.spawn_callback_server(ready.clone()));
        }

        let local_addr = match ready.wait().await {
            Ok(addr) => addr,
            Err(e) => {
                self.close_callback_server();
                return Err(self.fail(e));
            }
        };
        let redirect_uri = match self.redirect_uri(local_addr) {
            Ok(uri) => uri,
            Err(e) => {
                self.close_callback_server();
                return Err(self.fail(e));
            }
        };
        let nonce = generate_nonce();
        let url = self
            .inner
            .endpoint
            .authorization_url(&nonce, &redirect_uri, scopes);

        let awaiting = {
            let mut lifecycle = self.inner.lifecycle.lock();
            let awaiting = lifecycle.state == AuthState::AwaitingRedirect;
            if awaiting {
                lifecycle.session = Some(AuthorizationSession {
                    nonce,
                    redirect_uri,
                    pending: pending.clone(),
                });
            }
            awaiting
        };

        // Otherwise shut down while the listener was starting; pending is settled.
        if awaiting {
            tracing::info!(url = %url, "Waiting for browser authorization");
            (self.inner.settings.prompt)(&url);
        }

        pending.wait().await.map(|token| (*token).clone())
    }

    /// Current state of the authorization lifecycle.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.lifecycle.lock().state
    }

    /// Snapshot of the current token, if any.
    #[must_use]
    pub fn current_token(&self) -> Option<Arc<AccessToken>> {
        self.inner.token.read().clone()
    }

    /// Stops the redirect listener and background refresh, and settles any
    /// pending [`fetch`](Self::fetch) with [`AuthError::ShutDown`]. Idempotent.
    pub fn shutdown(&self) {
        let (server, refresh, ready, pending) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state == AuthState::ShutDown {
                return;
            }
            lifecycle.state = AuthState::ShutDown;
            lifecycle.session = None;
            (
                lifecycle.server.take(),
                lifecycle.refresh.take(),
                lifecycle.server_ready.take(),
                lifecycle.pending.take(),
            )
        };

        tracing::debug!("Shutting down token manager");

        if let Some(refresh) = refresh {
            refresh.abort();
        }
        if let Some(server) = server {
            server.close();
        }
        if let Some(ready) = ready {
            ready.reject(AuthError::ShutDown);
        }
        if let Some(pending) = pending {
            pending.reject(AuthError::ShutDown);
        }
        *self.inner.token.write() = None;
    }

    /// Refreshes the access token once.
    ///
    /// Failures are logged and the existing token is kept; the next scheduled
    /// attempt runs at the usual cadence.
    pub async fn refresh_now(&self) {
        if self.state() != AuthState::Authenticated {
            return;
        }
        let Some(current) = self.current_token() else {
            return;
        };
        let Some(refresh_token) = current.refresh_token.clone() else {
            tracing::warn!("Access token has no refresh token");
            return;
        };

        tracing::debug!("Refreshing access token");
        match self.inner.endpoint.refresh(&refresh_token).await {
            Ok(response) => {
                if self.state() != AuthState::Authenticated {
                    return;
                }
                let next = current.refreshed(response);
                let expires_in = next.expires_in;
                self.install_token(next);
                tracing::info!(expires_in = ?expires_in, "Refreshed access token");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to refresh access token");
            }
        }
    }

    /// Validates the redirect and exchanges its code; settles the pending fetch.
    pub(super) async fn complete_authorization(
        &self,
        params: RedirectParams,
    ) -> Result<(), AuthError> {
        let (expected, redirect_uri) = {
            let lifecycle = self.inner.lifecycle.lock();
            match (&lifecycle.state, &lifecycle.session) {
                (AuthState::AwaitingRedirect, Some(session)) => {
                    (session.nonce.clone(), session.redirect_uri.clone())
                }
                (state, _) => return Err(AuthError::InvalidState(*state)),
            }
        };

        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or(error);
            return Err(self.fail(AuthError::Denied(description)));
        }
        let state = params
            .state
            .ok_or_else(|| self.fail(AuthError::MissingParameter("state")))?;
        if !expected.matches(&state) {
            return Err(self.fail(AuthError::NonceMismatch));
        }
        let code = params
            .code
            .ok_or_else(|| self.fail(AuthError::MissingParameter("code")))?;

        let response = self
            .inner
            .endpoint
            .exchange_code(&code, &redirect_uri)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token exchange failed");
                self.fail(AuthError::Exchange(e.to_string()))
            })?;

        let token = AccessToken::from_exchange(response);
        let session = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != AuthState::AwaitingRedirect {
                return Err(AuthError::ShutDown);
            }
            lifecycle.state = AuthState::Authenticated;
            lifecycle.pending = None;
            lifecycle.session.take()
        };

        if let Some(principal) = &token.principal {
            tracing::info!(principal = %principal, "Authorized");
        }
        let token = self.install_token(token);
        self.schedule_refresh();
        if let Some(session) = session {
            session.pending.resolve(token);
        }
        Ok(())
    }

    /// Closes the redirect listener on the next scheduling tick, after the
    /// current response had a chance to flush.
    pub(super) fn close_callback_server_soon(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            manager.close_callback_server();
        });
    }

    fn close_callback_server(&self) {
        let server = self.inner.lifecycle.lock().server.take();
        if let Some(server) = server {
            server.close();
        }
    }

    fn spawn_callback_server(&self, ready: Deferred<SocketAddr, AuthError>) -> CallbackServer {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let addr = self.inner.settings.callback_addr;
        let router = callback_router(self.clone(), &self.inner.settings.callback_path);

        let task = tokio::spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    ready.reject(AuthError::Bind {
                        addr,
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            match listener.local_addr() {
                Ok(local_addr) => {
                    tracing::debug!(addr = %local_addr, "Redirect listener ready");
                    ready.resolve(local_addr);
                }
                Err(e) => {
                    ready.reject(AuthError::Bind {
                        addr,
                        reason: e.to_string(),
                    });
                    return;
                }
            }

            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "Redirect listener failed");
            }
            tracing::debug!("Redirect listener is shutting down");
        });

        CallbackServer {
            shutdown: shutdown_tx,
            task,
        }
    }

    fn redirect_uri(&self, local_addr: SocketAddr) -> Result<Url, AuthError> {
        format!("http://{local_addr}{}", self.inner.settings.callback_path)
            .parse::<Url>()
            .map_err(|e: url::ParseError| AuthError::Bind {
                addr: local_addr,
                reason: e.to_string(),
            })
    }

    /// Moves an in-progress authorization to `Failed` and rejects its future.
    fn fail(&self, error: AuthError) -> AuthError {
        let pending = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != AuthState::AwaitingRedirect {
                return error;
            }
            lifecycle.state = AuthState::Failed;
            lifecycle.session = None;
            lifecycle.server_ready = None;
            lifecycle.pending.take()
        };
        if let Some(pending) = pending {
            pending.reject(error.clone());
        }
        error
    }

    fn install_token(&self, token: AccessToken) -> Arc<AccessToken> {
        let token = Arc::new(token);
        *self.inner.token.write() = Some(Arc::clone(&token));
        token
    }

    /// Replaces any running refresh task with a new one.
    fn schedule_refresh(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if let Some(previous) = lifecycle.refresh.take() {
            previous.abort();
        }
        if lifecycle.state != AuthState::Authenticated {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        lifecycle.refresh = Some(tokio::spawn(refresh_loop(weak)));
    }
}

/// Sleeps a third of the token lifetime, refreshes, repeats.
///
/// The delay is recomputed from the current token each round so a changed
/// `expires_in` takes effect; a failed refresh keeps the old token and cadence.
async fn refresh_loop<A: TokenEndpoint>(weak: Weak<Inner<A>>) {
    loop {
        let interval = {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let token = inner.token.read().clone();
            match token.and_then(|t| t.refresh_interval()) {
                Some(interval) => interval,
                None => {
                    tracing::warn!("Background token refresh cannot be enabled");
                    return;
                }
            }
        };

        tracing::debug!(interval = ?interval, "Next token refresh scheduled");
        tokio::time::sleep(interval).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        TokenManager { inner }.refresh_now().await;
    }
}

impl<A: TokenEndpoint> BearerTokenProvider for TokenManager<A> {
    fn bearer_access_token(&self) -> Option<String> {
        self.inner.token.read().as_ref().map(|token| token.bearer())
    }
}

#[cfg(test)]
impl<A: TokenEndpoint> TokenManager<A> {
    /// Puts the manager straight into `Authenticated` with the given token.
    fn seed(&self, token: AccessToken) {
        self.inner.lifecycle.lock().state = AuthState::Authenticated;
        self.install_token(token);
        self.schedule_refresh();
    }
}
