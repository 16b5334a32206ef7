use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header::CONNECTION};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use super::error::AuthError;
use super::manager::TokenManager;
use super::state::AuthState;
use crate::oauth::TokenEndpoint;

pub(super) const AUTHORIZED_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authorized</title></head>
<body>
<h1>Authorized</h1>
<p>The listener received its access token. You can close this window.</p>
</body>
</html>
";

pub(super) const NOT_AUTHORIZED_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Not authorized</title></head>
<body>
<h1>Not authorized</h1>
<p>The authorization could not be completed. Check the listener output for details.</p>
</body>
</html>
";

/// Create the single-route router serving the `OAuth2` redirect.
pub(super) fn callback_router<A: TokenEndpoint>(manager: TokenManager<A>, path: &str) -> Router {
    Router::new()
        .route(path, get(redirect::<A>))
        .with_state(manager)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RedirectParams {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

async fn redirect<A: TokenEndpoint>(
    State(manager): State<TokenManager<A>>,
    Query(params): Query<RedirectParams>,
) -> Response {
    tracing::info!("Handling authorization redirect");

    let result = manager.complete_authorization(params).await;

    // Single use: the listener goes away once this response is flushed.
    // A redirect that beats session setup leaves it open for the real one.
    let early = matches!(result, Err(AuthError::InvalidState(AuthState::AwaitingRedirect)));
    if !early {
        manager.close_callback_server_soon();
    }

    let mut response = match result {
        Ok(()) => (StatusCode::OK, Html(AUTHORIZED_PAGE)).into_response(),
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
