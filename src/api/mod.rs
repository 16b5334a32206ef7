//! REST collaborators used by the listener.
//!
//! Each trait is the listener's view of one remote API. The HTTP clients in
//! this module implement them; listener tests substitute in-memory fakes.

mod call_events;
mod channel;

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderValue;

pub use call_events::{CallEventsReportClient, Subscription};
pub use channel::{NotificationChannel, NotificationChannelClient};

use crate::error::Error;
use crate::token::BearerTokenProvider;
use crate::types::{ChannelId, ConversationSpaceId};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Notification channel management.
pub trait ChannelApi: Send + Sync + 'static {
    fn create_channel(&self) -> impl Future<Output = Result<NotificationChannel, Error>> + Send;

    /// Extends the lifetime of an existing channel.
    fn refresh_channel(&self, id: &ChannelId) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes a channel. A channel that is already gone counts as deleted.
    fn delete_channel(&self, id: &ChannelId) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Event subscriptions attached to a channel.
pub trait SubscriptionApi: Send + Sync + 'static {
    fn create_subscription(
        &self,
        channel_id: &ChannelId,
        event_types: &[String],
    ) -> impl Future<Output = Result<Subscription, Error>> + Send;

    /// Deletes every subscription bound to the channel.
    fn delete_subscriptions(
        &self,
        channel_id: &ChannelId,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Call events reports for completed conversations.
pub trait ReportApi: Send + Sync + 'static {
    fn fetch_report(
        &self,
        id: &ConversationSpaceId,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;
}

/// HTTP client whose requests give up after `request_timeout`.
///
/// The listener awaits these calls inline, so every request must end.
pub(crate) fn http_client(request_timeout: Duration) -> Result<reqwest::Client, Error> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

/// `Authorization` header value for the current token.
fn authorization(tokens: &dyn BearerTokenProvider) -> Result<HeaderValue, Error> {
    let bearer = tokens.bearer_access_token().ok_or(Error::NotAuthorized)?;
    HeaderValue::from_str(&bearer)
        .map_err(|e| Error::Protocol(format!("invalid bearer token: {e}")))
}

/// Returns the response if its status is one of `accepted`, otherwise an error with details.
async fn ensure_status(
    response: reqwest::Response,
    accepted: &[u16],
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    let status = response.status().as_u16();
    if accepted.contains(&status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        operation,
        status,
        detail: body,
    })
}

fn join_url(base: &url::Url, segments: &[&str]) -> String {
    let mut url = base.as_str().trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment);
    }
    url
}


#[cfg(test)]
mod tests {
    use super::testing::StaticToken;
    use super::*;

    #[test]
    fn test_authorization_requires_token() {
        assert!(matches!(
            authorization(&StaticToken(None)),
            Err(Error::NotAuthorized)
        ));
        assert_eq!(
            authorization(&StaticToken(Some("at-1"))).unwrap(),
            "Bearer at-1"
        );
    }

    #[test]
    fn test_join_url_ignores_trailing_slash() {
        let base: url::Url = "https://api.test/channels/".parse().unwrap();
        assert_eq!(
            join_url(&base, &["demo", "ch-1"]),
            "https://api.test/channels/demo/ch-1"
        );
    }
}
