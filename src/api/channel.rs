use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use super::{ChannelApi, REQUEST_TIMEOUT, authorization, ensure_status, http_client, join_url};
use crate::error::Error;
use crate::token::BearerTokenProvider;
use crate::types::ChannelId;

const DEFAULT_BASE_URL: &str = "https://webrtc.jive.com/notification-channel/v1/channels";
const DEFAULT_NICKNAME: &str = "demo";

/// A WebSocket notification channel owned by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub channel_id: ChannelId,
    pub channel_url: Url,
    /// Seconds until the server expects a refresh, when reported.
    pub lifetime: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResponse {
    channel_id: ChannelId,
    channel_data: ChannelData,
    #[serde(default)]
    channel_lifetime: Option<u64>,
}

#[derive(Deserialize)]
struct ChannelData {
    #[serde(rename = "channelURL")]
    channel_url: String,
}

impl TryFrom<ChannelResponse> for NotificationChannel {
    type Error = Error;

    fn try_from(response: ChannelResponse) -> Result<Self, Error> {
        let channel_url = response
            .channel_data
            .channel_url
            .parse::<Url>()
            .map_err(|e| Error::Protocol(format!("invalid channel URL: {e}")))?;
        Ok(Self {
            channel_id: response.channel_id,
            channel_url,
            lifetime: response.channel_lifetime,
        })
    }
}

/// Notification channel API client.
///
/// A single channel could carry several subscriptions; the listener uses one
/// channel per subscription and recreates both together.
pub struct NotificationChannelClient {
    tokens: Arc<dyn BearerTokenProvider>,
    http: reqwest::Client,
    base_url: Url,
    nickname: String,
}

impl NotificationChannelClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the built-in base URL fails to parse, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn BearerTokenProvider>) -> Result<Self, Error> {
        let base_url = DEFAULT_BASE_URL
            .parse::<Url>()
            .map_err(|e| Error::Config(format!("invalid default URL {DEFAULT_BASE_URL}: {e}")))?;
        Ok(Self {
            tokens,
            http: http_client(REQUEST_TIMEOUT)?,
            base_url,
            nickname: DEFAULT_NICKNAME.into(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = url;
        self
    }

    /// Channel nickname used as the path segment under the base URL.
    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn channel_url(&self, id: &ChannelId) -> String {
        join_url(&self.base_url, &[self.nickname.as_str(), id.0.as_str()])
    }
}

impl ChannelApi for NotificationChannelClient {
    async fn create_channel(&self) -> Result<NotificationChannel, Error> {
        tracing::debug!(nickname = %self.nickname, "Creating notification channel");
        let response = self
            .http
            .post(join_url(&self.base_url, &[self.nickname.as_str()]))
            .header(reqwest::header::AUTHORIZATION, authorization(&*self.tokens)?)
            .json(&serde_json::json!({ "channelType": "WebSocket" }))
            .send()
            .await?;

        let response = ensure_status(response, &[201], "channel creation").await?;
        response.json::<ChannelResponse>().await?.try_into()
    }

    async fn refresh_channel(&self, id: &ChannelId) -> Result<(), Error> {
        tracing::debug!(channel_id = %id, "Refreshing notification channel");
        let response = self
            .http
            .put(self.channel_url(id))
            .header(reqwest::header::AUTHORIZATION, authorization(&*self.tokens)?)
            .json(&serde_json::json!({ "channelType": "WebSocket" }))
            .send()
            .await?;

        ensure_status(response, &[200], "channel refresh").await?;
        Ok(())
    }

    async fn delete_channel(&self, id: &ChannelId) -> Result<(), Error> {
        tracing::debug!(channel_id = %id, "Deleting notification channel");
        let response = self
            .http
            .delete(self.channel_url(id))
            .header(reqwest::header::AUTHORIZATION, authorization(&*self.tokens)?)
            .send()
            .await?;

        ensure_status(response, &[204, 404], "channel deletion").await?;
        Ok(())
    }
}
