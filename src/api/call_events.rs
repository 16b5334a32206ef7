use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    REQUEST_TIMEOUT, ReportApi, SubscriptionApi, authorization, ensure_status, http_client,
    join_url,
};
use crate::error::Error;
use crate::token::BearerTokenProvider;
use crate::types::{ChannelId, ConversationSpaceId, SubscriptionId};

const DEFAULT_BASE_URL: &str = "https://api.goto.com/call-events-report/v1";

/// Subscription binding the account's call events to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub channel_id: ChannelId,
    pub event_types: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRequest<'a> {
    channel_id: &'a ChannelId,
    account_keys: [&'a str; 1],
    event_types: &'a [String],
}

#[derive(Deserialize)]
struct SubscriptionResponse {
    items: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    id: SubscriptionId,
}

/// Call events report API client: subscriptions and report retrieval for one account.
pub struct CallEventsReportClient {
    tokens: Arc<dyn BearerTokenProvider>,
    http: reqwest::Client,
    base_url: Url,
    account_key: String,
}

impl CallEventsReportClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the built-in base URL fails to parse, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(
        tokens: Arc<dyn BearerTokenProvider>,
        account_key: impl Into<String>,
    ) -> Result<Self, Error> {
        let base_url = DEFAULT_BASE_URL
            .parse::<Url>()
            .map_err(|e| Error::Config(format!("invalid default URL {DEFAULT_BASE_URL}: {e}")))?;
        Ok(Self {
            tokens,
            http: http_client(REQUEST_TIMEOUT)?,
            base_url,
            account_key: account_key.into().trim().to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = url;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Deletes the channel's subscriptions, optionally only those for one event type.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers anything
    /// other than 204 or 404.
    pub async fn delete_subscription(
        &self,
        channel_id: &ChannelId,
        event_type: Option<&str>,
    ) -> Result<(), Error> {
        tracing::debug!(channel_id = %channel_id, "Deleting subscriptions bound to channel");

        let mut query = vec![
            ("channelId", channel_id.0.as_str()),
            ("accountKey", self.account_key.as_str()),
        ];
        if let Some(event_type) = event_type {
            query.push(("eventType", event_type));
        }

        let response = self
            .http
            .delete(join_url(&self.base_url, &["subscriptions"]))
            .header(reqwest::header::AUTHORIZATION, authorization(&*self.tokens)?)
            .query(&query)
            .send()
            .await?;

        ensure_status(response, &[204, 404], "subscription deletion").await?;
        Ok(())
    }
}

impl SubscriptionApi for CallEventsReportClient {
    async fn create_subscription(
        &self,
        channel_id: &ChannelId,
        event_types: &[String],
    ) -> Result<Subscription, Error> {
        tracing::debug!(channel_id = %channel_id, "Creating subscription");

        let request = SubscriptionRequest {
            channel_id,
            account_keys: [self.account_key.as_str()],
            event_types,
        };
        let response = self
            .http
            .post(join_url(&self.base_url, &["subscriptions"]))
            .header(reqwest::header::AUTHORIZATION, authorization(&*self.tokens)?)
            .json(&request)
            .send()
            .await?;

        let response = ensure_status(response, &[201], "subscription creation").await?;
        let created = response.json::<SubscriptionResponse>().await?;
        let item = created
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::Protocol("subscription response has no items".into()))?;

        Ok(Subscription {
            subscription_id: item.id,
            channel_id: channel_id.clone(),
            event_types: event_types.to_vec(),
        })
    }

    async fn delete_subscriptions(&self, channel_id: &ChannelId) -> Result<(), Error> {
        self.delete_subscription(channel_id, None).await
    }
}

impl ReportApi for CallEventsReportClient {
    async fn fetch_report(&self, id: &ConversationSpaceId) -> Result<serde_json::Value, Error> {
        tracing::debug!(conversation_space_id = %id, "Fetching call events report");
        let response = self
            .http
            .get(join_url(&self.base_url, &["reports", id.0.as_str()]))
            .header(reqwest::header::AUTHORIZATION, authorization(&*self.tokens)?)
            .send()
            .await?;

        let response = ensure_status(response, &[200], "report retrieval").await?;
        response.json().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::testing::StaticToken;

    fn client(server: &MockServer) -> CallEventsReportClient {
        CallEventsReportClient::new(Arc::new(StaticToken(Some("at-1"))), " acct-1\n")
            .unwrap()
            .with_base_url(server.uri().parse().unwrap())
    }

    #[tokio::test]
    async fn test_create_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .and(header("authorization", "Bearer at-1"))
            .and(body_json(serde_json::json!({
                "channelId": "ch-1",
                "accountKeys": ["acct-1"],
                "eventTypes": ["REPORT-SUMMARY"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "items": [{
                    "id": "sub-1",
                    "accountKey": "acct-1",
                    "eventType": "REPORT-SUMMARY"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let subscription = client(&server)
            .create_subscription(&ChannelId::from("ch-1"), &["REPORT-SUMMARY".to_string()])
            .await
            .unwrap();
        assert_eq!(subscription.subscription_id, SubscriptionId::from("sub-1".to_string()));
        assert_eq!(subscription.channel_id, ChannelId::from("ch-1"));
        assert_eq!(subscription.event_types, vec!["REPORT-SUMMARY".to_string()]);
    }

    #[tokio::test]
    async fn test_create_subscription_without_items_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "items": [] })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .create_subscription(&ChannelId::from("ch-1"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_delete_subscriptions_by_channel() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/subscriptions"))
            .and(query_param("channelId", "ch-1"))
            .and(query_param("accountKey", "acct-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_subscriptions(&ChannelId::from("ch-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_subscription_for_event_type() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/subscriptions"))
            .and(query_param("eventType", "REPORT-SUMMARY"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_subscription(&ChannelId::from("ch-1"), Some("REPORT-SUMMARY"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reports/conv-1"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "conversationSpaceId": "conv-1",
                "callEvents": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = client(&server)
            .fetch_report(&ConversationSpaceId::from("conv-1"))
            .await
            .unwrap();
        assert_eq!(report["conversationSpaceId"], "conv-1");
    }

    #[tokio::test]
    async fn test_fetch_report_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reports/conv-1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_report(&ConversationSpaceId::from("conv-1"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "report retrieval failed with status 500: boom"
        );
    }
}
