use std::net::SocketAddr;

use url::Url;

use crate::error::Error;
use crate::oauth::OAuthConfig;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SCOPES: &str = "cr.v1.read call-events.v1.notifications.manage";
const DEFAULT_CALLBACK_ADDR: &str = "127.0.0.1:12021";
const DEFAULT_CHANNEL_NICKNAME: &str = "demo";
const DEFAULT_EVENT_TYPES: &str = "REPORT-SUMMARY";

const REQUIRED: [&str; 3] = ["OAUTH_CLIENT_ID", "OAUTH_CLIENT_SECRET", "ACCOUNT_KEY"];

/// Process configuration read from the environment.
///
/// | Variable | Default |
/// |---|---|
/// | `OAUTH_CLIENT_ID`, `OAUTH_CLIENT_SECRET`, `ACCOUNT_KEY` | required |
/// | `LOG_LEVEL` | `info` |
/// | `OAUTH_AUTH_URL`, `OAUTH_TOKEN_URL` | production endpoints |
/// | `OAUTH_SCOPES` | `cr.v1.read call-events.v1.notifications.manage` |
/// | `CALLBACK_ADDR` | `127.0.0.1:12021` |
/// | `CHANNEL_API_URL`, `CALL_EVENTS_API_URL` | production endpoints |
/// | `CHANNEL_NICKNAME` | `demo` |
/// | `EVENT_TYPES` | `REPORT-SUMMARY` |
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Settings {
    pub oauth: OAuthConfig,
    pub account_key: String,
    pub log_level: String,
    pub scopes: Vec<String>,
    pub callback_addr: SocketAddr,
    pub channel_api_url: Option<Url>,
    pub call_events_api_url: Option<Url>,
    pub channel_nickname: String,
    pub event_types: Vec<String>,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming every missing required variable, or
    /// the first variable that fails to parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|&name| get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        let required = |name: &str| get(name).unwrap_or_default();

        let mut oauth = OAuthConfig::new(
            required("OAUTH_CLIENT_ID"),
            required("OAUTH_CLIENT_SECRET"),
        )?;
        if let Some(url) = parse_url(get("OAUTH_AUTH_URL"), "OAUTH_AUTH_URL")? {
            oauth = oauth.with_auth_url(url);
        }
        if let Some(url) = parse_url(get("OAUTH_TOKEN_URL"), "OAUTH_TOKEN_URL")? {
            oauth = oauth.with_token_url(url);
        }

        let callback_addr = get("CALLBACK_ADDR")
            .unwrap_or_else(|| DEFAULT_CALLBACK_ADDR.into())
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("invalid CALLBACK_ADDR: {e}")))?;

        Ok(Self {
            oauth,
            account_key: required("ACCOUNT_KEY"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
            scopes: split_list(&get("OAUTH_SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.into())),
            callback_addr,
            channel_api_url: parse_url(get("CHANNEL_API_URL"), "CHANNEL_API_URL")?,
            call_events_api_url: parse_url(get("CALL_EVENTS_API_URL"), "CALL_EVENTS_API_URL")?,
            channel_nickname: get("CHANNEL_NICKNAME")
                .unwrap_or_else(|| DEFAULT_CHANNEL_NICKNAME.into()),
            event_types: split_list(
                &get("EVENT_TYPES").unwrap_or_else(|| DEFAULT_EVENT_TYPES.into()),
            ),
        })
    }
}

fn parse_url(value: Option<String>, name: &str) -> Result<Option<Url>, Error> {
    value
        .map(|value| {
            value
                .parse::<Url>()
                .map_err(|e| Error::Config(format!("invalid {name}: {e}")))
        })
        .transpose()
}

/// Splits on whitespace and commas.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
