use std::future::Future;

use serde::Deserialize;
use url::Url;

use crate::api::{REQUEST_TIMEOUT, http_client};
use crate::error::Error;
use crate::types::Nonce;

const DEFAULT_AUTH_URL: &str = "https://authentication.logmeininc.com/oauth/authorize";
const DEFAULT_TOKEN_URL: &str = "https://authentication.logmeininc.com/oauth/token";

/// `OAuth2` client configuration.
///
/// Client credentials are constructor parameters; the endpoint URLs default
/// to the production authorization server.
///
/// ```rust,ignore
/// let config = OAuthConfig::new("my-client-id", "my-client-secret")?
///     .with_token_url("https://custom.example.com/oauth/token".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
}

impl OAuthConfig {
    /// Create a configuration pointing at the default authorization server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the built-in endpoint URLs fail to parse.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: parse_default(DEFAULT_AUTH_URL)?,
            token_url: parse_default(DEFAULT_TOKEN_URL)?,
        })
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .finish()
    }
}

fn parse_default(url: &str) -> Result<Url, Error> {
    url.parse::<Url>()
        .map_err(|e| Error::Config(format!("invalid default URL {url}: {e}")))
}

/// Token response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Identity the token was issued to (present on code exchange).
    #[serde(default)]
    pub principal: Option<String>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: Some("Bearer".into()),
            expires_in: None,
            refresh_token: None,
            scope: None,
            principal: None,
        }
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }
}

/// The authorization server as seen by the token manager.
///
/// [`AuthClient`] is the HTTP implementation; tests substitute in-memory fakes.
pub trait TokenEndpoint: Send + Sync + 'static {
    /// Build the URL the operator opens in a browser.
    fn authorization_url(&self, nonce: &Nonce, redirect_uri: &Url, scopes: &[String]) -> Url;

    /// Exchange an authorization code for tokens.
    fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
    ) -> impl Future<Output = Result<TokenResponse, Error>> + Send;

    /// Obtain a fresh access token using a refresh token.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, Error>> + Send;
}

impl<T: TokenEndpoint> TokenEndpoint for std::sync::Arc<T> {
    fn authorization_url(&self, nonce: &Nonce, redirect_uri: &Url, scopes: &[String]) -> Url {
        (**self).authorization_url(nonce, redirect_uri, scopes)
    }

    fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
    ) -> impl Future<Output = Result<TokenResponse, Error>> + Send {
        (**self).exchange_code(code, redirect_uri)
    }

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, Error>> + Send {
        (**self).refresh(refresh_token)
    }
}

/// `OAuth2` authorization-code client using confidential client credentials.
pub struct AuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: http_client(REQUEST_TIMEOUT).unwrap_or_default(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let response = Self::ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            operation,
            status,
            detail: body,
        })
    }
}

impl TokenEndpoint for AuthClient {
    fn authorization_url(&self, nonce: &Nonce, redirect_uri: &Url, scopes: &[String]) -> Url {
        let scope = scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", nonce.as_str());
        url
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &Url) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        self.request_token(&params, "token exchange").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&params, "token refresh").await
    }
}
