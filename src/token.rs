use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::oauth::TokenResponse;

/// Tokens are refreshed once this fraction of their lifetime has elapsed.
///
/// Staying below one half leaves room to retry a failed refresh before expiry.
const REFRESH_DIVISOR: u32 = 3;

/// Access token currently held by the token manager.
///
/// Replaced wholesale on every refresh; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub obtained_at: OffsetDateTime,
    pub principal: Option<String>,
}

impl AccessToken {
    /// Token obtained by an authorization-code exchange.
    #[must_use]
    pub fn from_exchange(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            obtained_at: OffsetDateTime::now_utc(),
            principal: response.principal,
        }
    }

    /// Successor token built from a refresh response.
    ///
    /// The refresh token is carried over when the response omits a new one.
    #[must_use]
    pub fn refreshed(&self, response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| self.refresh_token.clone()),
            expires_in: response.expires_in,
            obtained_at: OffsetDateTime::now_utc(),
            principal: response.principal.or_else(|| self.principal.clone()),
        }
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Delay until the next background refresh, or `None` if refresh is impossible.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_token.as_ref()?;
        match self.expires_in {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs) / REFRESH_DIVISOR),
            _ => None,
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        Some(self.obtained_at + time::Duration::seconds(secs))
    }
}

/// Capability handed to every outbound caller that needs credentials.
pub trait BearerTokenProvider: Send + Sync + 'static {
    /// Current token formatted as `"Bearer <token>"`, or `None` before authorization.
    fn bearer_access_token(&self) -> Option<String>;
}

impl<T: BearerTokenProvider + ?Sized> BearerTokenProvider for Arc<T> {
    fn bearer_access_token(&self) -> Option<String> {
        (**self).bearer_access_token()
    }
}
