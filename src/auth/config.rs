use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use url::Url;

const DEFAULT_CALLBACK_PORT: u16 = 12021;
const DEFAULT_CALLBACK_PATH: &str = "/app/redirect";

/// Hook that hands the authorization URL to the operator.
pub type Prompt = Arc<dyn Fn(&Url) + Send + Sync>;

/// Settings for the local redirect listener and the operator prompt.
///
/// All fields have defaults matching the redirect URI registered for the
/// client. Override with `with_*` methods.
#[derive(Clone)]
pub struct AuthSettings {
    pub(crate) callback_addr: SocketAddr,
    pub(crate) callback_path: String,
    pub(crate) prompt: Prompt,
}

impl AuthSettings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            callback_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_CALLBACK_PORT)),
            callback_path: DEFAULT_CALLBACK_PATH.into(),
            prompt: Arc::new(print_banner),
        }
    }

    /// Loopback address the redirect listener binds to. Port `0` picks a free port.
    #[must_use]
    pub fn with_callback_addr(mut self, addr: SocketAddr) -> Self {
        self.callback_addr = addr;
        self
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Replace the stdout banner used to surface the authorization URL.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    #[must_use]
    pub fn callback_addr(&self) -> SocketAddr {
        self.callback_addr
    }

    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("callback_addr", &self.callback_addr)
            .field("callback_path", &self.callback_path)
            .finish_non_exhaustive()
    }
}

fn print_banner(url: &Url) {
    println!();
    println!("Open this URL in a browser to authenticate:");
    println!("-------------------------------------------");
    println!("{url}");
    println!("-------------------------------------------");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_registered_redirect() {
        let settings = AuthSettings::new();
        assert_eq!(settings.callback_addr().to_string(), "127.0.0.1:12021");
        assert_eq!(settings.callback_path(), "/app/redirect");
    }

    #[test]
    fn overrides_apply() {
        let settings = AuthSettings::new()
            .with_callback_addr("127.0.0.1:0".parse().unwrap())
            .with_callback_path("/cb");
        assert_eq!(settings.callback_addr().port(), 0);
        assert_eq!(settings.callback_path(), "/cb");
    }
}
