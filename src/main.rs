use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use call_events_listener::api::{CallEventsReportClient, NotificationChannelClient};
use call_events_listener::config::Settings;
use call_events_listener::listener::WsTransport;
use call_events_listener::{
    AuthClient, AuthSettings, BearerTokenProvider, Error, Listener, ListenerSettings,
    TokenManager, logging,
};

/// Upper bound on listener teardown once a signal arrived.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    // rustls 0.23 requires selecting a CryptoProvider at runtime
    if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Failed to install rustls crypto provider: {err:?}");
        return ExitCode::FAILURE;
    }

    // A missing .env file is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            eprintln!(
                "Create a .env file defining OAUTH_CLIENT_ID, OAUTH_CLIENT_SECRET and ACCOUNT_KEY."
            );
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&settings.log_level) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    tracing::info!("Starting listener. Press Ctrl-C to exit...");
    let code = match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Listener failed");
            ExitCode::FAILURE
        }
    };
    tracing::info!(code = ?code, "Terminating");
    code
}

async fn run(settings: Settings) -> Result<(), Error> {
    let tokens = TokenManager::new(
        AuthClient::new(settings.oauth.clone()),
        AuthSettings::new().with_callback_addr(settings.callback_addr),
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let fetched = tokio::select! {
        result = tokens.fetch(&settings.scopes) => result,
        signal = &mut shutdown => {
            tracing::info!(signal, "Received signal: shutting down...");
            tokens.shutdown();
            return Ok(());
        }
    };
    if let Err(e) = fetched {
        tokens.shutdown();
        return Err(e.into());
    }

    let provider: Arc<dyn BearerTokenProvider> = Arc::new(tokens.clone());
    let mut channels = NotificationChannelClient::new(Arc::clone(&provider))?
        .with_nickname(&settings.channel_nickname);
    if let Some(url) = settings.channel_api_url.clone() {
        channels = channels.with_base_url(url);
    }
    let mut call_events = CallEventsReportClient::new(provider, &settings.account_key)?;
    if let Some(url) = settings.call_events_api_url.clone() {
        call_events = call_events.with_base_url(url);
    }
    let call_events = Arc::new(call_events);

    let listener = Listener::new(
        Arc::new(channels),
        Arc::clone(&call_events),
        call_events,
        WsTransport::new(),
        ListenerSettings::new().with_event_types(settings.event_types.clone()),
    );
    let handle = listener.spawn();
    handle.connect();

    let signal = shutdown.await;
    tracing::info!(signal, "Received signal: shutting down...");

    // Channel and subscription deletion still needs the token.
    if tokio::time::timeout(TEARDOWN_TIMEOUT, handle.disconnect(true)).await.is_err() {
        tracing::warn!(timeout = ?TEARDOWN_TIMEOUT, "Listener teardown timed out");
    }
    tokens.shutdown();
    Ok(())
}

/// Resolves with the name of the first termination signal received.
///
/// Later signals are absorbed by the installed handlers while teardown runs.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                return tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                };
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
