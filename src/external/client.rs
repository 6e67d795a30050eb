use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// User-Agent sent with every outbound request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client used by every job that talks to a third party.
///
/// Initialized lazily on first access so connection pools are reused across
/// tasks.
///
/// # Features
/// - **Timeouts**: 30s request timeout, 10s connect timeout
/// - **Compression**: gzip
/// - **HTTP/2**: adaptive window sizing and keep-alive
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    build_http_client(Duration::from_secs(30)).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Falling back to a default HTTP client");
        reqwest::Client::new()
    })
});

/// Builds a client with the shared defaults and the given request timeout.
///
/// # Errors
/// Returns `AppError::Internal` if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        // Timeouts
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        // Connection pooling
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        // HTTP/2 settings
        .http2_adaptive_window(true)
        .http2_keep_alive_interval(Duration::from_secs(10))
        .http2_keep_alive_timeout(Duration::from_secs(20))
        .gzip(true)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::new(e).context("failed to build HTTP client"),
        })
}
