//! Endpoint URL helpers for streaming connections.
//!
//! Streaming services commonly publish their endpoints as `https://` URLs
//! even though the actual session runs over a WebSocket. These helpers
//! rewrite such URLs to the corresponding socket scheme and compose the
//! final endpoint from a base URL, a function path and query arguments.

use thiserror::Error;
use url::Url;

/// Errors that can occur while preparing an endpoint URL.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("unsupported scheme for a streaming endpoint: {0}")]
    UnsupportedScheme(String),
}

/// Convert an HTTP/HTTPS URL into the corresponding WS/WSS URL.
///
/// URLs that already use `ws` or `wss` are passed through unchanged. Any
/// other scheme is rejected.
///
/// # Example
/// ```rust
/// use voxlink::utils::endpoint::fixup_url;
///
/// assert_eq!(
///     fixup_url("https://stream.example.com/v1/recognize").unwrap(),
///     "wss://stream.example.com/v1/recognize"
/// );
/// ```
pub fn fixup_url(raw: &str) -> Result<String, EndpointError> {
    let rewritten = if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        raw.to_string()
    };

    let parsed = Url::parse(&rewritten)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(rewritten),
        other => Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
}

/// Compose a full endpoint URL from a base URL, a function path and query
/// arguments.
///
/// The path is appended to whatever path the base URL already carries;
/// query pairs are appended to any existing query string.
pub fn compose_endpoint(
    base: &str,
    path: &str,
    query: &[(&str, &str)],
) -> Result<String, EndpointError> {
    let mut url = Url::parse(base)?;

    if !path.is_empty() {
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
    }

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}
