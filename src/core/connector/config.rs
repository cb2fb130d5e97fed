//! Connector configuration and credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::ConnectorError;
use crate::utils::endpoint::{compose_endpoint, fixup_url};

// =============================================================================
// Constants
// =============================================================================

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bounded wait of the sender loop. The background task wakes at
/// least this often so it observes a close request promptly even with no
/// outbound traffic.
pub const DEFAULT_SEND_WAKE_TIMEOUT: Duration = Duration::from_millis(500);

// =============================================================================
// Credentials
// =============================================================================

/// Authentication context attached to the transport handshake.
///
/// Opaque to the connector: it is converted into an `Authorization` header
/// and never validated or refreshed here. Secret material is wiped from
/// memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum Credentials {
    /// HTTP basic authentication.
    Basic { username: String, password: String },
    /// Bearer token (e.g. a pre-fetched IAM access token).
    Bearer { token: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }
}

// Never log secret material.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer { .. } => {
                f.debug_struct("Bearer").field("token", &"***").finish()
            }
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`DuplexConnector`](super::DuplexConnector).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Endpoint URL. `http`/`https` URLs are rewritten to `ws`/`wss` before
    /// the handshake.
    pub url: String,

    /// Credentials for the handshake, if the endpoint requires them.
    #[serde(skip)]
    pub credentials: Option<Credentials>,

    /// Extra headers passed on the upgrade request.
    pub headers: Vec<(String, String)>,

    /// Maximum time to wait for the handshake.
    pub connect_timeout: Duration,

    /// Bounded wait of the sender loop between wakes.
    pub send_wake_timeout: Duration,

    /// When set, the sender emits a transport-level ping after this much
    /// outbound idle time. Off by default.
    pub keepalive: Option<Duration>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: None,
            headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_wake_timeout: DEFAULT_SEND_WAKE_TIMEOUT,
            keepalive: None,
        }
    }
}

impl ConnectorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build a configuration for a service function endpoint: base URL plus
    /// function path plus query arguments.
    ///
    /// # Example
    /// ```rust
    /// use voxlink::ConnectorConfig;
    ///
    /// let config = ConnectorConfig::for_endpoint(
    ///     "https://api.speech.example.com/instances/abc",
    ///     "v1/recognize",
    ///     &[("model", "en-US_Multimedia")],
    /// )
    /// .unwrap();
    /// assert!(config.url.ends_with("/v1/recognize?model=en-US_Multimedia"));
    /// ```
    pub fn for_endpoint(
        base_url: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Self, ConnectorError> {
        let url = compose_endpoint(base_url, path, query)
            .map_err(|e| ConnectorError::Configuration(e.to_string()))?;
        Ok(Self::new(url))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, idle: Duration) -> Self {
        self.keepalive = Some(idle);
        self
    }

    /// Validate the configuration and return the endpoint URL rewritten to a
    /// streaming-socket scheme.
    pub fn validated_url(&self) -> Result<String, ConnectorError> {
        if self.url.is_empty() {
            return Err(ConnectorError::Configuration(
                "endpoint URL is required".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConnectorError::Configuration(
                "connect_timeout must be non-zero".to_string(),
            ));
        }
        if self.send_wake_timeout.is_zero() {
            return Err(ConnectorError::Configuration(
                "send_wake_timeout must be non-zero".to_string(),
            ));
        }
        fixup_url(&self.url).map_err(|e| ConnectorError::Configuration(e.to_string()))
    }
}
