//! WebSocket transport implementation.
//!
//! Wraps `tokio-tungstenite` behind the [`Transport`] trait: builds the HTTP
//! upgrade request (including the `Authorization` header), applies the
//! connect timeout and maps tungstenite messages to [`Frame`]s. Ping/pong
//! bookkeeping stays inside tungstenite; the connector only ever sees data
//! and close frames.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt, future};
use http::Request;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::debug;
use url::Url;

use super::{Frame, HandshakeRequest, Transport, TransportError, TransportPair};
use crate::core::connector::Credentials;

/// Production [`Transport`] over `tokio-tungstenite` with rustls TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }

    /// Build the HTTP upgrade request for the handshake.
    fn build_request(request: &HandshakeRequest) -> Result<Request<()>, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::Handshake(format!("invalid endpoint URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::Handshake("endpoint URL has no host".to_string()))?;
        let host_header = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let mut builder = Request::builder()
            .method("GET")
            .uri(request.url.as_str())
            .header("Host", host_header)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13");

        if let Some(credentials) = &request.credentials {
            builder = builder.header("Authorization", authorization_header(credentials));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(())
            .map_err(|e| TransportError::Handshake(format!("invalid handshake request: {e}")))
    }
}

/// Format the `Authorization` header value for the given credentials.
fn authorization_header(credentials: &Credentials) -> String {
    match credentials {
        Credentials::Basic { username, password } => {
            let encoded = BASE64.encode(format!("{username}:{password}"));
            format!("Basic {encoded}")
        }
        Credentials::Bearer { token } => format!("Bearer {token}"),
    }
}

fn frame_into_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Binary(data) => WsMessage::Binary(data),
        Frame::Ping(data) => WsMessage::Ping(data),
        Frame::Close { .. } => WsMessage::Close(None),
    }
}

fn map_inbound(item: Result<WsMessage, WsError>) -> Option<Result<Frame, TransportError>> {
    match item {
        Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(WsMessage::Binary(data)) => Some(Ok(Frame::Binary(data))),
        Ok(WsMessage::Close(frame)) => {
            debug!(?frame, "received close frame");
            Some(Ok(Frame::Close { clean: true }))
        }
        // tungstenite answers pings itself; pongs carry no payload we care about
        Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => None,
        Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => None,
        Err(e @ WsError::Protocol(_)) => Some(Err(TransportError::Protocol(e.to_string()))),
        Err(e) => Some(Err(TransportError::Network(e.to_string()))),
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self, request: HandshakeRequest) -> Result<TransportPair, TransportError> {
        let upgrade = Self::build_request(&request)?;

        debug!(url = %request.url, "opening WebSocket connection");
        let connect = connect_async(upgrade);
        let (ws_stream, _response) = match timeout(request.connect_timeout, connect).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
            Err(_) => {
                return Err(TransportError::Handshake(format!(
                    "connection timed out after {:?}",
                    request.connect_timeout
                )));
            }
        };

        let (ws_sink, ws_stream) = ws_stream.split();
        let sink = ws_sink
            .sink_map_err(|e: WsError| TransportError::Network(e.to_string()))
            .with(|frame: Frame| {
                future::ready(Ok::<WsMessage, TransportError>(frame_into_ws(frame)))
            });
        let stream = ws_stream.filter_map(|item| future::ready(map_inbound(item)));

        Ok(TransportPair {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(url: &str, credentials: Option<Credentials>) -> HandshakeRequest {
        HandshakeRequest {
            url: url.to_string(),
            credentials,
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_authorization_header_basic() {
        let credentials = Credentials::basic("scribe", "sesame");
        // base64("scribe:sesame")
        assert_eq!(
            authorization_header(&credentials),
            "Basic c2NyaWJlOnNlc2FtZQ=="
        );
    }

    #[test]
    fn test_authorization_header_bearer() {
        let credentials = Credentials::bearer("tok-123");
        assert_eq!(authorization_header(&credentials), "Bearer tok-123");
    }

    #[test]
    fn test_build_request_headers() {
        let mut req = request("wss://stream.example.com:8443/v1/recognize", None);
        req.headers
            .push(("X-Session-Id".to_string(), "abc".to_string()));
        let built = WsTransport::build_request(&req).unwrap();

        assert_eq!(built.method(), "GET");
        assert_eq!(
            built.headers().get("Host").unwrap(),
            "stream.example.com:8443"
        );
        assert_eq!(built.headers().get("Upgrade").unwrap(), "websocket");
        assert_eq!(built.headers().get("Sec-WebSocket-Version").unwrap(), "13");
        assert_eq!(built.headers().get("X-Session-Id").unwrap(), "abc");
        assert!(built.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_build_request_attaches_credentials() {
        let req = request(
            "wss://stream.example.com/v1",
            Some(Credentials::bearer("tok")),
        );
        let built = WsTransport::build_request(&req).unwrap();
        assert_eq!(built.headers().get("Authorization").unwrap(), "Bearer tok");
    }

    #[test]
    fn test_build_request_rejects_hostless_url() {
        let req = request("wss:///nohost", None);
        assert!(matches!(
            WsTransport::build_request(&req),
            Err(TransportError::Handshake(_))
        ));
    }

    #[test]
    fn test_frame_mapping_round_trip() {
        assert!(matches!(
            frame_into_ws(Frame::Text("hi".to_string())),
            WsMessage::Text(_)
        ));
        assert!(matches!(
            map_inbound(Ok(WsMessage::Binary(bytes::Bytes::from_static(b"x")))),
            Some(Ok(Frame::Binary(_)))
        ));
        assert!(map_inbound(Ok(WsMessage::Pong(bytes::Bytes::new()))).is_none());
        assert!(matches!(
            map_inbound(Ok(WsMessage::Close(None))),
            Some(Ok(Frame::Close { clean: true }))
        ));
    }
}
