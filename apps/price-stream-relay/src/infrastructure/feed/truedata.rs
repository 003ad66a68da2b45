//! TrueData WebSocket Provider
//!
//! Connects to the TrueData real-time push service. Credentials travel in the
//! connection URL query string; the password is masked whenever the URL is
//! logged.
//!
//! # Stream URL
//!
//! - Production: `wss://push.truedata.in:8084?user=<user>&password=<password>`

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::codec::TrueDataCodec;
use crate::application::ports::{CodecError, FeedConnection, FeedError, FeedEvent, FeedProvider};
use crate::domain::symbols::Symbol;
use crate::infrastructure::config::TrueDataSettings;

// =============================================================================
// Provider
// =============================================================================

/// TrueData feed provider.
#[derive(Debug, Clone)]
pub struct TrueDataProvider {
    url: Url,
    codec: TrueDataCodec,
}

impl TrueDataProvider {
    /// Create a provider from settings.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidEndpoint`] if the configured URL does not parse.
    pub fn new(settings: &TrueDataSettings, market_status_key: &str) -> Result<Self, FeedError> {
        let mut url = Url::parse(&settings.url)
            .map_err(|e| FeedError::InvalidEndpoint(format!("{}: {e}", settings.url)))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("user", settings.credentials.user())
            .append_pair("password", settings.credentials.password());

        Ok(Self {
            url,
            codec: TrueDataCodec::new(market_status_key),
        })
    }

    /// Connection URL with the password masked.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "password" { "***".into() } else { v };
                (k.into_owned(), v.into_owned())
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

#[async_trait]
impl FeedProvider for TrueDataProvider {
    fn name(&self) -> &'static str {
        "truedata"
    }

    async fn connect(&self) -> Result<Box<dyn FeedConnection>, FeedError> {
        tracing::info!(url = %self.redacted_url(), "Connecting to TrueData feed");

        let (stream, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "TrueData WebSocket handshake complete");
        Ok(Box::new(WebSocketConnection::new(stream)))
    }

    fn subscribe_request(&self, symbols: &[Symbol]) -> Result<String, FeedError> {
        Ok(self.codec.encode_subscribe(symbols)?)
    }

    fn keepalive_request(&self) -> Result<String, FeedError> {
        Ok(self.codec.encode_market_status_request()?)
    }

    fn decode(&self, text: &str) -> Result<FeedEvent, CodecError> {
        self.codec.decode(text)
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Text-frame view of a WebSocket stream.
///
/// Pings are answered in place; a close frame or end of stream ends the
/// connection.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketConnection {
    /// Wrap an established WebSocket stream.
    #[must_use]
    pub const fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<(), FeedError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::trace!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(FeedError::Transport(e.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Server sent close frame");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(FeedError::Transport(e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{Credentials, DEFAULT_TRUEDATA_URL};

    fn settings(url: &str, password: &str) -> TrueDataSettings {
        TrueDataSettings {
            url: url.to_string(),
            credentials: Credentials::new("trader".to_string(), password.to_string()),
        }
    }

    #[test]
    fn credentials_in_query() {
        let provider = TrueDataProvider::new(&settings(DEFAULT_TRUEDATA_URL, "s3cret"), "NSE_EQ")
            .unwrap();
        assert_eq!(
            provider.url.as_str(),
            "wss://push.truedata.in:8084/?user=trader&password=s3cret"
        );
    }

    #[test]
    fn special_characters_are_encoded() {
        let provider =
            TrueDataProvider::new(&settings(DEFAULT_TRUEDATA_URL, "p&ss=w rd"), "NSE_EQ").unwrap();
        let pairs: Vec<_> = provider.url.query_pairs().collect();
        assert_eq!(pairs[1].1, "p&ss=w rd");
    }

    #[test]
    fn redacted_url_hides_password() {
        let provider = TrueDataProvider::new(&settings(DEFAULT_TRUEDATA_URL, "s3cret"), "NSE_EQ")
            .unwrap();
        let redacted = provider.redacted_url();
        assert!(!redacted.contains("s3cret"));
        assert!(redacted.contains("user=trader"));
    }

    #[test]
    fn invalid_url_rejected() {
        let err = TrueDataProvider::new(&settings("not a url", "x"), "NSE_EQ").unwrap_err();
        assert!(matches!(err, FeedError::InvalidEndpoint(_)));
    }

    #[test]
    fn requests_and_decode_use_codec() {
        let provider = TrueDataProvider::new(&settings(DEFAULT_TRUEDATA_URL, "x"), "NSE_EQ")
            .unwrap();
        assert_eq!(provider.name(), "truedata");
        assert_eq!(
            provider.subscribe_request(&[Symbol::from("ITC")]).unwrap(),
            r#"{"method":"addsymbol","symbols":["ITC"]}"#
        );
        assert_eq!(
            provider.keepalive_request().unwrap(),
            r#"{"method":"getmarketstatus"}"#
        );
        assert!(matches!(
            provider.decode(r#"{"NSE_EQ":"OPEN"}"#),
            Ok(FeedEvent::Status(_))
        ));
    }
}
