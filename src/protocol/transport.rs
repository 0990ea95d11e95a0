//!
//! Duplex transport for the ChatHub endpoint.
//!
//! The turn state machine only sees [`FrameTransport`] and [`Connector`]; the
//! WebSocket implementation lives here so the machine can be driven by any
//! frame source.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::classifier::ErrorClassifier;
use crate::error::{ProxyError, Result};
use crate::session::SessionStore;

/* --- types ----------------------------------------------------------------------------------- */

///
/// One open duplex connection carrying text frames.
#[async_trait]
pub trait FrameTransport: Send {
    ///
    /// Send one already-terminated frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    ///
    /// Receive the next text message.
    ///
    /// # Returns
    ///  * `None` once the peer has closed the connection
    async fn recv(&mut self) -> Option<Result<String>>;

    ///
    /// Close the connection; errors while closing are swallowed.
    async fn close(&mut self);
}

///
/// Opens a fresh [`FrameTransport`] per turn.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>>;
}

///
/// WebSocket connector for the ChatHub endpoint.
pub struct WsConnector {
    /** ChatHub address */
    url: String,
    /** rendered session cookie */
    cookie: String,
    /** outbound identification string */
    user_agent: String,
    /** upper bound on the upgrade handshake */
    connect_timeout: Duration,
    /** session store refreshed from the upgrade response */
    session: Arc<SessionStore>,
    /** classifier for rejected upgrades */
    classifier: Arc<ErrorClassifier>,
}

///
/// [`FrameTransport`] over a WebSocket stream.
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl WsConnector {
    ///
    /// Create a connector presenting the given session cookie.
    ///
    /// # Arguments
    ///  * `url` - ChatHub address (`ws://` or `wss://`)
    ///  * `cookie` - rendered `Cookie` header value
    ///  * `user_agent` - outbound identification string
    ///  * `connect_timeout` - upper bound on the upgrade handshake
    ///  * `session` - store refreshed from the upgrade response headers
    ///  * `classifier` - classifier for rejected upgrades
    pub fn new(
        url: impl Into<String>,
        cookie: impl Into<String>,
        user_agent: impl Into<String>,
        connect_timeout: Duration,
        session: Arc<SessionStore>,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self {
            url: url.into(),
            cookie: cookie.into(),
            user_agent: user_agent.into(),
            connect_timeout,
            session,
            classifier,
        }
    }

    fn upgrade_error(&self, error: tungstenite::Error) -> ProxyError {
        match error {
            tungstenite::Error::Http(response) => {
                let status = response.status();
                let body = response
                    .body()
                    .as_deref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                let kind = self.classifier.classify_response(status.as_u16(), &body);
                tracing::error!("ChatHub upgrade rejected with {} ({})", status, kind);
                ProxyError::upstream(kind, format!("ChatHub upgrade rejected with {}", status))
            }
            other => ProxyError::ProtocolDesync(format!("ChatHub connection failed: {}", other)),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>> {
        let mut request = self.url.as_str().into_client_request().map_err(|e| {
            ProxyError::Config(format!("Invalid ChatHub URL '{}': {}", self.url, e))
        })?;

        let headers = request.headers_mut();
        let header = |value: &str| {
            HeaderValue::from_str(value)
                .map_err(|e| ProxyError::Conversion(format!("invalid header value: {}", e)))
        };
        headers.insert("cookie", header(&self.cookie)?);
        headers.insert("user-agent", header(&self.user_agent)?);

        tracing::debug!("Connecting to {}", self.url);
        let connected =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    ProxyError::ProtocolDesync(format!(
                        "ChatHub connection not established within {:?}",
                        self.connect_timeout
                    ))
                })?;

        let (stream, response) = connected.map_err(|e| self.upgrade_error(e))?;
        self.session.refresh(response.headers()).await;

        Ok(Box::new(WsTransport::new(stream)))
    }
}

impl<S> WsTransport<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> FrameTransport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: String) -> Result<()> {
        tracing::trace!("-> {}", frame);
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| ProxyError::ProtocolDesync(format!("send failed: {}", e)))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    tracing::trace!("<- {}", text.as_str());
                    return Some(Ok(text.as_str().to_string()));
                }
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes.to_vec()).map_err(|_| {
                        ProxyError::ProtocolDesync("binary frame is not UTF-8".to_string())
                    }));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(ProxyError::ProtocolDesync(format!("receive failed: {}", e))));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Ignoring error while closing ChatHub connection: {}", e);
        }
    }
}
