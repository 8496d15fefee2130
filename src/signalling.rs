/**
 * signalling.rs
 *
 * WebSocket relay client for exchanging ICE session descriptions
 * (TLS with self-signed certs allowed for development, or plain ws://)
 */

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use native_tls::TlsConnector;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::SignallingError;

/// Relay messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignallingMessage {
    Register {
        fingerprint: String,
    },
    RegisterAck {
        success: bool,
        message: String,
    },
    Offer {
        target_fingerprint: String,
        fingerprint: String,
        description: String,
    },
    ForwardOffer {
        from_fingerprint: String,
        description: String,
    },
    OfferResponse {
        success: bool,
        message: Option<String>,
    },
    Keepalive,
    Error {
        message: String,
    },
}

/// Description received from a peer through the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDescription {
    pub fingerprint: String,
    pub description: String,
}

/// TLS stream produced by `SignallingClient::connect`
pub type TlsStream = MaybeTlsStream<tokio_native_tls::TlsStream<TcpStream>>;

pub struct SignallingClient<S> {
    ws_stream: WebSocketStream<S>,
    local_fingerprint: Option<String>,
}

fn host_and_port(url: &str, default_port: u16) -> Result<(String, u16, tokio_tungstenite::tungstenite::handshake::client::Request)> {
    let req = url.into_client_request().context("Invalid signalling URL")?;
    let host = req
        .uri()
        .host()
        .ok_or_else(|| anyhow!("Missing hostname"))?
        .to_string();
    let port = req.uri().port_u16().unwrap_or(default_port);
    Ok((host, port, req))
}

impl SignallingClient<TlsStream> {
    /// Connect over TLS. Self-signed certificates are accepted.
    pub async fn connect(url: &str) -> Result<Self> {
        let (host, port, req) = host_and_port(url, 443)?;

        let mut tls_builder = TlsConnector::builder();
        tls_builder.danger_accept_invalid_certs(true);
        let tls = tls_builder
            .build()
            .map_err(|e| SignallingError::ConnectionFailed(e.to_string()))?;
        let tls = tokio_native_tls::TlsConnector::from(tls);

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .context("TCP connection failed")?;

        let tls_stream = tls
            .connect(&host, tcp)
            .await
            .context("TLS handshake failed")?;

        // TLS is already established; the upgrade runs over it as-is
        let (ws_stream, _resp) = tokio_tungstenite::client_async_tls_with_config(req, tls_stream, None, Some(Connector::Plain))
            .await
            .context("WebSocket upgrade failed")?;

        info!(%host, port, "connected to signalling server");
        Ok(Self::from_stream(ws_stream))
    }
}

impl SignallingClient<TcpStream> {
    /// Connect without TLS, for local relays
    pub async fn connect_plain(url: &str) -> Result<Self> {
        let (host, port, req) = host_and_port(url, 80)?;

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .context("TCP connection failed")?;

        let (ws_stream, _resp) = tokio_tungstenite::client_async(req, tcp)
            .await
            .context("WebSocket upgrade failed")?;

        info!(%host, port, "connected to signalling server (plain)");
        Ok(Self::from_stream(ws_stream))
    }
}

impl<S> SignallingClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_stream(ws_stream: WebSocketStream<S>) -> Self {
        Self {
            ws_stream,
            local_fingerprint: None,
        }
    }

    pub fn local_fingerprint(&self) -> Option<&str> {
        self.local_fingerprint.as_deref()
    }

    /// Register with the signalling server
    pub async fn register(&mut self, fingerprint: &str) -> Result<()> {
        let msg = SignallingMessage::Register {
            fingerprint: fingerprint.to_string(),
        };
        self.send_message(&msg).await?;

        match self.receive_message().await? {
            SignallingMessage::RegisterAck { success: true, .. } => {
                self.local_fingerprint = Some(fingerprint.to_string());
                debug!(fingerprint, "registered");
                Ok(())
            }
            SignallingMessage::RegisterAck { message, .. } => {
                Err(SignallingError::RegistrationFailed(message).into())
            }
            other => Err(SignallingError::InvalidMessage(format!(
                "unexpected registration response: {:?}",
                other
            ))
            .into()),
        }
    }

    /// Send our description to `target_fingerprint` and wait for theirs
    pub async fn exchange_description(
        &mut self,
        target_fingerprint: &str,
        description: &str,
    ) -> Result<PeerDescription> {
        let fingerprint = self
            .local_fingerprint
            .clone()
            .ok_or_else(|| anyhow!("Not registered"))?;

        let msg = SignallingMessage::Offer {
            target_fingerprint: target_fingerprint.to_string(),
            fingerprint,
            description: description.to_string(),
        };
        self.send_message(&msg).await?;

        loop {
            match self.receive_message().await? {
                SignallingMessage::ForwardOffer {
                    from_fingerprint,
                    description,
                } => {
                    if from_fingerprint != target_fingerprint {
                        warn!(%from_fingerprint, "ignoring description from unexpected peer");
                        continue;
                    }
                    return Ok(PeerDescription {
                        fingerprint: from_fingerprint,
                        description,
                    });
                }
                SignallingMessage::OfferResponse { success: false, message } => {
                    return Err(SignallingError::Relay(message.unwrap_or_else(|| "offer rejected".into())).into());
                }
                SignallingMessage::Error { message } => {
                    return Err(SignallingError::Relay(message).into());
                }
                SignallingMessage::Keepalive => {
                    self.send_message(&SignallingMessage::Keepalive).await?;
                }
                _ => {}
            }
        }
    }

    async fn send_message(&mut self, msg: &SignallingMessage) -> Result<()> {
        let json = serde_json::to_string(msg).context("Message serialization failed")?;
        self.ws_stream
            .send(Message::Text(json))
            .await
            .context("WebSocket send failed")?;
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<SignallingMessage> {
        loop {
            let msg = self
                .ws_stream
                .next()
                .await
                .ok_or_else(|| SignallingError::ConnectionFailed("connection closed".into()))??;

            match msg {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| SignallingError::InvalidMessage(e.to_string()).into());
                }
                Message::Ping(data) => {
                    self.ws_stream.send(Message::Pong(data)).await?;
                }
                Message::Close(_) => {
                    return Err(SignallingError::ConnectionFailed("server closed WebSocket".into()).into());
                }
                _ => {}
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws_stream
            .close(None)
            .await
            .context("Failed closing WebSocket")?;
        Ok(())
    }
}
