//! Live websocket transport built on `tokio-tungstenite`.

#![allow(clippy::module_name_repetitions)]

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as TungsteniteMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use tradedesk_core::error::NetworkError;

use super::{CLOSE_ABNORMAL, Frame, Link, LinkPeer, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, TungsteniteMessage>;
type WsSource = SplitStream<WsStream>;

/// Opens real websocket connections.
///
/// Each open spawns one pump task that moves frames between the socket and
/// the returned [`Link`]. Protocol-level pings are answered here; JSON
/// heartbeats are the connection manager's business.
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    connect_timeout: Duration,
}

impl TungsteniteTransport {
    /// Creates a transport that gives up opening after `connect_timeout`.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn run_pump(mut sink: WsSink, mut stream: WsSource, mut peer: LinkPeer) {
        loop {
            tokio::select! {
                outbound = peer.outbound.recv() => match outbound {
                    Some(Frame::Text(text)) => {
                        if let Err(e) = sink.send(TungsteniteMessage::Text(text)).await {
                            error!(error = %e, "Failed to send frame");
                            peer.failed(e.to_string());
                            break;
                        }
                    }
                    Some(Frame::Close { code, reason }) => {
                        debug!(code, reason = %reason, "Closing websocket");
                        let _ = sink.send(to_close_message(code, reason)).await;
                        let _ = sink.close().await;
                        break;
                    }
                    None => {
                        debug!("Link released, closing websocket");
                        let _ = sink.close().await;
                        break;
                    }
                },

                inbound = stream.next() => match inbound {
                    Some(Ok(TungsteniteMessage::Text(text))) => {
                        if !peer.deliver(text) {
                            break;
                        }
                    }
                    Some(Ok(TungsteniteMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if !peer.deliver(text) {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping non UTF-8 binary frame"),
                    },
                    Some(Ok(TungsteniteMessage::Ping(data))) => {
                        if let Err(e) = sink.send(TungsteniteMessage::Pong(data)).await {
                            warn!(error = %e, "Failed to send pong");
                        }
                    }
                    Some(Ok(TungsteniteMessage::Pong(_) | TungsteniteMessage::Frame(_))) => {}
                    Some(Ok(TungsteniteMessage::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (CLOSE_ABNORMAL, "Server closed connection".to_string()),
                            |f| (u16::from(f.code), f.reason.to_string()),
                        );
                        info!(code, reason = %reason, "Server sent close frame");
                        peer.closed(code, reason);
                        break;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        peer.failed(e.to_string());
                        break;
                    }
                    None => {
                        peer.closed(CLOSE_ABNORMAL, "Connection lost");
                        break;
                    }
                },
            }
        }
    }
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    fn name(&self) -> &'static str {
        "tungstenite"
    }

    async fn open(&self, url: &str) -> Result<Link, NetworkError> {
        validate_url(url)?;

        let (ws_stream, _) = timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| NetworkError::Timeout {
                timeout_ms: u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| NetworkError::connection_failed(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        let (link, peer) = Link::pair();
        tokio::spawn(Self::run_pump(sink, stream, peer));

        debug!(url = %url, "WebSocket opened");
        Ok(link)
    }
}

fn validate_url(url: &str) -> Result<(), NetworkError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(NetworkError::InvalidUrl {
            url: url.to_string(),
            reason: "scheme must be ws:// or wss://".to_string(),
        })
    }
}

fn to_close_message(code: u16, reason: String) -> TungsteniteMessage {
    TungsteniteMessage::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }))
}
