//! # WebSocket Push Transport
//!
//! Production transport for the [`RealtimeBus`]. Holds the bus's single
//! [`TransportHandle`] for its whole life and keeps one WebSocket open to the
//! server's notification stream, reconnecting after a fixed delay whenever the
//! connection fails or the server closes it. Each text frame is one JSON
//! notification.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, SyncError};
use crate::realtime::bus::{ConnectionState, RealtimeBus, TransportHandle};

/// Connection parameters of the push stream.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    /// Pause between a lost connection and the next attempt.
    pub reconnect_delay: Duration,
}

impl WsTransportConfig {
    /// Config with the default 5 s reconnect delay.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    fn request(&self) -> Result<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Config(format!("invalid push url '{}': {}", self.url, e)))?;
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SyncError::Config(format!("invalid auth token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// The WebSocket client bound to one bus.
pub struct WsPushTransport {
    config: WsTransportConfig,
    handle: TransportHandle,
    shutdown: CancellationToken,
}

impl WsPushTransport {
    /// Validates the config, claims the bus and starts the connection loop.
    ///
    /// Fails with [`SyncError::AlreadyConnected`] if the bus already has a transport.
    pub fn spawn(config: WsTransportConfig, bus: &Arc<RealtimeBus>) -> Result<JoinHandle<()>> {
        config.request()?;
        let handle = bus.attach()?;
        let transport = Self {
            shutdown: handle.shutdown_token(),
            config,
            handle,
        };
        Ok(tokio::spawn(transport.run()))
    }

    async fn run(self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.handle.set_state(ConnectionState::Connecting);
            log::info!("Connecting to push stream: {}", self.config.url);

            let request = match self.config.request() {
                Ok(r) => r,
                Err(e) => {
                    log::error!("{}", e);
                    break;
                }
            };

            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                res = connect_async(request) => res,
            };

            match connected {
                Ok((ws_stream, _)) => {
                    log::info!("Push stream connected.");
                    self.handle.set_state(ConnectionState::Connected);
                    let (mut write, mut read) = ws_stream.split();

                    loop {
                        tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        if let Err(e) = self.handle.ingest_frame(text.as_str()) {
                                            log::warn!("Dropping undecodable push frame: {}", e);
                                        }
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        log::warn!("Push stream closed by server: {:?}", frame);
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        log::error!("Push stream read error: {}", e);
                                        break;
                                    }
                                    None => {
                                        log::warn!("Push stream ended.");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("Failed to connect to push stream: {}", e);
                }
            }

            self.handle.set_state(ConnectionState::Disconnected);
            if self.shutdown.is_cancelled() {
                break;
            }
            log::info!("Reconnecting in {}ms", self.config.reconnect_delay.as_millis());
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        log::info!("Push transport stopped.");
    }
}
