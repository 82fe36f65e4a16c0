use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::messages::{decode_frame, ControlMessage, Frame};
use crate::error::{PriceWatchError, Result};
use crate::monitor::detector::ThresholdDetector;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Read half of an open stream, handed from `connect` to `receive`.
pub struct StreamSession {
    reader: WsReader,
    cancel: CancellationToken,
}

/// Owns the single outbound stream connection.
///
/// Sends are serialized through the writer mutex. The set of subscribed
/// symbols survives reconnects and is replayed after every `connect`.
/// Nothing here retries; failures go back to the caller.
pub struct StreamManager {
    url: String,
    close_timeout: Duration,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<CancellationToken>>,
    desired: Mutex<BTreeSet<String>>,
}

impl StreamManager {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            writer: tokio::sync::Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            session: Mutex::new(None),
            desired: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Symbols that will be (re)subscribed on the next connect.
    pub fn subscribed_symbols(&self) -> Vec<String> {
        lock(&self.desired).iter().cloned().collect()
    }

    /// Opens the transport and replays the current subscriptions.
    pub async fn connect(&self, parent: &CancellationToken) -> Result<StreamSession> {
        let cancel = parent.child_token();
        *lock(&self.session) = Some(cancel.clone());
        self.set_state(ConnectionState::Connecting);
        info!("[WS] Connecting to {}", redact(&self.url));

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.set_state(ConnectionState::Disconnected);
                return Err(PriceWatchError::Cancelled);
            }
            result = connect_async(self.url.as_str()) => result,
        };
        let ws_stream = match connected {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                error!("[WS] Connection error: {}", e);
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        let (writer, reader) = ws_stream.split();
        *self.writer.lock().await = Some(writer);
        self.set_state(ConnectionState::Connected);
        info!("[WS] Successfully connected");

        for symbol in self.subscribed_symbols() {
            if let Err(e) = self.send(ControlMessage::subscribe(symbol.as_str())).await {
                self.release(None).await;
                return Err(e);
            }
            debug!("[WS] Resubscribed to {}", symbol);
        }

        Ok(StreamSession { reader, cancel })
    }

    pub async fn subscribe(&self, symbol: &str) -> Result<()> {
        lock(&self.desired).insert(symbol.to_string());
        info!("[WS] Subscribing to {}", symbol);
        self.send(ControlMessage::subscribe(symbol)).await
    }

    pub async fn unsubscribe(&self, symbol: &str) -> Result<()> {
        lock(&self.desired).remove(symbol);
        info!("[WS] Unsubscribing from {}", symbol);
        self.send(ControlMessage::unsubscribe(symbol)).await
    }

    async fn send(&self, message: ControlMessage) -> Result<()> {
        let text = message.encode()?;
        let cancel = lock(&self.session).clone();
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(PriceWatchError::NotConnected)?;

        let sent = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => return Err(PriceWatchError::Cancelled),
                result = writer.send(Message::Text(text)) => result,
            },
            None => writer.send(Message::Text(text)).await,
        };
        sent?;
        debug!("[WS] Sent: {:?} {}", message.action, message.symbol);
        Ok(())
    }

    /// Reads frames and feeds trade batches to `detector` until the session
    /// is cancelled (`Ok`) or the connection fails or is closed (`Err`).
    pub async fn receive(&self, session: StreamSession, detector: &ThresholdDetector) -> Result<()> {
        let StreamSession { mut reader, cancel } = session;
        info!("[WS] Client listening for messages");

        let outcome = loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[WS] Receiving cancelled");
                    break Ok(());
                }
                message = reader.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => self.handle_text(&text, detector),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => self.handle_text(&text, detector),
                    Err(e) => warn!("[WS] Dropping non UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    info!("[WS] Server initiated close: {}", reason);
                    break Err(PriceWatchError::ConnectionClosed(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("[WS] WebSocket error: {}", e);
                    break Err(e.into());
                }
                None => break Err(PriceWatchError::ConnectionClosed("stream ended".to_string())),
            }
        };

        match outcome {
            Ok(()) => self.release(Some(client_close_frame())).await,
            // Acknowledge with a bare close; the peer already started the handshake.
            Err(_) => self.release(None).await,
        }
        outcome
    }

    fn handle_text(&self, text: &str, detector: &ThresholdDetector) {
        match decode_frame(text) {
            Ok(Frame::Trades(batch)) => {
                for rejected in &batch.rejected {
                    warn!("[WS] Skipping invalid trade entry: {}", rejected);
                }
                detector.process(&batch);
            }
            Ok(Frame::ServerError(msg)) => warn!("[WS] Server reported error: {}", msg),
            Ok(Frame::Ignored(kind)) => debug!("[WS] Ignoring {} frame", kind.as_deref().unwrap_or("untyped")),
            Err(e) => warn!("[WS] Received message but did not parse successfully: {}", e),
        }
    }

    /// Cancels the session, attempts a bounded close handshake, and drops
    /// the transport. Safe to call repeatedly or before any connect.
    pub async fn stop(&self) {
        let session = lock(&self.session).take();
        if let Some(cancel) = session {
            cancel.cancel();
        }
        self.release(Some(client_close_frame())).await;
        info!("[WS] WebSocket client stopped");
    }

    async fn release(&self, frame: Option<CloseFrame<'static>>) {
        let taken = self.writer.lock().await.take();
        if let Some(mut writer) = taken {
            self.set_state(ConnectionState::Closing);
            let handshake = async {
                match frame {
                    Some(frame) => writer.send(Message::Close(Some(frame))).await,
                    None => writer.close().await,
                }
            };
            match timeout(self.close_timeout, handshake).await {
                Ok(Ok(())) => debug!("[WS] Close handshake sent"),
                Ok(Err(e)) => debug!("[WS] Close handshake failed: {}", e),
                Err(_) => warn!("[WS] Close handshake timed out after {:?}", self.close_timeout),
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

fn client_close_frame() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "client stopping".into(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Strips the query string, which carries the API token.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
