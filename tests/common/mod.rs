#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use pricewatch::alerts::{Alert, AlertSink};
use pricewatch::monitor::{QuoteLookup, Subscription, SubscriptionStore};
use pricewatch::{PriceWatchError, Result};

pub const WAIT: Duration = Duration::from_secs(5);

/// Minimal stand-in for the trade stream. Every accepted client is handed
/// to the test as a `MockConnection`.
pub struct MockFeed {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    handle: JoinHandle<()>,
}

impl MockFeed {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, connections) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else {
                        return;
                    };
                    let (mut sink, mut source) = ws.split();
                    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
                    let (inbound_tx, inbound) = mpsc::unbounded_channel::<Message>();
                    let _ = conn_tx.send(MockConnection { outbound, inbound });

                    let writer = tokio::spawn(async move {
                        while let Some(msg) = outbound_rx.recv().await {
                            if sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                    });
                    while let Some(Ok(msg)) = source.next().await {
                        let closing = matches!(msg, Message::Close(_));
                        let _ = inbound_tx.send(msg);
                        if closing {
                            break;
                        }
                    }
                    writer.abort();
                });
            }
        });
        Self {
            addr,
            connections,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn next_connection(&mut self) -> MockConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("no client connected")
            .expect("feed stopped")
    }
}

impl Drop for MockFeed {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct MockConnection {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

impl MockConnection {
    pub fn push(&self, text: &str) {
        self.outbound.send(Message::Text(text.to_string())).unwrap();
    }

    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "server restart".into(),
        })));
    }

    /// Next text frame sent by the client.
    pub async fn next_text(&mut self) -> String {
        loop {
            let msg = timeout(WAIT, self.inbound.recv())
                .await
                .expect("client sent nothing")
                .expect("client disconnected");
            if let Message::Text(text) = msg {
                return text;
            }
        }
    }

    /// Waits for the client's close frame and returns it.
    pub async fn expect_close(&mut self) -> Option<CloseFrame<'static>> {
        loop {
            match timeout(WAIT, self.inbound.recv()).await.expect("client never closed") {
                Some(Message::Close(frame)) => return frame,
                Some(_) => continue,
                None => return None,
            }
        }
    }
}

pub fn subscribe_frame(symbol: &str) -> String {
    format!(r#"{{"type":"subscribe","symbol":"{symbol}"}}"#)
}

pub fn unsubscribe_frame(symbol: &str) -> String {
    format!(r#"{{"type":"unsubscribe","symbol":"{symbol}"}}"#)
}

pub fn trade_frame(ticks: &[(&str, f64)]) -> String {
    let data: Vec<String> = ticks
        .iter()
        .enumerate()
        .map(|(i, (s, p))| format!(r#"{{"s":"{s}","p":{p},"t":{},"v":1}}"#, 1_700_000_000_000u64 + i as u64))
        .collect();
    format!(r#"{{"type":"trade","data":[{}]}}"#, data.join(","))
}

#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn taken(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().drain(..).collect()
    }
}

impl AlertSink for RecordingSink {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

#[derive(Default)]
pub struct FixedQuotes {
    prices: HashMap<String, f64>,
    failing: Vec<String>,
    pub calls: AtomicUsize,
}

impl FixedQuotes {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Lookups for `symbol` fail.
    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_string());
        self
    }
}

#[async_trait]
impl QuoteLookup for FixedQuotes {
    async fn get_quote(&self, symbol: &str) -> Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|s| s == symbol) {
            return Err(PriceWatchError::ConfigError(format!("quote backend unavailable for {symbol}")));
        }
        Ok(self.prices.get(symbol).copied())
    }
}

pub struct CountingStore {
    symbols: Vec<String>,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(symbols: &[&str]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// The first `n` calls to `list_active` fail.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl SubscriptionStore for CountingStore {
    async fn list_active(&self) -> Result<Vec<Subscription>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PriceWatchError::StoreError("database unavailable".into()));
        }
        Ok(self
            .symbols
            .iter()
            .map(|symbol| Subscription {
                user_id: 1,
                symbol: symbol.clone(),
            })
            .collect())
    }
}

/// Polls `check` until it holds or the wait budget runs out.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
