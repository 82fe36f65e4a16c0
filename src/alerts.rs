use std::fmt;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::mpsc;

/// A symbol moved beyond the alert threshold since its last alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub symbol: String,
    pub price: f64,
    pub percent_change: f64,
    pub at: DateTime<Utc>,
}

impl Alert {
    pub fn new(symbol: impl Into<String>, price: f64, percent_change: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            percent_change,
            at: Utc::now(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Price Notification for {} | New Price ${} | Percent Change {:.2}%",
            self.symbol, self.price, self.percent_change
        )
    }
}

/// Delivery side of the monitor. Called from the receive loop, so
/// implementations must not block.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Hands alerts to a notifier task over an unbounded channel.
#[derive(Clone)]
pub struct ChannelAlertSink {
    sender: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AlertSink for ChannelAlertSink {
    fn alert(&self, alert: Alert) {
        if let Err(e) = self.sender.send(alert) {
            warn!("Alert dropped, notifier is gone: {}", e.0);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, alert: Alert) {
        info!("ALERT {}", alert);
    }
}
