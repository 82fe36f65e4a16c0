//! Wire format of the Finnhub trade stream.
//!
//! Outbound: `{"type":"subscribe","symbol":"AAPL"}`.
//! Inbound: `{"type":"trade","data":[{"s":"AAPL","p":187.2,"t":1700000000000,"v":10}]}`,
//! plus `ping` and `error` frames which never carry ticks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, TickError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub action: Action,
    pub symbol: String,
}

impl ControlMessage {
    pub fn subscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: Action::Subscribe,
            symbol: symbol.into(),
        }
    }

    pub fn unsubscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: Action::Unsubscribe,
            symbol: symbol.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub timestamp_ms: u64,
    pub volume: Option<f64>,
}

/// Ticks of one trade frame in arrival order. Entries that failed
/// validation are reported in `rejected` instead of discarding the frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickBatch {
    pub ticks: Vec<Tick>,
    pub rejected: Vec<TickError>,
}

impl TickBatch {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            ticks,
            rejected: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Trades(TickBatch),
    /// Error reported by the server, e.g. an unknown symbol.
    ServerError(String),
    /// Pings, acks and anything else that is not a trade frame.
    Ignored(Option<String>),
}

pub fn decode_frame(text: &str) -> Result<Frame, DecodeError> {
    let value: Value = serde_json::from_str(text)?;

    match value.get("type").and_then(Value::as_str) {
        Some("trade") => {}
        Some("error") => {
            let msg = value.get("msg").and_then(Value::as_str).unwrap_or_default();
            return Ok(Frame::ServerError(msg.to_string()));
        }
        other => return Ok(Frame::Ignored(other.map(str::to_string))),
    }

    let entries = match value.get("data") {
        Some(Value::Array(entries)) => entries,
        _ => return Err(DecodeError::MissingData),
    };

    let mut batch = TickBatch::default();
    for (index, entry) in entries.iter().enumerate() {
        match decode_tick(entry) {
            Ok(tick) => batch.ticks.push(tick),
            Err(reason) => batch.rejected.push(TickError { index, reason }),
        }
    }

    if batch.ticks.is_empty() {
        return Err(DecodeError::NoValidTicks {
            rejected: batch.rejected,
        });
    }
    Ok(Frame::Trades(batch))
}

fn decode_tick(entry: &Value) -> Result<Tick, String> {
    let symbol = entry
        .get("s")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing or empty symbol".to_string())?;

    let price = match entry.get("p") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|p| p.is_finite())
    .ok_or_else(|| format!("non-numeric price for {symbol}"))?;

    let timestamp_ms = entry.get("t").and_then(Value::as_u64).unwrap_or_default();
    let volume = entry.get("v").and_then(Value::as_f64);

    Ok(Tick {
        symbol: symbol.to_string(),
        price,
        timestamp_ms,
        volume,
    })
}
