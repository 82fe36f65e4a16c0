use thiserror::Error;

pub type Result<T> = std::result::Result<T, PriceWatchError>;

#[derive(Error, Debug)]
pub enum PriceWatchError {
    #[error("WebSocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Stream is not connected")]
    NotConnected,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Stream closed by server: {0}")]
    ConnectionClosed(String),

    #[error("Invalid ticker symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Subscription store error: {0}")]
    StoreError(String),
}

impl PriceWatchError {
    /// Connect/read/write failures on the stream itself, as opposed to the
    /// collaborators around it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PriceWatchError::WebsocketError(_)
                | PriceWatchError::NotConnected
                | PriceWatchError::ConnectionClosed(_)
        )
    }
}

/// Reasons an inbound frame could not be turned into a tick batch.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("trade frame has no data array")]
    MissingData,

    #[error("trade frame carried no valid ticks ({} rejected)", .rejected.len())]
    NoValidTicks { rejected: Vec<TickError> },
}

/// A single entry of a trade frame that failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("tick #{index}: {reason}")]
pub struct TickError {
    pub index: usize,
    pub reason: String,
}
