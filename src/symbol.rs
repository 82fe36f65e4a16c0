use crate::error::{PriceWatchError, Result};

/// Canonical form of a ticker symbol: trimmed and uppercased.
///
/// Exchange-prefixed symbols (`BINANCE:BTCUSDT`) are accepted as-is.
pub fn normalize(raw: &str) -> Result<String> {
    let symbol = raw.trim();
    if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
        return Err(PriceWatchError::InvalidSymbol(raw.to_string()));
    }
    Ok(symbol.to_uppercase())
}
