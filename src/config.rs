use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PriceWatchError, Result};
use crate::symbol;

const DEFAULT_WS_URL: &str = "wss://ws.finnhub.io";
const DEFAULT_REST_URL: &str = "https://finnhub.io/api/v1/";
pub const DEFAULT_THRESHOLD_PCT: f64 = 5.0;
const DEFAULT_RETRY_DELAY_SECS: u64 = 3;
const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 2000;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub ws_url: String,
    pub rest_url: String,
    pub threshold_pct: f64,
    pub retry_delay: Duration,
    pub close_timeout: Duration,
    pub symbols: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is normal in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("FINNHUB_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PriceWatchError::ConfigError("FINNHUB_API_KEY is not set".into()))?;

        let threshold_pct: f64 = parse_or(&lookup, "PRICEWATCH_THRESHOLD_PCT", DEFAULT_THRESHOLD_PCT)?;
        if !threshold_pct.is_finite() || threshold_pct <= 0.0 {
            return Err(PriceWatchError::ConfigError(format!(
                "PRICEWATCH_THRESHOLD_PCT must be a positive number, got {threshold_pct}"
            )));
        }

        let symbols = lookup("PRICEWATCH_SYMBOLS")
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(symbol::normalize)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            api_key,
            ws_url: lookup("FINNHUB_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            rest_url: lookup("FINNHUB_REST_URL").unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            threshold_pct,
            retry_delay: Duration::from_secs(parse_or(
                &lookup,
                "PRICEWATCH_RETRY_DELAY_SECS",
                DEFAULT_RETRY_DELAY_SECS,
            )?),
            close_timeout: Duration::from_millis(parse_or(
                &lookup,
                "PRICEWATCH_CLOSE_TIMEOUT_MS",
                DEFAULT_CLOSE_TIMEOUT_MS,
            )?),
            symbols,
        })
    }

    /// Stream endpoint with the API token attached. Never log this value.
    pub fn stream_url(&self) -> String {
        format!("{}?token={}", self.ws_url.trim_end_matches('/'), self.api_key)
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("ws_url", &self.ws_url)
            .field("rest_url", &self.rest_url)
            .field("threshold_pct", &self.threshold_pct)
            .field("retry_delay", &self.retry_delay)
            .field("close_timeout", &self.close_timeout)
            .field("symbols", &self.symbols)
            .finish()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| PriceWatchError::ConfigError(format!("{key} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}
