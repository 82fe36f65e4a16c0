use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;

use crate::error::Result;
use crate::monitor::ports::QuoteLookup;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Subset of Finnhub's `/quote` response.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price.
    c: Option<f64>,
    /// Percent change; `null` for symbols Finnhub does not know.
    dp: Option<f64>,
}

/// Current price, or `None` for an unknown symbol.
fn current_price(quote: &QuoteResponse) -> Option<f64> {
    quote.dp?;
    quote.c.filter(|c| c.is_finite() && *c > 0.0)
}

/// REST quote lookups against Finnhub with a short per-symbol cache.
pub struct FinnhubQuoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: Mutex<HashMap<String, (Instant, f64)>>,
    ttl: Duration,
}

impl FinnhubQuoteClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            cache: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        })
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cached(&self, symbol: &str) -> Option<f64> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(symbol)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, price)| *price)
    }
}

#[async_trait]
impl QuoteLookup for FinnhubQuoteClient {
    async fn get_quote(&self, symbol: &str) -> Result<Option<f64>> {
        if let Some(price) = self.cached(symbol) {
            debug!("Quote for {} retrieved from cache", symbol);
            return Ok(Some(price));
        }

        let url = format!("{}/quote", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Quote API returned status code {} for {}", response.status(), symbol);
            return Ok(None);
        }

        let quote: QuoteResponse = response.json().await?;
        let price = current_price(&quote);
        match price {
            Some(price) => {
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(symbol.to_string(), (Instant::now(), price));
            }
            None => warn!("Ticker {} has no current quote", symbol),
        }
        Ok(price)
    }
}
