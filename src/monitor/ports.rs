use async_trait::async_trait;

use crate::error::Result;

/// One persisted price subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: u64,
    pub symbol: String,
}

/// Source of the subscriptions that were active when the process started.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Subscription>>;
}

/// Point-in-time price lookup.
#[async_trait]
pub trait QuoteLookup: Send + Sync {
    /// `Ok(None)` means the symbol is unknown upstream.
    async fn get_quote(&self, symbol: &str) -> Result<Option<f64>>;
}

/// Runtime change to the set of streamed symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Subscribed(String),
    Unsubscribed(String),
}

impl SubscriptionEvent {
    pub fn symbol(&self) -> &str {
        match self {
            SubscriptionEvent::Subscribed(symbol) | SubscriptionEvent::Unsubscribed(symbol) => symbol,
        }
    }
}
