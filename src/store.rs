use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::monitor::ports::{Subscription, SubscriptionStore};

/// Subscriptions fixed at startup, e.g. from `PRICEWATCH_SYMBOLS`.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriptionStore {
    subscriptions: Vec<Subscription>,
}

impl StaticSubscriptionStore {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions }
    }

    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            symbols
                .into_iter()
                .map(|symbol| Subscription {
                    user_id: 0,
                    symbol: symbol.into(),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl SubscriptionStore for StaticSubscriptionStore {
    async fn list_active(&self) -> Result<Vec<Subscription>> {
        let mut seen = BTreeSet::new();
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| seen.insert(s.symbol.clone()))
            .cloned()
            .collect())
    }
}
