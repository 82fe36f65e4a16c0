use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::detector::ThresholdDetector;
use super::ports::{QuoteLookup, SubscriptionEvent, SubscriptionStore};
use super::prices::PriceTracker;
use crate::api::finnhub::ws::StreamManager;
use crate::error::{PriceWatchError, Result};
use crate::symbol;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Keeps the stream alive for the lifetime of the process and applies
/// subscription changes to both the stream and the price tracker.
pub struct Supervisor {
    manager: Arc<StreamManager>,
    tracker: Arc<PriceTracker>,
    detector: ThresholdDetector,
    store: Arc<dyn SubscriptionStore>,
    quotes: Arc<dyn QuoteLookup>,
    retry_delay: Duration,
    seeded: AtomicBool,
}

impl Supervisor {
    pub fn new(
        manager: Arc<StreamManager>,
        tracker: Arc<PriceTracker>,
        detector: ThresholdDetector,
        store: Arc<dyn SubscriptionStore>,
        quotes: Arc<dyn QuoteLookup>,
    ) -> Self {
        Self {
            manager,
            tracker,
            detector,
            store,
            quotes,
            retry_delay: DEFAULT_RETRY_DELAY,
            seeded: AtomicBool::new(false),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Connect/receive loop. Returns once `cancel` fires or the stream is
    /// stopped; any other failure is retried after the configured delay.
    pub async fn run(&self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            info!(
                "Price monitor service starting (alert threshold {}%) ....",
                self.detector.threshold_pct()
            );
            match self.run_once(&cancel).await {
                Ok(()) | Err(PriceWatchError::Cancelled) => break,
                Err(e) => {
                    if e.is_transport() {
                        warn!("Price stream dropped: {}. Reconnecting in {:?}", e, self.retry_delay);
                    } else {
                        error!("Price monitor failed: {}. Retrying in {:?}", e, self.retry_delay);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(self.retry_delay) => {}
                    }
                }
            }
        }
        self.manager.stop().await;
        info!("Price monitor service stopped");
    }

    async fn run_once(&self, cancel: &CancellationToken) -> Result<()> {
        let session = self.manager.connect(cancel).await?;
        if !self.seeded.load(Ordering::SeqCst) {
            if let Err(e) = self.seed_from_store().await {
                self.manager.stop().await;
                return Err(e);
            }
        }
        self.manager.receive(session, &self.detector).await
    }

    /// Subscribes every stored symbol and seeds its baseline from a live
    /// quote. Runs after the first successful connect only; a store failure
    /// fails the attempt so the retry loop reconnects and seeds again.
    async fn seed_from_store(&self) -> Result<()> {
        let subscriptions = self.store.list_active().await.map_err(|e| match e {
            PriceWatchError::StoreError(_) => e,
            other => PriceWatchError::StoreError(other.to_string()),
        })?;

        let symbols: BTreeSet<String> = subscriptions
            .into_iter()
            .filter_map(|s| match symbol::normalize(&s.symbol) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!("Skipping stored subscription for user {}: {}", s.user_id, e);
                    None
                }
            })
            .collect();
        info!("Seeding {} subscribed symbols", symbols.len());

        for symbol in &symbols {
            self.manager.subscribe(symbol).await?;
            match self.quotes.get_quote(symbol).await {
                Ok(Some(price)) if price > 0.0 => {
                    self.tracker.seed(symbol, price);
                    info!("{} baseline seeded at {}", symbol, price);
                }
                Ok(_) => warn!("No quote for {}; its first tick will set the baseline", symbol),
                Err(e) => warn!("Quote lookup for {} failed ({}); its first tick will set the baseline", symbol, e),
            }
        }

        self.seeded.store(true, Ordering::SeqCst);
        info!("Seeding complete; {} baselines tracked", self.tracker.len());
        Ok(())
    }

    /// Applies one runtime subscription change.
    pub async fn handle_event(&self, event: SubscriptionEvent) -> Result<()> {
        let symbol = symbol::normalize(event.symbol())?;
        match event {
            SubscriptionEvent::Subscribed(_) => {
                match self.quotes.get_quote(&symbol).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!("Quote lookup does not know {}; not subscribing", symbol);
                        return Err(PriceWatchError::InvalidSymbol(symbol));
                    }
                    Err(e) => warn!("Could not validate {} ({}); subscribing anyway", symbol, e),
                }
                let sent = self.manager.subscribe(&symbol).await;
                self.tracker.seed(&symbol, 0.0);
                deferred_if_disconnected(&symbol, sent)
            }
            SubscriptionEvent::Unsubscribed(_) => {
                let sent = self.manager.unsubscribe(&symbol).await;
                self.tracker.remove(&symbol);
                deferred_if_disconnected(&symbol, sent)
            }
        }
    }

    /// Drains subscription events until `cancel` fires or every sender is dropped.
    pub async fn run_events(&self, mut events: mpsc::Receiver<SubscriptionEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let Err(e) = self.handle_event(event).await {
                warn!("Subscription event not applied: {}", e);
            }
        }
    }
}

/// The manager already queued the change for the next connect.
fn deferred_if_disconnected(symbol: &str, sent: Result<()>) -> Result<()> {
    match sent {
        Err(PriceWatchError::NotConnected) => {
            info!("Stream is down; {} change will apply on reconnect", symbol);
            Ok(())
        }
        other => other,
    }
}
