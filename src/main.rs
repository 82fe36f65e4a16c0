use std::error::Error;
use std::io::{BufRead, Write};
use std::sync::Arc;

use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pricewatch::alerts::ChannelAlertSink;
use pricewatch::api::finnhub::quote::FinnhubQuoteClient;
use pricewatch::api::finnhub::ws::StreamManager;
use pricewatch::config::Settings;
use pricewatch::monitor::{PriceTracker, SubscriptionEvent, Supervisor, ThresholdDetector};
use pricewatch::store::StaticSubscriptionStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("pricewatch", LevelFilter::Debug)
        .parse_default_env()
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    let settings = Settings::from_env()?;
    info!("Starting pricewatch with {:?}", settings);

    let tracker = Arc::new(PriceTracker::new());
    let (sink, mut alerts) = ChannelAlertSink::new();
    let detector = ThresholdDetector::with_threshold(Arc::clone(&tracker), Arc::new(sink), settings.threshold_pct);
    let manager = Arc::new(StreamManager::new(settings.stream_url()).with_close_timeout(settings.close_timeout));
    let quotes = FinnhubQuoteClient::new(settings.rest_url.clone(), settings.api_key.clone())?;
    let store = StaticSubscriptionStore::from_symbols(settings.symbols.clone());

    let supervisor = Arc::new(
        Supervisor::new(manager, tracker, detector, Arc::new(store), Arc::new(quotes))
            .with_retry_delay(settings.retry_delay),
    );

    let cancel = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(64);

    // Notification layer: drains alerts and renders them
    let notifier_handle = tokio::spawn(async move {
        while let Some(alert) = alerts.recv().await {
            info!("{}", alert);
        }
    });

    let monitor_handle = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        let cancel = cancel.clone();
        async move { supervisor.run(cancel).await }
    });

    let events_handle = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        let cancel = cancel.clone();
        async move { supervisor.run_events(event_rx, cancel).await }
    });

    spawn_command_reader(event_tx);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
    cancel.cancel();

    let _ = monitor_handle.await;
    let _ = events_handle.await;
    // Dropping the supervisor drops the last alert sender.
    drop(supervisor);
    let _ = notifier_handle.await;

    info!("Shutdown complete");
    Ok(())
}

/// Reads `subscribe SYM` / `unsubscribe SYM` lines from stdin on a plain
/// thread so a pending read never holds up runtime shutdown.
fn spawn_command_reader(events: mpsc::Sender<SubscriptionEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read command: {}", e);
                    break;
                }
            };

            let mut parts = line.split_whitespace();
            let event = match (parts.next(), parts.next()) {
                (Some("subscribe" | "sub"), Some(symbol)) => SubscriptionEvent::Subscribed(symbol.to_string()),
                (Some("unsubscribe" | "unsub"), Some(symbol)) => SubscriptionEvent::Unsubscribed(symbol.to_string()),
                (None, _) => continue,
                _ => {
                    warn!("Unknown command {:?}; use `subscribe SYM` or `unsubscribe SYM`", line);
                    continue;
                }
            };
            if events.blocking_send(event).is_err() {
                break;
            }
        }
    });
}
