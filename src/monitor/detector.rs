use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use super::prices::PriceTracker;
use crate::alerts::{Alert, AlertSink};
use crate::api::finnhub::messages::TickBatch;
use crate::config::DEFAULT_THRESHOLD_PCT;

/// Outcome of comparing one tick against its symbol's baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// No usable baseline; the tick price becomes the baseline.
    Seeded,
    /// Below threshold; baseline left untouched.
    Within { baseline: f64, percent_change: f64 },
    /// At or beyond threshold; baseline moves to the tick price.
    Breached { baseline: f64, percent_change: f64 },
}

/// Percent move from `baseline` to `price`. A zero baseline yields zero.
pub fn percent_change(baseline: f64, price: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (price - baseline) / baseline * 100.0
}

pub fn evaluate(baseline: Option<f64>, price: f64, threshold_pct: f64) -> Verdict {
    match baseline {
        None => Verdict::Seeded,
        Some(b) if b == 0.0 => Verdict::Seeded,
        Some(baseline) => {
            let percent_change = percent_change(baseline, price);
            if percent_change.abs() >= threshold_pct {
                Verdict::Breached {
                    baseline,
                    percent_change,
                }
            } else {
                Verdict::Within {
                    baseline,
                    percent_change,
                }
            }
        }
    }
}

/// Applies tick batches to the tracker and raises alerts on threshold breaches.
pub struct ThresholdDetector {
    tracker: Arc<PriceTracker>,
    sink: Arc<dyn AlertSink>,
    threshold_pct: f64,
}

impl ThresholdDetector {
    pub fn new(tracker: Arc<PriceTracker>, sink: Arc<dyn AlertSink>) -> Self {
        Self::with_threshold(tracker, sink, DEFAULT_THRESHOLD_PCT)
    }

    pub fn with_threshold(tracker: Arc<PriceTracker>, sink: Arc<dyn AlertSink>, threshold_pct: f64) -> Self {
        Self {
            tracker,
            sink,
            threshold_pct,
        }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    /// Processes ticks in arrival order and returns the number of alerts sent.
    ///
    /// At most one alert per symbol is emitted per batch; later ticks for a
    /// symbol that already alerted in this batch are skipped.
    pub fn process(&self, batch: &TickBatch) -> usize {
        let mut alerted: HashSet<&str> = HashSet::new();

        for tick in &batch.ticks {
            if alerted.contains(tick.symbol.as_str()) {
                continue;
            }

            let threshold = self.threshold_pct;
            let verdict = self.tracker.update(&tick.symbol, |baseline| {
                let verdict = evaluate(baseline, tick.price, threshold);
                match verdict {
                    Verdict::Seeded | Verdict::Breached { .. } => (Some(tick.price), verdict),
                    Verdict::Within { .. } => (None, verdict),
                }
            });

            match verdict {
                Verdict::Seeded => {
                    debug!("{} baseline set to {}", tick.symbol, tick.price);
                }
                Verdict::Within {
                    baseline,
                    percent_change,
                } => {
                    debug!(
                        "{} - Baseline: {}. Received: {} ({:+.2}%)",
                        tick.symbol, baseline, tick.price, percent_change
                    );
                }
                Verdict::Breached {
                    baseline,
                    percent_change,
                } => {
                    info!(
                        "Price for {} moved {:+.2}% ({} -> {})",
                        tick.symbol, percent_change, baseline, tick.price
                    );
                    // Sink runs outside the tracker lock.
                    self.sink
                        .alert(Alert::new(tick.symbol.clone(), tick.price, percent_change));
                    alerted.insert(tick.symbol.as_str());
                }
            }
        }

        alerted.len()
    }
}
