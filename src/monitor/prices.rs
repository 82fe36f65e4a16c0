use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last alerted reference price per symbol.
///
/// A baseline of `0.0` means "known symbol, price not learned yet". Every
/// operation holds the lock only for the map mutation itself.
#[derive(Debug, Default)]
pub struct PriceTracker {
    baselines: Mutex<HashMap<String, f64>>,
}

impl PriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, f64>> {
        self.baselines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `price` unless the symbol already has a baseline.
    /// Returns true when an entry was created.
    pub fn seed(&self, symbol: &str, price: f64) -> bool {
        let mut map = self.map();
        if map.contains_key(symbol) {
            return false;
        }
        map.insert(symbol.to_string(), price);
        true
    }

    pub fn try_get(&self, symbol: &str) -> Option<f64> {
        self.map().get(symbol).copied()
    }

    pub fn set_baseline(&self, symbol: &str, price: f64) {
        self.map().insert(symbol.to_string(), price);
    }

    pub fn remove(&self, symbol: &str) -> Option<f64> {
        self.map().remove(symbol)
    }

    /// Atomic read-modify-write of one baseline. `decide` sees the current
    /// baseline and returns the value to store (or `None` to leave it) along
    /// with a result for the caller.
    pub fn update<R>(&self, symbol: &str, decide: impl FnOnce(Option<f64>) -> (Option<f64>, R)) -> R {
        let mut map = self.map();
        let (next, result) = decide(map.get(symbol).copied());
        if let Some(price) = next {
            match map.get_mut(symbol) {
                Some(baseline) => *baseline = price,
                None => {
                    map.insert(symbol.to_string(), price);
                }
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
