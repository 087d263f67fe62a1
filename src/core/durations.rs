//! Rolling window of past job durations, used for the ETA display

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::core::storage::JsonStore;

const STORAGE_KEY: &str = "translation_durations";
const MAX_SAMPLES: usize = 20;
const FALLBACK_AVERAGE_MS: u64 = 30_000;

/// Bounded FIFO of elapsed-time samples, persisted across runs.
///
/// Display-only: the average feeds the ETA and never affects scheduling.
#[derive(Debug, Clone)]
pub struct DurationEstimator {
    samples: Arc<Mutex<VecDeque<u64>>>,
    storage: Arc<JsonStore>,
}

impl DurationEstimator {
    /// Load persisted samples from the store
    pub fn load(storage: Arc<JsonStore>) -> Self {
        let samples: VecDeque<u64> = storage
            .get::<Vec<u64>>(STORAGE_KEY)
            .map(|v| v.into_iter().take(MAX_SAMPLES).collect())
            .unwrap_or_default();
        Self {
            samples: Arc::new(Mutex::new(samples)),
            storage,
        }
    }

    /// Append a sample, evicting the oldest beyond capacity
    pub fn record(&self, elapsed_ms: u64) {
        let snapshot: Vec<u64> = {
            let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
            samples.push_back(elapsed_ms);
            while samples.len() > MAX_SAMPLES {
                samples.pop_front();
            }
            samples.iter().copied().collect()
        };
        if let Err(e) = self.storage.set(STORAGE_KEY, &snapshot) {
            warn!("Could not persist translation durations: {}", e);
        }
    }

    /// Arithmetic mean of the window, or a fixed fallback when empty
    pub fn average_ms(&self) -> u64 {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.is_empty() {
            return FALLBACK_AVERAGE_MS;
        }
        samples.iter().sum::<u64>() / samples.len() as u64
    }
}
