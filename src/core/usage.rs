//! Daily per-model usage accounting and the shared-counter sync

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::config::WorkbenchConfig;
use crate::core::models::DailyUsage;
use crate::core::storage::JsonStore;

const STORAGE_KEY: &str = "daily_translation_usage";

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Counts successful jobs per model per calendar day and gates admission
/// against each model's daily cap.
///
/// The local record is authoritative. The shared remote counter is synced
/// best-effort: a failed push or fetch is logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    record: Arc<RwLock<DailyUsage>>,
    storage: Arc<JsonStore>,
    config: Arc<WorkbenchConfig>,
    client: reqwest::Client,
}

impl UsageTracker {
    /// Load today's record from local storage; stale records read as zero
    pub fn load(config: Arc<WorkbenchConfig>, storage: Arc<JsonStore>) -> Self {
        let mut record = storage
            .get::<DailyUsage>(STORAGE_KEY)
            .unwrap_or_else(|| DailyUsage::empty(today()));
        if record.date != today() {
            record = DailyUsage::empty(today());
        }
        Self {
            record: Arc::new(RwLock::new(record)),
            storage,
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Adopt the shared counter if it is current, or reset it if it is stale.
    /// Best effort on both sides; local state is untouched on any failure.
    pub async fn sync_shared(&self) {
        let Some(url) = &self.config.usage_sync_url else {
            return;
        };

        match self.fetch_shared(url).await {
            Some(shared) if shared.date == today() => {
                let snapshot = {
                    let mut record = self.record.write().await;
                    record.counts = shared.counts;
                    record.clone()
                };
                self.persist(&snapshot);
                info!("Adopted shared usage counts for {}", snapshot.date);
            }
            Some(_) => {
                // Shared record is from a previous day; push today's instead
                let snapshot = self.record.read().await.clone();
                self.push_shared(url.clone(), snapshot).await;
            }
            None => {}
        }
    }

    /// Today's count for a model
    pub async fn current_count(&self, model_id: &str) -> u32 {
        let mut record = self.record.write().await;
        roll_over(&mut record);
        record.counts.get(model_id).copied().unwrap_or(0)
    }

    /// Whether a model has reached its daily cap
    pub async fn is_over_limit(&self, model_id: &str) -> bool {
        let Some(cap) = self.config.model(model_id).map(|m| m.daily_cap) else {
            return false;
        };
        self.current_count(model_id).await >= cap
    }

    /// Add to today's count, persist locally, then push the full record to the
    /// shared counter without blocking the caller
    pub async fn increment(&self, model_id: &str, by: u32) {
        if by == 0 {
            return;
        }
        let snapshot = {
            let mut record = self.record.write().await;
            roll_over(&mut record);
            *record.counts.entry(model_id.to_string()).or_insert(0) += by;
            record.clone()
        };
        debug!(
            "Usage for {} is now {}",
            model_id,
            snapshot.counts.get(model_id).copied().unwrap_or(0)
        );
        self.persist(&snapshot);

        if let Some(url) = self.config.usage_sync_url.clone() {
            let tracker = self.clone();
            tokio::spawn(async move {
                tracker.push_shared(url, snapshot).await;
            });
        }
    }

    fn persist(&self, record: &DailyUsage) {
        if let Err(e) = self.storage.set(STORAGE_KEY, record) {
            warn!("Could not persist daily usage: {}", e);
        }
    }

    async fn fetch_shared(&self, url: &str) -> Option<DailyUsage> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                response.json::<DailyUsage>().await.ok()
            }
            Ok(response) => {
                warn!("Shared usage fetch returned status {}", response.status());
                None
            }
            Err(e) => {
                warn!("Could not fetch shared usage data: {}", e);
                None
            }
        }
    }

    async fn push_shared(&self, url: String, record: DailyUsage) {
        match self.client.put(&url).json(&record).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("Shared usage push returned status {}", response.status());
            }
            Err(e) => {
                warn!("Could not push shared usage data: {}", e);
            }
            _ => {}
        }
    }
}

fn roll_over(record: &mut DailyUsage) {
    let now = today();
    if record.date != now {
        *record = DailyUsage::empty(now);
    }
}
