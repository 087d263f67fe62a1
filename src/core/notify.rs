//! Human-facing event sink for scheduler progress and outcomes

use tracing::{error, info};

use crate::core::models::{JobOutcome, Severity};

/// Observer of scheduler events.
///
/// Implementations must be cheap and non-blocking; the drain loop calls these
/// inline between jobs.
pub trait Reporter: Send + Sync {
    /// A short human-readable message (toast/log style)
    fn notify(&self, severity: Severity, message: &str);

    /// Queue progress in percent plus the estimated remaining time
    fn progress(&self, percent: f64, eta_ms: u64);

    /// Explicit per-job result, published alongside the chapter mutation
    fn job_finished(&self, outcome: &JobOutcome);
}

/// Default reporter that forwards everything to the tracing subscriber
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info | Severity::Success => info!("{}", message),
            Severity::Error => error!("{}", message),
        }
    }

    fn progress(&self, percent: f64, eta_ms: u64) {
        info!("Progress {:.0}%, ETA {}s", percent, eta_ms / 1000);
    }

    fn job_finished(&self, outcome: &JobOutcome) {
        if outcome.success {
            info!(
                "Job for {} finished in {}ms",
                outcome.unit_id, outcome.elapsed_ms
            );
        } else {
            error!(
                "Job for {} failed: {}",
                outcome.unit_id,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
