//! Single-flight translation job queue and drain loop

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::core::config::{WorkbenchConfig, DEFAULT_SYSTEM_PROMPT};
use crate::core::durations::DurationEstimator;
use crate::core::errors::TranslationError;
use crate::core::models::{
    ChapterStatus, Job, JobOutcome, KeyInfo, Severity, SharedChapter,
};
use crate::core::notify::Reporter;
use crate::core::transport::{StreamJob, Transport};
use crate::core::usage::UsageTracker;

/// Placeholder shown in a chapter while its retry is queued
const RETRY_PLACEHOLDER: &str = "Retrying…";

/// Serializes all translation jobs through one drain loop.
///
/// At most one transport call is in flight system-wide: jobs run strictly
/// sequentially, paced by the target model's per-minute rate limit. Credential
/// rotation state and provider rate limits are both defined per sequential
/// request, which is why no parallelism exists across jobs.
#[derive(Clone)]
pub struct Scheduler {
    transport: Arc<dyn Transport>,
    config: Arc<WorkbenchConfig>,
    usage: UsageTracker,
    durations: DurationEstimator,
    reporter: Arc<dyn Reporter>,
    queue: Arc<Mutex<VecDeque<Job>>>,
    processing: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    total_at_start: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<WorkbenchConfig>,
        usage: UsageTracker,
        durations: DurationEstimator,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            transport,
            config,
            usage,
            durations,
            reporter,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            processing: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            total_at_start: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Enqueue every eligible chapter for translation and start draining.
    ///
    /// Eligible means non-empty source text and `Idle` or `Failed` state.
    /// Returns immediately; progress is observed through the reporter and the
    /// chapters' own state transitions.
    pub async fn start_translation(
        &self,
        units: &[SharedChapter],
        model_id: &str,
        system_prompt: Option<&str>,
        temperature: f32,
        thinking_budget: u32,
    ) {
        let eligible: Vec<SharedChapter> = units
            .iter()
            .filter(|u| {
                u.with(|c| {
                    !c.source_text.trim().is_empty()
                        && matches!(c.status, ChapterStatus::Idle | ChapterStatus::Failed)
                })
            })
            .cloned()
            .collect();

        if eligible.is_empty() {
            self.reporter
                .notify(Severity::Info, "No new or failed chapters to translate.");
            return;
        }

        if self.processing.load(Ordering::Acquire) {
            self.reporter
                .notify(Severity::Info, "A translation run is already in progress.");
            return;
        }

        if !self.admit(model_id).await {
            return;
        }

        self.reporter.notify(
            Severity::Info,
            &format!("Started translating {} chapter(s).", eligible.len()),
        );

        self.total_at_start.store(eligible.len(), Ordering::Release);
        self.reporter.progress(0.0, 0);

        // Visible as one state transition before any network call begins
        for unit in &eligible {
            unit.with(|c| c.status = ChapterStatus::InProgress);
        }

        let prompt = system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string();
        {
            let mut queue = self.lock_queue();
            for unit in eligible {
                queue.push_back(Job {
                    unit,
                    model_id: model_id.to_string(),
                    system_prompt: prompt.clone(),
                    temperature,
                    thinking_budget,
                });
            }
        }

        // A stop requested after the previous run ended must not cancel this one
        self.stop_requested.store(false, Ordering::Release);
        self.spawn_drain();
    }

    /// Queue one chapter ahead of the backlog and start draining if idle.
    ///
    /// A retry is admitted while a bulk run is in progress; it preempts the
    /// remaining bulk jobs but never the job already in flight.
    pub async fn retry_translation(
        &self,
        unit: &SharedChapter,
        model_id: &str,
        system_prompt: Option<&str>,
        temperature: f32,
        thinking_budget: u32,
    ) {
        if !self.admit(model_id).await {
            return;
        }

        let title = unit.with(|c| {
            c.status = ChapterStatus::InProgress;
            c.translated_text = RETRY_PLACEHOLDER.to_string();
            c.title.clone()
        });
        info!("Retrying translation of \"{}\"", title);

        if !self.processing.load(Ordering::Acquire) {
            self.total_at_start.store(1, Ordering::Release);
            self.reporter.progress(0.0, 0);
        }

        self.lock_queue().push_front(Job {
            unit: unit.clone(),
            model_id: model_id.to_string(),
            system_prompt: system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
            temperature,
            thinking_budget,
        });

        self.spawn_drain();
    }

    /// Advisory stop: takes effect at the next queue-pop boundary. The job
    /// currently streaming always runs to completion or failure.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Wait until the drain loop has released the in-flight flag
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_processing() {
                return;
            }
            notified.await;
        }
    }

    /// Configuration and admission checks shared by start and retry.
    /// Failures surface as notifications; no queue state is touched.
    async fn admit(&self, model_id: &str) -> bool {
        let Some(spec) = self.config.model(model_id) else {
            self.reporter.notify(
                Severity::Error,
                &TranslationError::UnknownModel {
                    model: model_id.to_string(),
                }
                .to_string(),
            );
            return false;
        };

        if self.transport.key_info(spec.provider).total == 0 {
            self.reporter.notify(
                Severity::Error,
                &TranslationError::NoKeysConfigured {
                    provider: spec.provider.to_string(),
                }
                .to_string(),
            );
            return false;
        }

        if self.usage.is_over_limit(model_id).await {
            self.reporter.notify(
                Severity::Error,
                &TranslationError::DailyLimitReached {
                    model: model_id.to_string(),
                    cap: spec.daily_cap,
                }
                .to_string(),
            );
            return false;
        }

        true
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the in-flight flag and spawn the drain loop; a no-op when a
    /// drain is already running
    fn spawn_drain(&self) {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.drain().await });
        }
    }

    async fn drain(&self) {
        let average_ms = self.durations.average_ms();
        let mut succeeded = 0u32;
        let mut failed = 0u32;

        loop {
            if self.stop_requested.swap(false, Ordering::AcqRel) {
                let cancelled: Vec<Job> = self.lock_queue().drain(..).collect();
                for job in &cancelled {
                    job.unit.with(|c| c.status = ChapterStatus::Idle);
                }
                self.reporter.notify(
                    Severity::Info,
                    &format!(
                        "Translation stopped; {} pending chapter(s) returned to idle.",
                        cancelled.len()
                    ),
                );
                break;
            }

            let (job, remaining) = {
                let mut queue = self.lock_queue();
                let remaining = queue.len();
                (queue.pop_front(), remaining)
            };
            let Some(job) = job else { break };

            let total = self.total_at_start.load(Ordering::Acquire);
            if total > 0 {
                let done = total.saturating_sub(remaining);
                let percent = (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                self.reporter
                    .progress(percent, average_ms * remaining as u64);
            }

            let outcome = self.run_job(&job).await;
            if outcome.success {
                succeeded += 1;
                self.usage.increment(&job.model_id, 1).await;
                self.durations.record(outcome.elapsed_ms);
            } else {
                failed += 1;
            }
            self.reporter.job_finished(&outcome);

            if !self.lock_queue().is_empty() {
                let delay = self.config.pacing_interval_ms(&job.model_id);
                debug!("Pacing {}ms before the next job", delay);
                sleep(Duration::from_millis(delay)).await;
            }
        }

        self.reporter.progress(100.0, 0);
        if succeeded > 0 {
            self.reporter.notify(
                Severity::Success,
                &format!("Successfully translated {} chapter(s).", succeeded),
            );
        }
        if failed > 0 {
            self.reporter.notify(
                Severity::Error,
                &format!("Failed to translate {} chapter(s).", failed),
            );
        }

        self.total_at_start.store(0, Ordering::Release);
        self.processing.store(false, Ordering::Release);

        // A retry enqueued between the final pop and the flag release would
        // otherwise sit in the queue until the next run
        if !self.lock_queue().is_empty() {
            self.spawn_drain();
        }
        self.idle.notify_waiters();
    }

    async fn run_job(&self, job: &Job) -> JobOutcome {
        let started = Instant::now();
        // Starting fresh: the old output (or retry placeholder) is cleared
        // before the first delta lands
        let (unit_id, title, source) = job.unit.with(|c| {
            c.translated_text.clear();
            (c.id.clone(), c.title.clone(), c.source_text.clone())
        });
        info!(
            "Starting translation of \"{}\" with model {}",
            title, job.model_id
        );

        let result = match self.config.model(&job.model_id) {
            None => Err(TranslationError::UnknownModel {
                model: job.model_id.clone(),
            }),
            Some(spec) => {
                let unit = job.unit.clone();
                let mut on_delta = move |text: &str| {
                    unit.with(|c| c.translated_text.push_str(text));
                };

                let reporter = Arc::clone(&self.reporter);
                let model_id = job.model_id.clone();
                let mut on_rotate = move |position: KeyInfo| {
                    reporter.notify(
                        Severity::Info,
                        &format!(
                            "Automatically switched to API key {} of {} for {}.",
                            position.current, position.total, model_id
                        ),
                    );
                };

                self.transport
                    .stream(
                        StreamJob {
                            title: &title,
                            source_text: &source,
                            model: spec,
                            system_prompt: &job.system_prompt,
                            temperature: job.temperature,
                            thinking_budget: job.thinking_budget,
                        },
                        &mut on_delta,
                        &mut on_rotate,
                    )
                    .await
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                job.unit.with(|c| c.status = ChapterStatus::Done);
                info!("Successfully translated \"{}\"", title);
                JobOutcome {
                    unit_id,
                    model_id: job.model_id.clone(),
                    success: true,
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => {
                let message = format!("Translation failed ({}): {}", title, e);
                job.unit.with(|c| {
                    c.status = ChapterStatus::Failed;
                    c.translated_text = format!("### {}", message);
                });
                self.reporter.notify(Severity::Error, &message);
                JobOutcome {
                    unit_id,
                    model_id: job.model_id.clone(),
                    success: false,
                    elapsed_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Chapter, Provider};
    use crate::core::notify::test_support::RecordingReporter;
    use crate::core::storage::JsonStore;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    enum Script {
        Success(Vec<&'static str>),
        SuccessAfterRotations(usize, Vec<&'static str>),
        Fail(TranslationError),
    }

    struct MockTransport {
        script: Mutex<VecDeque<Script>>,
        /// Titles in call order
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        key_total: usize,
        /// Each call consumes one permit before producing its result
        gate: Option<Arc<Semaphore>>,
    }

    impl MockTransport {
        fn scripted(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                key_total: 1,
                gate: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn stream<'a>(
            &'a self,
            job: StreamJob<'a>,
            on_delta: crate::core::transport::DeltaSink<'a>,
            on_rotate: crate::core::transport::RotateSink<'a>,
        ) -> BoxFuture<'a, crate::core::errors::Result<()>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(job.title.to_string());
                if let Some(gate) = &self.gate {
                    gate.acquire().await.unwrap().forget();
                }

                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);

                // Yield so an overlapping call would be observable
                tokio::time::sleep(Duration::from_millis(2)).await;

                let step = self
                    .script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Script::Success(vec!["out"]));
                let result = match step {
                    Script::Success(deltas) => {
                        for d in deltas {
                            on_delta(d);
                        }
                        Ok(())
                    }
                    Script::SuccessAfterRotations(n, deltas) => {
                        for i in 0..n {
                            on_rotate(KeyInfo {
                                total: self.key_total.max(n + 1),
                                current: i + 2,
                            });
                        }
                        for d in deltas {
                            on_delta(d);
                        }
                        Ok(())
                    }
                    Script::Fail(err) => Err(err),
                };

                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            })
        }

        fn key_info(&self, _provider: Provider) -> KeyInfo {
            KeyInfo {
                total: self.key_total,
                current: if self.key_total > 0 { 1 } else { 0 },
            }
        }
    }

    /// Yield until the transport has seen `n` calls
    async fn wait_for_calls(transport: &MockTransport, n: usize) {
        while transport.calls().len() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn fast_config() -> WorkbenchConfig {
        let mut config = WorkbenchConfig::default();
        config.pacing_buffer_ms = 0;
        for model in &mut config.models {
            model.requests_per_minute = 60_000; // 1ms pacing interval
        }
        config
    }

    struct Harness {
        scheduler: Scheduler,
        transport: Arc<MockTransport>,
        reporter: Arc<RecordingReporter>,
        usage: UsageTracker,
        _dir: tempfile::TempDir,
    }

    fn harness(config: WorkbenchConfig, transport: MockTransport) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStore::open(dir.path().join("state.json")));
        let config = Arc::new(config);
        let transport = Arc::new(transport);
        let reporter = Arc::new(RecordingReporter::default());
        let usage = UsageTracker::load(Arc::clone(&config), Arc::clone(&storage));
        let scheduler = Scheduler::new(
            transport.clone(),
            config,
            usage.clone(),
            DurationEstimator::load(storage),
            reporter.clone(),
        );
        Harness {
            scheduler,
            transport,
            reporter,
            usage,
            _dir: dir,
        }
    }

    fn unit(id: &str, source: &str, status: ChapterStatus) -> SharedChapter {
        let mut chapter = Chapter::new(id, id, source);
        chapter.status = status;
        SharedChapter::new(chapter)
    }

    const MODEL: &str = "gemini-2.5-flash";

    #[tokio::test]
    async fn test_bulk_filters_to_eligible_units() {
        let h = harness(fast_config(), MockTransport::scripted(vec![]));
        let units = vec![
            unit("a", "text", ChapterStatus::Idle),
            unit("b", "", ChapterStatus::Idle),
            unit("c", "text", ChapterStatus::Done),
            unit("d", "text", ChapterStatus::Failed),
            unit("e", "   ", ChapterStatus::Idle),
        ];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert_eq!(h.transport.calls(), vec!["a", "d"]);
        assert_eq!(units[0].status(), ChapterStatus::Done);
        assert_eq!(units[2].status(), ChapterStatus::Done);
        assert_eq!(units[3].status(), ChapterStatus::Done);
        assert_eq!(units[1].status(), ChapterStatus::Idle);
    }

    #[tokio::test]
    async fn test_no_eligible_units_is_an_informational_no_op() {
        let h = harness(fast_config(), MockTransport::scripted(vec![]));
        let units = vec![unit("a", "", ChapterStatus::Idle)];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;

        assert!(!h.scheduler.is_processing());
        assert!(h.transport.calls().is_empty());
        let infos = h.reporter.messages(Severity::Info);
        assert!(infos.iter().any(|m| m.contains("No new or failed")));
    }

    #[tokio::test]
    async fn test_at_most_one_transport_call_in_flight() {
        let h = harness(fast_config(), MockTransport::scripted(vec![]));
        let units: Vec<SharedChapter> = (0..4)
            .map(|i| unit(&format!("u{}", i), "text", ChapterStatus::Idle))
            .collect();

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert_eq!(h.transport.calls().len(), 4);
        assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_preempts_pending_bulk_jobs() {
        let gate = Arc::new(Semaphore::new(0));
        let mut transport = MockTransport::scripted(vec![]);
        transport.gate = Some(gate.clone());
        let h = harness(fast_config(), transport);

        let units = vec![
            unit("a", "text", ChapterStatus::Idle),
            unit("b", "text", ChapterStatus::Idle),
            unit("c", "text", ChapterStatus::Idle),
        ];
        let retried = unit("x", "text", ChapterStatus::Failed);

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        // First job is parked on the gate; queue still holds b and c
        wait_for_calls(&h.transport, 1).await;
        h.scheduler
            .retry_translation(&retried, MODEL, None, 0.7, 0)
            .await;
        assert_eq!(retried.snapshot().translated_text, RETRY_PLACEHOLDER);

        gate.add_permits(4);
        h.scheduler.wait_until_idle().await;

        assert_eq!(h.transport.calls(), vec!["a", "x", "b", "c"]);
        assert_eq!(retried.status(), ChapterStatus::Done);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation_and_summary() {
        let h = harness(
            fast_config(),
            MockTransport::scripted(vec![
                Script::Success(vec!["one"]),
                Script::Fail(TranslationError::ApiError {
                    status: 400,
                    message: "bad request".into(),
                }),
                Script::Success(vec!["three"]),
            ]),
        );
        let units = vec![
            unit("a", "text", ChapterStatus::Idle),
            unit("b", "text", ChapterStatus::Idle),
            unit("c", "text", ChapterStatus::Idle),
        ];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert_eq!(units[0].status(), ChapterStatus::Done);
        assert_eq!(units[1].status(), ChapterStatus::Failed);
        assert_eq!(units[2].status(), ChapterStatus::Done);
        assert!(units[1]
            .snapshot()
            .translated_text
            .starts_with("### Translation failed"));

        let successes = h.reporter.messages(Severity::Success);
        assert!(successes.iter().any(|m| m.contains("2 chapter(s)")));
        let errors = h.reporter.messages(Severity::Error);
        assert!(errors.iter().any(|m| m.contains("1 chapter(s)")));

        let outcomes = h.reporter.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().filter(|o| o.success).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_empty_stream_surfaces_as_failure() {
        let h = harness(
            fast_config(),
            MockTransport::scripted(vec![Script::Fail(TranslationError::EmptyResponse)]),
        );
        let units = vec![unit("a", "text", ChapterStatus::Idle)];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert_eq!(units[0].status(), ChapterStatus::Failed);
        assert!(units[0].snapshot().translated_text.contains("Empty response"));
        assert_eq!(h.usage.current_count(MODEL).await, 0);
    }

    #[tokio::test]
    async fn test_daily_cap_gates_admission() {
        let mut config = fast_config();
        if let Some(model) = config.models.iter_mut().find(|m| m.id == MODEL) {
            model.daily_cap = 0;
        }
        let h = harness(config, MockTransport::scripted(vec![]));
        let units = vec![unit("a", "text", ChapterStatus::Idle)];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert!(h.transport.calls().is_empty());
        assert_eq!(units[0].status(), ChapterStatus::Idle);
        assert_eq!(h.usage.current_count(MODEL).await, 0);
        let errors = h.reporter.messages(Severity::Error);
        assert!(errors.iter().any(|m| m.contains("Daily limit reached")));
    }

    #[tokio::test]
    async fn test_no_keys_fails_fast() {
        let mut transport = MockTransport::scripted(vec![]);
        transport.key_total = 0;
        let h = harness(fast_config(), transport);
        let units = vec![unit("a", "text", ChapterStatus::Idle)];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;

        assert!(h.transport.calls().is_empty());
        assert_eq!(units[0].status(), ChapterStatus::Idle);
        let errors = h.reporter.messages(Severity::Error);
        assert!(errors.iter().any(|m| m.contains("No API keys configured")));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let h = harness(fast_config(), MockTransport::scripted(vec![]));
        let units: Vec<SharedChapter> = (0..3)
            .map(|i| unit(&format!("u{}", i), "text", ChapterStatus::Idle))
            .collect();

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        let values = h.reporter.progress_values.lock().unwrap().clone();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_rotation_events_surface_as_info() {
        let h = harness(
            fast_config(),
            MockTransport::scripted(vec![Script::SuccessAfterRotations(2, vec!["ok"])]),
        );
        let units = vec![unit("a", "text", ChapterStatus::Idle)];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert_eq!(units[0].status(), ChapterStatus::Done);
        let infos = h.reporter.messages(Severity::Info);
        let switches: Vec<_> = infos
            .iter()
            .filter(|m| m.contains("switched to API key"))
            .collect();
        assert_eq!(switches.len(), 2);
    }

    #[tokio::test]
    async fn test_usage_counts_successes_only() {
        let h = harness(
            fast_config(),
            MockTransport::scripted(vec![
                Script::Success(vec!["one"]),
                Script::Fail(TranslationError::ApiError {
                    status: 500,
                    message: "boom".into(),
                }),
            ]),
        );
        let units = vec![
            unit("a", "text", ChapterStatus::Idle),
            unit("b", "text", ChapterStatus::Idle),
        ];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        h.scheduler.wait_until_idle().await;

        assert_eq!(h.usage.current_count(MODEL).await, 1);
    }

    #[tokio::test]
    async fn test_second_bulk_run_is_rejected_while_processing() {
        let gate = Arc::new(Semaphore::new(0));
        let mut transport = MockTransport::scripted(vec![]);
        transport.gate = Some(gate.clone());
        let h = harness(fast_config(), transport);

        let first = vec![unit("a", "text", ChapterStatus::Idle)];
        let second = vec![unit("b", "text", ChapterStatus::Idle)];

        h.scheduler
            .start_translation(&first, MODEL, None, 0.7, 0)
            .await;
        h.scheduler
            .start_translation(&second, MODEL, None, 0.7, 0)
            .await;

        gate.add_permits(2);
        h.scheduler.wait_until_idle().await;

        assert_eq!(h.transport.calls(), vec!["a"]);
        assert_eq!(second[0].status(), ChapterStatus::Idle);
        let infos = h.reporter.messages(Severity::Info);
        assert!(infos.iter().any(|m| m.contains("already in progress")));
    }

    #[tokio::test]
    async fn test_stop_takes_effect_at_the_next_pop_boundary() {
        let gate = Arc::new(Semaphore::new(0));
        let mut transport = MockTransport::scripted(vec![]);
        transport.gate = Some(gate.clone());
        let h = harness(fast_config(), transport);

        let units = vec![
            unit("a", "text", ChapterStatus::Idle),
            unit("b", "text", ChapterStatus::Idle),
            unit("c", "text", ChapterStatus::Idle),
        ];

        h.scheduler
            .start_translation(&units, MODEL, None, 0.7, 0)
            .await;
        // Job a is in flight; stop before it completes
        wait_for_calls(&h.transport, 1).await;
        h.scheduler.request_stop();
        gate.add_permits(3);
        h.scheduler.wait_until_idle().await;

        // The in-flight job ran to completion, the rest were cancelled
        assert_eq!(h.transport.calls(), vec!["a"]);
        assert_eq!(units[0].status(), ChapterStatus::Done);
        assert_eq!(units[1].status(), ChapterStatus::Idle);
        assert_eq!(units[2].status(), ChapterStatus::Idle);
    }
}
