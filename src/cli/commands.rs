//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::PathBuf;

use crate::core::models::{JobOutcome, Severity};
use crate::core::notify::Reporter;

/// Commands for the chapter translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate chapter files through the job queue
    Translate {
        /// Input file or directory of chapter files (.txt or .md)
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (default: <input>/translated)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model identifier (see the `models` command for the table)
        #[arg(short, long, default_value = "gemini-2.5-flash")]
        model: String,

        /// File containing custom system instructions
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Sampling temperature
        #[arg(short, long, default_value_t = 0.7)]
        temperature: f32,

        /// Thinking budget in tokens, for models that support it
        #[arg(long, default_value_t = 0)]
        thinking_budget: u32,
    },

    /// Show today's per-model usage against the daily caps
    Usage,

    /// List the supported models and their limits
    Models,
}

/// Load configuration from a JSON file when given, from the environment otherwise
fn load_config(path: &Option<PathBuf>) -> anyhow::Result<crate::core::config::WorkbenchConfig> {
    use crate::core::config::WorkbenchConfig;

    Ok(match path {
        Some(p) => WorkbenchConfig::from_file(p)?,
        None => WorkbenchConfig::from_env()?,
    })
}

/// Forwards scheduler events to an indicatif progress bar
struct BarReporter {
    bar: indicatif::ProgressBar,
}

impl Reporter for BarReporter {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => self.bar.println(format!("⚠️  {}", message)),
            Severity::Success => self.bar.println(format!("✅ {}", message)),
            Severity::Info => self.bar.println(message.to_string()),
        }
    }

    fn progress(&self, percent: f64, eta_ms: u64) {
        self.bar.set_position(percent.round() as u64);
        if eta_ms > 0 {
            self.bar.set_message(format!("ETA {}s", eta_ms / 1000));
        } else {
            self.bar.set_message("");
        }
    }

    fn job_finished(&self, outcome: &JobOutcome) {
        if outcome.success {
            self.bar
                .println(format!("Translated {} in {}ms", outcome.unit_id, outcome.elapsed_ms));
        }
    }
}

/// Handle the translate command
pub async fn handle_translate(
    config_path: Option<PathBuf>,
    input: PathBuf,
    output: Option<PathBuf>,
    model: String,
    prompt_file: Option<PathBuf>,
    temperature: f32,
    thinking_budget: u32,
) -> anyhow::Result<()> {
    use crate::core::durations::DurationEstimator;
    use crate::core::models::{Chapter, ChapterStatus, SharedChapter};
    use crate::core::queue::Scheduler;
    use crate::core::storage::JsonStore;
    use crate::core::transport::HttpTransport;
    use crate::core::usage::UsageTracker;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::sync::Arc;
    use std::time::Instant;
    use tracing::info;

    let start_time = Instant::now();

    let config = Arc::new(load_config(&config_path)?);
    config.validate()?;

    // Determine output directory
    let output = output.unwrap_or_else(|| {
        if input.is_dir() {
            input.join("translated")
        } else {
            input
                .parent()
                .map(|p| p.join("translated"))
                .unwrap_or_else(|| PathBuf::from("translated"))
        }
    });

    // Find chapter files
    let files: Vec<PathBuf> = if input.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&input)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect();
        files.sort();
        files
    } else {
        vec![input.clone()]
    };

    if files.is_empty() {
        anyhow::bail!("No chapter files found (.txt or .md)");
    }

    let system_prompt = match &prompt_file {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };

    // One shared chapter per file; the file stem doubles as the title
    let chapters: Vec<SharedChapter> = files
        .iter()
        .map(|path| -> anyhow::Result<SharedChapter> {
            let source = std::fs::read_to_string(path)?;
            let title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("chapter")
                .to_string();
            Ok(SharedChapter::new(Chapter::new(title.clone(), title, source)))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!("Starting translation of {} chapter file(s)", chapters.len());
    info!("Input: {}", input.display());
    info!("Output: {}", output.display());
    info!("Model: {}", model);

    let storage = Arc::new(JsonStore::open(&config.state_path));
    let usage = UsageTracker::load(Arc::clone(&config), Arc::clone(&storage));
    usage.sync_shared().await;
    let durations = DurationEstimator::load(storage);
    let transport = Arc::new(HttpTransport::new(Arc::clone(&config))?);

    // Create progress bar
    let pb = ProgressBar::new(100);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/100% {msg}")
        .unwrap()
        .progress_chars("=>-"));
    let reporter = Arc::new(BarReporter { bar: pb.clone() });

    let scheduler = Scheduler::new(transport, config, usage, durations, reporter);
    scheduler
        .start_translation(
            &chapters,
            &model,
            system_prompt.as_deref(),
            temperature,
            thinking_budget,
        )
        .await;
    scheduler.wait_until_idle().await;

    pb.finish_with_message("Completed");

    // Write results
    std::fs::create_dir_all(&output)?;
    let mut translated = 0;
    let mut failed = 0;
    for (unit, path) in chapters.iter().zip(&files) {
        let chapter = unit.snapshot();
        match chapter.status {
            ChapterStatus::Done => {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("chapter");
                std::fs::write(
                    output.join(format!("{}_translated.md", stem)),
                    &chapter.translated_text,
                )?;
                translated += 1;
            }
            ChapterStatus::Failed => {
                failed += 1;
                eprintln!("Error translating {}: {}", path.display(), chapter.translated_text);
            }
            _ => {}
        }
    }

    let duration = start_time.elapsed();
    info!(
        "Completed: {} translated, {} failed in {:?}",
        translated, failed, duration
    );

    println!("\n✅ Translation completed!");
    println!("   Translated: {}", translated);
    println!("   Failed: {}", failed);
    println!("   Output: {}", output.display());
    println!("   Time: {:?}", duration);

    Ok(())
}

/// Handle the usage command
pub async fn handle_usage(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use crate::core::storage::JsonStore;
    use crate::core::usage::UsageTracker;
    use std::sync::Arc;

    let config = Arc::new(load_config(&config_path)?);
    let storage = Arc::new(JsonStore::open(&config.state_path));
    let usage = UsageTracker::load(Arc::clone(&config), storage);
    usage.sync_shared().await;

    println!("📊 Daily usage:");
    for model in &config.models {
        let count = usage.current_count(&model.id).await;
        let marker = if count >= model.daily_cap {
            "  ⚠️  limit reached"
        } else {
            ""
        };
        println!("   {:<28} {:>4} / {}{}", model.id, count, model.daily_cap, marker);
    }

    Ok(())
}

/// Handle the models command
pub async fn handle_models() -> anyhow::Result<()> {
    use crate::core::config::WorkbenchConfig;

    let config = WorkbenchConfig::default();

    println!("Supported models:");
    for model in &config.models {
        println!(
            "   {:<28} provider={:<9} rpm={:<3} daily cap={:<5} max tokens={}{}",
            model.id,
            model.provider.to_string(),
            model.requests_per_minute,
            model.daily_cap,
            model.max_output_tokens,
            if model.supports_thinking { "  (thinking)" } else { "" }
        );
    }

    Ok(())
}
