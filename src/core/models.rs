//! Core data models for the translation workbench

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Which backend serves a given model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Google Gemini streaming API
    Gemini,
    /// Cerebras chat-completions API
    Cerebras,
    /// Any OpenAI-compatible chat-completions endpoint
    GptOss,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Cerebras => write!(f, "cerebras"),
            Provider::GptOss => write!(f, "gpt-oss"),
        }
    }
}

impl Provider {
    /// Resolve the provider from a model identifier prefix
    pub fn for_model(model_id: &str) -> Provider {
        if model_id.starts_with("cerebras/") {
            Provider::Cerebras
        } else if model_id.starts_with("gpt-oss/") {
            Provider::GptOss
        } else {
            Provider::Gemini
        }
    }
}

/// Lifecycle state of one chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChapterStatus {
    /// Never translated (or reset by the caller)
    Idle,
    /// Owned by the scheduler, output being streamed
    InProgress,
    /// Terminal success
    Done,
    /// Terminal failure; eligible for retry
    Failed,
}

/// One chapter awaiting translation.
///
/// `source_text` is never mutated by the engine. `translated_text` is
/// append-only while the chapter is `InProgress` and owned by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub source_text: String,
    pub translated_text: String,
    pub status: ChapterStatus,
}

impl Chapter {
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source_text: source.into(),
            translated_text: String::new(),
            status: ChapterStatus::Idle,
        }
    }
}

/// A chapter shared between the caller and the scheduler.
///
/// Observers see streamed partial output through this handle while a job is in
/// flight. Lock sections are short and never held across awaits, so a plain
/// mutex is enough.
#[derive(Debug, Clone)]
pub struct SharedChapter {
    inner: Arc<Mutex<Chapter>>,
}

impl SharedChapter {
    pub fn new(chapter: Chapter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chapter)),
        }
    }

    /// Run `f` against the chapter under the lock
    pub fn with<R>(&self, f: impl FnOnce(&mut Chapter) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn id(&self) -> String {
        self.with(|c| c.id.clone())
    }

    pub fn status(&self) -> ChapterStatus {
        self.with(|c| c.status)
    }

    /// Clone out the current chapter contents
    pub fn snapshot(&self) -> Chapter {
        self.with(|c| c.clone())
    }
}

/// One queued translation attempt binding a chapter, model and instructions
#[derive(Debug, Clone)]
pub struct Job {
    pub unit: SharedChapter,
    pub model_id: String,
    pub system_prompt: String,
    pub temperature: f32,
    /// Reasoning budget; only forwarded to models that support it
    pub thinking_budget: u32,
}

/// Credential pool position, for UI and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Number of keys configured
    pub total: usize,
    /// 1-based ordinal of the key about to be used; 0 when none remain
    pub current: usize,
}

/// Per-model request counts for one calendar day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Local date, `YYYY-MM-DD`
    pub date: String,
    pub counts: HashMap<String, u32>,
}

impl DailyUsage {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            counts: HashMap::new(),
        }
    }
}

/// Severity of a human-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Explicit per-job result published alongside the chapter state mutation
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub unit_id: String,
    pub model_id: String,
    pub success: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}
