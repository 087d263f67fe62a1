//! Chapter Translator - streaming multi-provider translation engine
//!
//! This library drives batch translation of novel chapters through a serial
//! job queue, streaming output from Gemini, Cerebras or any OpenAI-compatible
//! endpoint with automatic API key rotation, overload backoff and daily usage
//! accounting.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

pub mod cli;
pub mod core;

// Re-export key types for convenience
pub use crate::core::{
    config::{ModelSpec, WorkbenchConfig},
    errors::TranslationError,
    models::{Chapter, ChapterStatus, JobOutcome, Provider, SharedChapter},
    notify::{LogReporter, Reporter},
    queue::Scheduler,
    transport::{HttpTransport, Transport},
    usage::UsageTracker,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
