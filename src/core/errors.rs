//! Custom error types for translation operations

use thiserror::Error;

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// No API keys configured for the provider at all
    #[error("No API keys configured for {provider}. Add at least one key in the settings")]
    NoKeysConfigured {
        provider: String,
    },

    /// Every configured key for the provider was rejected during one job
    #[error("All {provider} API keys have been tried and failed, likely due to usage limits or invalid keys")]
    KeysExhausted {
        provider: String,
    },

    /// The current key was rejected (quota, rate limit, invalid key)
    #[error("API key rejected ({status}): {message}")]
    KeyRejected {
        status: u16,
        message: String,
    },

    /// Provider temporarily overloaded; retried with backoff before surfacing
    #[error("Provider overloaded: {message}")]
    Overloaded {
        message: String,
    },

    /// Stream closed cleanly but produced no text
    #[error("Empty response from provider. The request may have been blocked by safety filters")]
    EmptyResponse,

    /// Daily request cap reached for a model
    #[error("Daily limit reached for {model} ({cap} requests)")]
    DailyLimitReached {
        model: String,
        cap: u32,
    },

    /// Any other provider-side failure; fatal, no retry
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    /// Model identifier not present in the model table
    #[error("Unknown model: {model}")]
    UnknownModel {
        model: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Retry class of a provider failure, decided once per attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rotate to the next API key
    RotateKey,
    /// Retry the same key with exponential backoff
    Backoff,
    /// Fail the job immediately
    Fatal,
}

impl TranslationError {
    /// How the transport driver should react to this error
    pub fn class(&self) -> FailureClass {
        match self {
            TranslationError::KeyRejected { .. } => FailureClass::RotateKey,
            TranslationError::Overloaded { .. } => FailureClass::Backoff,
            _ => FailureClass::Fatal,
        }
    }
}

/// Classify a provider error response into the retry taxonomy.
///
/// Status codes are authoritative; the lowercased message substrings are a
/// fallback for providers that bury the real condition in the body text.
pub fn classify_provider_error(status: u16, message: &str) -> TranslationError {
    let lowered = message.to_lowercase();

    if status == 401 || status == 429 {
        return TranslationError::KeyRejected {
            status,
            message: message.to_string(),
        };
    }
    if status == 503 {
        return TranslationError::Overloaded {
            message: message.to_string(),
        };
    }

    if lowered.contains("quota")
        || lowered.contains("limit")
        || lowered.contains("api key not valid")
    {
        return TranslationError::KeyRejected {
            status,
            message: message.to_string(),
        };
    }
    if lowered.contains("overloaded") || lowered.contains("unavailable") {
        return TranslationError::Overloaded {
            message: message.to_string(),
        };
    }

    TranslationError::ApiError {
        status,
        message: message.to_string(),
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;
