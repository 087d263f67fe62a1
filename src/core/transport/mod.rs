//! Streaming provider transports with key failover and overload backoff
//!
//! One driver owns the retry/rotation skeleton; the provider modules only
//! build requests and decode their chunk framing.

pub mod cerebras;
pub mod gemini;
pub mod gpt_oss;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::config::{ModelSpec, WorkbenchConfig};
use crate::core::errors::{classify_provider_error, FailureClass, Result, TranslationError};
use crate::core::keys::{mask_key, CredentialPool};
use crate::core::models::{KeyInfo, Provider};
use crate::core::sse::{SseDecoder, SseEvent};

/// Parameters of one logical streaming request
#[derive(Debug, Clone, Copy)]
pub struct StreamJob<'a> {
    pub title: &'a str,
    pub source_text: &'a str,
    pub model: &'a ModelSpec,
    pub system_prompt: &'a str,
    pub temperature: f32,
    pub thinking_budget: u32,
}

/// Receives text deltas in arrival order
pub type DeltaSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Notified after the pool rotated to a fresh key
pub type RotateSink<'a> = &'a mut (dyn FnMut(KeyInfo) + Send);

/// Streaming client seam between the scheduler and the provider protocols
pub trait Transport: Send + Sync {
    /// Run one logical translation request to completion.
    ///
    /// Rotates through the provider's key pool on quota/auth rejection and
    /// retries transient overloads with exponential backoff. Succeeds only if
    /// at least one non-empty delta was delivered.
    fn stream<'a>(
        &'a self,
        job: StreamJob<'a>,
        on_delta: DeltaSink<'a>,
        on_rotate: RotateSink<'a>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Current pool position for a provider
    fn key_info(&self, provider: Provider) -> KeyInfo;
}

/// Multi-provider HTTP transport backed by one shared reqwest client
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<WorkbenchConfig>,
    pools: Mutex<HashMap<Provider, CredentialPool>>,
}

impl HttpTransport {
    pub fn new(config: Arc<WorkbenchConfig>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .build()?;

        let mut pools = HashMap::new();
        for provider in [Provider::Gemini, Provider::Cerebras, Provider::GptOss] {
            pools.insert(provider, CredentialPool::new(config.keys_for(provider)));
        }

        Ok(Self {
            client,
            config,
            pools: Mutex::new(pools),
        })
    }

    /// Replace a provider's key list (the user edited saved credentials)
    pub fn reset_keys(&self, provider: Provider, keys: Vec<String>) {
        self.lock_pools()
            .entry(provider)
            .or_default()
            .initialize(keys);
    }

    fn lock_pools(&self) -> MutexGuard<'_, HashMap<Provider, CredentialPool>> {
        self.pools.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(
        &self,
        job: &StreamJob<'_>,
        on_delta: DeltaSink<'_>,
        on_rotate: RotateSink<'_>,
    ) -> Result<()> {
        let mut attempt = HttpAttempt {
            transport: self,
            job: *job,
            on_delta,
        };
        run_with_failover(
            &self.config,
            &self.pools,
            job.model.provider,
            &mut attempt,
            on_rotate,
        )
        .await
    }

    /// One request with one credential: send, classify, decode the stream
    async fn attempt(
        &self,
        provider: Provider,
        job: &StreamJob<'_>,
        api_key: &str,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<()> {
        let request = match provider {
            Provider::Gemini => gemini::build_request(&self.client, job, api_key),
            Provider::Cerebras => cerebras::build_request(&self.client, job, api_key),
            Provider::GptOss => gpt_oss::build_request(&self.client, &self.config, job, api_key),
        };

        debug!("{}: requesting stream for \"{}\"", provider, job.title);
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(classify_provider_error(status.as_u16(), &message));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut received_text = false;

        'receive: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                match event {
                    SseEvent::Done => break 'receive,
                    SseEvent::Data(payload) => {
                        let deltas = match provider {
                            Provider::Gemini => gemini::extract_deltas(&payload)?,
                            Provider::Cerebras | Provider::GptOss => {
                                extract_chat_deltas(&payload)?
                            }
                        };
                        for text in &deltas {
                            if !text.is_empty() {
                                received_text = true;
                                on_delta(text);
                            }
                        }
                    }
                }
            }
        }

        // A clean close with zero deltas means the output was filtered away;
        // treating it as success would silently store an empty translation.
        if !received_text {
            return Err(TranslationError::EmptyResponse);
        }

        info!("{}: stream for \"{}\" completed", provider, job.title);
        Ok(())
    }
}

/// One credentialed attempt of a logical request; the failover driver decides
/// what happens after it fails
trait Attempt: Send {
    fn run<'a>(&'a mut self, api_key: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// HTTP-backed attempt binding a transport, a job and the delta sink
struct HttpAttempt<'a> {
    transport: &'a HttpTransport,
    job: StreamJob<'a>,
    on_delta: DeltaSink<'a>,
}

impl<'a> Attempt for HttpAttempt<'a> {
    fn run<'b>(&'b mut self, api_key: &'b str) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            self.transport
                .attempt(self.job.model.provider, &self.job, api_key, &mut *self.on_delta)
                .await
        })
    }
}

fn lock<'a>(
    pools: &'a Mutex<HashMap<Provider, CredentialPool>>,
) -> MutexGuard<'a, HashMap<Provider, CredentialPool>> {
    pools.lock().unwrap_or_else(|e| e.into_inner())
}

/// Key-rotation and overload-backoff skeleton shared by every provider.
///
/// The outer loop walks the key pool and is bounded by pool exhaustion, not by
/// an attempt counter; only transient overloads consume backoff attempts.
async fn run_with_failover(
    config: &WorkbenchConfig,
    pools: &Mutex<HashMap<Provider, CredentialPool>>,
    provider: Provider,
    attempt_runner: &mut dyn Attempt,
    on_rotate: RotateSink<'_>,
) -> Result<()> {
    if lock(pools).get(&provider).map_or(true, |p| p.is_empty()) {
        return Err(TranslationError::NoKeysConfigured {
            provider: provider.to_string(),
        });
    }

    loop {
        let key = lock(pools)
            .get(&provider)
            .and_then(|p| p.current().map(str::to_string));
        let Some(key) = key else {
            return Err(TranslationError::KeysExhausted {
                provider: provider.to_string(),
            });
        };

        let mut attempt: u32 = 0;
        loop {
            match attempt_runner.run(&key).await {
                Ok(()) => return Ok(()),
                Err(err) => match err.class() {
                    FailureClass::RotateKey => {
                        warn!(
                            "{} key {} rejected ({}), trying next key",
                            provider,
                            mask_key(&key),
                            err
                        );
                        let (has_next, position) = {
                            let mut pools = lock(pools);
                            let pool = pools.entry(provider).or_default();
                            (pool.advance(), pool.describe())
                        };
                        if !has_next {
                            return Err(TranslationError::KeysExhausted {
                                provider: provider.to_string(),
                            });
                        }
                        on_rotate(position);
                        break;
                    }
                    FailureClass::Backoff if attempt + 1 < config.overload_max_attempts => {
                        let delay = config.overload_base_delay_ms * 2u64.pow(attempt);
                        warn!(
                            "{} overloaded, retry {}/{} in {}ms",
                            provider,
                            attempt + 2,
                            config.overload_max_attempts,
                            delay
                        );
                        sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                    }
                    _ => return Err(err),
                },
            }
        }
    }
}

impl Transport for HttpTransport {
    fn stream<'a>(
        &'a self,
        job: StreamJob<'a>,
        on_delta: DeltaSink<'a>,
        on_rotate: RotateSink<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.run(&job, on_delta, on_rotate).await })
    }

    fn key_info(&self, provider: Provider) -> KeyInfo {
        self.lock_pools()
            .get(&provider)
            .map(|p| p.describe())
            .unwrap_or(KeyInfo { total: 0, current: 0 })
    }
}

/// Error bodies are JSON with a message buried under one of two shapes
fn parse_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.pointer("/message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// One chunk of an OpenAI-style chat-completions stream
#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Text deltas of a chat-completions chunk (Cerebras and GPT-OSS share this)
pub(crate) fn extract_chat_deltas(payload: &str) -> Result<Vec<String>> {
    let chunk: ChatChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect())
}
