//! OpenAI-compatible custom endpoint: request shaping
//!
//! The endpoint and served model are user-configured; the wire format is the
//! shared chat-completions framing decoded in the parent module.

use serde_json::json;

use crate::core::config::{build_user_query, WorkbenchConfig};
use crate::core::transport::StreamJob;

pub(crate) fn build_request(
    client: &reqwest::Client,
    config: &WorkbenchConfig,
    job: &StreamJob<'_>,
    api_key: &str,
) -> reqwest::RequestBuilder {
    let url = format!(
        "{}/chat/completions",
        config.gpt_oss_base_url.trim_end_matches('/')
    );
    client
        .post(&url)
        .bearer_auth(api_key)
        .json(&build_body(config, job))
}

pub(crate) fn build_body(config: &WorkbenchConfig, job: &StreamJob<'_>) -> serde_json::Value {
    json!({
        "model": config.gpt_oss_model,
        "messages": [
            { "role": "system", "content": job.system_prompt },
            { "role": "user", "content": build_user_query(job.title, job.source_text) }
        ],
        "stream": true,
        "max_tokens": job.model.max_output_tokens,
        "temperature": job.temperature,
        "top_p": job.model.top_p,
    })
}
