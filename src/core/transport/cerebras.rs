//! Cerebras chat-completions protocol: request shaping
//!
//! Chunk decoding is the shared chat-completions framing in the parent module.

use serde_json::json;

use crate::core::config::build_user_query;
use crate::core::transport::StreamJob;

const API_URL: &str = "https://api.cerebras.ai/v1/chat/completions";

pub(crate) fn build_request(
    client: &reqwest::Client,
    job: &StreamJob<'_>,
    api_key: &str,
) -> reqwest::RequestBuilder {
    client
        .post(API_URL)
        .bearer_auth(api_key)
        .json(&build_body(job))
}

pub(crate) fn build_body(job: &StreamJob<'_>) -> serde_json::Value {
    // The model table uses a `cerebras/` prefix; the API wants the bare name
    let bare_model = job.model.id.strip_prefix("cerebras/").unwrap_or(&job.model.id);

    let mut body = json!({
        "model": bare_model,
        "messages": [
            { "role": "system", "content": job.system_prompt },
            { "role": "user", "content": build_user_query(job.title, job.source_text) }
        ],
        "stream": true,
        "max_completion_tokens": job.model.max_output_tokens,
        "temperature": job.temperature,
        "top_p": job.model.top_p,
    });

    if let Some(effort) = &job.model.reasoning_effort {
        body["reasoning_effort"] = json!(effort);
    }

    body
}
