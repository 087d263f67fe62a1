//! Gemini streaming protocol: request shaping and chunk decoding

use serde::Deserialize;
use serde_json::json;

use crate::core::config::build_user_query;
use crate::core::errors::Result;
use crate::core::transport::StreamJob;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) fn build_request(
    client: &reqwest::Client,
    job: &StreamJob<'_>,
    api_key: &str,
) -> reqwest::RequestBuilder {
    let url = format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        API_BASE, job.model.id
    );
    client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&build_body(job))
}

pub(crate) fn build_body(job: &StreamJob<'_>) -> serde_json::Value {
    let mut generation_config = json!({
        "temperature": job.temperature,
        "topP": job.model.top_p,
        "maxOutputTokens": job.model.max_output_tokens,
    });

    // Only thinking-capable models accept thinkingConfig; others reject the
    // whole request with a 400 InvalidArgument.
    if job.model.supports_thinking && job.thinking_budget > 0 {
        generation_config["thinkingConfig"] = json!({ "thinkingBudget": job.thinking_budget });
    }

    json!({
        "systemInstruction": { "parts": [{ "text": job.system_prompt }] },
        "contents": [{ "parts": [{ "text": build_user_query(job.title, job.source_text) }] }],
        "generationConfig": generation_config,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Text deltas of one streamed `GenerateContentResponse` fragment
pub(crate) fn extract_deltas(payload: &str) -> Result<Vec<String>> {
    let chunk: GeminiChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .candidates
        .into_iter()
        .take(1)
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect())
}
