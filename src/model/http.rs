//! OpenAI-compatible chat completions over HTTP.
//!
//! Works against api.openai.com, OpenAI-compatible proxies (via `base_url`),
//! and Azure OpenAI deployments. Streaming mode reads server-sent events and
//! concatenates the `delta.content` chunks.
use super::{ContentPart, ModelClient, ModelRequest};
use crate::config::{ModelSettings, Provider};
use crate::error::{PipelineError, PipelineResult};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read};
use std::time::{Duration, Instant};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_API_VERSION: &str = "2024-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

enum AuthHeader {
    Bearer(String),
    ApiKey(String),
}

pub struct HttpModelClient {
    agent: ureq::Agent,
    endpoint: String,
    auth: AuthHeader,
    model: String,
    temperature: f32,
    streaming: bool,
}

impl HttpModelClient {
    pub fn new(settings: &ModelSettings) -> PipelineResult<Self> {
        let key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PipelineError::config("HTTP model client requires an API key"))?;
        let (endpoint, auth) = match settings.provider {
            Provider::Azure => {
                let base = settings.base_url.as_deref().ok_or_else(|| {
                    PipelineError::config("azure provider requires a base URL")
                })?;
                (
                    format!(
                        "{}/openai/deployments/{}/chat/completions?api-version={AZURE_API_VERSION}",
                        base.trim_end_matches('/'),
                        settings.model
                    ),
                    AuthHeader::ApiKey(key),
                )
            }
            _ => {
                let base = settings
                    .base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_OPENAI_BASE_URL);
                (
                    format!("{}/chat/completions", base.trim_end_matches('/')),
                    AuthHeader::Bearer(key),
                )
            }
        };
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint,
            auth,
            model: settings.model.clone(),
            temperature: settings.temperature,
            streaming: settings.streaming,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ModelClient for HttpModelClient {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String> {
        let body = request_body(&self.model, self.temperature, self.streaming, request);
        let start = Instant::now();
        let builder = self.agent.post(&self.endpoint);
        let builder = match &self.auth {
            AuthHeader::Bearer(key) => builder.header("Authorization", format!("Bearer {key}")),
            AuthHeader::ApiKey(key) => builder.header("api-key", key.as_str()),
        };
        let response = builder
            .send_json(&body)
            .map_err(|err| PipelineError::model(format!("{} request failed: {err}", request.purpose)))?;

        let text = if self.streaming {
            let reader = response.into_body().into_reader();
            collect_sse(BufReader::new(reader))?
        } else {
            let value: Value = response
                .into_body()
                .read_json()
                .map_err(|err| PipelineError::model(format!("decode response body: {err}")))?;
            completion_text(&value)?
        };

        tracing::info!(
            purpose = %request.purpose,
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = text.len(),
            "model call complete"
        );
        Ok(text)
    }
}

/// Build the chat completions payload for a request.
fn request_body(model: &str, temperature: f32, streaming: bool, request: &ModelRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    let content: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({"type": "text", "text": text}),
            ContentPart::PngBase64(data) => json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{data}")}
            }),
        })
        .collect();
    messages.push(json!({"role": "user", "content": content}));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
    });
    if streaming {
        body["stream"] = Value::Bool(true);
    }
    body
}

/// Pull `choices[0].message.content` out of a non-streaming response.
fn completion_text(value: &Value) -> PipelineResult<String> {
    if let Some(error) = value.get("error") {
        return Err(PipelineError::model(format!("provider error: {error}")));
    }
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::model("response missing choices[0].message.content"))
}

/// Concatenate streamed `delta.content` chunks until `[DONE]`.
fn collect_sse<R: Read>(reader: BufReader<R>) -> PipelineResult<String> {
    let mut text = String::new();
    for line in reader.lines() {
        let line = line.map_err(|err| PipelineError::model(format!("read stream: {err}")))?;
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }
        let chunk: Value = serde_json::from_str(data)
            .map_err(|err| PipelineError::model(format!("stream chunk is not JSON: {err}")))?;
        if let Some(error) = chunk.get("error") {
            return Err(PipelineError::model(format!("provider error: {error}")));
        }
        if let Some(delta) = chunk
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            text.push_str(delta);
        }
    }
    if text.is_empty() {
        return Err(PipelineError::model("stream ended without content"));
    }
    Ok(text)
}
