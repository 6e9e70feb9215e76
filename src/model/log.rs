//! Model invocation logging for run transparency.
//!
//! Every call through a [`LoggedClient`] appends one line to
//! `<run dir>/model_log.jsonl`:
//!
//! ```jsonl
//! {"ts":1707900000000,"seq":1,"role":"vlm","purpose":"plan","duration_ms":4200,"outcome":"success",...}
//! ```
//!
//! With content logging enabled, full prompts and responses are also stored
//! as `model_log/NNN_<purpose>_prompt.txt` and `..._response.txt`.
use super::{preview, ModelClient, ModelRequest, ModelRole};
use crate::error::PipelineResult;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const MODEL_LOG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutcome {
    Success,
    Failed,
}

/// A single model invocation log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLogEntry {
    pub schema_version: u32,
    /// Unix timestamp in milliseconds when the call finished.
    pub ts: u64,
    /// 1-indexed call number within this client.
    pub seq: u32,
    pub role: ModelRole,
    pub purpose: String,
    pub duration_ms: u64,
    pub image_count: usize,
    pub outcome: ModelOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

/// Decorator that records each call of the wrapped client.
pub struct LoggedClient<C> {
    inner: C,
    role: ModelRole,
    log_path: PathBuf,
    content_dir: Option<PathBuf>,
    seq: Cell<u32>,
}

impl<C: ModelClient> LoggedClient<C> {
    pub fn new(inner: C, role: ModelRole, log_path: PathBuf) -> Self {
        Self {
            inner,
            role,
            log_path,
            content_dir: None,
            seq: Cell::new(0),
        }
    }

    /// Also store full prompt/response text under `dir`.
    pub fn with_content_dir(mut self, dir: PathBuf) -> Self {
        self.content_dir = Some(dir);
        self
    }

    fn record(
        &self,
        seq: u32,
        request: &ModelRequest,
        duration: Duration,
        result: &PipelineResult<String>,
    ) -> anyhow::Result<()> {
        let prompt = request.prompt_text();
        let entry = ModelLogEntry {
            schema_version: MODEL_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            seq,
            role: self.role,
            purpose: request.purpose.clone(),
            duration_ms: duration.as_millis() as u64,
            image_count: request.image_count(),
            outcome: if result.is_ok() {
                ModelOutcome::Success
            } else {
                ModelOutcome::Failed
            },
            error: result.as_ref().err().map(|err| err.to_string()),
            prompt_preview: Some(preview(&prompt, 500)),
        };
        append_model_log(&self.log_path, &entry)?;

        if let (Some(dir), Ok(response)) = (&self.content_dir, result) {
            store_model_content(dir, seq, &request.purpose, &prompt, response)?;
        }
        Ok(())
    }
}

impl<C: ModelClient> ModelClient for LoggedClient<C> {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String> {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        let start = Instant::now();
        let result = self.inner.complete(request);
        if let Err(err) = self.record(seq, request, start.elapsed(), &result) {
            tracing::warn!(error = %format!("{err:#}"), "failed to write model log");
        }
        result
    }
}

/// Append a model log entry as JSONL.
pub fn append_model_log(path: &Path, entry: &ModelLogEntry) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create run directory for model_log")?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open model_log for append: {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize model_log entry")?;
    writeln!(file, "{line}").context("write model_log entry")?;
    Ok(())
}

/// Load all entries, skipping corrupt lines.
pub fn load_model_log(path: &Path) -> anyhow::Result<Vec<ModelLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("read model_log: {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ModelLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt model_log entry");
            }
        }
    }
    Ok(entries)
}

fn store_model_content(
    dir: &Path,
    seq: u32,
    purpose: &str,
    prompt: &str,
    response: &str,
) -> anyhow::Result<()> {
    fs::create_dir_all(dir).context("create model_log directory")?;
    let stem: String = purpose
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let prompt_path = dir.join(format!("{seq:03}_{stem}_prompt.txt"));
    let response_path = dir.join(format!("{seq:03}_{stem}_response.txt"));
    fs::write(&prompt_path, prompt)
        .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
    fs::write(&response_path, response)
        .with_context(|| format!("write response: {}", response_path.display()))?;
    Ok(())
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
