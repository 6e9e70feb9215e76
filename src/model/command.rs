//! Local LM command client.
//!
//! Invokes a user-configured command with the prompt on stdin and reads the
//! response from stdout. The command can be any tool that accepts text input
//! and produces text output (e.g., `llm`, `ollama run`, custom scripts).
//! Images are appended to the prompt as `data:` URLs so vision-capable
//! wrappers can pick them up.
use super::{ContentPart, ModelClient, ModelRequest};
use crate::error::{PipelineError, PipelineResult};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CommandModelClient {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandModelClient {
    /// Parse `command` with shell-words and resolve the program on PATH.
    pub fn new(command: &str) -> PipelineResult<Self> {
        let mut argv = shell_words::split(command)
            .map_err(|err| PipelineError::config(format!("parse LM command {command:?}: {err}")))?;
        if argv.is_empty() {
            return Err(PipelineError::config("LM command is empty"));
        }
        let program = argv.remove(0);
        let resolved = which::which(&program).map_err(|err| {
            PipelineError::config(format!("LM command program {program:?} not found: {err}"))
        })?;
        Ok(Self {
            program: resolved,
            args: argv,
        })
    }
}

impl ModelClient for CommandModelClient {
    fn complete(&self, request: &ModelRequest) -> PipelineResult<String> {
        let prompt = render_prompt(request);
        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                PipelineError::model(format!("spawn LM command {}: {err}", self.program.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|err| PipelineError::model(format!("write prompt to LM stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| PipelineError::model(format!("wait for LM command: {err}")))?;

        tracing::info!(
            purpose = %request.purpose,
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::model(format!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|err| PipelineError::model(format!("decode LM stdout as UTF-8: {err}")))
    }
}

fn render_prompt(request: &ModelRequest) -> String {
    let mut prompt = String::new();
    if let Some(system) = &request.system {
        prompt.push_str(system);
        prompt.push_str("\n\n");
    }
    for part in &request.parts {
        match part {
            ContentPart::Text(text) => {
                prompt.push_str(text);
                prompt.push_str("\n\n");
            }
            ContentPart::PngBase64(data) => {
                prompt.push_str("data:image/png;base64,");
                prompt.push_str(data);
                prompt.push_str("\n\n");
            }
        }
    }
    prompt.trim_end().to_string()
}
