//! Typed run configuration resolved from CLI arguments and the environment.
//!
//! Resolution happens once, before any model call, so every credential or
//! input problem surfaces as a `Config` error up front.
use crate::cli::RunArgs;
use crate::dataset::Selection;
use crate::error::{PipelineError, PipelineResult};
use crate::paths::RunPaths;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const AZURE_API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const LM_COMMAND_ENV: &str = "SVG_ANIMATOR_LM_COMMAND";

/// Model provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI or any OpenAI-compatible proxy.
    OpenAi,
    Azure,
    /// A local command reading the prompt on stdin.
    Command,
}

impl FromStr for Provider {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure" | "azure_openai" => Ok(Self::Azure),
            "command" | "local" => Ok(Self::Command),
            other => Err(PipelineError::config(format!(
                "unknown model provider {other:?} (expected openai, azure, or command)"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Azure => write!(f, "azure"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// Settings for one model role.
#[derive(Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub provider: Provider,
    pub temperature: f32,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub streaming: bool,
    pub command: Option<String>,
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("streaming", &self.streaming)
            .field("command", &self.command)
            .finish()
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub paths: RunPaths,
    pub dataset_path: PathBuf,
    pub selection: Selection,
    pub plan_cache_path: PathBuf,
    pub tagged_cache_path: PathBuf,
    pub vlm: ModelSettings,
    pub llm: ModelSettings,
    pub burn_in: usize,
    pub log_model_content: bool,
}

impl PipelineConfig {
    /// Resolve CLI arguments against the process environment.
    pub fn from_args(args: &RunArgs) -> PipelineResult<Self> {
        Self::resolve(args, |name| std::env::var(name).ok())
    }

    /// Resolve CLI arguments with an injectable environment lookup.
    ///
    /// Role-specific settings fall back to the shared ones; credentials fall
    /// back to the provider's environment variable.
    pub fn resolve(
        args: &RunArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> PipelineResult<Self> {
        let exp_name = args.exp_name.trim();
        if exp_name.is_empty() || exp_name.contains(['/', '\\']) || exp_name == ".." {
            return Err(PipelineError::config(format!(
                "--exp-name must be a plain directory name (got {:?})",
                args.exp_name
            )));
        }
        if !args.temperature.is_finite() || !(0.0..=2.0).contains(&args.temperature) {
            return Err(PipelineError::config(format!(
                "--temperature must be within 0.0..=2.0 (got {})",
                args.temperature
            )));
        }
        let provider: Provider = args.model_provider.parse()?;
        let command = args
            .lm_command
            .clone()
            .or_else(|| env(LM_COMMAND_ENV))
            .filter(|command| !command.trim().is_empty());

        let shared_key = args.api_key.clone().or_else(|| match provider {
            Provider::OpenAi => env(OPENAI_API_KEY_ENV),
            Provider::Azure => env(AZURE_API_KEY_ENV).or_else(|| env(OPENAI_API_KEY_ENV)),
            Provider::Command => None,
        });

        let role = |model: &Option<String>, base_url: &Option<String>, api_key: &Option<String>| {
            ModelSettings {
                model: model.clone().unwrap_or_else(|| args.model_name.clone()),
                provider,
                temperature: args.temperature,
                base_url: base_url.clone().or_else(|| args.base_url.clone()),
                api_key: api_key.clone().or_else(|| shared_key.clone()),
                streaming: args.streaming,
                command: command.clone(),
            }
        };
        let vlm = role(&args.vlm_model, &args.vlm_base_url, &args.vlm_api_key);
        let llm = role(&args.llm_model, &args.llm_base_url, &args.llm_api_key);
        // Every stage needs images, so only the VLM settings must be usable.
        validate_settings("vlm", &vlm)?;

        let paths = RunPaths::new(args.log_dir.clone(), exp_name);
        let tagged_cache_path = args
            .tagged_cache
            .clone()
            .unwrap_or_else(|| paths.default_tagged_cache_path());
        let selection = args.index.map(Selection::Index).unwrap_or_default();

        Ok(Self {
            paths,
            dataset_path: args.test_json.clone(),
            selection,
            plan_cache_path: args.test_plan_json.clone(),
            tagged_cache_path,
            vlm,
            llm,
            burn_in: args.burn_in,
            log_model_content: args.log_model_content,
        })
    }
}

fn validate_settings(role: &str, settings: &ModelSettings) -> PipelineResult<()> {
    if settings.model.trim().is_empty() {
        return Err(PipelineError::config(format!("{role} model name is empty")));
    }
    match settings.provider {
        Provider::OpenAi | Provider::Azure => {
            let has_key = settings
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty());
            if !has_key {
                return Err(PipelineError::config(format!(
                    "missing {role} API key for provider {} (pass --api-key/--{role}-api-key or set {})",
                    settings.provider,
                    if settings.provider == Provider::Azure {
                        AZURE_API_KEY_ENV
                    } else {
                        OPENAI_API_KEY_ENV
                    }
                )));
            }
            if settings.provider == Provider::Azure && settings.base_url.is_none() {
                return Err(PipelineError::config(format!(
                    "provider azure requires --base-url or --{role}-base-url"
                )));
            }
        }
        Provider::Command => {
            if settings.command.is_none() {
                return Err(PipelineError::config(format!(
                    "provider command requires --lm-command or {LM_COMMAND_ENV}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
