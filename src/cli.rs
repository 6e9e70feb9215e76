//! CLI argument parsing for the animation pipeline.
//!
//! The CLI is intentionally thin: it only collects raw settings. Fallbacks and
//! validation live in `config` so they can be tested without a process.
use clap::Parser;
use std::path::PathBuf;

/// Animate one SVG from a dataset according to its instruction.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "svg-animator",
    version,
    about = "Animated SVG generator driven by vision-language models",
    after_help = "Examples:\n  svg-animator --exp-name demo --test-json svg/test.jsonl\n  svg-animator --model-provider command --lm-command 'llm -m gpt-4o' --burn-in 0\n  svg-animator --vlm-model gpt-4o --llm-model gpt-4o-mini --streaming"
)]
pub struct RunArgs {
    /// Experiment name; keys the plan cache and names the output directory
    #[arg(long, default_value = "test")]
    pub exp_name: String,

    /// JSONL dataset of {image, instruction} records
    #[arg(long, value_name = "PATH", default_value = "svg/test.jsonl")]
    pub test_json: PathBuf,

    /// Dataset record to animate (defaults to the first)
    #[arg(long, value_name = "N")]
    pub index: Option<usize>,

    /// JSONL plan cache
    #[arg(long, value_name = "PATH", default_value = "logs/plans.jsonl")]
    pub test_plan_json: PathBuf,

    /// JSONL tagged-svg cache (defaults to <log-dir>/tagged.jsonl)
    #[arg(long, value_name = "PATH")]
    pub tagged_cache: Option<PathBuf>,

    /// Root directory for run logs and artifacts
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Model name for LLM and VLM
    #[arg(long, default_value = "gpt-5-mini")]
    pub model_name: String,

    /// Model provider (openai, azure, command)
    #[arg(long, default_value = "openai")]
    pub model_provider: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Base URL for an OpenAI-compatible proxy
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// API key for the model provider or proxy
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Model name for vision tasks (defaults to --model-name)
    #[arg(long)]
    pub vlm_model: Option<String>,

    /// Base URL for the VLM (defaults to --base-url)
    #[arg(long, value_name = "URL")]
    pub vlm_base_url: Option<String>,

    /// API key for the VLM (defaults to --api-key)
    #[arg(long, value_name = "KEY")]
    pub vlm_api_key: Option<String>,

    /// Model name for text-only tasks (defaults to --model-name)
    #[arg(long)]
    pub llm_model: Option<String>,

    /// Base URL for the LLM (defaults to --base-url)
    #[arg(long, value_name = "URL")]
    pub llm_base_url: Option<String>,

    /// API key for the LLM (defaults to --api-key)
    #[arg(long, value_name = "KEY")]
    pub llm_api_key: Option<String>,

    /// Number of burn-in labeling passes before final tagging
    #[arg(long, default_value_t = 2)]
    pub burn_in: usize,

    /// Enable streaming responses (required by some proxies)
    #[arg(long)]
    pub streaming: bool,

    /// Local LM command for provider `command` (prompt on stdin)
    #[arg(long, value_name = "CMD")]
    pub lm_command: Option<String>,

    /// Store full prompts and responses next to model_log.jsonl
    #[arg(long)]
    pub log_model_content: bool,

    /// Emit debug-level logs
    #[arg(long)]
    pub verbose: bool,
}
