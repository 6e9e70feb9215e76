//! Typed paths into the run log layout.
//!
//! Centralizing path construction keeps file access consistent across the
//! pipeline stages and prevents drift when the layout evolves.
use std::path::PathBuf;

/// Convenience wrapper for locating per-experiment artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    log_root: PathBuf,
    exp_name: String,
}

impl RunPaths {
    /// Create a new path helper rooted at the log directory.
    pub fn new(log_root: PathBuf, exp_name: impl Into<String>) -> Self {
        Self {
            log_root,
            exp_name: exp_name.into(),
        }
    }

    /// Return the experiment name used to key run artifacts.
    pub fn exp_name(&self) -> &str {
        &self.exp_name
    }

    /// Return the `<log root>/<exp>/` directory path.
    pub fn run_dir(&self) -> PathBuf {
        self.log_root.join(&self.exp_name)
    }

    /// Return the final `animation.html` artifact path.
    pub fn output_html_path(&self) -> PathBuf {
        self.run_dir().join("animation.html")
    }

    /// Return the `run.log` path written by the tracing subscriber.
    pub fn run_log_path(&self) -> PathBuf {
        self.run_dir().join("run.log")
    }

    /// Return the `model_log.jsonl` path.
    pub fn model_log_path(&self) -> PathBuf {
        self.run_dir().join("model_log.jsonl")
    }

    /// Return the directory for full prompt/response storage.
    pub fn model_log_dir(&self) -> PathBuf {
        self.run_dir().join("model_log")
    }

    /// Return the default shared tagged-decomposition cache path.
    pub fn default_tagged_cache_path(&self) -> PathBuf {
        self.log_root.join("tagged.jsonl")
    }
}
