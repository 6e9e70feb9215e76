//! Error taxonomy for the animation pipeline.
//!
//! Each variant maps to one failure class the pipeline distinguishes:
//! configuration problems abort before any model call, cache corruption is
//! recovered inside the cache layer, and everything else aborts the run.
use std::path::PathBuf;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("cache corruption in {}: {reason}", path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("model error: {0}")]
    Model(String),

    #[error("plan has no classes to animate")]
    EmptyPlan,

    #[error("tagging gap: planned classes not found in svg: {}", missing.join(", "))]
    TaggingGap { missing: Vec<String> },

    #[error("generation error for class {class}: {reason}")]
    Generation { class: String, reason: String },

    #[error("class not found in tagged svg: {0}")]
    NotFound(String),

    #[error("svg error: {0}")]
    Svg(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn svg(msg: impl Into<String>) -> Self {
        Self::Svg(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn generation(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Generation {
            class: class.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
