//! Turn a static SVG plus a natural-language instruction into an animated
//! HTML document.
//!
//! The pipeline is sequential: plan (which classes, which steps), tag (which
//! drawables belong to each class), then generate one CSS fragment per class
//! into a shared [`state::AnimationState`] that is finally saved as HTML.
pub mod cache;
pub mod cli;
pub mod config;
pub mod css;
pub mod dataset;
pub mod error;
pub mod generator;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod render;
pub mod state;
pub mod svg;
pub mod tagger;
pub mod util;

pub use error::{PipelineError, PipelineResult};
