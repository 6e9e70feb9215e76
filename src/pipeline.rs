//! End-to-end orchestration: plan, tag, generate per class, save.
//!
//! ```text
//! Empty -> Planned -> Tagged -> Generating(1..=n) -> Saved
//! ```
//!
//! Any error aborts the run; there are no backward transitions.
use crate::cache::Cached;
use crate::config::PipelineConfig;
use crate::dataset::{select_record, DatasetRecord};
use crate::error::PipelineResult;
use crate::generator::{AnimationGenerator, ContentContext};
use crate::model::{build_client, LoggedClient, ModelClient, ModelRole};
use crate::planner::AnimationPlanner;
use crate::render::{Rasterizer, ResvgRasterizer};
use crate::state::AnimationState;
use crate::svg::SvgSource;
use crate::tagger::MultiSvgParser;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Empty,
    Planned,
    Tagged,
    /// One-based index of the class being generated.
    Generating(usize),
    Saved,
}

impl Stage {
    fn rank(self) -> (u8, usize) {
        match self {
            Self::Empty => (0, 0),
            Self::Planned => (1, 0),
            Self::Tagged => (2, 0),
            Self::Generating(i) => (3, i),
            Self::Saved => (4, 0),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Planned => write!(f, "planned"),
            Self::Tagged => write!(f, "tagged"),
            Self::Generating(i) => write!(f, "generating({i})"),
            Self::Saved => write!(f, "saved"),
        }
    }
}

/// Forward-only stage bookkeeping with a log line per transition.
#[derive(Debug)]
struct StageTracker {
    current: Stage,
    history: Vec<Stage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: Stage::Empty,
            history: vec![Stage::Empty],
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            next.rank() > self.current.rank(),
            "stage went backwards: {} -> {next}",
            self.current
        );
        tracing::info!(from = %self.current, to = %next, "pipeline stage");
        self.current = next;
        self.history.push(next);
    }
}

/// Per-run knobs for [`run_with`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Key for the plan cache; the experiment name.
    pub run_key: String,
    pub plan_cache_path: PathBuf,
    pub tagged_cache_path: PathBuf,
    pub burn_in: usize,
    pub output_path: PathBuf,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            run_key: config.paths.exp_name().to_string(),
            plan_cache_path: config.plan_cache_path.clone(),
            tagged_cache_path: config.tagged_cache_path.clone(),
            burn_in: config.burn_in,
            output_path: config.paths.output_html_path(),
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub classes: Vec<String>,
    pub stages: Vec<Stage>,
}

/// Run the pipeline with production collaborators built from `config`.
pub fn run(config: &PipelineConfig) -> PipelineResult<RunReport> {
    let record = select_record(&config.dataset_path, config.selection)?;
    tracing::info!(
        exp = config.paths.exp_name(),
        model = %config.vlm.model,
        provider = %config.vlm.provider,
        burn_in = config.burn_in,
        "starting run"
    );
    let mut vlm = LoggedClient::new(
        build_client(&config.vlm)?,
        ModelRole::Vlm,
        config.paths.model_log_path(),
    );
    if config.log_model_content {
        vlm = vlm.with_content_dir(config.paths.model_log_dir());
    }
    run_with(
        &record,
        &RunOptions::from_config(config),
        &vlm,
        &ResvgRasterizer,
    )
}

/// Run the pipeline for one record with the given collaborators.
pub fn run_with(
    record: &DatasetRecord,
    options: &RunOptions,
    vlm: &dyn ModelClient,
    rasterizer: &dyn Rasterizer,
) -> PipelineResult<RunReport> {
    let mut stages = StageTracker::new();
    let svg = SvgSource::load(&record.image)?;

    let planner = AnimationPlanner::new(
        vlm,
        rasterizer,
        &options.plan_cache_path,
        &options.run_key,
    );
    let plan = planner.plan(&svg, &record.instruction)?;
    stages.advance(Stage::Planned);

    let mut parser = MultiSvgParser::new(vlm, rasterizer, &options.tagged_cache_path);
    parser.set_parser(svg, &plan);
    let tagged = match parser.load_tagged_svg() {
        Cached::Materialized(tagged) => tagged,
        Cached::Pending => {
            parser.burn_in(options.burn_in)?;
            parser.tag_semantics()?
        }
    };
    stages.advance(Stage::Tagged);

    let mut state = AnimationState::new(&tagged)?;
    let generator = AnimationGenerator::new(vlm);
    let big_picture = parser.full_svg_base64()?.to_string();
    for (i, entry) in plan.entries().iter().enumerate() {
        stages.advance(Stage::Generating(i + 1));
        tracing::info!(
            class = %entry.class_name,
            index = i + 1,
            of = plan.len(),
            "animating class"
        );
        let context = ContentContext {
            class_name: entry.class_name.clone(),
            viewbox: state.viewbox(),
            animation_plan: entry.steps.clone(),
            big_picture: big_picture.clone(),
            little_picture: parser.render_by_class(&entry.class_name)?,
        };
        let fragment = generator.animate(&context, &state.current_html())?;
        state.merge(fragment);
    }

    let classes = state.classes().map(str::to_string).collect();
    let output_path = state.save_to_html(&options.output_path)?;
    stages.advance(Stage::Saved);
    Ok(RunReport {
        output_path,
        classes,
        stages: stages.history,
    })
}
