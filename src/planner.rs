//! Animation planning with a resumable plan cache.
//!
//! The planner first looks for a cached plan keyed by experiment name whose
//! input digest matches the current (image, instruction) pair. Only on a
//! miss does it call the VLM, and a fresh plan is appended to the cache so
//! the next run resumes from it.
use crate::cache::{CacheEntry, Cached, JsonlCache};
use crate::error::PipelineResult;
use crate::model::{parse_json_response, ModelClient, ModelRequest};
use crate::plan::Plan;
use crate::render::{rasterize_base64, Rasterizer};
use crate::svg::SvgSource;
use crate::util::{fill_template, sha256_hex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const PLAN_PROMPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/plan.md"));
const PLAN_SYSTEM: &str = "You are an animation director. Return a single JSON object only.";

/// One persisted plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCacheEntry {
    /// Experiment name.
    pub key: String,
    /// SHA-256 over the SVG text and the instruction.
    pub digest: String,
    pub svg_path: PathBuf,
    pub instruction: String,
    pub plan: Plan,
}

impl CacheEntry for PlanCacheEntry {
    fn key(&self) -> &str {
        &self.key
    }
}

pub struct AnimationPlanner<'a> {
    model: &'a dyn ModelClient,
    rasterizer: &'a dyn Rasterizer,
    cache: JsonlCache<PlanCacheEntry>,
    run_key: String,
}

impl<'a> AnimationPlanner<'a> {
    pub fn new(
        model: &'a dyn ModelClient,
        rasterizer: &'a dyn Rasterizer,
        cache_path: impl Into<PathBuf>,
        run_key: impl Into<String>,
    ) -> Self {
        Self {
            model,
            rasterizer,
            cache: JsonlCache::new(cache_path),
            run_key: run_key.into(),
        }
    }

    /// Look up a cached plan for this run and input.
    ///
    /// The newest entry for the run whose input digest matches wins, so
    /// alternating inputs under one experiment name keep resuming.
    pub fn load_plan(&self, svg: &SvgSource, instruction: &str) -> Cached<Plan> {
        let digest = input_digest(svg, instruction);
        match self
            .cache
            .load_where(&self.run_key, |entry| entry.digest == digest)
        {
            Cached::Materialized(entry) => Cached::Materialized(entry.plan),
            Cached::Pending => {
                if self.cache.load(&self.run_key).is_materialized() {
                    tracing::warn!(
                        key = %self.run_key,
                        "no cached plan for this input under the run key; replanning"
                    );
                }
                Cached::Pending
            }
        }
    }

    /// Return the plan for `svg` + `instruction`, computing it on a cache miss.
    pub fn plan(&self, svg: &SvgSource, instruction: &str) -> PipelineResult<Plan> {
        if let Cached::Materialized(plan) = self.load_plan(svg, instruction) {
            tracing::info!(
                key = %self.run_key,
                classes = plan.len(),
                path = %self.cache.path().display(),
                "loaded plan from cache"
            );
            return Ok(plan);
        }

        let image = rasterize_base64(self.rasterizer, svg.text())?;
        let prompt = fill_template(
            PLAN_PROMPT,
            &[("inventory", &svg.inventory()), ("instruction", instruction)],
        );
        let request = ModelRequest::new("plan")
            .with_system(PLAN_SYSTEM)
            .text(prompt)
            .image(image);
        let response = self.model.complete(&request)?;
        let plan = Plan::from_value(&parse_json_response(&response)?)?;

        for entry in plan.entries() {
            tracing::info!(class = %entry.class_name, steps = ?entry.steps, "planned class");
        }

        self.cache.append(&PlanCacheEntry {
            key: self.run_key.clone(),
            digest: input_digest(svg, instruction),
            svg_path: svg.path().to_path_buf(),
            instruction: instruction.to_string(),
            plan: plan.clone(),
        })?;
        Ok(plan)
    }
}

fn input_digest(svg: &SvgSource, instruction: &str) -> String {
    sha256_hex(&[svg.text().as_bytes(), instruction.as_bytes()])
}
