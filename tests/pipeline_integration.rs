//! End-to-end pipeline runs over the `shapes` fixture with a scripted model.

mod common;

use common::{style_block, ScriptedModel, ShapesRun, StubRasterizer, CIRCLE_CSS, SQUARE_CSS};
use std::fs;
use svg_animator::pipeline::run_with;
use svg_animator::plan::Plan;
use svg_animator::state::AnimationState;
use svg_animator::svg::SvgSource;
use svg_animator::tagger::MultiSvgParser;
use svg_animator::PipelineError;

#[test]
fn shapes_end_to_end_writes_both_classes_in_plan_order() {
    let run = ShapesRun::new(2);
    let model = ScriptedModel::shapes();

    let report = run_with(&run.record, &run.options, &model, &StubRasterizer).expect("run");

    assert_eq!(report.output_path, run.options.output_path);
    let html = fs::read_to_string(&report.output_path).expect("output written");
    let circle = style_block(&html, "circle").expect("circle block");
    let square = style_block(&html, "square").expect("square block");
    assert!(circle.contains(CIRCLE_CSS));
    assert!(square.contains(SQUARE_CSS));
    assert!(html.find(circle).expect("circle") < html.find(square).expect("square"));
    assert!(html.contains(r#"class="circle""#));
    assert!(html.contains(r#"class="square""#));
    assert!(!html.contains("<?xml"));

    assert_eq!(
        model.purposes(),
        [
            "plan",
            "burn_in:1",
            "burn_in:2",
            "tag",
            "animate:circle",
            "animate:square"
        ]
    );
}

#[test]
fn later_classes_see_earlier_fragments() {
    let run = ShapesRun::new(0);
    let model = ScriptedModel::shapes();
    run_with(&run.record, &run.options, &model, &StubRasterizer).expect("run");

    let first = model.request("animate:circle").expect("circle request");
    let second = model.request("animate:square").expect("square request");
    assert!(!first.prompt_text().contains("data-animation-class"));
    assert!(second.prompt_text().contains(CIRCLE_CSS));
    assert_eq!(second.image_count(), 2);
}

#[test]
fn merging_a_class_leaves_other_blocks_byte_identical() {
    let run = ShapesRun::new(0);
    let model = ScriptedModel::shapes();
    run_with(&run.record, &run.options, &model, &StubRasterizer).expect("run");

    let second = model.request("animate:square").expect("square request");
    let prompt = second.prompt_text();
    let circle_before = style_block(&prompt, "circle").expect("circle in snapshot");

    let html = fs::read_to_string(&run.options.output_path).expect("output");
    assert_eq!(style_block(&html, "circle"), Some(circle_before));
}

#[test]
fn save_without_generation_is_a_valid_baseline() {
    let run = ShapesRun::new(0);
    let model = ScriptedModel::shapes();
    let svg = SvgSource::load(&run.record.image).expect("svg");
    let plan = Plan::from_value(&serde_json::json!({"circle": ["pulse"], "square": ["slide"]}))
        .expect("plan");

    let mut parser = MultiSvgParser::new(&model, &StubRasterizer, &run.options.tagged_cache_path);
    parser.set_parser(svg, &plan);
    let tagged = parser.tag_semantics().expect("tagging");

    let path = AnimationState::new(&tagged)
        .expect("state")
        .save_to_html(&run.options.output_path)
        .expect("save");
    let html = fs::read_to_string(path).expect("read");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<svg"));
    assert!(html.trim_end().ends_with("</html>"));
    assert!(!html.contains("data-animation-class"));
}

#[test]
fn empty_plan_aborts_before_tagging_or_generation() {
    let run = ShapesRun::new(2);
    let model = ScriptedModel::new(|request| {
        Ok(if request.purpose == "plan" {
            "{}".to_string()
        } else {
            common::shapes_response(&request.purpose)
        })
    });

    let err = run_with(&run.record, &run.options, &model, &StubRasterizer).expect_err("empty plan");
    assert!(matches!(err, PipelineError::EmptyPlan));
    assert_eq!(model.purposes(), ["plan"]);
    assert!(!run.options.plan_cache_path.exists());
    assert!(!run.options.tagged_cache_path.exists());
    assert!(!run.options.output_path.exists());
}

#[test]
fn tagging_gap_aborts_before_generation() {
    let run = ShapesRun::new(0);
    let model = ScriptedModel::new(|request| {
        Ok(if request.purpose == "tag" {
            r#"{"assignments": {"circle": [0, 1]}}"#.to_string()
        } else {
            common::shapes_response(&request.purpose)
        })
    });

    let err = run_with(&run.record, &run.options, &model, &StubRasterizer).expect_err("gap");
    match err {
        PipelineError::TaggingGap { missing } => assert_eq!(missing, ["square"]),
        other => panic!("expected tagging gap, got {other:?}"),
    }
    assert!(!model.purposes().iter().any(|p| p.starts_with("animate:")));
    assert!(!run.options.output_path.exists());
}

#[test]
fn rerun_resumes_plan_and_tagging_from_cache() {
    let run = ShapesRun::new(1);
    run_with(&run.record, &run.options, &ScriptedModel::shapes(), &StubRasterizer)
        .expect("first run");
    let plans_after_first = fs::read(&run.options.plan_cache_path).expect("plan cache");
    let tagged_after_first = fs::read(&run.options.tagged_cache_path).expect("tagged cache");

    let model = ScriptedModel::shapes();
    run_with(&run.record, &run.options, &model, &StubRasterizer).expect("second run");

    assert_eq!(model.purposes(), ["animate:circle", "animate:square"]);
    assert_eq!(fs::read(&run.options.plan_cache_path).expect("plan cache"), plans_after_first);
    assert_eq!(
        fs::read(&run.options.tagged_cache_path).expect("tagged cache"),
        tagged_after_first
    );
}

#[test]
fn invalid_fragment_is_fatal() {
    let run = ShapesRun::new(0);
    let model = ScriptedModel::new(|request| {
        Ok(if request.purpose == "animate:square" {
            r#"{"css": ".square { color: red; }</style><script>alert(1)</script>"}"#.to_string()
        } else {
            common::shapes_response(&request.purpose)
        })
    });

    let err = run_with(&run.record, &run.options, &model, &StubRasterizer).expect_err("invalid css");
    assert!(matches!(err, PipelineError::Generation { ref class, .. } if class == "square"));
    assert!(!run.options.output_path.exists());
}

#[test]
fn fragment_redefining_an_earlier_class_keyframes_is_fatal() {
    let run = ShapesRun::new(0);
    let model = ScriptedModel::new(|request| {
        Ok(if request.purpose == "animate:square" {
            serde_json::json!({
                "css": ".square { animation: circle-pulse 1s; }\n@keyframes circle-pulse { to { opacity: 0; } }"
            })
            .to_string()
        } else {
            common::shapes_response(&request.purpose)
        })
    });

    let err = run_with(&run.record, &run.options, &model, &StubRasterizer).expect_err("collision");
    match err {
        PipelineError::Generation { class, reason } => {
            assert_eq!(class, "square");
            assert!(reason.contains("circle-pulse"), "{reason}");
        }
        other => panic!("expected generation error, got {other:?}"),
    }
    assert!(!run.options.output_path.exists());
}
