//! Runs the `svg-animator` binary against the `shapes` fixture with the
//! scripted `tests/mock-lm.sh` model behind the command provider.

mod common;

use common::{fixture_dir, manifest_dir, style_block};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use svg_animator::model::{load_model_log, ModelOutcome};

fn svg_animator(work_dir: &Path, extra: &[&str]) -> Output {
    let mock = manifest_dir().join("tests/mock-lm.sh");
    let lm_command = format!("sh {}", mock.display());
    let dataset = fixture_dir("shapes").join("test.jsonl");
    Command::new(env!("CARGO_BIN_EXE_svg-animator"))
        .current_dir(work_dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("AZURE_OPENAI_API_KEY")
        .env_remove("SVG_ANIMATOR_LM_COMMAND")
        .env_remove("RUST_LOG")
        .arg("--test-json")
        .arg(&dataset)
        .args(["--exp-name", "demo", "--log-dir", "logs"])
        .args(["--test-plan-json", "logs/plans.jsonl"])
        .args(extra)
        .arg("--lm-command")
        .arg(&lm_command)
        .output()
        .expect("spawn svg-animator")
}

#[test]
fn command_provider_run_writes_animation_and_logs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = svg_animator(
        temp.path(),
        &["--model-provider", "command", "--burn-in", "1", "--log-model-content"],
    );
    assert!(
        output.status.success(),
        "svg-animator failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let run_dir = temp.path().join("logs/demo");
    let html_path = run_dir.join("animation.html");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        Path::new("logs/demo/animation.html").display().to_string()
    );

    let html = fs::read_to_string(&html_path).expect("animation.html");
    assert!(style_block(&html, "circle").is_some_and(|b| b.contains("circle-pulse")));
    assert!(style_block(&html, "square").is_some_and(|b| b.contains("square-slide")));

    let entries = load_model_log(&run_dir.join("model_log.jsonl")).expect("model log");
    let purposes: Vec<&str> = entries.iter().map(|e| e.purpose.as_str()).collect();
    assert_eq!(
        purposes,
        ["plan", "burn_in:1", "tag", "animate:circle", "animate:square"]
    );
    assert!(entries.iter().all(|e| e.outcome == ModelOutcome::Success));
    assert!(run_dir.join("model_log").is_dir());

    let run_log = fs::read_to_string(run_dir.join("run.log")).expect("run.log");
    assert!(run_log.contains("saved animation"));
    assert!(temp.path().join("logs/plans.jsonl").exists());
    assert!(temp.path().join("logs/tagged.jsonl").exists());
}

#[test]
fn missing_api_key_fails_before_any_work() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = svg_animator(temp.path(), &["--model-provider", "openai"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing vlm API key"), "stderr: {stderr}");
    assert!(!temp.path().join("logs").exists());
}
