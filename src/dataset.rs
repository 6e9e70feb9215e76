//! SVG source selection from a JSONL dataset.
use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One (image, instruction) pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetRecord {
    #[serde(alias = "svg_path", alias = "svg_file", alias = "svg")]
    pub image: PathBuf,
    #[serde(alias = "prompt")]
    pub instruction: String,
}

/// Which record a run picks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    First,
    Index(usize),
}

/// Parse every non-blank line of a dataset file.
pub fn load_records(path: &Path) -> PipelineResult<Vec<DatasetRecord>> {
    let text = fs::read_to_string(path).map_err(|err| {
        PipelineError::config(format!("read dataset {}: {err}", path.display()))
    })?;
    let mut records = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: DatasetRecord = serde_json::from_str(line).map_err(|err| {
            PipelineError::config(format!(
                "dataset {} line {}: {err}",
                path.display(),
                line_num + 1
            ))
        })?;
        if record.instruction.trim().is_empty() {
            return Err(PipelineError::config(format!(
                "dataset {} line {}: instruction is empty",
                path.display(),
                line_num + 1
            )));
        }
        records.push(record);
    }
    Ok(records)
}

/// Pick exactly one record and resolve its image path.
pub fn select_record(path: &Path, selection: Selection) -> PipelineResult<DatasetRecord> {
    let records = load_records(path)?;
    let count = records.len();
    let index = match selection {
        Selection::First => 0,
        Selection::Index(index) => index,
    };
    let mut record = records.into_iter().nth(index).ok_or_else(|| {
        PipelineError::config(format!(
            "dataset {} has {count} records; cannot select index {index}",
            path.display()
        ))
    })?;
    record.image = resolve_image_path(&record.image, path);
    tracing::info!(
        image = %record.image.display(),
        index,
        "selected dataset record"
    );
    Ok(record)
}

fn resolve_image_path(image: &Path, dataset_path: &Path) -> PathBuf {
    if image.is_absolute() || image.exists() {
        return image.to_path_buf();
    }
    match dataset_path.parent() {
        Some(dir) if dir.join(image).exists() => dir.join(image),
        _ => image.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_dataset(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("test.jsonl");
        fs::write(&path, body).expect("write dataset");
        path
    }

    #[test]
    fn selects_first_record_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_dataset(
            dir.path(),
            "{\"svg_path\": \"a.svg\", \"instruction\": \"spin\"}\n\n{\"image\": \"b.svg\", \"prompt\": \"fade\"}\n",
        );
        let record = select_record(&path, Selection::First).expect("select");
        assert_eq!(record.instruction, "spin");
        assert_eq!(record.image, PathBuf::from("a.svg"));

        let second = select_record(&path, Selection::Index(1)).expect("select second");
        assert_eq!(second.instruction, "fade");
    }

    #[test]
    fn resolves_image_relative_to_dataset_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("shape-only-here.svg"), "<svg/>").expect("write svg");
        let path = write_dataset(
            dir.path(),
            "{\"svg\": \"shape-only-here.svg\", \"instruction\": \"pulse\"}\n",
        );
        let record = select_record(&path, Selection::First).expect("select");
        assert_eq!(record.image, dir.path().join("shape-only-here.svg"));
    }

    #[test]
    fn out_of_range_and_malformed_are_config_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_dataset(dir.path(), "{\"image\": \"a.svg\", \"instruction\": \"x\"}\n");
        assert!(matches!(
            select_record(&path, Selection::Index(3)),
            Err(PipelineError::Config(_))
        ));

        let bad = write_dataset(dir.path(), "{\"image\": \"a.svg\"}\n");
        let err = select_record(&bad, Selection::First).expect_err("missing instruction");
        assert!(err.to_string().contains("line 1"));
    }
}
