//! Append-only JSONL caches for resumable pipeline stages.
//!
//! Both the plan cache and the tagged-decomposition cache share this shape:
//! one JSON object per line, keyed by a string, read for resume and appended
//! on fresh computation. Caches are an optimization, so a corrupt file or a
//! corrupt line degrades to a cache miss instead of failing the run.
use crate::error::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A resource that is either already materialized or still needs computing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    Materialized(T),
    Pending,
}

impl<T> Cached<T> {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized(_))
    }
}

/// A cache line with a lookup key.
pub trait CacheEntry: Serialize + DeserializeOwned {
    fn key(&self) -> &str;
}

/// JSONL file of cache entries; later lines win over earlier ones.
#[derive(Debug, Clone)]
pub struct JsonlCache<T> {
    path: PathBuf,
    _entry: PhantomData<fn() -> T>,
}

impl<T: CacheEntry> JsonlCache<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the most recent entry for `key`.
    ///
    /// Never fails: a missing file is a miss, and an unreadable file is
    /// logged as cache corruption and treated as a miss.
    pub fn load(&self, key: &str) -> Cached<T> {
        self.load_where(key, |_| true)
    }

    /// Look up the most recent entry for `key` that passes `accept`.
    ///
    /// Entries are tried newest first, so an older valid entry is still found
    /// behind newer ones for the same key that `accept` rejects.
    pub fn load_where(&self, key: &str, mut accept: impl FnMut(&T) -> bool) -> Cached<T> {
        if !self.path.is_file() {
            tracing::debug!(path = %self.path.display(), "cache file absent");
            return Cached::Pending;
        }
        let entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable cache");
                return Cached::Pending;
            }
        };
        match entries
            .into_iter()
            .rev()
            .find(|entry| entry.key() == key && accept(entry))
        {
            Some(entry) => Cached::Materialized(entry),
            None => Cached::Pending,
        }
    }

    /// Read every parsable entry, skipping corrupt lines with a warning.
    pub fn read_entries(&self) -> PipelineResult<Vec<T>> {
        let bytes = fs::read(&self.path).map_err(|source| PipelineError::io(&self.path, source))?;
        let text = String::from_utf8(bytes).map_err(|err| PipelineError::CacheCorruption {
            path: self.path.clone(),
            reason: format!("not UTF-8: {err}"),
        })?;

        let mut entries = Vec::new();
        for (line_num, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    let corruption = PipelineError::CacheCorruption {
                        path: self.path.clone(),
                        reason: format!("line {}: {err}", line_num + 1),
                    };
                    tracing::warn!(error = %corruption, "skip corrupt cache entry");
                }
            }
        }
        Ok(entries)
    }

    /// Append an entry, creating the file and its parent directory if needed.
    pub fn append(&self, entry: &T) -> PipelineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PipelineError::io(parent, source))?;
        }
        let line = serde_json::to_string(entry).map_err(|err| PipelineError::CacheCorruption {
            path: self.path.clone(),
            reason: format!("serialize entry: {err}"),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| PipelineError::io(&self.path, source))?;
        writeln!(file, "{line}").map_err(|source| PipelineError::io(&self.path, source))?;
        tracing::debug!(path = %self.path.display(), key = entry.key(), "cache entry appended");
        Ok(())
    }
}
