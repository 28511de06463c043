//! Run State Persistence
//!
//! One JSON record per (workflow name, target) pair, stored under the state
//! directory as `{workflow}-{target}-{hash}.json`. Records are written to a
//! temporary file in the same directory and renamed into place, so a crash
//! mid-write never leaves a half-written record behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// File extension of persisted records.
const RECORD_EXTENSION: &str = "json";

/// Longest readable prefix kept from each half of the key.
const SLUG_LIMIT: usize = 40;

/// Lifecycle of a run as persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    /// True for states a resume should pick up.
    pub fn is_resumable(self) -> bool {
        !matches!(self, RunStatus::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        };
        f.write_str(text)
    }
}

/// Durable progress of one run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StateRecord {
    pub workflow_name: String,
    pub target: String,

    /// Index of the next step to execute
    pub current_step_index: usize,

    /// Indices of steps that finished successfully
    pub completed_steps: BTreeSet<usize>,

    /// Resolved variables at the last checkpoint
    pub variables: BTreeMap<String, String>,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RunStatus,
}

impl StateRecord {
    /// Creates a fresh record positioned at step 0.
    pub fn new(workflow_name: &str, target: &str) -> Self {
        let now = Utc::now();
        Self {
            workflow_name: workflow_name.to_string(),
            target: target.to_string(),
            current_step_index: 0,
            completed_steps: BTreeSet::new(),
            variables: BTreeMap::new(),
            started_at: now,
            updated_at: now,
            status: RunStatus::Running,
        }
    }

    /// Records a successful step and moves past it.
    pub fn mark_completed(&mut self, index: usize) {
        self.completed_steps.insert(index);
        self.current_step_index = index + 1;
        self.status = RunStatus::Running;
        self.touch();
    }

    /// Moves past a step that failed but was allowed to.
    pub fn mark_skipped(&mut self, index: usize) {
        self.completed_steps.remove(&index);
        self.current_step_index = index + 1;
        self.status = RunStatus::Running;
        self.touch();
    }

    /// Stops at a failing step so a resume retries it.
    pub fn mark_failed(&mut self, index: usize) {
        self.current_step_index = index;
        self.status = RunStatus::Failed;
        self.touch();
    }

    /// Stops at the interrupted step so a resume retries it.
    pub fn mark_aborted(&mut self, index: usize) {
        self.current_step_index = index;
        self.status = RunStatus::Aborted;
        self.touch();
    }

    pub fn mark_finished(&mut self) {
        self.status = RunStatus::Completed;
        self.touch();
    }

    /// Returns true if step `index` already finished successfully.
    pub fn is_completed(&self, index: usize) -> bool {
        self.completed_steps.contains(&index)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One line of `list` output.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSummary {
    pub workflow_name: String,
    pub target: String,
    pub status: RunStatus,
    pub current_step_index: usize,
    pub completed: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&StateRecord> for StateSummary {
    fn from(record: &StateRecord) -> Self {
        Self {
            workflow_name: record.workflow_name.clone(),
            target: record.target.clone(),
            status: record.status,
            current_step_index: record.current_step_index,
            completed: record.completed_steps.len(),
            updated_at: record.updated_at,
        }
    }
}

/// Directory-backed store of [`StateRecord`]s.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file a (workflow, target) record lives in.
    pub fn record_path(&self, workflow_name: &str, target: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            state_key(workflow_name, target),
            RECORD_EXTENSION
        ))
    }

    /// Loads the record for a pair.
    ///
    /// Missing records and unreadable records both come back as `None`; the
    /// latter is logged so the run can start fresh instead of failing.
    pub fn load(&self, workflow_name: &str, target: &str) -> Option<StateRecord> {
        match self.try_load(workflow_name, target) {
            Ok(record) => record,
            Err(e) => {
                warn!("{}. Starting from a fresh state.", e);
                None
            }
        }
    }

    /// Loads the record for a pair, surfacing corruption as an error.
    pub fn try_load(&self, workflow_name: &str, target: &str) -> Result<Option<StateRecord>> {
        let path = self.record_path(workflow_name, target);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state record at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::StateCorruption {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let record = read_record(&path, &content)?;
        if record.workflow_name != workflow_name || record.target != target {
            return Err(Error::StateCorruption {
                path,
                reason: format!(
                    "record belongs to ('{}', '{}')",
                    record.workflow_name, record.target
                ),
            });
        }

        info!("Loaded state from {}", path.display());
        debug!("Previously completed: {:?}", record.completed_steps);
        Ok(Some(record))
    }

    /// Atomically writes a record, replacing any previous version.
    pub fn save(&self, record: &StateRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.record_path(&record.workflow_name, &record.target);
        let json = serde_json::to_vec_pretty(record)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(
            "Checkpoint {} (step {}, {})",
            path.display(),
            record.current_step_index,
            record.status
        );
        Ok(())
    }

    /// Removes the record for a pair. Returns whether one existed.
    pub fn delete(&self, workflow_name: &str, target: &str) -> Result<bool> {
        let path = self.record_path(workflow_name, target);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted state file: {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Summarizes every readable record, sorted by workflow then target.
    pub fn list(&self) -> Result<Vec<StateSummary>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let loaded = fs::read_to_string(&path)
                .map_err(|e| Error::StateCorruption {
                    path: path.clone(),
                    reason: e.to_string(),
                })
                .and_then(|content| read_record(&path, &content));

            match loaded {
                Ok(record) => summaries.push(StateSummary::from(&record)),
                Err(e) => warn!("Skipping {}", e),
            }
        }

        summaries.sort_by(|a, b| {
            (a.workflow_name.as_str(), a.target.as_str())
                .cmp(&(b.workflow_name.as_str(), b.target.as_str()))
        });
        Ok(summaries)
    }
}

fn read_record(path: &Path, content: &str) -> Result<StateRecord> {
    serde_json::from_str(content).map_err(|e| Error::StateCorruption {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Derives the file stem for a pair: readable slugs plus a digest of both
/// raw values, so distinct pairs never share a file.
fn state_key(workflow_name: &str, target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}-{}-{}", slug(workflow_name), slug(target), &digest[..16])
}

fn slug(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(SLUG_LIMIT)
        .collect();

    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}
