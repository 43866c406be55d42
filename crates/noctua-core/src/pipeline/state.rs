//! Pipeline state and its on-disk snapshot.
//!
//! `PipelineState` is the single live record of a run. The driver mutates
//! it and persists the full JSON to `workDir/state.json` after every
//! state-affecting mutation, so a run is observable (and resumable by a
//! human) at any point.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths;
use crate::report::{ReconReport, TestReport};

/// Max length of a project slug.
const SLUG_MAX_CHARS: usize = 50;

/// Default cap on repair attempts before the pipeline gives up.
pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u32 = 5;

/// The six pipeline phases plus the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Recon,
    Schema,
    Codegen,
    Test,
    Repair,
    Harden,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recon => "recon",
            Self::Schema => "schema",
            Self::Codegen => "codegen",
            Self::Test => "test",
            Self::Repair => "repair",
            Self::Harden => "harden",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub project_name: String,
    pub target_url: String,
    pub user_intent: String,
    pub work_dir: PathBuf,
    pub scraper_dir: PathBuf,
    pub current_stage: Stage,
    #[serde(default)]
    pub recon_report: Option<ReconReport>,
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
    #[serde(default)]
    pub test_results: Vec<TestReport>,
    pub repair_attempts: u32,
    pub max_repair_attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// Fresh state for a new run. The project slug is derived from the
    /// user intent; the workspace is rooted under `base_dir`.
    pub fn new(
        base_dir: &Path,
        target_url: impl Into<String>,
        user_intent: impl Into<String>,
        max_repair_attempts: u32,
    ) -> Self {
        let user_intent = user_intent.into();
        let project_name = slugify(&user_intent);
        let work_dir = paths::work_dir(base_dir, &project_name);
        let scraper_dir = paths::scraper_dir(&work_dir);
        Self {
            project_name,
            target_url: target_url.into(),
            user_intent,
            work_dir,
            scraper_dir,
            current_stage: Stage::Recon,
            recon_report: None,
            schema_path: None,
            test_results: Vec::new(),
            repair_attempts: 0,
            max_repair_attempts: max_repair_attempts.max(1),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn last_test_report(&self) -> Option<&TestReport> {
        self.test_results.last()
    }
}

/// Derive a filesystem-safe project slug: lowercase, `[a-z0-9-]+`,
/// at most 50 chars, no leading or trailing dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let trimmed: String = slug.trim_matches('-').chars().take(SLUG_MAX_CHARS).collect();
    trimmed.trim_end_matches('-').to_string()
}

/// Write the full state snapshot to `workDir/state.json`.
pub async fn save_state(state: &PipelineState) -> Result<()> {
    let path = paths::state_file(&state.work_dir);
    let json = serde_json::to_string_pretty(state).context("serializing pipeline state")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Read a state snapshot back, if one exists.
pub async fn load_state(work_dir: &Path) -> Result<Option<PipelineState>> {
    let path = paths::state_file(work_dir);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(anyhow::Error::from(err))
                .with_context(|| format!("reading {}", path.display()))
        }
    };
    let state = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_examples() {
        assert_eq!(
            slugify("OSCN court records – Oklahoma County"),
            "oscn-court-records-oklahoma-county"
        );
        assert_eq!(slugify("X"), "x");
        assert_eq!(slugify("  --weird   input!!  "), "weird-input");
    }

    #[test]
    fn slugify_is_idempotent() {
        for input in ["OSCN court records – Oklahoma County", "a  b", "ALL CAPS 42"] {
            let once = slugify(input);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn slugify_truncates_without_trailing_dash() {
        let long = "word ".repeat(30);
        let slug = slugify(&long);
        assert!(slug.len() <= 50);
        assert!(!slug.ends_with('-'));
        assert!(!slug.starts_with('-'));
    }

    #[test]
    fn new_state_derives_workspace_layout() {
        let state = PipelineState::new(Path::new("/tmp/run"), "https://x.test", "X", 5);
        assert_eq!(state.project_name, "x");
        assert_eq!(state.work_dir, PathBuf::from("/tmp/run/.noctua/pipelines/x"));
        assert_eq!(
            state.scraper_dir,
            PathBuf::from("/tmp/run/.noctua/pipelines/x/scraper")
        );
        assert_eq!(state.current_stage, Stage::Recon);
        assert_eq!(state.repair_attempts, 0);
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = PipelineState::new(dir.path(), "https://x.test", "demo run", 5);
        tokio::fs::create_dir_all(&state.work_dir).await.unwrap();
        state.current_stage = Stage::Codegen;
        state.schema_path = Some(state.scraper_dir.join("schema.ts"));

        save_state(&state).await.unwrap();
        let loaded = load_state(&state.work_dir).await.unwrap().unwrap();

        assert_eq!(loaded.current_stage, Stage::Codegen);
        assert_eq!(loaded.project_name, state.project_name);
        assert_eq!(loaded.schema_path, state.schema_path);
    }

    #[tokio::test]
    async fn load_missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(dir.path()).await.unwrap().is_none());
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Codegen).unwrap(), "\"codegen\"");
        assert_eq!(serde_json::to_string(&Stage::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn state_json_is_camel_case() {
        let state = PipelineState::new(Path::new("/b"), "https://x.test", "Some Intent", 5);
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("projectName").is_some());
        assert!(value.get("maxRepairAttempts").is_some());
        assert!(value.get("startedAt").is_some());
    }
}
