//! Centralized workspace layout.
//!
//! Every run owns a workspace directory under the caller's base dir:
//! `{base}/.noctua/pipelines/{project}`. All artifact paths are derived
//! here so the driver, prompts and tests agree on the layout.

use std::path::{Path, PathBuf};

/// Directory (relative to the base dir) that holds all pipeline workspaces.
pub const PIPELINES_DIR: &str = "pipelines";

/// Hidden root for everything noctua writes under the base dir.
pub const NOCTUA_DIR: &str = ".noctua";

/// Directory (relative to the base dir) where the run-time scaffold lives.
pub const SCAFFOLD_DIR: &str = "scaffold";

/// Workspace directory for a run: `{base}/.noctua/pipelines/{project}`.
pub fn work_dir(base_dir: &Path, project_name: &str) -> PathBuf {
    base_dir
        .join(NOCTUA_DIR)
        .join(PIPELINES_DIR)
        .join(project_name)
}

/// Directory that holds the generated scraper artifacts.
pub fn scraper_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("scraper")
}

pub fn state_file(work_dir: &Path) -> PathBuf {
    work_dir.join("state.json")
}

pub fn debug_log_file(work_dir: &Path) -> PathBuf {
    work_dir.join("debug.log")
}

pub fn findings_file(work_dir: &Path) -> PathBuf {
    work_dir.join("findings.txt")
}

pub fn recon_report_file(work_dir: &Path) -> PathBuf {
    work_dir.join("recon-report.json")
}

/// Raw synthesize attempts, kept for diagnostics.
pub fn synth_attempt_file(work_dir: &Path, attempt: u32) -> PathBuf {
    work_dir.join(format!("synth-attempt-{attempt}.txt"))
}

pub fn test_report_file(work_dir: &Path) -> PathBuf {
    work_dir.join("test-report.json")
}

pub fn schema_file(scraper_dir: &Path) -> PathBuf {
    scraper_dir.join("schema.ts")
}

pub fn scraper_file(scraper_dir: &Path) -> PathBuf {
    scraper_dir.join("scraper.ts")
}

pub fn entry_file(scraper_dir: &Path) -> PathBuf {
    scraper_dir.join("index.ts")
}

/// Relative import path from the scraper dir back to the scaffold.
///
/// Counts directory levels from the scraper dir up to the project root
/// (the parent of `.noctua`) and emits the matching `../` chain. Falls
/// back to the standard four-level layout when the workspace was created
/// outside `work_dir()` (tests with hand-built paths).
pub fn scaffold_import_path(scraper_dir: &Path) -> String {
    let components: Vec<&str> = scraper_dir
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    let depth = components
        .iter()
        .position(|c| *c == NOCTUA_DIR)
        .map(|idx| components.len() - idx)
        .unwrap_or(4);

    format!("{}{}/index.js", "../".repeat(depth), SCAFFOLD_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_dir_layout() {
        let dir = work_dir(Path::new("/tmp/run"), "x");
        assert_eq!(dir, PathBuf::from("/tmp/run/.noctua/pipelines/x"));
    }

    #[test]
    fn artifact_names() {
        let wd = PathBuf::from("/w");
        assert_eq!(state_file(&wd), PathBuf::from("/w/state.json"));
        assert_eq!(
            synth_attempt_file(&wd, 2),
            PathBuf::from("/w/synth-attempt-2.txt")
        );
        let sd = scraper_dir(&wd);
        assert_eq!(schema_file(&sd), PathBuf::from("/w/scraper/schema.ts"));
        assert_eq!(entry_file(&sd), PathBuf::from("/w/scraper/index.ts"));
    }

    #[test]
    fn scaffold_path_counts_levels_from_workspace_root() {
        let sd = scraper_dir(&work_dir(Path::new("/base"), "proj"));
        // scraper -> proj -> pipelines -> .noctua -> base
        assert_eq!(scaffold_import_path(&sd), "../../../../scaffold/index.js");
    }

    #[test]
    fn scaffold_path_falls_back_to_default_depth() {
        assert_eq!(
            scaffold_import_path(Path::new("/somewhere/else")),
            "../../../../scaffold/index.js"
        );
    }
}
