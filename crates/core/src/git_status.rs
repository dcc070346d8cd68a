// crates/core/src/git_status.rs
//! Git working-tree status via subprocess (spec §3 "git"). Grounded on
//! `claude-view-db`'s `git_correlation.rs` (`check_is_git_repo`,
//! `get_current_branch`): `tokio::process::Command` + `tokio::time::timeout`
//! around each invocation, current_dir set to the project path.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use session_health_types::GitState;

use crate::freshness::now_ms;

const GIT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(3);

async fn run_git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = tokio::time::timeout(
        GIT_SUBPROCESS_TIMEOUT,
        Command::new("git").args(args).current_dir(dir).output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Parse `git status --porcelain=v1 --branch` output into ahead/behind/dirty.
/// First line looks like `## main...origin/main [ahead 2, behind 1]`; every
/// subsequent non-empty line is a dirty working-tree entry.
fn parse_status_porcelain(raw: &str) -> (u32, u32, bool) {
    let mut ahead = 0u32;
    let mut behind = 0u32;
    let mut dirty = false;

    for (i, line) in raw.lines().enumerate() {
        if i == 0 {
            if let Some(bracket) = line.find('[') {
                let inner = &line[bracket + 1..line.find(']').unwrap_or(line.len())];
                for part in inner.split(',') {
                    let part = part.trim();
                    if let Some(n) = part.strip_prefix("ahead ") {
                        ahead = n.trim().parse().unwrap_or(0);
                    } else if let Some(n) = part.strip_prefix("behind ") {
                        behind = n.trim().parse().unwrap_or(0);
                    }
                }
            }
        } else if !line.trim().is_empty() {
            dirty = true;
        }
    }

    (ahead, behind, dirty)
}

/// Fetch `GitState` for `project_path` by shelling out to `git`. Returns
/// `None` if the directory is not a git repository or any subprocess call
/// fails/times out — callers treat `None` as "source unavailable", not an
/// error (spec §7 "Transient external failure").
pub async fn fetch(project_path: &Path) -> Option<GitState> {
    let branch = run_git(project_path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    if branch.is_empty() {
        return None;
    }

    let status = run_git(project_path, &["status", "--porcelain=v1", "--branch"])
        .await
        .unwrap_or_default();
    let (ahead, behind, dirty) = parse_status_porcelain(&status);

    Some(GitState {
        branch: Some(branch),
        ahead,
        behind,
        dirty,
        last_checked: now_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ahead_behind_from_branch_header() {
        let raw = "## main...origin/main [ahead 2, behind 1]\n M src/lib.rs\n";
        let (ahead, behind, dirty) = parse_status_porcelain(raw);
        assert_eq!(ahead, 2);
        assert_eq!(behind, 1);
        assert!(dirty);
    }

    #[test]
    fn clean_tree_has_no_dirty_flag() {
        let raw = "## main...origin/main\n";
        let (ahead, behind, dirty) = parse_status_porcelain(raw);
        assert_eq!(ahead, 0);
        assert_eq!(behind, 0);
        assert!(!dirty);
    }

    #[tokio::test]
    async fn fetch_on_non_git_directory_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = fetch(dir.path()).await;
        assert!(result.is_none());
    }
}
