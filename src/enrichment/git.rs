// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Git metadata for the `git` enrichment.
//!
//! All commands are best-effort: a failing, missing or slow `git` simply
//! yields no value, so enrichment never blocks the hook.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Timeout applied to every git invocation.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs git commands. Returns trimmed stdout, or `None` on any failure.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, args: &[&str]) -> Option<String>;
}

/// Runs the system `git` binary in a working directory.
pub struct SystemGit {
    cwd: PathBuf,
    timeout: Duration,
}

impl SystemGit {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            timeout: GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, args: &[&str]) -> Option<String> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(Ok(output)) => {
                debug!(
                    args = ?args,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git command failed"
                );
                None
            }
            Ok(Err(e)) => {
                debug!(args = ?args, error = %e, "git could not be spawned");
                None
            }
            Err(_) => {
                debug!(args = ?args, "git command timed out");
                None
            }
        }
    }
}

/// Check if the working directory is inside a git repository.
pub async fn is_git_repo(git: &dyn GitRunner) -> bool {
    git.run(&["rev-parse", "--git-dir"]).await.is_some()
}

/// Capture git metadata as `git.*` trace tags.
///
/// Values git cannot provide are left out rather than set to empty strings.
pub async fn get_git_metadata(git: &dyn GitRunner) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if !is_git_repo(git).await {
        return metadata;
    }

    let commit = git.run(&["rev-parse", "HEAD"]).await;
    let branch = git.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await;
    let remote = git.run(&["remote", "get-url", "origin"]).await;
    let toplevel = git.run(&["rev-parse", "--show-toplevel"]).await;

    let repo_name = match (&remote, &toplevel) {
        (Some(remote), _) => repo_name_from_remote(remote),
        (None, Some(root)) => Path::new(root)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        (None, None) => None,
    };

    let entries = [
        ("git.commit_id", commit),
        ("git.branch", branch),
        ("git.remote_url", remote),
        ("git.repo_name", repo_name),
    ];
    for (key, value) in entries {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            metadata.insert(key.to_string(), value);
        }
    }
    metadata
}

/// Derive `org/repo` from an HTTPS or SSH remote URL.
pub fn repo_name_from_remote(remote: &str) -> Option<String> {
    let trimmed = remote.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    if trimmed.contains('@') && trimmed.contains(':') && !trimmed.contains("://") {
        // git@github.com:org/repo
        return trimmed
            .rsplit(':')
            .next()
            .filter(|s| !s.is_empty())
            .map(String::from);
    }

    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() >= 2 {
        let owner = parts[parts.len() - 2];
        let repo = parts[parts.len() - 1];
        if !owner.is_empty() && !repo.is_empty() {
            return Some(format!("{}/{}", owner, repo));
        }
    }
    None
}

/// A commit from `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    /// ISO 8601 author date.
    pub date: String,
    pub subject: String,
}

/// Get the last `n` commits of the current branch.
pub async fn get_recent_commits(git: &dyn GitRunner, n: usize) -> Vec<CommitInfo> {
    if !is_git_repo(git).await {
        return Vec::new();
    }
    let count = format!("-{}", n);
    match git.run(&["log", &count, "--format=%H|%h|%an|%aI|%s"]).await {
        Some(output) => parse_commit_log(&output),
        None => Vec::new(),
    }
}

/// Parse `%H|%h|%an|%aI|%s` lines; the subject keeps any further `|`.
pub fn parse_commit_log(output: &str) -> Vec<CommitInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.splitn(5, '|').collect();
            if parts.len() != 5 {
                return None;
            }
            Some(CommitInfo {
                hash: parts[0].to_string(),
                short_hash: parts[1].to_string(),
                author: parts[2].to_string(),
                date: parts[3].to_string(),
                subject: parts[4].to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers git commands from a fixed table.
    #[derive(Default)]
    pub(crate) struct FakeGit {
        pub responses: HashMap<Vec<String>, String>,
        pub repo: bool,
    }

    impl FakeGit {
        pub fn repo() -> Self {
            Self {
                responses: HashMap::new(),
                repo: true,
            }
        }

        pub fn with(mut self, args: &[&str], out: &str) -> Self {
            self.responses
                .insert(args.iter().map(|s| s.to_string()).collect(), out.to_string());
            self
        }
    }

    #[async_trait]
    impl GitRunner for FakeGit {
        async fn run(&self, args: &[&str]) -> Option<String> {
            if args == ["rev-parse", "--git-dir"] {
                return self.repo.then(|| ".git".to_string());
            }
            let key: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            self.responses.get(&key).cloned()
        }
    }

    fn standard(remote: Option<&str>) -> FakeGit {
        let git = FakeGit::repo()
            .with(&["rev-parse", "HEAD"], "abc123def456")
            .with(&["rev-parse", "--abbrev-ref", "HEAD"], "main")
            .with(&["rev-parse", "--show-toplevel"], "/home/user/my-project");
        match remote {
            Some(r) => git.with(&["remote", "get-url", "origin"], r),
            None => git,
        }
    }

    #[tokio::test]
    async fn test_not_a_git_repo() {
        let git = FakeGit::default();
        assert!(!is_git_repo(&git).await);
        assert!(get_git_metadata(&git).await.is_empty());
        assert!(get_recent_commits(&git, 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_https_remote() {
        let git = standard(Some("https://github.com/myorg/myrepo.git"));
        let metadata = get_git_metadata(&git).await;
        assert_eq!(metadata["git.commit_id"], "abc123def456");
        assert_eq!(metadata["git.branch"], "main");
        assert_eq!(metadata["git.remote_url"], "https://github.com/myorg/myrepo.git");
        assert_eq!(metadata["git.repo_name"], "myorg/myrepo");
    }

    #[tokio::test]
    async fn test_ssh_remote() {
        let git = standard(Some("git@github.com:myorg/myrepo.git"));
        let metadata = get_git_metadata(&git).await;
        assert_eq!(metadata["git.repo_name"], "myorg/myrepo");
    }

    #[tokio::test]
    async fn test_no_remote_uses_directory_name() {
        let git = standard(None);
        let metadata = get_git_metadata(&git).await;
        assert_eq!(metadata["git.repo_name"], "my-project");
        assert!(!metadata.contains_key("git.remote_url"));
    }

    #[tokio::test]
    async fn test_missing_values_are_omitted() {
        let git = FakeGit::repo().with(&["rev-parse", "HEAD"], "abc123");
        let metadata = get_git_metadata(&git).await;
        assert!(metadata.contains_key("git.commit_id"));
        assert!(!metadata.contains_key("git.branch"));
        assert!(!metadata.contains_key("git.remote_url"));
        assert!(!metadata.contains_key("git.repo_name"));
    }

    #[test]
    fn test_repo_name_variants() {
        assert_eq!(
            repo_name_from_remote("https://github.com/myorg/myrepo").as_deref(),
            Some("myorg/myrepo")
        );
        assert_eq!(
            repo_name_from_remote("https://github.com/myorg/myrepo/").as_deref(),
            Some("myorg/myrepo")
        );
        assert_eq!(
            repo_name_from_remote("ssh://git@github.com/myorg/myrepo.git").as_deref(),
            Some("myorg/myrepo")
        );
        assert_eq!(
            repo_name_from_remote("git@gitlab.com:group/sub/proj.git").as_deref(),
            Some("group/sub/proj")
        );
        assert_eq!(repo_name_from_remote("myrepo"), None);
    }

    #[test]
    fn test_parse_commits() {
        let log = "abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Initial commit\n\
                   def456|def4|Bob|2024-01-16T11:00:00+00:00|Add feature";
        let commits = parse_commit_log(log);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].short_hash, "abc1");
        assert_eq!(commits[0].author, "Alice");
        assert_eq!(commits[0].date, "2024-01-15T10:30:00+00:00");
        assert_eq!(commits[0].subject, "Initial commit");
        assert_eq!(commits[1].author, "Bob");
    }

    #[test]
    fn test_parse_commit_subject_with_pipe() {
        let commits =
            parse_commit_log("abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Fix bug | handle edge case");
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].subject, "Fix bug | handle edge case");
    }

    #[test]
    fn test_parse_commits_skips_malformed_and_empty_lines() {
        let log = "abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Good commit\n\
                   malformed line\n\
                   \n\
                   def456|def4|Bob|2024-01-16T11:00:00+00:00|Another good commit\n";
        assert_eq!(parse_commit_log(log).len(), 2);
    }

    #[tokio::test]
    async fn test_recent_commits_uses_count() {
        let git = FakeGit::repo().with(
            &["log", "-1", "--format=%H|%h|%an|%aI|%s"],
            "abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Commit",
        );
        let commits = get_recent_commits(&git, 1).await;
        assert_eq!(commits.len(), 1);
        assert!(get_recent_commits(&git, 2).await.is_empty());
    }

    #[tokio::test]
    async fn test_system_git_outside_repo() {
        let temp = tempfile::TempDir::new().unwrap();
        let git = SystemGit::new(temp.path());
        // Either git is missing or the temp dir is not a repo; both mean "absent".
        assert!(get_git_metadata(&git).await.is_empty());
    }
}
