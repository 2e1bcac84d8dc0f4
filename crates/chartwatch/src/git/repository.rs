//! Clone-or-pull synchronization of working copies.

use std::path::Path;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use super::auth::authenticated_url;
use crate::error::SyncError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::sanitize::{mask_remote, redact_secret};

/// Keeps a local working copy of one branch of a remote repository current.
///
/// Calls for the same `local_path` must be serialized by the caller, see
/// [`crate::git::RepoLocks`]. Failures are never retried.
pub struct RepositorySync {
    runner: Arc<dyn CommandRunner>,
    git_host: String,
}

impl RepositorySync {
    pub fn new(runner: Arc<dyn CommandRunner>, git_host: impl Into<String>) -> Self {
        Self {
            runner,
            git_host: git_host.into(),
        }
    }

    /// Clones `repository` into `local_path` if it is missing, otherwise pulls
    /// `branch` into it; then checks out `branch`.
    pub fn sync(
        &self,
        local_path: &Path,
        repository: &str,
        branch: &str,
        token: &SecretString,
    ) -> Result<(), SyncError> {
        validate_branch(branch)?;

        let url = authenticated_url(&self.git_host, repository, token);
        let secret = token.expose_secret();

        if local_path.exists() {
            log::info!(
                "Pulling {} ({}) into {}",
                mask_remote(&url),
                branch,
                local_path.display()
            );

            // Refresh the remote so a rotated token takes effect.
            let set_url = self.git(Some(local_path), &["remote", "set-url", "origin", url.as_str()]);
            check(set_url, secret, SyncError::Pull)?;

            let pull = self.git(Some(local_path), &["pull", "origin", branch]);
            check(pull, secret, SyncError::Pull)?;
        } else {
            if let Some(parent) = local_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SyncError::WorkingDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            log::info!(
                "Cloning {} into {}",
                mask_remote(&url),
                local_path.display()
            );

            let target = local_path.to_string_lossy();
            let clone = self.git(None, &["clone", url.as_str(), target.as_ref()]);
            check(clone, secret, SyncError::Clone)?;
        }

        let checkout = self.git(Some(local_path), &["checkout", branch]);
        check(checkout, secret, |reason| SyncError::Checkout {
            branch: branch.to_string(),
            reason,
        })
    }

    fn git(&self, dir: Option<&Path>, args: &[&str]) -> std::io::Result<CommandOutput> {
        let mut spec = CommandSpec::new("git")
            .args(args.iter().copied())
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            spec = spec.current_dir(dir);
        }
        self.runner.run(&spec)
    }
}

/// Rejects branch names git would read as an option or refuse as a ref.
///
/// Mirrors the rules of `git check-ref-format --branch`.
pub fn validate_branch(branch: &str) -> Result<(), SyncError> {
    let invalid = |reason: &str| {
        Err(SyncError::InvalidBranch {
            branch: branch.to_string(),
            reason: reason.to_string(),
        })
    };

    if branch.is_empty() {
        return invalid("empty");
    }
    if branch.starts_with('-') {
        return invalid("must not start with '-'");
    }
    if branch == "@" {
        return invalid("'@' is not a branch");
    }
    if branch.starts_with('/') || branch.ends_with('/') || branch.contains("//") {
        return invalid("empty path component");
    }
    if branch.ends_with('.') || branch.contains("..") || branch.contains("@{") {
        return invalid("contains a forbidden sequence");
    }
    if branch
        .chars()
        .any(|c| c.is_ascii_control() || c == ' ' || "~^:?*[\\".contains(c))
    {
        return invalid("contains a forbidden character");
    }
    if branch
        .split('/')
        .any(|part| part.starts_with('.') || part.ends_with(".lock"))
    {
        return invalid("component starts with '.' or ends with '.lock'");
    }

    Ok(())
}

/// Maps a failed or unrunnable git command to `make_error`, scrubbing `secret`.
fn check(
    result: std::io::Result<CommandOutput>,
    secret: &str,
    make_error: impl FnOnce(String) -> SyncError,
) -> Result<(), SyncError> {
    let reason = match result {
        Ok(output) if output.success => return Ok(()),
        Ok(output) => output.failure_reason(),
        Err(e) => e.to_string(),
    };
    Err(make_error(redact_secret(&reason, secret)))
}
