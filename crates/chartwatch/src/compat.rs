//! Compatibility orchestration: sync, discover, check and bump.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::checker::ApiChecker;
use crate::config::Settings;
use crate::discovery::discover_charts;
use crate::error::ChartIssue;
use crate::git::{working_copy_dir, RepoLocks, RepositorySync};
use crate::models::{dedup_preserving_order, now_rfc3339, CompatibilityRequest, CompatibilityResult};
use crate::process::CommandRunner;
use crate::sanitize::chart_label;
use crate::version::ChartDescriptor;

/// Message reported when the working copy has no chart descriptors.
pub const NO_CHARTS_MESSAGE: &str = "no chart descriptors found";

/// Runs compatibility checks against per-repository working copies.
///
/// Checks that resolve to the same working copy are serialized through
/// [`RepoLocks`]; the blocking work runs on the blocking thread pool, at most `max_concurrency`
/// checks at a time.
pub struct CompatibilityOrchestrator {
    working_dir: PathBuf,
    token: SecretString,
    sync: RepositorySync,
    checker: ApiChecker,
    locks: RepoLocks,
    permits: Arc<Semaphore>,
    lock_timeout: Duration,
}

impl CompatibilityOrchestrator {
    pub fn new(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Self {
        let max_concurrency = usize::try_from(settings.max_concurrency)
            .unwrap_or(1)
            .max(1);
        let lock_timeout =
            Duration::from_secs(u64::try_from(settings.request_timeout).unwrap_or(1).max(1));

        Self {
            working_dir: PathBuf::from(&settings.working_dir),
            token: settings.github_token_secret(),
            sync: RepositorySync::new(Arc::clone(&runner), settings.git_host.as_str()),
            checker: ApiChecker::new(
                runner,
                settings.checker_command.as_str(),
                &settings.checker_script,
            ),
            locks: RepoLocks::new(),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            lock_timeout,
        }
    }

    /// Runs one check without blocking the async runtime.
    ///
    /// Every failure is folded into the returned result.
    pub async fn check(self: Arc<Self>, request: CompatibilityRequest) -> CompatibilityResult {
        let span = tracing::info_span!(
            "compat.check",
            repository = %request.repository,
            branch = %request.branch,
            kubernetes_version = %request.kubernetes_version,
        );

        async move {
            if request.repository.trim().is_empty() {
                return CompatibilityResult::failed(
                    "Failed to clone/update repository: no repository specified",
                );
            }

            let lock_key = self.lock_key(&request.repository);
            let acquire = self.locks.acquire(&lock_key);
            let guard = match tokio::time::timeout(self.lock_timeout, acquire).await {
                Ok(guard) => guard,
                Err(_) => {
                    log::warn!(
                        "Timed out after {:?} waiting for repository {}",
                        self.lock_timeout,
                        request.repository
                    );
                    return CompatibilityResult::failed(format!(
                        "repository {} is busy, try again later",
                        request.repository
                    ));
                }
            };

            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return CompatibilityResult::failed("compatibility checks are shut down"),
            };

            let span = tracing::Span::current();
            let this = Arc::clone(&self);
            let handle = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                let _permit = permit;
                span.in_scope(|| this.check_blocking(&request))
            });

            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Compatibility check task failed: {}", e);
                    CompatibilityResult::failed(format!("Compatibility check aborted: {}", e))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Lock name for `repository`: its working-copy directory.
    fn lock_key(&self, repository: &str) -> String {
        working_copy_dir(&self.working_dir, repository)
            .to_string_lossy()
            .into_owned()
    }

    /// The whole pipeline for one request, on the calling thread.
    ///
    /// The caller must hold the repository's lock.
    pub fn check_blocking(&self, request: &CompatibilityRequest) -> CompatibilityResult {
        let local_path = working_copy_dir(&self.working_dir, &request.repository);

        if let Err(e) = self
            .sync
            .sync(&local_path, &request.repository, &request.branch, &self.token)
        {
            log::error!("Repository sync failed for {}: {}", request.repository, e);
            return CompatibilityResult::failed(format!("Failed to clone/update repository: {}", e));
        }

        let charts = match discover_charts(&local_path) {
            Ok(charts) => charts,
            Err(e) => {
                log::error!("Chart discovery failed: {}", e);
                return CompatibilityResult::failed(format!("Failed to find chart descriptors: {}", e));
            }
        };

        let mut result = CompatibilityResult::new();

        if charts.is_empty() {
            log::info!("No chart descriptors in {}", request.repository);
            result.success = true;
            result.message = NO_CHARTS_MESSAGE.to_string();
            return result;
        }

        for chart in &charts {
            let _span = tracing::debug_span!("compat.chart", chart = %chart_label(chart)).entered();

            if let Err(issue) = self.check_chart(chart, &local_path, request, &mut result) {
                log::warn!("{}", issue);
                result.compatibility_issues.push(issue.to_string());
            }
        }

        dedup_preserving_order(&mut result.api_versions);
        dedup_preserving_order(&mut result.deprecated_apis);

        if result.compatibility_issues.is_empty() {
            result.success = true;
            result.message = if result.deprecated_apis.is_empty() {
                "All API versions are compatible".to_string()
            } else {
                format!(
                    "Found {} deprecated APIs, chart version updated",
                    result.deprecated_apis.len()
                )
            };
        } else {
            result.message = format!(
                "Found {} compatibility issues",
                result.compatibility_issues.len()
            );
        }
        result.timestamp = now_rfc3339();

        log::info!(
            "Checked {} charts in {}: {}",
            charts.len(),
            request.repository,
            result.message
        );
        result
    }

    fn check_chart(
        &self,
        chart: &Path,
        repo_root: &Path,
        request: &CompatibilityRequest,
        result: &mut CompatibilityResult,
    ) -> Result<(), ChartIssue> {
        let mut descriptor = ChartDescriptor::read(chart)?;
        if result.chart_version.is_empty() {
            result.chart_version = descriptor.version.to_string();
        }

        let report = self.checker.check(
            repo_root,
            descriptor.chart_dir(),
            &request.kubernetes_version,
        )?;
        let has_deprecated = !report.deprecated_apis.is_empty();
        result.api_versions.extend(report.api_versions);
        result.deprecated_apis.extend(report.deprecated_apis);

        if has_deprecated || request.force_update {
            let old = descriptor.version;
            let new = descriptor.bump()?;
            log::info!("Bumped {} from {} to {}", chart_label(chart), old, new);
            result.new_chart_version = Some(new.to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSchema;
    use crate::process::{CommandOutput, CommandSpec};
    use assert_fs::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Git always succeeds; the checker prints the stdout registered for the
    /// chart directory's name, or fails when none is registered.
    #[derive(Default)]
    struct ScriptedRunner {
        checker_output: HashMap<String, String>,
        fail_git: bool,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(command.clone());

            if command.program == "git" {
                return Ok(CommandOutput {
                    success: !self.fail_git,
                    code: Some(if self.fail_git { 128 } else { 0 }),
                    stderr: if self.fail_git {
                        "fatal: repository not found".to_string()
                    } else {
                        String::new()
                    },
                    ..Default::default()
                });
            }

            let chart_dir = command.args.first().map(PathBuf::from).unwrap_or_default();
            let name = chart_label(&chart_dir);
            match self.checker_output.get(&name) {
                Some(stdout) => Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout: stdout.clone(),
                    stderr: String::new(),
                }),
                None => Ok(CommandOutput {
                    success: false,
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "checker exploded".to_string(),
                }),
            }
        }
    }

    fn settings(working_dir: &Path) -> Settings {
        let mut settings = Settings::default();
        for field in Settings::fields() {
            settings.assign(field.name, field.default).unwrap();
        }
        settings.working_dir = working_dir.to_string_lossy().into_owned();
        settings.github_token = "ghp_test".to_string();
        settings.checker_command = "checker".to_string();
        settings.checker_script = String::new();
        settings
    }

    fn request(force_update: bool) -> CompatibilityRequest {
        CompatibilityRequest {
            kubernetes_version: "1.31".to_string(),
            force_update,
            repository: "org/charts".to_string(),
            branch: "main".to_string(),
            ..Default::default()
        }
    }

    fn runner(outputs: &[(&str, &str)]) -> Arc<ScriptedRunner> {
        Arc::new(ScriptedRunner {
            checker_output: outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_all_compatible() {
        let temp = assert_fs::TempDir::new().unwrap();
        let repo = temp.child("org__charts");
        repo.child("charts/api/Chart.yaml")
            .write_str("name: api\nversion: 1.4.2\n")
            .unwrap();

        let orchestrator = CompatibilityOrchestrator::new(
            &settings(temp.path()),
            runner(&[("api", "API_VERSION:apps/v1\nAPI_VERSION:v1\n")]),
        );
        let result = orchestrator.check_blocking(&request(false));

        assert!(result.success);
        assert_eq!(result.message, "All API versions are compatible");
        assert_eq!(result.chart_version, "1.4.2");
        assert_eq!(result.new_chart_version, None);
        assert_eq!(result.api_versions, vec!["apps/v1", "v1"]);
        repo.child("charts/api/Chart.yaml")
            .assert("name: api\nversion: 1.4.2\n");
    }

    #[test]
    fn test_force_update_bumps_without_deprecations() {
        let temp = assert_fs::TempDir::new().unwrap();
        let repo = temp.child("org__charts");
        repo.child("chart/Chart.yaml").write_str("version: 0.0.9\n").unwrap();

        let orchestrator =
            CompatibilityOrchestrator::new(&settings(temp.path()), runner(&[("chart", "")]));
        let result = orchestrator.check_blocking(&request(true));

        assert!(result.success);
        assert_eq!(result.chart_version, "0.0.9");
        assert_eq!(result.new_chart_version.as_deref(), Some("0.0.10"));
        repo.child("chart/Chart.yaml").assert("version: 0.0.10\n");
    }

    #[test]
    fn test_checker_failure_is_recorded() {
        let temp = assert_fs::TempDir::new().unwrap();
        let repo = temp.child("org__charts");
        repo.child("a/Chart.yaml").write_str("version: 1.0.0\n").unwrap();
        repo.child("b/Chart.yaml").write_str("version: 2.0.0\n").unwrap();

        let orchestrator = CompatibilityOrchestrator::new(
            &settings(temp.path()),
            runner(&[("b", "API_VERSION:v1\n")]),
        );
        let result = orchestrator.check_blocking(&request(false));

        assert!(!result.success);
        assert_eq!(result.message, "Found 1 compatibility issues");
        assert_eq!(result.compatibility_issues.len(), 1);
        assert!(result.compatibility_issues[0].contains("checker exploded"));
        // the failing chart still reported its version first
        assert_eq!(result.chart_version, "1.0.0");
        assert_eq!(result.api_versions, vec!["v1"]);
    }

    #[test]
    fn test_no_charts_is_success() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("org__charts/README.md").write_str("hi").unwrap();

        let orchestrator = CompatibilityOrchestrator::new(&settings(temp.path()), runner(&[]));
        let result = orchestrator.check_blocking(&request(false));

        assert!(result.success);
        assert_eq!(result.message, NO_CHARTS_MESSAGE);
        assert!(result.compatibility_issues.is_empty());
    }

    #[test]
    fn test_sync_failure_is_terminal() {
        let temp = assert_fs::TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner {
            fail_git: true,
            ..Default::default()
        });

        let orchestrator = CompatibilityOrchestrator::new(&settings(temp.path()), runner.clone());
        let result = orchestrator.check_blocking(&request(false));

        assert!(!result.success);
        assert!(result
            .message
            .starts_with("Failed to clone/update repository: failed to clone repository"));
        assert!(!result.message.contains("ghp_test"));
        assert!(result.api_versions.is_empty());
        assert!(result.compatibility_issues.is_empty());
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_async_check_runs_pipeline() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("org__charts/Chart.yaml")
            .write_str("version: 3.1.4\n")
            .unwrap();

        let orchestrator = Arc::new(CompatibilityOrchestrator::new(
            &settings(temp.path()),
            runner(&[("org__charts", "DEPRECATED:batch/v1beta1/CronJob\n")]),
        ));
        let result = orchestrator.clone().check(request(false)).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.deprecated_apis, vec!["batch/v1beta1/CronJob"]);
        assert_eq!(result.new_chart_version.as_deref(), Some("3.1.5"));
    }

    #[tokio::test]
    async fn test_busy_repository_times_out() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut settings = settings(temp.path());
        settings.request_timeout = 1;

        let orchestrator = Arc::new(CompatibilityOrchestrator::new(&settings, runner(&[])));
        let _held = orchestrator
            .locks
            .acquire(&orchestrator.lock_key("org/charts"))
            .await;

        let result = orchestrator.clone().check(request(false)).await;
        assert!(!result.success);
        assert_eq!(result.message, "repository org/charts is busy, try again later");
    }

    #[tokio::test]
    async fn test_ids_sharing_a_working_copy_share_a_lock() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut settings = settings(temp.path());
        settings.request_timeout = 1;

        let orchestrator = Arc::new(CompatibilityOrchestrator::new(&settings, runner(&[])));
        assert_eq!(
            orchestrator.lock_key("/org/charts/"),
            orchestrator.lock_key("org/charts")
        );
        let _held = orchestrator
            .locks
            .acquire(&orchestrator.lock_key("org/charts"))
            .await;

        let mut req = request(false);
        req.repository = "/org/charts/".to_string();
        let result = orchestrator.clone().check(req).await;
        assert!(!result.success);
        assert!(result.message.ends_with("is busy, try again later"), "{}", result.message);
    }

    #[test]
    fn test_bump_overflow_only_affects_that_chart() {
        let temp = assert_fs::TempDir::new().unwrap();
        let repo = temp.child("org__charts");
        repo.child("a/Chart.yaml")
            .write_str("version: 0.1.18446744073709551615\n")
            .unwrap();
        repo.child("b/Chart.yaml").write_str("version: 2.0.0\n").unwrap();

        let orchestrator = CompatibilityOrchestrator::new(
            &settings(temp.path()),
            runner(&[("a", "API_VERSION:v1\n"), ("b", "API_VERSION:apps/v1\n")]),
        );
        let result = orchestrator.check_blocking(&request(true));

        assert!(!result.success);
        assert_eq!(result.compatibility_issues.len(), 1);
        assert!(result.compatibility_issues[0].contains("overflows"));
        assert_eq!(result.new_chart_version.as_deref(), Some("2.0.1"));
        assert_eq!(result.api_versions, vec!["v1", "apps/v1"]);
    }

    #[test]
    fn test_option_like_branch_is_terminal_failure() {
        let temp = assert_fs::TempDir::new().unwrap();
        let runner = runner(&[]);
        let orchestrator = CompatibilityOrchestrator::new(&settings(temp.path()), runner.clone());

        let mut req = request(false);
        req.branch = "--orphan=pwned".to_string();
        let result = orchestrator.check_blocking(&req);

        assert!(!result.success);
        assert!(result.message.contains("invalid branch name"), "{}", result.message);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_repository_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let orchestrator = Arc::new(CompatibilityOrchestrator::new(
            &settings(temp.path()),
            runner(&[]),
        ));

        let mut req = request(false);
        req.repository.clear();
        let result = orchestrator.check(req).await;
        assert!(!result.success);
        assert!(result.message.contains("no repository specified"));
    }
}
