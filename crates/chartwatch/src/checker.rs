//! Invocation of the external API compatibility checker.
//!
//! The checker is an opaque program run as
//! `<command> [script] <chart_dir> <kubernetes_version>`. It reports through
//! stdout, one finding per line:
//!
//! ```text
//! API_VERSION:apps/v1
//! DEPRECATED:policy/v1beta1/PodSecurityPolicy
//! ```
//!
//! Any other line is ignored. A non-zero exit means the check failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ChartIssue;
use crate::process::{CommandRunner, CommandSpec};

pub const API_VERSION_PREFIX: &str = "API_VERSION:";
pub const DEPRECATED_PREFIX: &str = "DEPRECATED:";

/// Findings for one chart, in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckerReport {
    pub api_versions: Vec<String>,
    pub deprecated_apis: Vec<String>,
}

/// Parses checker stdout. Lines are trimmed, prefixes stripped, the rest kept verbatim.
pub fn parse_checker_output(stdout: &str) -> CheckerReport {
    let mut report = CheckerReport::default();

    for line in stdout.lines().map(str::trim) {
        if let Some(api) = line.strip_prefix(API_VERSION_PREFIX) {
            report.api_versions.push(api.to_string());
        } else if let Some(api) = line.strip_prefix(DEPRECATED_PREFIX) {
            report.deprecated_apis.push(api.to_string());
        }
    }

    report
}

/// Runs the checker for one chart directory.
pub struct ApiChecker {
    runner: Arc<dyn CommandRunner>,
    command: String,
    script: Option<PathBuf>,
}

impl ApiChecker {
    /// `script` may be empty, in which case `command` is run directly.
    pub fn new(runner: Arc<dyn CommandRunner>, command: impl Into<String>, script: &str) -> Self {
        let script = (!script.trim().is_empty()).then(|| PathBuf::from(script.trim()));
        Self {
            runner,
            command: command.into(),
            script,
        }
    }

    /// Checks `chart_dir` against `kubernetes_version`.
    ///
    /// A relative script path is resolved against `repo_root`.
    pub fn check(
        &self,
        repo_root: &Path,
        chart_dir: &Path,
        kubernetes_version: &str,
    ) -> Result<CheckerReport, ChartIssue> {
        let mut spec = CommandSpec::new(self.command.as_str()).current_dir(repo_root);
        if let Some(script) = &self.script {
            let script = if script.is_absolute() {
                script.clone()
            } else {
                repo_root.join(script)
            };
            spec = spec.arg(script.to_string_lossy());
        }
        let spec = spec
            .arg(chart_dir.to_string_lossy())
            .arg(kubernetes_version);

        let issue = |reason: String| ChartIssue::Checker {
            chart_dir: chart_dir.to_path_buf(),
            reason,
        };

        let output = self.runner.run(&spec).map_err(|e| issue(e.to_string()))?;
        if !output.success {
            return Err(issue(output.failure_reason()));
        }

        Ok(parse_checker_output(&output.stdout))
    }
}
