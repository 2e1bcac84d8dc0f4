//! Subprocess seam used by git sync and the compatibility checker.

use std::path::{Path, PathBuf};
use std::process::Command;

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Best human-readable failure reason: stderr, stdout, or the exit code.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();

        match (stderr.is_empty(), stdout.is_empty()) {
            (true, true) => format!(
                "Command failed with exit code {}",
                self.code.unwrap_or(-1)
            ),
            (true, false) => stdout.to_string(),
            (false, true) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stderr, stdout),
        }
    }
}

/// Runs commands to completion, blocking the calling thread.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let output = cmd.output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            success: code == 0,
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_failure_reason_empty_output() {
        assert_eq!(
            output(1, "", "").failure_reason(),
            "Command failed with exit code 1"
        );
    }

    #[test]
    fn test_failure_reason_stderr_only() {
        assert_eq!(
            output(128, "", "fatal: not a git repository\n").failure_reason(),
            "fatal: not a git repository"
        );
    }

    #[test]
    fn test_failure_reason_both() {
        assert_eq!(
            output(1, "some output", "some error").failure_reason(),
            "some error\nsome output"
        );
    }

    #[test]
    fn test_builder() {
        let spec = CommandSpec::new("git")
            .args(["pull", "origin"])
            .arg("main")
            .current_dir("/tmp/repo")
            .env("GIT_TERMINAL_PROMPT", "0");

        assert_eq!(spec.args, vec!["pull", "origin", "main"]);
        assert_eq!(spec.current_dir, Some(PathBuf::from("/tmp/repo")));
        assert_eq!(spec.env, vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .unwrap();

        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }
}
