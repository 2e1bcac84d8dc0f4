//! Chart descriptor versions.
//!
//! Descriptors are treated as plain text: only the first line whose trimmed
//! start is `version:` is interpreted, and rewriting touches that line alone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ChartIssue;

/// Base name of the files chart discovery looks for.
pub const CHART_DESCRIPTOR: &str = "Chart.yaml";

const VERSION_KEY: &str = "version:";

/// A strict `major.minor.patch` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChartVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version format: '{0}' (expected MAJOR.MINOR.PATCH)")]
pub struct VersionParseError(pub String);

impl ChartVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns the version with the patch component incremented by one, or
    /// `None` when the patch is already `u64::MAX`.
    pub fn bump(self) -> Option<Self> {
        Some(Self {
            patch: self.patch.checked_add(1)?,
            ..self
        })
    }
}

impl FromStr for ChartVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError(s.to_string());

        let mut parts = s.split('.');
        let mut next = || -> Result<u64, VersionParseError> {
            let part = parts.next().ok_or_else(err)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            part.parse().map_err(|_| err())
        };

        let version = ChartVersion::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

impl fmt::Display for ChartVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A chart descriptor on disk and the version it declared when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartDescriptor {
    pub path: PathBuf,
    pub version: ChartVersion,
}

impl ChartDescriptor {
    /// Reads and parses the version line of `path`.
    pub fn read(path: &Path) -> Result<Self, ChartIssue> {
        let content = std::fs::read_to_string(path).map_err(|e| ChartIssue::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let raw = find_version(&content).ok_or_else(|| ChartIssue::MissingVersion {
            path: path.to_path_buf(),
        })?;

        let version = raw.parse().map_err(|e| ChartIssue::InvalidVersion {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            version,
        })
    }

    /// Directory containing the descriptor.
    pub fn chart_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Bumps the patch version and rewrites the version line in place.
    pub fn bump(&mut self) -> Result<ChartVersion, ChartIssue> {
        let next = self.version.bump().ok_or_else(|| ChartIssue::VersionOverflow {
            path: self.path.clone(),
            version: self.version,
        })?;
        write_version(&self.path, next)?;
        self.version = next;
        Ok(next)
    }
}

/// Text after the first colon of the first `version:` line, trimmed.
pub fn find_version(content: &str) -> Option<&str> {
    content
        .split('\n')
        .find(|line| line.trim_start().starts_with(VERSION_KEY))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
}

/// Returns `content` with its first version line set to `version`.
///
/// Leading indentation and the line ending of that line are kept; every other
/// line is untouched.
pub fn replace_version(content: &str, version: ChartVersion) -> String {
    let mut replaced = false;
    content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            if !replaced && trimmed.starts_with(VERSION_KEY) {
                replaced = true;
                let indent = &line[..line.len() - trimmed.len()];
                let eol = if line.ends_with('\r') { "\r" } else { "" };
                format!("{}{} {}{}", indent, VERSION_KEY, version, eol)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_version(path: &Path, version: ChartVersion) -> Result<(), ChartIssue> {
    let write_err = |e| ChartIssue::Write {
        path: path.to_path_buf(),
        source: e,
    };

    let content = std::fs::read_to_string(path).map_err(write_err)?;
    std::fs::write(path, replace_version(&content, version)).map_err(write_err)
}
