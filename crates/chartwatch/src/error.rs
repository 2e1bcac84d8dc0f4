use std::path::PathBuf;
use thiserror::Error;

use crate::config::CoercionError;
use crate::secrets::SecretError;
use crate::version::{ChartVersion, VersionParseError};

#[derive(Error, Debug)]
pub enum ChartwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup-fatal configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field} ({env}): {source}")]
    Coercion {
        field: String,
        env: String,
        #[source]
        source: CoercionError,
    },

    #[error("Failed to decrypt {field} ({env}): {source}")]
    Decrypt {
        field: String,
        env: String,
        #[source]
        source: SecretError,
    },

    #[error("Invalid configuration: {field} {constraint}")]
    Validation { field: String, constraint: String },
}

/// Failure to bring a working copy up to date.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to clone repository: {0}")]
    Clone(String),

    #[error("failed to pull latest changes: {0}")]
    Pull(String),

    #[error("failed to checkout branch {branch}: {reason}")]
    Checkout { branch: String, reason: String },

    #[error("invalid branch name '{branch}': {reason}")]
    InvalidBranch { branch: String, reason: String },

    #[error("failed to prepare working directory '{path}': {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while walking a working copy for chart descriptors.
#[derive(Error, Debug)]
#[error("Directory scan failed for '{path}': {source}")]
pub struct DiscoveryError {
    pub path: PathBuf,
    #[source]
    pub source: walkdir::Error,
}

/// Problem with a single chart descriptor. Recorded, never fatal.
#[derive(Error, Debug)]
pub enum ChartIssue {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read chart version in '{path}': version not found")]
    MissingVersion { path: PathBuf },

    #[error("Failed to read chart version in '{path}': {source}")]
    InvalidVersion {
        path: PathBuf,
        #[source]
        source: VersionParseError,
    },

    #[error("API compatibility check failed for '{chart_dir}': {reason}")]
    Checker { chart_dir: PathBuf, reason: String },

    #[error("Cannot bump chart version {version} in '{path}': patch number overflows")]
    VersionOverflow { path: PathBuf, version: ChartVersion },

    #[error("Failed to update chart version in '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChartwatchError>;
