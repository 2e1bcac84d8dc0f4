pub mod checker;
pub mod compat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod models;
pub mod process;
pub mod sanitize;
pub mod secrets;
pub mod server;
pub mod telemetry;
pub mod version;
pub mod webhook;

pub use checker::{parse_checker_output, ApiChecker, CheckerReport};
pub use compat::CompatibilityOrchestrator;
pub use config::{resolve, ConfigSchema, EnvSource, ProcessEnv, SecureContext, Settings};
pub use discovery::discover_charts;
pub use error::{ChartIssue, ChartwatchError, ConfigError, DiscoveryError, Result, SyncError};
pub use git::{RepoLocks, RepositorySync};
pub use models::{ChangeEvent, CompatibilityRequest, CompatibilityResult, WebhookResponse};
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use secrets::{SecretCodec, SecretError};
pub use server::{create_router, RequestError};
pub use telemetry::init_logging;
pub use version::{ChartDescriptor, ChartVersion, VersionParseError};
pub use webhook::WebhookPipeline;
