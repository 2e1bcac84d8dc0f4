//! Process settings for the webhook server.

use secrecy::SecretString;

use crate::config::resolver::{resolve, EnvSource};
use crate::config::schema::{config_schema, ConfigSchema};
use crate::error::ConfigError;
use crate::secrets::SecretCodec;

/// Environment variable holding the secret codec passphrase.
pub const ENCRYPTION_KEY_ENV_VAR: &str = "ENCRYPTION_KEY";

/// Passphrase used when `ENCRYPTION_KEY` is not set.
pub const DEFAULT_ENCRYPTION_KEY: &str = "default-webhook-encryption-key-change-in-production";

config_schema! {
    /// Settings resolved once at startup and shared read-only afterwards.
    pub struct Settings {
        /// HTTP listen port.
        port: u16 = env("PORT", default = "8080"),
        /// Bearer token used to authenticate git operations.
        github_token: String = env("GITHUB_TOKEN", default = "", encrypted),
        /// Repository used when an event does not name one (`owner/name`).
        repository: String = env("REPOSITORY", default = ""),
        /// Parent directory of the per-repository working copies.
        working_dir: String = env("WORKING_DIR", default = "/tmp/webhook-workspace"),
        /// Kubernetes version that webhook-triggered checks audit against.
        kubernetes_version: String = env("KUBERNETES_VERSION", default = "1.31"),
        encryption_key: String = env("ENCRYPTION_KEY", default = "", encrypted),
        /// Host serving the remote repositories.
        git_host: String = env("GIT_HOST", default = "github.com"),
        /// Branch used when an event does not name one.
        default_branch: String = env("DEFAULT_BRANCH", default = "main"),
        /// Program that runs the compatibility checker.
        checker_command: String = env("CHECKER_COMMAND", default = "bash"),
        /// Checker script, resolved against the working copy when relative.
        checker_script: String = env("CHECKER_SCRIPT", default = "scripts/check-api-compatibility.sh"),
        log_level: String = env("LOG_LEVEL", default = "info"),
        /// `text` or `json`.
        log_format: String = env("LOG_FORMAT", default = "text"),
        /// Maximum number of compatibility checks running at once.
        max_concurrency: i64 = env("MAX_CONCURRENCY", default = "10"),
        /// Seconds a request waits for its repository's lock.
        request_timeout: i64 = env("REQUEST_TIMEOUT", default = "30"),
        max_body_bytes: u64 = env("MAX_BODY_BYTES", default = "1048576"),
        /// Changed-file fragments that trigger a compatibility check.
        manifest_patterns: Vec<String> = env(
            "MANIFEST_PATTERNS",
            default = "kustomization.yaml,kustomization.yml,Chart.yaml,values.yaml,deployment.yaml,service.yaml,ingress.yaml"
        ),
    }
}

impl Settings {
    /// Checks required values and numeric ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("GITHUB_TOKEN", &self.github_token),
            ("WORKING_DIR", &self.working_dir),
            ("KUBERNETES_VERSION", &self.kubernetes_version),
            ("CHECKER_COMMAND", &self.checker_command),
        ];
        for (env, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(env, "is required"));
            }
        }

        if self.port == 0 {
            return Err(invalid("PORT", "must be greater than 0"));
        }
        if self.max_concurrency <= 0 {
            return Err(invalid("MAX_CONCURRENCY", "must be greater than 0"));
        }
        if self.request_timeout <= 0 {
            return Err(invalid("REQUEST_TIMEOUT", "must be greater than 0"));
        }
        if self.max_body_bytes == 0 {
            return Err(invalid("MAX_BODY_BYTES", "must be greater than 0"));
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(invalid("LOG_FORMAT", "must be 'text' or 'json'"));
        }

        Ok(())
    }

    /// The git token, wrapped so it cannot be printed by accident.
    pub fn github_token_secret(&self) -> SecretString {
        SecretString::from(self.github_token.clone())
    }
}

fn invalid(env: &str, constraint: &str) -> ConfigError {
    ConfigError::Validation {
        field: env.to_string(),
        constraint: constraint.to_string(),
    }
}

/// `(log_level, log_format)` read directly from `env`, before any other
/// setting is resolved, so logging can be up while the resolver runs.
///
/// Unset or blank variables fall back to the declared defaults.
pub fn logging_from_env(env: &impl EnvSource) -> (String, String) {
    let value = |field: &str| {
        Settings::fields()
            .iter()
            .find(|spec| spec.name == field)
            .map(|spec| {
                env.var(spec.env)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| spec.default.to_string())
            })
            .unwrap_or_default()
    };
    (value("log_level"), value("log_format"))
}

/// Settings plus the codec that decrypted them.
#[derive(Debug)]
pub struct SecureContext {
    pub settings: Settings,
    pub codec: SecretCodec,
    /// True when `ENCRYPTION_KEY` was unset and the built-in passphrase was used.
    pub default_key_used: bool,
}

impl SecureContext {
    /// Builds the codec from `ENCRYPTION_KEY` and resolves [`Settings`].
    ///
    /// Validation is a separate step, see [`Settings::validate`].
    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let passphrase = env
            .var(ENCRYPTION_KEY_ENV_VAR)
            .filter(|key| !key.is_empty());
        let default_key_used = passphrase.is_none();
        let codec = SecretCodec::new(passphrase.as_deref().unwrap_or(DEFAULT_ENCRYPTION_KEY));

        let settings = resolve(env, &codec)?;

        Ok(Self {
            settings,
            codec,
            default_key_used,
        })
    }
}
