//! Resolution of a [`ConfigSchema`] from environment variables.

use std::collections::HashMap;

use crate::config::schema::{ConfigSchema, FieldSpec};
use crate::error::ConfigError;
use crate::secrets::SecretCodec;

/// Prefix marking a value as an encrypted token.
pub const ENCRYPTED_PREFIX: &str = "ENC:";

/// Source of environment values.
pub trait EnvSource {
    /// Returns the value of `key`, or `None` when unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolves every field of `S` from `env`, in declaration order.
///
/// Absent or empty variables fall back to the declared default. For
/// encryption-flagged fields:
///
/// - `ENC:<token>` is decrypted; if decryption fails the default is used,
///   and when there is no default the whole resolution fails.
/// - A bare value is decrypted if possible and otherwise taken as plaintext.
///   A corrupted token therefore silently becomes a wrong plaintext value.
pub fn resolve<S: ConfigSchema>(env: &impl EnvSource, codec: &SecretCodec) -> Result<S, ConfigError> {
    let mut config = S::default();

    for spec in S::fields() {
        let raw = env.var(spec.env).filter(|value| !value.is_empty());

        let value = match raw {
            None => spec.default.to_string(),
            Some(raw) if spec.encrypted => resolve_secret_value(spec, raw, codec)?,
            Some(raw) => raw,
        };

        config
            .assign(spec.name, &value)
            .map_err(|source| ConfigError::Coercion {
                field: spec.name.to_string(),
                env: spec.env.to_string(),
                source,
            })?;
    }

    Ok(config)
}

fn resolve_secret_value(
    spec: &FieldSpec,
    raw: String,
    codec: &SecretCodec,
) -> Result<String, ConfigError> {
    if let Some(token) = raw.strip_prefix(ENCRYPTED_PREFIX) {
        return match codec.decrypt(token) {
            Ok(plaintext) => Ok(plaintext),
            Err(e) if !spec.default.is_empty() => {
                log::warn!(
                    "Failed to decrypt {} with {} prefix, using default: {}",
                    spec.env,
                    ENCRYPTED_PREFIX,
                    e
                );
                Ok(spec.default.to_string())
            }
            Err(source) => Err(ConfigError::Decrypt {
                field: spec.name.to_string(),
                env: spec.env.to_string(),
                source,
            }),
        };
    }

    match codec.decrypt(&raw) {
        Ok(plaintext) => Ok(plaintext),
        Err(e) => {
            log::info!("{} appears to be plaintext (decryption failed: {})", spec.env, e);
            Ok(raw)
        }
    }
}
