//! Environment-driven configuration with transparent secret decryption.

pub mod resolver;
pub mod schema;
pub mod settings;

pub use resolver::{resolve, EnvSource, ProcessEnv, ENCRYPTED_PREFIX};
pub use schema::{CoercionError, ConfigSchema, FieldKind, FieldSpec, FromEnvValue, REDACTED};
pub use settings::{
    logging_from_env, SecureContext, Settings, DEFAULT_ENCRYPTION_KEY, ENCRYPTION_KEY_ENV_VAR,
};
