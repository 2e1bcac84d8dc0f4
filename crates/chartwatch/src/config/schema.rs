//! Declarative configuration schema.
//!
//! A schema is an ordered table of [`FieldSpec`] entries, one per struct
//! field, generated together with the struct by [`config_schema!`]. The
//! resolver walks the table and writes each value through
//! [`ConfigSchema::assign`], which is a plain `match` over field names.

use std::fmt;

use serde_json::Value;

/// Marker substituted for encryption-flagged values in every rendered view.
pub const REDACTED: &str = "***REDACTED***";

/// Target type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Unsigned,
    Float,
    Boolean,
    List,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Unsigned => "unsigned integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "list",
        };
        f.write_str(name)
    }
}

/// One row of a schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Struct field name.
    pub name: &'static str,
    /// Environment variable the value is read from.
    pub env: &'static str,
    /// Literal used when the variable is absent or empty.
    pub default: &'static str,
    /// Whether the value may arrive encrypted and must be redacted.
    pub encrypted: bool,
    /// Target type.
    pub kind: FieldKind,
}

/// Failure to turn a raw string into a field value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    #[error("invalid {kind} value '{value}'")]
    Invalid { kind: FieldKind, value: String },

    #[error("unknown field '{0}'")]
    UnknownField(String),
}

/// Conversion from a raw environment string. Empty input yields the zero value.
pub trait FromEnvValue: Sized {
    const KIND: FieldKind;

    fn from_env_value(raw: &str) -> Result<Self, CoercionError>;
}

fn invalid(kind: FieldKind, raw: &str) -> CoercionError {
    CoercionError::Invalid {
        kind,
        value: raw.to_string(),
    }
}

impl FromEnvValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn from_env_value(raw: &str) -> Result<Self, CoercionError> {
        Ok(raw.to_string())
    }
}

macro_rules! impl_numeric {
    ($kind:expr => $($ty:ty),*) => {
        $(
            impl FromEnvValue for $ty {
                const KIND: FieldKind = $kind;

                fn from_env_value(raw: &str) -> Result<Self, CoercionError> {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        return Ok(Self::default());
                    }
                    trimmed.parse().map_err(|_| invalid(Self::KIND, raw))
                }
            }
        )*
    };
}

impl_numeric!(FieldKind::Integer => i32, i64);
impl_numeric!(FieldKind::Unsigned => u16, u32, u64);
impl_numeric!(FieldKind::Float => f64);

impl FromEnvValue for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn from_env_value(raw: &str) -> Result<Self, CoercionError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(false),
            "1" | "t" | "true" => Ok(true),
            "0" | "f" | "false" => Ok(false),
            _ => Err(invalid(Self::KIND, raw)),
        }
    }
}

impl FromEnvValue for Vec<String> {
    const KIND: FieldKind = FieldKind::List;

    fn from_env_value(raw: &str) -> Result<Self, CoercionError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        Ok(raw.split(',').map(|part| part.trim().to_string()).collect())
    }
}

/// Implemented by structs generated with [`config_schema!`].
pub trait ConfigSchema: Default {
    /// The field table, in declaration order.
    fn fields() -> &'static [FieldSpec];

    /// Coerces `raw` and stores it into the named field.
    fn assign(&mut self, field: &str, raw: &str) -> Result<(), CoercionError>;

    /// Current value of the named field as JSON, unredacted.
    ///
    /// Only the redacting helpers in this module call this.
    #[doc(hidden)]
    fn field_value(&self, field: &str) -> Option<Value>;

    /// JSON object of all fields with encryption-flagged values replaced by
    /// [`REDACTED`].
    fn redacted_value(&self) -> Value {
        let map = Self::fields()
            .iter()
            .map(|spec| {
                let value = if spec.encrypted {
                    Value::String(REDACTED.to_string())
                } else {
                    self.field_value(spec.name).unwrap_or(Value::Null)
                };
                (spec.name.to_string(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// Pretty-printed form of [`ConfigSchema::redacted_value`], for logs.
    fn to_redacted_json(&self) -> String {
        serde_json::to_string_pretty(&self.redacted_value())
            .unwrap_or_else(|_| String::from("{}"))
    }

    /// Names of the encryption-flagged fields.
    fn encrypted_fields() -> Vec<&'static str> {
        Self::fields()
            .iter()
            .filter(|spec| spec.encrypted)
            .map(|spec| spec.name)
            .collect()
    }

    /// `(environment variable, field name)` pairs of the encryption-flagged fields.
    fn encrypted_env_vars() -> Vec<(&'static str, &'static str)> {
        Self::fields()
            .iter()
            .filter(|spec| spec.encrypted)
            .map(|spec| (spec.env, spec.name))
            .collect()
    }
}

/// Declares a settings struct together with its [`ConfigSchema`] table.
///
/// ```ignore
/// config_schema! {
///     pub struct Example {
///         /// Listen port.
///         port: u16 = env("PORT", default = "8080"),
///         token: String = env("TOKEN", default = "", encrypted),
///     }
/// }
/// ```
///
/// The generated `Debug` impl prints [`REDACTED`] for encrypted fields. No
/// `Serialize` impl is generated; use [`ConfigSchema::to_redacted_json`].
macro_rules! config_schema {
    (@encrypted) => { false };
    (@encrypted encrypted) => { true };
    (
        $(#[$struct_meta:meta])*
        pub struct $name:ident {
            $(
                $(#[doc = $doc:literal])*
                $field:ident : $ty:ty = env($env:literal, default = $default:literal $(, $flag:ident)?),
            )*
        }
    ) => {
        $(#[$struct_meta])*
        #[derive(Clone, PartialEq, Default)]
        pub struct $name {
            $(
                $(#[doc = $doc])*
                pub $field: $ty,
            )*
        }

        impl $crate::config::ConfigSchema for $name {
            fn fields() -> &'static [$crate::config::FieldSpec] {
                const FIELDS: &[$crate::config::FieldSpec] = &[
                    $(
                        $crate::config::FieldSpec {
                            name: stringify!($field),
                            env: $env,
                            default: $default,
                            encrypted: $crate::config::schema::config_schema!(@encrypted $($flag)?),
                            kind: <$ty as $crate::config::FromEnvValue>::KIND,
                        },
                    )*
                ];
                FIELDS
            }

            fn assign(
                &mut self,
                field: &str,
                raw: &str,
            ) -> ::std::result::Result<(), $crate::config::CoercionError> {
                match field {
                    $(
                        stringify!($field) => {
                            self.$field = <$ty as $crate::config::FromEnvValue>::from_env_value(raw)?;
                            Ok(())
                        }
                    )*
                    other => Err($crate::config::CoercionError::UnknownField(other.to_string())),
                }
            }

            fn field_value(&self, field: &str) -> Option<::serde_json::Value> {
                match field {
                    $(stringify!($field) => ::serde_json::to_value(&self.$field).ok(),)*
                    _ => None,
                }
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut out = f.debug_struct(stringify!($name));
                $(
                    let value: &dyn ::std::fmt::Debug =
                        if $crate::config::schema::config_schema!(@encrypted $($flag)?) {
                            &$crate::config::REDACTED
                        } else {
                            &self.$field
                        };
                    out.field(stringify!($field), value);
                )*
                out.finish()
            }
        }
    };
}

pub(crate) use config_schema;
