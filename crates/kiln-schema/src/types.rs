//! Newtype wrappers for identifiers that end up as path components.
//!
//! Both newtypes serialize as plain strings and are validated on construction
//! through [`BuildpackId::parse`] / [`LayerName::parse`], since each of them is
//! joined onto a directory on disk.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

const MAX_NAME_LEN: usize = 64;

macro_rules! name_newtype {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a name.
            pub fn parse(s: impl Into<String>) -> Result<Self, SchemaError> {
                let s = s.into();
                validate_name(&s, $what)?;
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<std::path::Path> for $name {
            fn as_ref(&self) -> &std::path::Path {
                std::path::Path::new(&self.0)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl TryFrom<String> for $name {
            type Error = SchemaError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = SchemaError;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(n: $name) -> String {
                n.0
            }
        }
    };
}

name_newtype!(
    /// Identifier of a buildpack module, e.g. `dotnet-runtime`. Scopes the
    /// module's layer namespace.
    BuildpackId,
    "buildpack id"
);

name_newtype!(
    /// Name of a layer, unique within one buildpack.
    LayerName,
    "layer name"
);

/// Names must be 1-64 characters of `[A-Za-z0-9_-]`. Dots are rejected so a
/// layer directory can never collide with its `<name>.toml` side file.
pub fn validate_name(name: &str, what: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(SchemaError::InvalidName(format!(
            "{what} must be 1-{MAX_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(SchemaError::InvalidName(format!(
            "{what} '{name}' must match [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_name_display_and_as_ref() {
        let name = LayerName::parse("sdk").unwrap();
        assert_eq!(name.to_string(), "sdk");
        assert_eq!(name.as_str(), "sdk");
        assert_eq!(AsRef::<str>::as_ref(&name), "sdk");
    }

    #[test]
    fn layer_name_serde_roundtrip() {
        let name = LayerName::parse("functions-framework").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"functions-framework\"");
        let back: LayerName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn deserialize_rejects_invalid_name() {
        let res: Result<LayerName, _> = serde_json::from_str("\"../escape\"");
        assert!(res.is_err());
    }

    #[test]
    fn buildpack_id_into_inner() {
        let id = BuildpackId::parse("dotnet-runtime").unwrap();
        assert_eq!(id.into_inner(), "dotnet-runtime");
    }

    #[test]
    fn validate_name_accepts_valid_chars() {
        assert!(validate_name("m2_cache-1", "layer name").is_ok());
        assert!(validate_name(&"x".repeat(64), "layer name").is_ok());
    }

    #[test]
    fn validate_name_rejects_empty_and_long() {
        assert!(validate_name("", "layer name").is_err());
        assert!(validate_name(&"x".repeat(65), "layer name").is_err());
    }

    #[test]
    fn validate_name_rejects_separators_and_dots() {
        assert!(LayerName::parse("a/b").is_err());
        assert!(LayerName::parse("sdk.toml").is_err());
        assert!(LayerName::parse("has space").is_err());
    }
}
