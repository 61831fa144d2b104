//! Classified buildpack failures and their exit codes.
//!
//! Classification is always an explicit tag. A module marks an error as the
//! user's fault with [`user_error!`](crate::user_error) or
//! [`BuildpackError::user`]; everything raised by the engine's own helpers is
//! internal; anything converted with `?` from a plain error is unclassified
//! and exits like an internal failure. Message text is never inspected.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_USER_ERROR: u8 = 2;
pub const EXIT_INTERNAL_ERROR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    User,
    Internal,
    Unclassified,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::User => EXIT_USER_ERROR,
            ErrorKind::Internal | ErrorKind::Unclassified => EXIT_INTERNAL_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::User => "user",
            ErrorKind::Internal => "internal",
            ErrorKind::Unclassified => "unclassified",
        })
    }
}

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type of [`Buildpack::detect`](crate::Buildpack::detect) and
/// [`Buildpack::build`](crate::Buildpack::build).
#[derive(Debug)]
pub struct BuildpackError {
    kind: ErrorKind,
    message: String,
    source: Option<Source>,
}

impl BuildpackError {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::User,
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a plain error without classifying it.
    pub fn unclassified<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Unclassified,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_user(&self) -> bool {
        self.kind == ErrorKind::User
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl fmt::Display for BuildpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::User => f.write_str(&self.message),
            ErrorKind::Internal | ErrorKind::Unclassified => {
                write!(f, "(internal) {}", self.message)
            }
        }
    }
}

impl std::error::Error for BuildpackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Errors raised by the engine's helpers are internal by definition.
impl From<CoreError> for BuildpackError {
    fn from(err: CoreError) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<kiln_store::StoreError> for BuildpackError {
    fn from(err: kiln_store::StoreError) -> Self {
        Self::unclassified(err)
    }
}

impl From<kiln_schema::SchemaError> for BuildpackError {
    fn from(err: kiln_schema::SchemaError) -> Self {
        Self::unclassified(err)
    }
}

impl From<std::io::Error> for BuildpackError {
    fn from(err: std::io::Error) -> Self {
        Self::unclassified(err)
    }
}

impl From<serde_json::Error> for BuildpackError {
    fn from(err: serde_json::Error) -> Self {
        Self::unclassified(err)
    }
}

/// Build a user-attributed [`BuildpackError`] from format arguments.
#[macro_export]
macro_rules! user_error {
    ($($arg:tt)*) => {
        $crate::BuildpackError::user(format!($($arg)*))
    };
}

/// Build an internal [`BuildpackError`] from format arguments.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BuildpackError::internal(format!($($arg)*))
    };
}
