//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The value contained characters that cannot appear in a host name.
    #[error("invalid {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
}

/// A host name that time is attributed to.
///
/// Domains are stored lowercase. Construction rejects empty values and values
/// containing whitespace or path separators, so a `Domain` can always be used
/// as a map key in the persisted aggregates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Creates a new domain after normalization and validation.
    pub fn new(host: impl Into<String>) -> Result<Self, ValidationError> {
        let host = host.into().to_lowercase();
        if host.is_empty() {
            return Err(ValidationError::Empty { field: "domain" });
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ValidationError::Malformed {
                field: "domain",
                value: host,
            });
        }
        Ok(Self(host))
    }

    /// Returns the domain as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders an icon reference by substituting `{domain}` in `template`.
    pub fn icon_ref(&self, template: &str) -> String {
        template.replace("{domain}", &self.0)
    }
}

impl TryFrom<String> for Domain {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates an opaque integer handle newtype for host browser objects.
macro_rules! define_host_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

define_host_id!(
    /// Identifier of a browser tab, as assigned by the host.
    TabId
);

define_host_id!(
    /// Identifier of a browser window, as assigned by the host.
    WindowId
);
