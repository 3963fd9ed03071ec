//! Strongly-typed identifiers for history service entities.
//!
//! [`DomainId`] and [`WorkflowId`] are cheap string newtypes — their values
//! are assigned by the frontend and treated as opaque here. [`RunId`] wraps
//! a [`uuid::Uuid`]: run ids are minted as v4 UUIDs when a run starts and
//! every externally-supplied run id must parse as one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant namespace of the workflow service.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

/// A logical long-running job, unique within its domain.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Create a new identifier from a raw string.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Return the inner string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
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

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
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
    };
}

string_id!(DomainId);
string_id!(WorkflowId);

/// Error from parsing a [`RunId`] out of a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("run id is not a valid uuid: {input}")]
pub struct RunIdParseError {
    /// The string that failed to parse.
    pub input: String,
}

/// One execution attempt of a workflow, identified by a v4 UUID.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Mint a fresh random run id.
    #[must_use]
    pub fn v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run id from its hyphenated string form.
    pub fn parse(raw: &str) -> Result<Self, RunIdParseError> {
        Uuid::parse_str(raw).map(Self).map_err(|_| RunIdParseError {
            input: raw.to_owned(),
        })
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Return the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = RunIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
