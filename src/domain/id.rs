//! Identifiers for items and transition edges
//!
//! Both kinds of ID are opaque strings. Callers may supply their own
//! (any non-blank string), otherwise a 128-bit random ID is generated and
//! rendered as 32 lowercase hex characters (e.g. `3f2a9c...`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("ID must not be blank")]
    Blank,

    #[error("ID must not contain whitespace: '{0}'")]
    Whitespace(String),
}

/// Length of a generated ID in characters
pub const GENERATED_ID_LEN: usize = 32;

/// Generates a random 128-bit token as fixed-width lowercase hex
fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn validate(raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Blank);
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(IdError::Whitespace(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates an ID from a caller-supplied string
            pub fn new(raw: &str) -> Result<Self, IdError> {
                validate(raw).map(Self)
            }

            /// Generates a fresh collision-resistant ID
            pub fn generate() -> Self {
                Self(generate_token())
            }

            /// Returns the ID as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifies an item in an [`ItemRegistry`](super::ItemRegistry)
    ItemId
}

string_id! {
    /// Identifies a transition edge in a [`StateGraph`](super::StateGraph)
    EdgeId
}
