//! Actor identity - authenticated users and anonymous sessions
//!
//! Views count once per identity whether or not the caller is logged in, so
//! anonymous sessions carry a caller-supplied token. Toggles always require
//! an authenticated user.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::validate_identifier;
use crate::error::EngagementError;

/// Who is acting: a logged-in user or an anonymous session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    User(String),
    Session(String),
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self {
        Identity::User(id.into())
    }

    pub fn session(token: impl Into<String>) -> Self {
        Identity::Session(token.into())
    }

    /// Stable storage key; prefixes keep the two populations disjoint
    pub fn storage_key(&self) -> String {
        match self {
            Identity::User(id) => format!("user:{}", id),
            Identity::Session(token) => format!("session:{}", token),
        }
    }

    /// User id when authenticated
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User(id) => Some(id),
            Identity::Session(_) => None,
        }
    }

    /// Check the underlying identifier is well-formed
    pub fn validate(&self) -> Result<(), EngagementError> {
        match self {
            Identity::User(id) => validate_identifier(id, "user id"),
            Identity::Session(token) => validate_identifier(token, "session token"),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}
