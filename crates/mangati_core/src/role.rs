//! crates/mangati_core/src/role.rs
//!
//! The closed set of roles a principal may hold.
//!
//! Roles have exactly one canonical spelling. Free-form input is only folded
//! into a canonical role at the registration boundary; everywhere else (token
//! claims, policy checks) the canonical spelling is compared byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Viewer,
    Writer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Viewer, Role::Writer, Role::Admin];

    /// The canonical spelling, as stored and as embedded in token claims.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "Viewer",
            Role::Writer => "Writer",
            Role::Admin => "Admin",
        }
    }

    /// Exact match against a stored value or a token claim. `"ADMIN"` is not `Admin`.
    pub fn from_claim(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value)
    }

    /// Folds a role requested at signup into a canonical role.
    ///
    /// Unrecognized names fall back to `Viewer`, the default role.
    pub fn from_requested(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "writer" => Role::Writer,
            "admin" => Role::Admin,
            _ => Role::Viewer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
