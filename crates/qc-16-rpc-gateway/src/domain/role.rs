//! Authorization roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authorization level granted to a request.
///
/// Ordered from least to most privileged. Each command declares the minimum
/// role it needs; `Forbid` always rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Forbid,
    Guest,
    User,
    Identified,
    Admin,
}

impl Role {
    /// Roles whose resource usage is never metered.
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Role::Admin | Role::Identified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Forbid => "forbid",
            Role::Guest => "guest",
            Role::User => "user",
            Role::Identified => "identified",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
