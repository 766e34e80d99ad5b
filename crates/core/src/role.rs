use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Access role of a user.
///
/// The panel only offers the three known roles, but the backend is the
/// authority: an unknown role string it returns is kept as `Other` and sent
/// back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Client,
    Staff,
    Admin,
    Other(String),
}

impl Role {
    /// Roles selectable from the admin table.
    pub const SELECTABLE: [Role; 3] = [Role::Client, Role::Staff, Role::Admin];

    pub fn as_str(&self) -> &str {
        match self {
            Role::Client => "client",
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Role::Other(_))
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "client" => Role::Client,
            "staff" => Role::Staff,
            "admin" => Role::Admin,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        match value {
            Role::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Error returned when parsing a role typed by an operator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}' (expected client, staff or admin)")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Strict parse: only the selectable roles are accepted from user input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Role::from(s.trim().to_ascii_lowercase()) {
            Role::Other(_) => Err(UnknownRole(s.to_string())),
            role => Ok(role),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
