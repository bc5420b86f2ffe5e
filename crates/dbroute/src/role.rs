//! Database roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Identifier of one replica endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaId(pub u16);

/// Logical endpoint a connection is drawn from.
///
/// `Role` is the only key into the pool registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// The writable primary.
    Primary,
    /// A read-only replica.
    Replica(ReplicaId),
}

impl Role {
    /// The first (or only) replica.
    pub const REPLICA: Role = Role::Replica(ReplicaId(0));

    /// Shorthand for `Role::Replica(ReplicaId(id))`.
    #[must_use]
    pub const fn replica(id: u16) -> Self {
        Role::Replica(ReplicaId(id))
    }

    /// Whether this is the primary.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self, Role::Primary)
    }

    /// The replica id, if this is a replica.
    #[must_use]
    pub fn replica_id(&self) -> Option<ReplicaId> {
        match self {
            Role::Primary => None,
            Role::Replica(id) => Some(*id),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Replica(ReplicaId(0)) => f.write_str("replica"),
            Role::Replica(ReplicaId(id)) => write!(f, "replica-{id}"),
        }
    }
}

/// Error returned when a role name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid role {0:?}: expected \"primary\", \"replica\" or \"replica-<n>\"")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "primary" => Ok(Role::Primary),
            "replica" => Ok(Role::REPLICA),
            other => other
                .strip_prefix("replica-")
                .and_then(|id| id.parse().ok())
                .map(Role::replica)
                .ok_or_else(|| ParseRoleError(s.to_string())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
