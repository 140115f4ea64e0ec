//! Caller identity passed into lifecycle operations.
//!
//! # Responsibility
//! - Carry who is performing an operation and with what authority.
//!
//! # Invariants
//! - Actors are supplied explicitly by the caller context; core holds no
//!   global current-user or current-team state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a user known to the surrounding application.
///
/// Users themselves (names, credentials, team membership) live outside this
/// crate; core only ever sees their identifiers.
pub type UserId = Uuid;

/// Authority level of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular team member.
    Member,
    /// Team manager. Carries no extra meeting rights.
    Manager,
    /// Administrative role, may delete any meeting.
    Admin,
}

impl Role {
    /// Returns whether this role may delete meetings it does not organize.
    pub fn can_moderate(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// A user performing a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user id.
    pub user: UserId,
    /// Authority level supplied by the caller's session layer.
    pub role: Role,
}

impl Actor {
    /// Convenience constructor for a regular member actor.
    pub fn member(user: UserId) -> Self {
        Self {
            user,
            role: Role::Member,
        }
    }

    /// Convenience constructor for an administrative actor.
    pub fn admin(user: UserId) -> Self {
        Self {
            user,
            role: Role::Admin,
        }
    }
}
