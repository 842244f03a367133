// crates/juris-core/src/core/identity.rs
// ============================================================================
// Module: Juris Identity Model
// Description: Roles, identity tuples, and actor attribution for audit rows.
// Purpose: Model the identity facts the core consumes from outside collaborators.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Authentication and role assignment live outside the core. The core consumes
//! `(user_id, role, institution_id)` tuples and uses only the closed role set
//! for permission checks. Any finer-grained role logic belongs to the
//! permissions collaborator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::InstitutionId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Closed role set recognized by the core.
///
/// # Invariants
/// - Variants are stable for serialization and permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Student participant.
    Student,
    /// Faculty session owner.
    Faculty,
    /// Evaluating judge.
    Judge,
    /// Institution administrator.
    Admin,
    /// Platform super administrator.
    SuperAdmin,
}

impl Role {
    /// Returns true for roles that may exercise faculty-gated transitions.
    #[must_use]
    pub const fn has_faculty_authority(self) -> bool {
        matches!(self, Self::Faculty | Self::Admin | Self::SuperAdmin)
    }

    /// Returns true for the student role.
    #[must_use]
    pub const fn is_student(self) -> bool {
        matches!(self, Self::Student)
    }
}

// ============================================================================
// SECTION: Identity Tuple
// ============================================================================

/// Identity tuple consumed from the authentication collaborator.
///
/// # Invariants
/// - `institution_id` scopes every operation; cross-tenant access fails closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Acting user identifier.
    pub user_id: UserId,
    /// Role label used for permission checks.
    pub role: Role,
    /// Institution the user belongs to.
    pub institution_id: InstitutionId,
}

impl Identity {
    /// Creates an identity tuple.
    #[must_use]
    pub const fn new(user_id: UserId, role: Role, institution_id: InstitutionId) -> Self {
        Self { user_id, role, institution_id }
    }
}

// ============================================================================
// SECTION: Actor Attribution
// ============================================================================

/// Actor recorded on audit rows; `System` covers timer-driven mutations.
///
/// # Invariants
/// - Serializes as a nullable user id on the wire (`null` for system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<UserId>", into = "Option<UserId>")]
pub enum Actor {
    /// Internal engine actor (timer expiry, supervisor advances).
    System,
    /// Human actor identified by user id.
    User(UserId),
}

impl Actor {
    /// Returns the user id when the actor is a human.
    #[must_use]
    pub const fn user_id(self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User(id) => Some(id),
        }
    }
}

impl From<Option<UserId>> for Actor {
    fn from(value: Option<UserId>) -> Self {
        value.map_or(Self::System, Self::User)
    }
}

impl From<Actor> for Option<UserId> {
    fn from(actor: Actor) -> Self {
        actor.user_id()
    }
}

impl From<Identity> for Actor {
    fn from(identity: Identity) -> Self {
        Self::User(identity.user_id)
    }
}
