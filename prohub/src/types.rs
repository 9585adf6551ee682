//! Common type definitions and permission system types.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, ProfessionalId, etc.)
//! - Permission and authorization types
//! - Resource and operation enums for access control
//!
//! # Permission System
//!
//! - [`Resource`]: What entity type is being accessed (Users, Reservations, ...)
//! - [`Operation`]: What action is being performed (Read, Create, Update, Delete)
//! - [`Permission`]: Authorization requirement combining resource and operation
//!
//! Operations come in two flavors:
//! - **All**: Unrestricted access to all entities (e.g., `ReadAll`, `DeleteAll`)
//! - **Own**: Restricted to entities the caller owns (e.g., `ReadOwn`, `UpdateOwn`)

use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type ProfessionalId = Uuid;
pub type CategoryId = Uuid;
pub type ServiceId = Uuid;
pub type ReservationId = Uuid;
pub type AvailabilityId = Uuid;
pub type ReviewId = Uuid;
pub type ImageId = Uuid;
pub type ConversationId = Uuid;
pub type MessageId = Uuid;
pub type SubscriptionId = Uuid;
pub type PaymentId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// Common types for path parameters
#[derive(Debug, Clone, Deserialize)]
pub enum CurrentKeyword {
    #[serde(rename = "current")]
    Current,
}

/// Allows routes like /users/current and /users/{user_id} to hit the same handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserIdOrCurrent {
    Current(CurrentKeyword),
    Id(UserId),
}

// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

impl Operation {
    /// The unrestricted counterpart of an *-Own operation
    pub fn as_all(self) -> Self {
        match self {
            Operation::CreateOwn => Operation::CreateAll,
            Operation::ReadOwn => Operation::ReadAll,
            Operation::UpdateOwn => Operation::UpdateAll,
            Operation::DeleteOwn => Operation::DeleteAll,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Professionals,
    Categories,
    Services,
    Reservations,
    Availability,
    Reviews,
    Images,
    Conversations,
    Payments,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Professionals => "professionals",
            Resource::Categories => "categories",
            Resource::Services => "services",
            Resource::Reservations => "reservations",
            Resource::Availability => "availability",
            Resource::Reviews => "reviews",
            Resource::Images => "images",
            Resource::Conversations => "conversations",
            Resource::Payments => "payments",
        };
        f.write_str(name)
    }
}

// Permission types for authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
    /// Caller must own the specific resource instance
    Owner,
    /// Logical combinator
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "delete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_user_id_or_current_deserialization() {
        let current: UserIdOrCurrent = serde_json::from_str(r#""current""#).unwrap();
        assert!(matches!(current, UserIdOrCurrent::Current(_)));

        let id: UserIdOrCurrent = serde_json::from_str(r#""550e8400-e29b-41d4-a716-446655440000""#).unwrap();
        assert!(matches!(id, UserIdOrCurrent::Id(_)));

        assert!(serde_json::from_str::<UserIdOrCurrent>(r#""someone""#).is_err());
    }

    #[test]
    fn test_operation_as_all() {
        assert_eq!(Operation::ReadOwn.as_all(), Operation::ReadAll);
        assert_eq!(Operation::DeleteOwn.as_all(), Operation::DeleteAll);
        assert_eq!(Operation::UpdateAll.as_all(), Operation::UpdateAll);
    }
}
