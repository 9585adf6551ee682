//! Role-based access control.
//!
//! Each [`Role`] maps to a fixed set of `(Resource, Operation)` grants. `*All`
//! operations apply to every record; `*Own` operations only to records the caller
//! owns, which the handler verifies with [`require_owner`] once it has loaded the
//! record. Admins hold every grant.
//!
//! Handlers declare their baseline requirement in the signature:
//!
//! ```ignore
//! async fn create_service(
//!     current_user: RequiresPermission<resource::Services, operation::CreateOwn>,
//!     ...
//! ) -> Result<...>
//! ```

use std::{fmt, marker::PhantomData, ops::Deref};

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
    types::{Operation, Permission, Resource, UserId},
};

use Operation::*;
use Resource::*;

const CUSTOMER_GRANTS: &[(Resource, Operation)] = &[
    (Users, ReadOwn),
    (Users, UpdateOwn),
    (Users, DeleteOwn),
    (Professionals, ReadAll),
    (Professionals, CreateOwn),
    (Categories, ReadAll),
    (Services, ReadAll),
    (Reservations, CreateOwn),
    (Reservations, ReadOwn),
    (Reservations, UpdateOwn),
    (Reservations, DeleteOwn),
    (Availability, ReadAll),
    (Reviews, ReadAll),
    (Reviews, CreateOwn),
    (Reviews, DeleteOwn),
    (Images, ReadAll),
    (Conversations, CreateOwn),
    (Conversations, ReadOwn),
    (Conversations, UpdateOwn),
    (Payments, ReadOwn),
];

const PROFESSIONAL_GRANTS: &[(Resource, Operation)] = &[
    (Professionals, UpdateOwn),
    (Professionals, DeleteOwn),
    (Services, CreateOwn),
    (Services, UpdateOwn),
    (Services, DeleteOwn),
    (Availability, CreateOwn),
    (Availability, UpdateOwn),
    (Availability, DeleteOwn),
    (Images, CreateOwn),
    (Images, DeleteOwn),
    (Payments, CreateOwn),
];

/// Whether the role holds the grant. Professionals hold every customer grant as well.
pub fn role_has_permission(role: Role, resource: Resource, operation: Operation) -> bool {
    let grant = (resource, operation);
    match role {
        Role::Admin => true,
        Role::Professional => PROFESSIONAL_GRANTS.contains(&grant) || CUSTOMER_GRANTS.contains(&grant),
        Role::Customer => CUSTOMER_GRANTS.contains(&grant),
    }
}

/// Whether the user holds the grant, or its unrestricted counterpart
pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    role_has_permission(user.role, resource, operation) || role_has_permission(user.role, resource, operation.as_all())
}

/// Whether the user may read every record of this resource, not only their own
pub fn can_read_all_resources(user: &CurrentUser, resource: Resource) -> bool {
    role_has_permission(user.role, resource, ReadAll)
}

/// Check an `*Own` operation against a loaded record's owner. Callers holding the
/// unrestricted counterpart pass regardless of ownership.
pub fn require_owner(user: &CurrentUser, owner_id: UserId, resource: Resource, operation: Operation) -> Result<()> {
    let unrestricted = operation.as_all();
    if role_has_permission(user.role, resource, unrestricted) {
        return Ok(());
    }
    if user.id == owner_id && role_has_permission(user.role, resource, operation) {
        return Ok(());
    }

    Err(Error::InsufficientPermissions {
        required: Permission::Any(vec![Permission::Owner, Permission::Allow(resource, unrestricted)]),
        action: operation,
        resource: resource.to_string(),
    })
}

/// Type-level resource markers for [`RequiresPermission`]
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    macro_rules! markers {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl ResourceMarker for $name {
                    const RESOURCE: Resource = Resource::$name;
                }
            )*
        };
    }

    markers!(
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
    );
}

/// Type-level operation markers for [`RequiresPermission`]
pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    macro_rules! markers {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl OperationMarker for $name {
                    const OPERATION: Operation = Operation::$name;
                }
            )*
        };
    }

    markers!(
        CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, UpdateOwn, DeleteAll, DeleteOwn,
    );
}

/// Extractor that authenticates the caller and checks a baseline grant.
/// Dereferences to the authenticated [`CurrentUser`].
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R, O> RequiresPermission<R, O> {
    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> fmt::Debug for RequiresPermission<R, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequiresPermission").field(&self.user).finish()
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceMarker,
    O: operation::OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: R::RESOURCE.to_string(),
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            role,
            display_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn test_admin_has_everything() {
        let admin = user(Role::Admin);
        assert!(has_permission(&admin, Categories, CreateAll));
        assert!(has_permission(&admin, Users, DeleteAll));
        assert!(can_read_all_resources(&admin, Reservations));
    }

    #[test]
    fn test_professional_inherits_customer_grants() {
        let professional = user(Role::Professional);
        assert!(has_permission(&professional, Reservations, CreateOwn));
        assert!(has_permission(&professional, Services, CreateOwn));
        assert!(!has_permission(&professional, Categories, CreateAll));

        let customer = user(Role::Customer);
        assert!(!has_permission(&customer, Services, CreateOwn));
        assert!(!has_permission(&customer, Availability, UpdateOwn));
    }

    #[test]
    fn test_own_is_satisfied_by_all() {
        let customer = user(Role::Customer);
        // Customers read every professional, which covers reading their own
        assert!(has_permission(&customer, Professionals, ReadOwn));
        assert!(!can_read_all_resources(&customer, Reservations));
    }

    #[test]
    fn test_require_owner() {
        let customer = user(Role::Customer);
        assert!(require_owner(&customer, customer.id, Reservations, UpdateOwn).is_ok());

        let err = require_owner(&customer, Uuid::new_v4(), Reservations, UpdateOwn).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let admin = user(Role::Admin);
        assert!(require_owner(&admin, Uuid::new_v4(), Reservations, DeleteOwn).is_ok());

        // Ownership alone isn't enough without the grant
        assert!(require_owner(&customer, customer.id, Services, UpdateOwn).is_err());
    }
}
