//! Authorization Policy
//!
//! Pure checks over an [`AuthenticatedIdentity`] and the state of the
//! resource being acted on. Handlers run these before any write.

use uuid::Uuid;

use crate::auth::models::{AuthenticatedIdentity, Role};
use crate::database::models::Conversation;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    SelfAction(String),
}

/// Actions an admin may not apply to their own account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfAction {
    ChangeRole,
    DeleteAccount,
}

impl SelfAction {
    fn message(&self) -> &'static str {
        match self {
            SelfAction::ChangeRole => "Cannot change your own role",
            SelfAction::DeleteAccount => "Cannot delete your own account",
        }
    }
}

/// Role gate
pub fn require_role(identity: &AuthenticatedIdentity, allowed: &[Role]) -> Result<(), PolicyError> {
    if allowed.contains(&identity.role) {
        return Ok(());
    }
    let allowed = allowed
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" or ");
    Err(PolicyError::Forbidden(format!("Requires role {allowed}")))
}

/// Ownership gate: the owner, or any admin
pub fn require_owner_or_admin(
    identity: &AuthenticatedIdentity,
    owner_id: Uuid,
) -> Result<(), PolicyError> {
    match identity.role {
        Role::Admin => Ok(()),
        Role::User | Role::Agent if identity.user_id == owner_id => Ok(()),
        Role::User | Role::Agent => Err(PolicyError::Forbidden(
            "You do not have permission to modify this resource".to_string(),
        )),
    }
}

pub fn require_not_self(
    identity: &AuthenticatedIdentity,
    target_user_id: Uuid,
    action: SelfAction,
) -> Result<(), PolicyError> {
    if identity.user_id == target_user_id {
        return Err(PolicyError::SelfAction(action.message().to_string()));
    }
    Ok(())
}

/// Only the buyer and the seller can read or write a conversation
pub fn require_participant(
    identity: &AuthenticatedIdentity,
    conversation: &Conversation,
) -> Result<(), PolicyError> {
    if conversation.buyer_id == identity.user_id || conversation.seller_id == identity.user_id {
        Ok(())
    } else {
        Err(PolicyError::Forbidden("Access denied".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn identity(role: Role) -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_role_gate() {
        assert!(require_role(&identity(Role::Admin), &[Role::Admin]).is_ok());
        assert!(require_role(&identity(Role::Agent), &[Role::Agent, Role::Admin]).is_ok());

        let err = require_role(&identity(Role::User), &[Role::Agent, Role::Admin]).unwrap_err();
        assert_eq!(err, PolicyError::Forbidden("Requires role AGENT or ADMIN".to_string()));
        assert!(matches!(
            require_role(&identity(Role::Agent), &[Role::Admin]),
            Err(PolicyError::Forbidden(_))
        ));
    }

    #[test]
    fn test_ownership_gate() {
        let owner = identity(Role::Agent);
        assert!(require_owner_or_admin(&owner, owner.user_id).is_ok());
        assert!(require_owner_or_admin(&identity(Role::Admin), owner.user_id).is_ok());
        assert!(matches!(
            require_owner_or_admin(&identity(Role::User), owner.user_id),
            Err(PolicyError::Forbidden(_))
        ));
        assert!(matches!(
            require_owner_or_admin(&identity(Role::Agent), owner.user_id),
            Err(PolicyError::Forbidden(_))
        ));
    }

    #[test]
    fn test_self_protection() {
        let admin = identity(Role::Admin);
        assert_eq!(
            require_not_self(&admin, admin.user_id, SelfAction::DeleteAccount),
            Err(PolicyError::SelfAction("Cannot delete your own account".to_string()))
        );
        assert_eq!(
            require_not_self(&admin, admin.user_id, SelfAction::ChangeRole),
            Err(PolicyError::SelfAction("Cannot change your own role".to_string()))
        );
        assert!(require_not_self(&admin, Uuid::new_v4(), SelfAction::DeleteAccount).is_ok());
    }

    #[test]
    fn test_participant_gate() {
        let buyer = identity(Role::User);
        let seller = identity(Role::Agent);
        let conversation = Conversation {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            buyer_id: buyer.user_id,
            seller_id: seller.user_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(require_participant(&buyer, &conversation).is_ok());
        assert!(require_participant(&seller, &conversation).is_ok());
        assert!(require_participant(&identity(Role::Admin), &conversation).is_err());
    }
}
