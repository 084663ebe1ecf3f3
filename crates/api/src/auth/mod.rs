//! Authentication for Fleetdesk
//!
//! Turns transport credentials into a typed [`Identity`]. The caller's kind
//! always comes from a verified token claim; request input (panel flags,
//! headers) only ever selects the verification strategy.

pub mod jwt;
pub mod middleware;
pub mod resolver;

use fleetdesk_shared::{ActorKind, Party};
use uuid::Uuid;

pub use jwt::{Claims, JwtManager};
pub use middleware::{require_auth, AuthState, DisplayName};
pub use resolver::{Credentials, IdentityResolver, Panel};

/// A fully authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Business(Uuid),
    Admin(Uuid),
    Courier(Uuid),
}

impl Identity {
    pub fn kind(&self) -> ActorKind {
        match self {
            Identity::Business(_) => ActorKind::Business,
            Identity::Admin(_) => ActorKind::Admin,
            Identity::Courier(_) => ActorKind::Courier,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Identity::Business(id) | Identity::Admin(id) | Identity::Courier(id) => *id,
        }
    }

    /// The ticket-conversation party this caller acts as.
    ///
    /// Couriers are not a ticket party and get `None`.
    pub fn party(&self) -> Option<Party> {
        match self {
            Identity::Business(_) => Some(Party::Business),
            Identity::Admin(_) => Some(Party::Admin),
            Identity::Courier(_) => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Admin(_))
    }
}

/// Typed authentication failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No credential supplied")]
    NoCredential,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    ExpiredToken,
}

impl From<AuthError> for crate::error::ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NoCredential => crate::error::ApiError::Unauthorized,
            AuthError::InvalidToken => crate::error::ApiError::InvalidToken,
            AuthError::ExpiredToken => crate::error::ApiError::ExpiredToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_party_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(Identity::Business(id).party(), Some(Party::Business));
        assert_eq!(Identity::Admin(id).party(), Some(Party::Admin));
        assert_eq!(Identity::Courier(id).party(), None);
        assert!(Identity::Admin(id).is_admin());
        assert!(!Identity::Courier(id).is_admin());
    }
}
