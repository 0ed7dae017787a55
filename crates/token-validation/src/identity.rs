//! Authenticated identity built from validated claims.

use crate::claims::ClaimSet;
use crate::config::IdentityOptions;

/// Claims of a validated token together with the claim types that carry the
/// identity's name and roles.
///
/// Hosts receive this in request extensions from
/// [`require_bearer`](crate::middleware::require_bearer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    claims: ClaimSet,
    options: IdentityOptions,
}

impl AuthenticatedIdentity {
    /// Wrap claims with the given identity options.
    #[must_use]
    pub fn new(claims: ClaimSet, options: IdentityOptions) -> Self {
        Self { claims, options }
    }

    /// Authentication type (e.g. "Bearer").
    #[must_use]
    pub fn authentication_type(&self) -> &str {
        &self.options.authentication_type
    }

    /// First value of the name claim.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.claims.find_first(&self.options.name_claim_type)
    }

    /// All values of the role claim, in order.
    pub fn roles(&self) -> impl Iterator<Item = &str> + '_ {
        self.claims.values(&self.options.role_claim_type)
    }

    /// Whether the identity carries the role.
    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.claims.has_claim(&self.options.role_claim_type, role)
    }

    /// The validated claims.
    #[must_use]
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// Consume the identity, returning its claims.
    #[must_use]
    pub fn into_claims(self) -> ClaimSet {
        self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;

    fn identity(options: IdentityOptions) -> AuthenticatedIdentity {
        let claims = vec![
            Claim::new("sub", "u1"),
            Claim::new("name", "Alice"),
            Claim::new("role", "admin"),
            Claim::new("role", "user"),
            Claim::new("preferred_username", "alice"),
        ]
        .into_iter()
        .collect();
        AuthenticatedIdentity::new(claims, options)
    }

    #[test]
    fn test_default_claim_types() {
        let identity = identity(IdentityOptions::default());

        assert_eq!(identity.authentication_type(), "Bearer");
        assert_eq!(identity.name(), Some("Alice"));
        assert_eq!(identity.roles().collect::<Vec<_>>(), vec!["admin", "user"]);
        assert!(identity.is_in_role("admin"));
        assert!(!identity.is_in_role("root"));
        assert_eq!(identity.claims().len(), 5);
    }

    #[test]
    fn test_custom_claim_types() {
        let identity = identity(IdentityOptions {
            authentication_type: "Introspected".to_string(),
            name_claim_type: "preferred_username".to_string(),
            role_claim_type: "scope".to_string(),
        });

        assert_eq!(identity.authentication_type(), "Introspected");
        assert_eq!(identity.name(), Some("alice"));
        assert_eq!(identity.roles().count(), 0);
        assert!(!identity.is_in_role("admin"));
    }

    #[test]
    fn test_missing_name_claim() {
        let identity = AuthenticatedIdentity::new(ClaimSet::new(), IdentityOptions::default());

        assert_eq!(identity.name(), None);
        assert!(identity.into_claims().is_empty());
    }
}
