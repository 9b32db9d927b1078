//! External id checks

use super::ValidationRule;
use crate::types::{ImportUnit, Scope, ScopedErrors};

/// Longest accepted external id, in characters
pub const MAX_EXTERNAL_ID_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct IdentityRule {
    max_len: usize,
}

impl Default for IdentityRule {
    fn default() -> Self {
        Self {
            max_len: MAX_EXTERNAL_ID_LEN,
        }
    }
}

impl ValidationRule for IdentityRule {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn scope(&self) -> Scope {
        Scope::Identity
    }

    fn check(&self, unit: &ImportUnit, errors: &mut ScopedErrors) {
        let id = unit.external_id();

        if id.is_empty() {
            errors.set(Scope::Identity, "external_id", "external id is required");
            return;
        }

        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            errors.set(
                Scope::Identity,
                "external_id",
                "external id must not contain whitespace or control characters",
            );
        } else if id.chars().count() > self.max_len {
            errors.set(
                Scope::Identity,
                "external_id",
                format!("external id is longer than {} characters", self.max_len),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(id: &str) -> ScopedErrors {
        let mut errors = ScopedErrors::new();
        IdentityRule::default().check(&ImportUnit::new(id), &mut errors);
        errors
    }

    #[test]
    fn test_identity_rule() {
        assert!(check("ext-42").is_empty());
        assert_eq!(
            check("").get(Scope::Identity, "external_id"),
            Some("external id is required")
        );
        assert!(check("ext 42").has_scope(Scope::Identity));
        assert!(check("ext\u{0}").has_scope(Scope::Identity));
        assert!(check(&"x".repeat(256)).has_scope(Scope::Identity));
        assert!(check(&"x".repeat(255)).is_empty());
    }
}
