//! Metadata key checks
//!
//! Keys are reported by position (`meta[3]`) because duplicate keys are legal
//! and an empty key has no name to report under.

use super::ValidationRule;
use crate::identity::IdentityResolver;
use crate::types::{ImportUnit, Scope, ScopedErrors};

#[derive(Debug, Clone)]
pub struct MetadataRule {
    identity: IdentityResolver,
}

impl MetadataRule {
    pub fn new(identity: IdentityResolver) -> Self {
        Self { identity }
    }

    fn is_reserved(&self, key: &str) -> bool {
        key == self.identity.base_key() || key.starts_with(self.identity.prefix())
    }
}

impl ValidationRule for MetadataRule {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn scope(&self) -> Scope {
        Scope::Metadata
    }

    fn check(&self, unit: &ImportUnit, errors: &mut ScopedErrors) {
        for (index, entry) in unit.metadata.iter().enumerate() {
            let field = format!("meta[{}]", index);
            if entry.key.trim().is_empty() {
                errors.set(Scope::Metadata, field, "metadata key is required");
            } else if self.is_reserved(&entry.key) {
                errors.set(
                    Scope::Metadata,
                    field,
                    format!("metadata key '{}' is reserved for the identity index", entry.key),
                );
            }
        }
    }
}
