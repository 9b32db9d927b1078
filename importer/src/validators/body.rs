use super::ValidationRule;
use crate::types::{ImportUnit, Scope, ScopedErrors};

/// Title must be present; an explicit record type must not be blank
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyRule;

impl ValidationRule for BodyRule {
    fn name(&self) -> &'static str {
        "body"
    }

    fn scope(&self) -> Scope {
        Scope::Body
    }

    fn check(&self, unit: &ImportUnit, errors: &mut ScopedErrors) {
        if unit.body.title.trim().is_empty() {
            errors.set(Scope::Body, "title", "title is required");
        }

        if let Some(record_type) = &unit.body.record_type {
            if record_type.trim().is_empty() {
                errors.set(Scope::Body, "record_type", "record type must not be empty");
            }
        }
    }
}
