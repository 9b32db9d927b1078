// Import unit validation
//
// Rules are independent checks, one scope each. Every rule runs on every
// unit; a failing rule adds field errors and the remaining rules still run,
// so one pass reports the full error set.

pub mod body;
pub mod identity;
pub mod locale;
pub mod metadata;
pub mod taxonomy;

use crate::identity::IdentityResolver;
use crate::types::{ImportUnit, Scope, ScopedErrors};
use std::sync::Arc;
use tracing::debug;

pub use body::BodyRule;
pub use identity::IdentityRule;
pub use locale::LocaleRule;
pub use metadata::MetadataRule;
pub use taxonomy::TaxonomyRule;

/// One field-level check
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Scope this rule reports into
    fn scope(&self) -> Scope;

    /// Record every problem found in `unit` into `errors`
    fn check(&self, unit: &ImportUnit, errors: &mut ScopedErrors);
}

/// Ordered rule set
#[derive(Clone)]
pub struct Validator {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl Validator {
    /// Empty validator; every unit passes
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Built-in rules for all five scopes
    ///
    /// The metadata rule reserves the identity index keys derived from
    /// `identity`, so imported metadata cannot overwrite them.
    pub fn with_default_rules(identity: &IdentityResolver) -> Self {
        Self::empty()
            .with_rule(IdentityRule::default())
            .with_rule(BodyRule)
            .with_rule(MetadataRule::new(identity.clone()))
            .with_rule(TaxonomyRule)
            .with_rule(LocaleRule)
    }

    pub fn with_rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Run every rule and merge the findings into the unit's error map
    pub fn validate(&self, mut unit: ImportUnit) -> ImportUnit {
        let mut errors = ScopedErrors::new();
        for rule in &self.rules {
            let before = errors.len();
            rule.check(&unit, &mut errors);
            let found = errors.len() - before;
            if found > 0 {
                debug!(
                    external_id = unit.external_id(),
                    rule = rule.name(),
                    scope = %rule.scope(),
                    found,
                    "Validation rule reported errors"
                );
            }
        }
        unit.merge_errors(errors);
        unit
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_default_rules(&IdentityResolver::default())
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rule_names())
            .finish()
    }
}
