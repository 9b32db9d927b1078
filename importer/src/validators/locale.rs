use super::ValidationRule;
use crate::types::{ImportUnit, Scope, ScopedErrors};

/// Accepts `ll`, `ll_CC` and `ll-CC` (language lowercase, country uppercase)
pub fn is_valid_locale(code: &str) -> bool {
    let (language, country) = match code.find(['_', '-']) {
        Some(pos) => (&code[..pos], Some(&code[pos + 1..])),
        None => (code, None),
    };

    let language_ok = language.len() == 2 && language.chars().all(|c| c.is_ascii_lowercase());
    let country_ok = country
        .map(|cc| cc.len() == 2 && cc.chars().all(|c| c.is_ascii_uppercase()))
        .unwrap_or(true);

    language_ok && country_ok
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocaleRule;

impl ValidationRule for LocaleRule {
    fn name(&self) -> &'static str {
        "locale"
    }

    fn scope(&self) -> Scope {
        Scope::Locale
    }

    fn check(&self, unit: &ImportUnit, errors: &mut ScopedErrors) {
        let Some(info) = &unit.locale else {
            return;
        };

        if !is_valid_locale(&info.locale) {
            errors.set(
                Scope::Locale,
                "locale",
                format!("'{}' is not a locale code (expected ll or ll_CC)", info.locale),
            );
        }

        if let Some(master) = &info.master_external_id {
            if master.trim().is_empty() {
                errors.set(Scope::Locale, "master", "master external id must not be empty");
            }
        }
    }
}
