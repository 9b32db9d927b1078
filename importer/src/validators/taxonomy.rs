//! Term reference shape checks
//!
//! Errors land in the `taxonomy` scope keyed `{taxonomy}[{index}]`, or by the
//! taxonomy name alone for problems with the name itself.

use super::ValidationRule;
use crate::types::{ImportUnit, Scope, ScopedErrors};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct TaxonomyRule;

/// Lowercase ASCII letters, digits, `-` and `_`
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl ValidationRule for TaxonomyRule {
    fn name(&self) -> &'static str {
        "taxonomy"
    }

    fn scope(&self) -> Scope {
        Scope::Taxonomy
    }

    fn check(&self, unit: &ImportUnit, errors: &mut ScopedErrors) {
        for (taxonomy, terms) in &unit.taxonomies {
            if taxonomy.trim().is_empty() {
                errors.set(Scope::Taxonomy, "taxonomy", "taxonomy name is required");
                continue;
            }

            let mut seen = HashSet::new();
            for (index, term) in terms.iter().enumerate() {
                let field = format!("{}[{}]", taxonomy, index);

                let problem = if term.name.trim().is_empty() {
                    Some("term name is required".to_string())
                } else if term.slug.is_empty() {
                    Some(format!("term '{}' has no slug", term.name))
                } else if !is_valid_slug(&term.slug) {
                    Some(format!("slug '{}' may only contain a-z, 0-9, '-' and '_'", term.slug))
                } else if !seen.insert(term.slug.as_str()) {
                    Some(format!("slug '{}' is listed more than once", term.slug))
                } else if term.parent_slug.as_deref() == Some(term.slug.as_str()) {
                    Some(format!("term '{}' cannot be its own parent", term.slug))
                } else {
                    None
                };

                if let Some(message) = problem {
                    errors.set(Scope::Taxonomy, field, message);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TermRef;

    fn check(unit: &ImportUnit) -> ScopedErrors {
        let mut errors = ScopedErrors::new();
        TaxonomyRule.check(unit, &mut errors);
        errors
    }

    #[test]
    fn test_slug_charset() {
        assert!(is_valid_slug("news_2024-eu"));
        assert!(!is_valid_slug("News"));
        assert!(!is_valid_slug("with space"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_term_problems_keyed_by_position() {
        let unit = ImportUnit::new("ext-1").with_terms(
            "category",
            vec![
                TermRef::new("News", "news"),
                TermRef::new("", "empty-name"),
                TermRef::new("Again", "news"),
                TermRef::new("Loop", "loop").with_parent("loop"),
                TermRef::new("Child", "child").with_parent("news"),
            ],
        );

        let errors = check(&unit);
        assert_eq!(errors.len(), 3);
        assert!(errors.get(Scope::Taxonomy, "category[1]").is_some());
        assert!(errors.get(Scope::Taxonomy, "category[2]").is_some());
        assert!(errors.get(Scope::Taxonomy, "category[3]").is_some());
    }

    #[test]
    fn test_same_slug_in_different_taxonomies_is_fine() {
        let unit = ImportUnit::new("ext-1")
            .with_terms("category", vec![TermRef::new("News", "news")])
            .with_terms("post_tag", vec![TermRef::new("News", "news")]);
        assert!(check(&unit).is_empty());
    }

    #[test]
    fn test_blank_taxonomy_name() {
        let unit = ImportUnit::new("ext-1").with_terms(" ", vec![TermRef::new("News", "news")]);
        assert_eq!(
            check(&unit).get(Scope::Taxonomy, "taxonomy"),
            Some("taxonomy name is required")
        );
    }
}
