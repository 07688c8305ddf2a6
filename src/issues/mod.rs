//! Issue detection
//!
//! A bank of pure rules maps one [`PageRecord`] to `(issue code, details)`
//! emissions. The loaded catalogue is authoritative: emissions whose code is
//! missing or inactive are dropped, so rules can never invent codes the
//! store does not know.

pub mod catalogue;
pub mod rules;

pub use catalogue::{default_definitions, IssueCatalogue};

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::types::{IssueDefinition, PageRecord};

/// One raw rule emission, pre-catalogue.
#[derive(Debug, Clone)]
pub struct Emission {
    pub code: String,
    pub details: Value,
}

impl Emission {
    pub fn new(code: impl Into<String>, details: Value) -> Self {
        Self {
            code: code.into(),
            details,
        }
    }
}

/// An emission that survived the catalogue gate.
#[derive(Debug, Clone)]
pub struct DetectedIssue {
    pub definition: IssueDefinition,
    pub details: Value,
}

/// Sequencing harness over the rule registry.
pub struct IssueDetector {
    catalogue: IssueCatalogue,
}

impl IssueDetector {
    pub fn new(catalogue: IssueCatalogue) -> Self {
        Self { catalogue }
    }

    pub fn catalogue(&self) -> &IssueCatalogue {
        &self.catalogue
    }

    /// Run every rule over the page. Emissions are de-duplicated by code
    /// within the page and gated by the catalogue.
    pub fn detect(&self, page: &PageRecord) -> Vec<DetectedIssue> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for rule in rules::RULES {
            for emission in rule(page) {
                if !seen.insert(emission.code.clone()) {
                    continue;
                }
                match self.catalogue.resolve(&emission.code) {
                    Some(definition) => out.push(DetectedIssue {
                        definition: definition.clone(),
                        details: emission.details,
                    }),
                    None => {
                        debug!("dropping emission for unknown issue code {}", emission.code);
                    }
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> IssueDetector {
        IssueDetector::new(IssueCatalogue::from_definitions(default_definitions()))
    }

    fn content_page() -> PageRecord {
        let mut page = PageRecord::error_record("https://ex.test/p", 200, None, 100, "");
        page.content_type = Some("text/html".to_string());
        page.is_indexable = true;
        page.indexability_reason = None;
        page
    }

    #[test]
    fn detects_across_families() {
        // A bare 200 page with no title, h1, or body trips content rules
        let page = content_page();
        let detected = detector().detect(&page);
        let codes: Vec<&str> = detected.iter().map(|d| d.definition.code.as_str()).collect();
        assert!(codes.contains(&"CONTENT_NO_TITLE"));
        assert!(codes.contains(&"CONTENT_NO_H1"));
        assert!(codes.contains(&"CONTENT_NO_BODY_TEXT"));
        assert!(codes.contains(&"SCHEMA_NONE"));
    }

    #[test]
    fn unknown_codes_are_dropped() {
        let mut page = content_page();
        page.product_issues = vec!["product_made_up_code".to_string()];
        let detected = detector().detect(&page);
        assert!(!detected
            .iter()
            .any(|d| d.definition.code == "product_made_up_code"));
    }

    #[test]
    fn inactive_codes_are_dropped() {
        let mut defs = default_definitions();
        for def in &mut defs {
            if def.code == "CONTENT_NO_TITLE" {
                def.active = false;
            }
        }
        let detector = IssueDetector::new(IssueCatalogue::from_definitions(defs));
        let detected = detector.detect(&content_page());
        assert!(!detected.iter().any(|d| d.definition.code == "CONTENT_NO_TITLE"));
        // Other content rules still fire
        assert!(detected.iter().any(|d| d.definition.code == "CONTENT_NO_H1"));
    }

    #[test]
    fn emissions_deduplicate_by_code() {
        let mut page = content_page();
        page.product_issues = vec![
            "product_missing_brand".to_string(),
            "product_missing_brand".to_string(),
        ];
        let detected = detector().detect(&page);
        let brand_count = detected
            .iter()
            .filter(|d| d.definition.code == "product_missing_brand")
            .count();
        assert_eq!(brand_count, 1);
    }

    #[test]
    fn error_page_only_gets_transport_rules() {
        let page = PageRecord::error_record("https://ex.test/x", 0, None, 0, "DNS failure");
        let detected = detector().detect(&page);
        assert!(detected.is_empty());
    }
}
