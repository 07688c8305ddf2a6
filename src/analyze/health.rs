//! Health and category scoring

use std::collections::HashMap;

use crate::types::{IssueDefinition, IssueSeverity};

/// Issue counts summed by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityTotals {
    pub errors: u64,
    pub warnings: u64,
    pub notices: u64,
}

impl SeverityTotals {
    pub fn total(&self) -> u64 {
        self.errors + self.warnings + self.notices
    }
}

/// `max(0, min(100, 100 − 5·errors − 2·warnings − ⌊0.5·notices⌋))`
pub fn score(totals: SeverityTotals) -> u32 {
    let penalty = 5 * totals.errors + 2 * totals.warnings + totals.notices / 2;
    (100i64 - penalty as i64).clamp(0, 100) as u32
}

/// Sum aggregate counts by severity.
pub fn severity_totals(aggregates: &[(IssueDefinition, u64)]) -> SeverityTotals {
    let mut totals = SeverityTotals::default();
    for (definition, count) in aggregates {
        match definition.severity {
            IssueSeverity::Error => totals.errors += count,
            IssueSeverity::Warning => totals.warnings += count,
            IssueSeverity::Notice => totals.notices += count,
        }
    }
    totals
}

/// Per-category scores using the same penalty formula over each category's
/// own severity sums.
pub fn category_scores(aggregates: &[(IssueDefinition, u64)]) -> HashMap<String, u32> {
    let mut by_category: HashMap<String, SeverityTotals> = HashMap::new();
    for (definition, count) in aggregates {
        let entry = by_category.entry(definition.category.clone()).or_default();
        match definition.severity {
            IssueSeverity::Error => entry.errors += count,
            IssueSeverity::Warning => entry.warnings += count,
            IssueSeverity::Notice => entry.notices += count,
        }
    }
    by_category
        .into_iter()
        .map(|(category, totals)| (category, score(totals)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn def(category: &str, severity: IssueSeverity) -> IssueDefinition {
        IssueDefinition {
            id: Uuid::new_v4(),
            code: "x".to_string(),
            name: "x".to_string(),
            category: category.to_string(),
            severity,
            active: true,
        }
    }

    #[test]
    fn score_formula() {
        assert_eq!(score(SeverityTotals::default()), 100);
        assert_eq!(
            score(SeverityTotals { errors: 2, warnings: 3, notices: 5 }),
            100 - 10 - 6 - 2
        );
        // Notices floor-divide
        assert_eq!(score(SeverityTotals { errors: 0, warnings: 0, notices: 1 }), 100);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(
            score(SeverityTotals { errors: 50, warnings: 0, notices: 0 }),
            0
        );
    }

    #[test]
    fn score_stays_in_range_for_arbitrary_inputs() {
        for errors in [0u64, 1, 7, 100, 10_000] {
            for warnings in [0u64, 3, 999] {
                for notices in [0u64, 1, 12_345] {
                    let s = score(SeverityTotals { errors, warnings, notices });
                    assert!(s <= 100);
                }
            }
        }
    }

    #[test]
    fn totals_and_categories() {
        let aggregates = vec![
            (def("content", IssueSeverity::Error), 2),
            (def("content", IssueSeverity::Notice), 4),
            (def("mobile", IssueSeverity::Warning), 3),
        ];
        let totals = severity_totals(&aggregates);
        assert_eq!(totals.errors, 2);
        assert_eq!(totals.warnings, 3);
        assert_eq!(totals.notices, 4);
        assert_eq!(totals.total(), 9);

        let categories = category_scores(&aggregates);
        assert_eq!(categories["content"], 100 - 10 - 2);
        assert_eq!(categories["mobile"], 100 - 6);
    }
}
