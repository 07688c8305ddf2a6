//! Per-family detection rules
//!
//! Each family is a pure function `(&PageRecord) -> Vec<Emission>`; the
//! detector sequences them. Rules never decide severity or category; that
//! lives in the catalogue entry resolved from the emitted code.

pub mod content;
pub mod crawlability;
pub mod mobile;
pub mod performance;
pub mod structured;
pub mod technical;

use crate::types::PageRecord;

use super::Emission;

/// A detection rule for one issue family.
pub type Rule = fn(&PageRecord) -> Vec<Emission>;

/// The rule registry, run in order for every page.
pub const RULES: &[Rule] = &[
    crawlability::detect,
    content::detect,
    performance::detect,
    mobile::detect,
    technical::detect,
    structured::detect,
];

/// Whether content-level rules apply: a successfully fetched HTML page.
/// Error records and non-HTML responses only see the crawlability family.
pub(crate) fn is_content_page(page: &PageRecord) -> bool {
    !page.is_fetch_error()
        && (200..300).contains(&page.status_code)
        && page
            .content_type
            .as_deref()
            .map(|c| c.contains("html"))
            .unwrap_or(false)
}
