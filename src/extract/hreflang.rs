//! Hreflang alternate-link validation

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::crawl::url::normalize;
use crate::types::{HreflangAnalysis, HreflangTag};

static HREFLANG_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("link[rel='alternate'][hreflang]").expect("static selector must parse")
});

/// ISO 639-1 language codes accepted in hreflang values.
const VALID_LANG_CODES: &[&str] = &[
    "aa", "ab", "af", "am", "ar", "az", "be", "bg", "bn", "bs", "ca", "cs", "cy", "da", "de",
    "el", "en", "eo", "es", "et", "eu", "fa", "fi", "fr", "ga", "gl", "gu", "he", "hi", "hr",
    "hu", "hy", "id", "is", "it", "ja", "ka", "kk", "km", "kn", "ko", "ku", "ky", "lb", "lo",
    "lt", "lv", "mk", "ml", "mn", "mr", "ms", "mt", "my", "ne", "nl", "no", "pa", "pl", "ps",
    "pt", "ro", "ru", "sd", "si", "sk", "sl", "so", "sq", "sr", "sv", "sw", "ta", "te", "th",
    "tl", "tr", "uk", "ur", "uz", "vi", "zh", "zu",
];

/// ISO 3166-1 alpha-2 region codes accepted in hreflang values.
const VALID_REGION_CODES: &[&str] = &[
    "AE", "AR", "AT", "AU", "BD", "BE", "BG", "BR", "CA", "CH", "CL", "CN", "CO", "CZ", "DE",
    "DK", "EE", "EG", "ES", "FI", "FR", "GB", "GR", "HK", "HR", "HU", "ID", "IE", "IL", "IN",
    "IS", "IT", "JP", "KE", "KR", "KW", "LT", "LU", "LV", "MA", "MX", "MY", "NG", "NL", "NO",
    "NZ", "PE", "PH", "PK", "PL", "PT", "QA", "RO", "RS", "RU", "SA", "SE", "SG", "SI", "SK",
    "TH", "TR", "TW", "UA", "US", "VN", "ZA",
];

/// Collect and validate every hreflang alternate link. `x-default` entries
/// are recorded but skipped by code validation. The self-reference flag is
/// set when one entry's normalized URL equals the current page's.
pub fn extract_hreflang(document: &Html, current: &Url) -> HreflangAnalysis {
    let mut analysis = HreflangAnalysis::default();
    let mut seen_langs: HashSet<String> = HashSet::new();
    let current_normalized = normalize(current.as_str());

    for link in document.select(&HREFLANG_LINKS) {
        let Some(lang) = link.value().attr("hreflang").map(|l| l.trim().to_string()) else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty())
        else {
            continue;
        };

        let absolute = current
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string());

        if !seen_langs.insert(lang.to_ascii_lowercase()) {
            analysis.duplicate_langs.push(lang.clone());
        }

        if let Some(entry_normalized) = normalize(&absolute) {
            if Some(&entry_normalized) == current_normalized.as_ref() {
                analysis.has_self_reference = true;
            }
        }

        if !lang.eq_ignore_ascii_case("x-default") {
            let mut parts = lang.splitn(2, '-');
            let language = parts.next().unwrap_or("").to_ascii_lowercase();
            if !VALID_LANG_CODES.contains(&language.as_str()) {
                analysis.invalid_lang_codes.push(lang.clone());
            }
            if let Some(region) = parts.next() {
                let region = region.to_ascii_uppercase();
                if !VALID_REGION_CODES.contains(&region.as_str()) {
                    analysis.invalid_region_codes.push(lang.clone());
                }
            }
        }

        analysis.tags.push(HreflangTag {
            lang,
            href: absolute,
        });
    }

    analysis
}
