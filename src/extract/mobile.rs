//! Mobile-friendliness analysis
//!
//! Works entirely off the parsed DOM and raw HTML. Every signal here is a
//! heuristic: the crawler never lays out the page, so flags are derived from
//! viewport directives, inline styles, class names, and markup structure.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::types::MobileAnalysis;

use super::head::HeadSignals;

fn selector(raw: &str) -> Selector {
    Selector::parse(raw).expect("static selector must parse")
}

static IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static TABLES: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static STYLED: LazyLock<Selector> = LazyLock::new(|| selector("[style]"));
static CLASSED: LazyLock<Selector> = LazyLock::new(|| selector("[class]"));
static TEL_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href^='tel:']"));
static INLINE_STYLE_BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("style"));
static STYLESHEETS: LazyLock<Selector> = LazyLock::new(|| selector("link[rel='stylesheet'][href]"));
static LCP_CANDIDATES: LazyLock<Selector> = LazyLock::new(|| {
    selector("header img, .hero img, .banner img, .jumbotron img, main img")
});

static PHONE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").unwrap());
static FONT_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)font-size\s*:\s*([\d.]+)\s*(px|pt)").unwrap());

/// Class names commonly used for viewport-pinned chrome.
const FIXED_CLASS_HINTS: &[&str] = &[
    "fixed-top",
    "fixed-bottom",
    "sticky-top",
    "navbar-fixed",
    "is-fixed",
    "header-fixed",
];

/// Wrapper class fragments that make a `<table>` scrollable on small screens.
const TABLE_WRAPPER_HINTS: &[&str] = &["overflow", "responsive", "scroll", "data-responsive"];

/// CSS framework names whose stylesheet link implies media-query support.
const FRAMEWORK_HINTS: &[&str] = &[
    "bootstrap",
    "tailwind",
    "foundation",
    "bulma",
    "materialize",
    "semantic",
];

/// Responsive utility-class tokens.
const UTILITY_TOKENS: &[&str] = &["col-sm", "md:", "d-sm-", "@screen"];

/// Pixels-per-point for the small-text threshold (1 pt = 1.333 px).
const PX_PER_PT: f64 = 1.333;
const SMALL_FONT_PX: f64 = 12.0;

/// Analyze mobile signals. `body_text` is the collapsed plain body text used
/// for phone-number detection.
pub fn analyze_mobile(
    document: &Html,
    html: &str,
    head: &HeadSignals,
    body_text: &str,
) -> MobileAnalysis {
    let viewport = head.viewport.as_deref();
    let pairs = viewport.map(parse_viewport).unwrap_or_default();

    let is_zoom_disabled = pairs.iter().any(|(k, v)| {
        (k == "user-scalable" && matches!(v.as_str(), "no" | "0"))
            || (k == "maximum-scale" && v.parse::<f64>().map(|s| s <= 1.0).unwrap_or(false))
    });

    let initial_scale_not_one = pairs
        .iter()
        .find(|(k, _)| k == "initial-scale")
        .and_then(|(_, v)| v.parse::<f64>().ok())
        .map(|s| (s - 1.0).abs() > f64::EPSILON)
        .unwrap_or(false);

    MobileAnalysis {
        has_viewport: viewport.is_some(),
        viewport_content: viewport.map(|v| v.to_string()),
        is_zoom_disabled,
        initial_scale_not_one,
        has_apple_touch_icon: head.has_apple_touch_icon,
        has_manifest: head.has_manifest,
        has_theme_color: head.theme_color.is_some(),
        non_responsive_images: count_non_responsive_images(document),
        tables_without_wrapper: count_unwrapped_tables(document),
        fixed_elements: count_fixed_elements(document),
        has_tel_links: document.select(&TEL_LINKS).next().is_some(),
        phone_numbers_in_body: PHONE_NUMBER.find_iter(body_text).count() as u32,
        lcp_candidate_lazy_loaded: lcp_candidate_is_lazy(document),
        uses_media_queries: detects_media_queries(document, html),
        small_text_elements: count_small_text(document),
    }
}

/// Viewport content split into lower-cased key/value pairs.
fn parse_viewport(content: &str) -> Vec<(String, String)> {
    content
        .split([',', ';'])
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            Some((
                key.trim().to_ascii_lowercase(),
                value.trim().to_ascii_lowercase(),
            ))
        })
        .collect()
}

/// Images larger than 50px on either side without `srcset` and not wrapped
/// in `<picture>`.
fn count_non_responsive_images(document: &Html) -> u32 {
    let mut count = 0;
    for img in document.select(&IMAGES) {
        let el = img.value();
        if el.attr("srcset").is_some() {
            continue;
        }
        let width: f64 = el.attr("width").and_then(|w| w.parse().ok()).unwrap_or(0.0);
        let height: f64 = el.attr("height").and_then(|h| h.parse().ok()).unwrap_or(0.0);
        if width <= 50.0 && height <= 50.0 {
            continue;
        }
        let in_picture = img
            .ancestors()
            .filter_map(scraper::ElementRef::wrap)
            .any(|a| a.value().name() == "picture");
        if !in_picture {
            count += 1;
        }
    }
    count
}

/// Tables with no ancestor carrying a scroll/responsive wrapper class.
fn count_unwrapped_tables(document: &Html) -> u32 {
    let mut count = 0;
    for table in document.select(&TABLES) {
        let wrapped = table
            .ancestors()
            .filter_map(scraper::ElementRef::wrap)
            .any(|ancestor| {
                let el = ancestor.value();
                let class = el.attr("class").unwrap_or("").to_ascii_lowercase();
                TABLE_WRAPPER_HINTS.iter().any(|hint| class.contains(hint))
                    || el.attr("data-responsive").is_some()
            });
        if !wrapped {
            count += 1;
        }
    }
    count
}

/// Elements pinned via inline `position: fixed/sticky` or well-known classes.
fn count_fixed_elements(document: &Html) -> u32 {
    let mut count = 0;
    for element in document.select(&STYLED) {
        let style = element.value().attr("style").unwrap_or("").to_ascii_lowercase();
        let style: String = style.split_whitespace().collect();
        if style.contains("position:fixed") || style.contains("position:sticky") {
            count += 1;
        }
    }
    for element in document.select(&CLASSED) {
        let class = element.value().attr("class").unwrap_or("").to_ascii_lowercase();
        if FIXED_CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
            count += 1;
        }
    }
    count
}

/// Whether the first hero/header image is lazy-loaded (a likely LCP
/// candidate rendered late).
fn lcp_candidate_is_lazy(document: &Html) -> bool {
    document
        .select(&LCP_CANDIDATES)
        .next()
        .map(|img| {
            img.value()
                .attr("loading")
                .map(|l| l.eq_ignore_ascii_case("lazy"))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

/// Media-query use: inline `@media`, a known framework stylesheet, or
/// responsive utility-class tokens anywhere in the markup.
fn detects_media_queries(document: &Html, html: &str) -> bool {
    for style in document.select(&INLINE_STYLE_BLOCKS) {
        if style.text().collect::<String>().contains("@media") {
            return true;
        }
    }
    for sheet in document.select(&STYLESHEETS) {
        let href = sheet.value().attr("href").unwrap_or("").to_ascii_lowercase();
        if FRAMEWORK_HINTS.iter().any(|hint| href.contains(hint)) {
            return true;
        }
    }
    UTILITY_TOKENS.iter().any(|token| html.contains(token))
}

/// Inline font sizes below the 12px readability floor.
fn count_small_text(document: &Html) -> u32 {
    let mut count = 0;
    for element in document.select(&STYLED) {
        let style = element.value().attr("style").unwrap_or("");
        if let Some(caps) = FONT_SIZE.captures(style) {
            let size: f64 = caps[1].parse().unwrap_or(f64::MAX);
            let px = match &caps[2].to_ascii_lowercase()[..] {
                "pt" => size * PX_PER_PT,
                _ => size,
            };
            if px < SMALL_FONT_PX {
                count += 1;
            }
        }
    }
    count
}
