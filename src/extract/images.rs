//! Image inventory and alt-text statistics

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::types::ImageStats;

static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("static selector must parse"));

/// Count `<img>` elements, distinguishing a missing `alt` attribute from an
/// empty one. Images without a `src` are ignored.
pub fn extract_images(document: &Html) -> ImageStats {
    let mut stats = ImageStats::default();

    for img in document.select(&IMAGES) {
        if img.value().attr("src").map(str::trim).unwrap_or("").is_empty() {
            continue;
        }
        stats.total += 1;
        match img.value().attr("alt") {
            None => stats.without_alt += 1,
            Some(alt) if alt.trim().is_empty() => stats.with_empty_alt += 1,
            Some(_) => {}
        }
    }

    stats
}
