//! Content, image, and social-card rules

use serde_json::json;

use crate::issues::Emission;
use crate::types::{PageRecord, ReadingBucket};

use super::is_content_page;

const TITLE_MIN: usize = 30;
const TITLE_MAX: usize = 60;
const DESC_MIN: usize = 70;
const DESC_MAX: usize = 160;
const VERY_THIN_WORDS: u32 = 100;
const LOW_WORDS: u32 = 300;
/// Per-mille density above which a keyword counts as stuffed (3%).
const STUFFING_DENSITY: f64 = 30.0;
const MIN_WORDS_FOR_RATIO: u32 = 50;
const LOW_RATIO_PERCENT: u32 = 10;
const COMPLEX_GRADE: i32 = 16;

pub fn detect(page: &PageRecord) -> Vec<Emission> {
    if !is_content_page(page) {
        return Vec::new();
    }

    let mut out = Vec::new();

    match &page.title {
        None => out.push(Emission::new("CONTENT_NO_TITLE", json!({}))),
        Some(_) => {
            let len = page.title_length();
            if len < TITLE_MIN {
                out.push(Emission::new("CONTENT_TITLE_TOO_SHORT", json!({ "length": len })));
            } else if len > TITLE_MAX {
                out.push(Emission::new("CONTENT_TITLE_TOO_LONG", json!({ "length": len })));
            }
        }
    }

    match &page.meta_description {
        None => out.push(Emission::new("CONTENT_NO_META_DESCRIPTION", json!({}))),
        Some(_) => {
            let len = page.meta_description_length();
            if len < DESC_MIN {
                out.push(Emission::new("CONTENT_META_DESC_TOO_SHORT", json!({ "length": len })));
            } else if len > DESC_MAX {
                out.push(Emission::new("CONTENT_META_DESC_TOO_LONG", json!({ "length": len })));
            }
        }
    }

    match page.h1_count() {
        0 => out.push(Emission::new("CONTENT_NO_H1", json!({}))),
        1 => {}
        n => out.push(Emission::new("CONTENT_MULTIPLE_H1", json!({ "count": n }))),
    }

    if page.word_count == 0 {
        out.push(Emission::new("CONTENT_NO_BODY_TEXT", json!({})));
    } else if page.word_count < VERY_THIN_WORDS {
        out.push(Emission::new(
            "CONTENT_VERY_THIN",
            json!({ "word_count": page.word_count }),
        ));
    } else if page.word_count < LOW_WORDS {
        out.push(Emission::new(
            "CONTENT_LOW_WORD_COUNT",
            json!({ "word_count": page.word_count }),
        ));
    }

    if let Some(stuffed) = page
        .keyword_density
        .iter()
        .find(|k| k.density > STUFFING_DENSITY)
    {
        out.push(Emission::new(
            "CONTENT_KEYWORD_STUFFING",
            json!({ "word": stuffed.word, "density": stuffed.density }),
        ));
    }

    if page.word_count >= MIN_WORDS_FOR_RATIO && page.text_html_ratio < LOW_RATIO_PERCENT {
        out.push(Emission::new(
            "CONTENT_LOW_TEXT_HTML_RATIO",
            json!({ "ratio": page.text_html_ratio }),
        ));
    }

    if let Some(level) = &page.reading_level {
        if level.grade > COMPLEX_GRADE && level.bucket == ReadingBucket::Complex {
            out.push(Emission::new(
                "CONTENT_READING_COMPLEX",
                json!({ "grade": level.grade }),
            ));
        }
    }

    if let Some((from, to)) = heading_skip(&page.heading_sequence) {
        out.push(Emission::new(
            "CONTENT_HEADING_SKIP",
            json!({ "from": from, "to": to }),
        ));
    }

    if title_absent_from_body(page) {
        out.push(Emission::new("CONTENT_TITLE_NOT_IN_BODY", json!({})));
    }

    if page.images.without_alt > 0 {
        out.push(Emission::new(
            "IMAGES_MISSING_ALT",
            json!({ "count": page.images.without_alt, "total": page.images.total }),
        ));
    }
    if page.images.with_empty_alt > 0 {
        out.push(Emission::new(
            "IMAGES_EMPTY_ALT",
            json!({ "count": page.images.with_empty_alt }),
        ));
    }

    if page.og_title.is_none() {
        out.push(Emission::new("SOCIAL_NO_OG", json!({})));
    }
    if page.twitter_card.is_none() {
        out.push(Emission::new("SOCIAL_NO_TWITTER_CARD", json!({})));
    }

    out
}

/// First place the heading sequence jumps down by more than one level.
fn heading_skip(sequence: &[String]) -> Option<(String, String)> {
    let mut previous: Option<u8> = None;
    for tag in sequence {
        let level = tag.as_bytes().get(1).map(|b| b.saturating_sub(b'0'))?;
        if let Some(prev) = previous {
            if level > prev + 1 {
                return Some((format!("h{}", prev), tag.clone()));
            }
        }
        previous = Some(level);
    }
    None
}

/// True when every ≥4-letter title word is absent from the body text.
fn title_absent_from_body(page: &PageRecord) -> bool {
    let Some(title) = page.title.as_deref() else {
        return false;
    };
    let body = page.body_text.to_lowercase();
    let words: Vec<String> = title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(|w| w.to_string())
        .collect();
    if words.is_empty() || body.is_empty() {
        return false;
    }
    words.iter().all(|w| !body.contains(w.as_str()))
}
