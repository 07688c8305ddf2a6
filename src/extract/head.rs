//! Head signals: title, meta tags, canonical, social cards, indexability

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::crawl::url::normalize;

fn selector(raw: &str) -> Selector {
    Selector::parse(raw).expect("static selector must parse")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("head > title, title"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector("meta[name='description']"));
static META_ROBOTS: LazyLock<Selector> = LazyLock::new(|| selector("meta[name='robots']"));
static META_GOOGLEBOT: LazyLock<Selector> = LazyLock::new(|| selector("meta[name='googlebot']"));
static CANONICAL: LazyLock<Selector> = LazyLock::new(|| selector("link[rel='canonical']"));
static HTML_TAG: LazyLock<Selector> = LazyLock::new(|| selector("html"));
static VIEWPORT: LazyLock<Selector> = LazyLock::new(|| selector("meta[name='viewport']"));
static THEME_COLOR: LazyLock<Selector> = LazyLock::new(|| selector("meta[name='theme-color']"));
static APPLE_TOUCH_ICON: LazyLock<Selector> =
    LazyLock::new(|| selector("link[rel='apple-touch-icon']"));
static MANIFEST: LazyLock<Selector> = LazyLock::new(|| selector("link[rel='manifest']"));
static REL_PREV: LazyLock<Selector> = LazyLock::new(|| selector("link[rel='prev']"));
static REL_NEXT: LazyLock<Selector> = LazyLock::new(|| selector("link[rel='next']"));
static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("meta[property='og:title']"));
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector("meta[property='og:description']"));
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("meta[property='og:image']"));
static TWITTER_CARD: LazyLock<Selector> = LazyLock::new(|| selector("meta[name='twitter:card']"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static H2: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3, h4, h5, h6"));

/// Signals lifted from `<head>` (plus the heading inventory).
#[derive(Debug, Clone, Default)]
pub struct HeadSignals {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub robots_meta: Option<String>,
    pub canonical_url: Option<String>,
    pub html_lang: Option<String>,
    pub viewport: Option<String>,
    pub theme_color: Option<String>,
    pub has_apple_touch_icon: bool,
    pub has_manifest: bool,
    pub rel_prev: Option<String>,
    pub rel_next: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub twitter_card: Option<String>,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    pub heading_sequence: Vec<String>,
}

fn meta_content(document: &Html, sel: &Selector) -> Option<String> {
    document
        .select(sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn link_href(document: &Html, sel: &Selector) -> Option<String> {
    document
        .select(sel)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

pub fn extract_head(document: &Html) -> HeadSignals {
    let title = document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    // robots falls back to googlebot when absent
    let robots_meta =
        meta_content(document, &META_ROBOTS).or_else(|| meta_content(document, &META_GOOGLEBOT));

    let html_lang = document
        .select(&HTML_TAG)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    let h1_tags: Vec<String> = document
        .select(&H1)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let h2_tags: Vec<String> = document
        .select(&H2)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let heading_sequence: Vec<String> = document
        .select(&HEADINGS)
        .map(|el| el.value().name().to_string())
        .collect();

    HeadSignals {
        title,
        meta_description: meta_content(document, &META_DESCRIPTION),
        robots_meta,
        canonical_url: link_href(document, &CANONICAL),
        html_lang,
        viewport: meta_content(document, &VIEWPORT),
        theme_color: meta_content(document, &THEME_COLOR),
        has_apple_touch_icon: document.select(&APPLE_TOUCH_ICON).next().is_some(),
        has_manifest: document.select(&MANIFEST).next().is_some(),
        rel_prev: link_href(document, &REL_PREV),
        rel_next: link_href(document, &REL_NEXT),
        og_title: meta_content(document, &OG_TITLE),
        og_description: meta_content(document, &OG_DESCRIPTION),
        og_image: meta_content(document, &OG_IMAGE),
        twitter_card: meta_content(document, &TWITTER_CARD),
        h1_tags,
        h2_tags,
        heading_sequence,
    }
}

/// HTTP status and robots directives decide indexability before content
/// signals are even consulted.
pub fn indexability(status: u16, robots_meta: Option<&str>) -> (bool, Option<String>) {
    if status >= 400 {
        return (false, Some(format!("HTTP {} error", status)));
    }
    if (300..400).contains(&status) {
        return (false, Some("Redirect".to_string()));
    }
    if let Some(robots) = robots_meta {
        if robots.to_ascii_lowercase().contains("noindex") {
            return (false, Some("noindex directive".to_string()));
        }
    }
    (true, None)
}

/// Compare the absolute canonical against the current URL, ignoring
/// fragments and trailing slashes.
pub fn is_self_canonical(canonical: &str, current: &Url) -> Option<bool> {
    let absolute = current.join(canonical).ok()?;
    let canonical_norm = normalize(absolute.as_str())?;
    let current_norm = normalize(current.as_str())?;
    Some(canonical_norm == current_norm)
}
