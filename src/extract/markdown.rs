//! Markdown body view
//!
//! Walks the body tree in document order emitting Markdown, after dropping
//! non-content tags and cookie/consent containers. Lines matching the
//! boilerplate set (privacy-banner phrases, cookie category headings, vendor
//! strings) are skipped, and a leading privacy block that slipped through is
//! stripped at the end.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node, Selector};

/// Tags excluded from the content walk.
const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside",
];

/// id/class substrings marking cookie and consent machinery.
const CONSENT_CONTAINER_HINTS: &[&str] = &[
    "cookie",
    "consent",
    "gdpr",
    "privacy-banner",
    "privacy-notice",
    "cc-window",
    "cc-banner",
    "onetrust",
    "cookiebot",
    "usercentrics",
    "didomi",
    "truste",
    "osano",
    "cmp-container",
    "qc-cmp",
];

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static selector must parse"));

static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^we value your privacy",
        r"(?i)this (web)?site uses cookies",
        r"(?i)^accept( all)?( cookies)?$",
        r"(?i)^reject( all)?( cookies)?$",
        r"(?i)^manage (cookie )?(preferences|settings)$",
        r"(?i)^(strictly )?necessary cookies",
        r"(?i)^functional cookies",
        r"(?i)^performance cookies",
        r"(?i)^(targeting|advertising|marketing) cookies",
        r"(?i)^cookie (policy|settings|preferences)$",
        r"(?i)powered by (onetrust|cookiebot|usercentrics)",
        r"(?i)^your privacy choices$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static boilerplate regex must parse"))
    .collect()
});

static LEADING_PRIVACY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#*\s*we value your privacy").unwrap());

/// Render the page body as Markdown.
pub fn markdown_body(document: &Html) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };

    let mut lines: Vec<String> = Vec::new();
    walk(*body, &mut lines);

    let mut out: Vec<String> = Vec::new();
    let mut previous_blank = true;
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(line);
        previous_blank = blank;
    }

    // Strip a leading privacy block that survived container removal.
    while out
        .first()
        .map(|l| LEADING_PRIVACY.is_match(l))
        .unwrap_or(false)
    {
        out.remove(0);
        while out.first().map(|l| !l.trim().is_empty()).unwrap_or(false) {
            out.remove(0);
        }
        while out.first().map(|l| l.trim().is_empty()).unwrap_or(false) {
            out.remove(0);
        }
    }

    while out.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.pop();
    }

    out.join("\n")
}

fn is_consent_container(el: &scraper::node::Element) -> bool {
    let id = el.attr("id").unwrap_or("").to_ascii_lowercase();
    let class = el.attr("class").unwrap_or("").to_ascii_lowercase();
    CONSENT_CONTAINER_HINTS
        .iter()
        .any(|hint| id.contains(hint) || class.contains(hint))
}

fn inline_text(node: ego_tree::NodeRef<'_, Node>) -> String {
    let mut raw = String::new();
    gather_text(node, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn gather_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) => {
                if NON_CONTENT_TAGS.contains(&el.name()) || is_consent_container(el) {
                    continue;
                }
                gather_text(child, out);
            }
            _ => {}
        }
    }
}

fn emit(lines: &mut Vec<String>, text: String) {
    if text.is_empty() {
        return;
    }
    if BOILERPLATE.iter().any(|re| re.is_match(&text)) {
        return;
    }
    lines.push(text);
    lines.push(String::new());
}

fn walk(node: ego_tree::NodeRef<'_, Node>, lines: &mut Vec<String>) {
    for child in node.children() {
        let Node::Element(el) = child.value() else {
            continue;
        };
        if NON_CONTENT_TAGS.contains(&el.name()) || is_consent_container(el) {
            continue;
        }

        match el.name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = el.name()[1..].parse::<usize>().unwrap_or(1);
                let text = inline_text(child);
                if !text.is_empty() {
                    emit(lines, format!("{} {}", "#".repeat(level), text));
                }
            }
            "p" => {
                emit(lines, inline_text(child));
            }
            "blockquote" => {
                let text = inline_text(child);
                if !text.is_empty() {
                    emit(lines, format!("> {}", text));
                }
            }
            "ol" => {
                let mut index = 0;
                for item in child.children() {
                    if let Node::Element(item_el) = item.value() {
                        if item_el.name() == "li" {
                            index += 1;
                            let text = inline_text(item);
                            if !text.is_empty()
                                && !BOILERPLATE.iter().any(|re| re.is_match(&text))
                            {
                                lines.push(format!("{}. {}", index, text));
                            }
                        }
                    }
                }
                lines.push(String::new());
            }
            "ul" => {
                for item in child.children() {
                    if let Node::Element(item_el) = item.value() {
                        if item_el.name() == "li" {
                            let text = inline_text(item);
                            if !text.is_empty()
                                && !BOILERPLATE.iter().any(|re| re.is_match(&text))
                            {
                                lines.push(format!("- {}", text));
                            }
                        }
                    }
                }
                lines.push(String::new());
            }
            "li" => {
                // A list item outside ol/ul context
                let text = inline_text(child);
                if !text.is_empty() && !BOILERPLATE.iter().any(|re| re.is_match(&text)) {
                    lines.push(format!("- {}", text));
                }
            }
            _ => walk(child, lines),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_paragraphs_and_lists() {
        let html = r#"<html><body>
            <h1>Guide</h1>
            <p>Intro paragraph.</p>
            <h2>Steps</h2>
            <ol><li>First</li><li>Second</li></ol>
            <ul><li>Point</li></ul>
            <blockquote>Quoted wisdom.</blockquote>
        </body></html>"#;
        let md = markdown_body(&Html::parse_document(html));
        let expected = "# Guide\n\nIntro paragraph.\n\n## Steps\n\n1. First\n2. Second\n\n- Point\n\n> Quoted wisdom.";
        assert_eq!(md, expected);
    }

    #[test]
    fn cookie_containers_are_removed() {
        let html = r#"<html><body>
            <div id="onetrust-banner-sdk"><p>We use cookies to improve things.</p></div>
            <div class="cookie-consent"><p>Accept all</p></div>
            <p>Real content.</p>
        </body></html>"#;
        let md = markdown_body(&Html::parse_document(html));
        assert_eq!(md, "Real content.");
    }

    #[test]
    fn boilerplate_lines_are_skipped() {
        let html = r#"<html><body>
            <p>This website uses cookies to enhance your experience.</p>
            <p>Performance Cookies</p>
            <p>Genuine paragraph.</p>
        </body></html>"#;
        let md = markdown_body(&Html::parse_document(html));
        assert_eq!(md, "Genuine paragraph.");
    }

    #[test]
    fn leading_privacy_block_is_stripped() {
        let html = r#"<html><body>
            <h2>We Value Your Privacy</h2>
            <p>Vendors may process data.</p>
            <p>Real intro.</p>
        </body></html>"#;
        let md = markdown_body(&Html::parse_document(html));
        // The heading matches the leading-privacy pattern; its block is cut.
        assert!(md.contains("Real intro."));
        assert!(!md.to_lowercase().contains("value your privacy"));
    }

    #[test]
    fn nested_markup_flattens_to_inline_text() {
        let html = r#"<body><p>Some <strong>bold</strong> and <a href="/x">linked</a> text.</p></body>"#;
        let md = markdown_body(&Html::parse_document(html));
        assert_eq!(md, "Some bold and linked text.");
    }
}
