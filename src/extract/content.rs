//! Body text metrics: word count, keyword density, reading level

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node, Selector};

use crate::types::{KeywordDensity, ReadingBucket, ReadingLevel};

/// Tags whose text never counts as page content.
const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside",
];

/// Minimum tokens before keyword density is computed.
const DENSITY_MIN_TOKENS: usize = 50;

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static selector must parse"));
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-z]{3,}\b").unwrap());

static STOP_WORDS: LazyLock<std::collections::HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one",
        "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old",
        "see", "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too",
        "use", "that", "with", "have", "this", "will", "your", "from", "they", "been",
        "were", "what", "when", "more", "some", "there", "which", "their", "about", "would",
        "these", "other", "into", "could", "than", "them", "then", "also", "only", "over",
        "such", "very", "just", "because", "while", "where", "after", "before", "between",
        "under", "here", "each", "most", "being", "does", "doing", "should", "might",
    ]
    .into_iter()
    .collect()
});

/// Plain body text: everything under `<body>` except non-content tags, with
/// whitespace collapsed to single spaces.
pub fn plain_body_text(document: &Html) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };

    let mut raw = String::new();
    collect_text(*body, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) => {
                if NON_CONTENT_TAGS.contains(&el.name()) {
                    continue;
                }
                collect_text(child, out);
            }
            _ => {}
        }
    }
}

/// Whitespace-split word count.
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// `round(100 × |text| / |html|)`.
pub fn text_html_ratio(text: &str, html: &str) -> u32 {
    if html.is_empty() {
        return 0;
    }
    ((100.0 * text.len() as f64 / html.len() as f64).round() as i64).clamp(0, 100) as u32
}

/// Top-10 non-stop-word tokens appearing at least 3 times, sorted by density
/// descending. Density is per-mille, rounded to one decimal. Returns nothing
/// for pages under the token threshold.
pub fn keyword_density(text: &str) -> Vec<KeywordDensity> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = WORD
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .collect();

    if tokens.len() < DENSITY_MIN_TOKENS {
        return Vec::new();
    }

    let total = tokens.len() as f64;
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for &token in &tokens {
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<KeywordDensity> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 3)
        .map(|(word, count)| KeywordDensity {
            word: word.to_string(),
            count,
            density: (count as f64 / total * 1000.0).round() / 10.0,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.density
            .partial_cmp(&a.density)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.word.cmp(&b.word))
    });
    ranked.truncate(10);
    ranked
}

/// Flesch-Kincaid grade with bucket classification. Sentences are `[.!?]+`
/// runs; syllables are vowel groups with a final silent-`e` adjustment.
pub fn reading_level(text: &str) -> Option<ReadingLevel> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let sentences = text
        .split(|c| matches!(c, '.' | '!' | '?'))
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);

    let syllables: usize = words.iter().map(|w| syllable_estimate(w)).sum();

    let word_count = words.len() as f64;
    let grade = 0.39 * (word_count / sentences as f64)
        + 11.8 * (syllables as f64 / word_count)
        - 15.59;
    let grade = grade.round() as i32;

    let bucket = match grade {
        g if g <= 6 => ReadingBucket::Basic,
        g if g <= 10 => ReadingBucket::Intermediate,
        g if g <= 14 => ReadingBucket::Advanced,
        _ => ReadingBucket::Complex,
    };

    Some(ReadingLevel { grade, bucket })
}

/// Count vowel groups; subtract one for a final silent `e` when the raw
/// estimate exceeds one. Minimum one syllable per word.
fn syllable_estimate(word: &str) -> usize {
    let lowered = word.to_lowercase();
    let mut groups = 0;
    let mut in_group = false;
    for c in lowered.chars() {
        if matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y') {
            if !in_group {
                groups += 1;
                in_group = true;
            }
        } else {
            in_group = false;
        }
    }
    if lowered.ends_with('e') && groups > 1 {
        groups -= 1;
    }
    groups.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_text_skips_non_content_tags() {
        let html = r#"<html><body>
            <nav>Menu items</nav>
            <header>Site header</header>
            <p>Actual   content
               here.</p>
            <script>var x = 1;</script>
            <footer>Copyright</footer>
        </body></html>"#;
        let text = plain_body_text(&Html::parse_document(html));
        assert_eq!(text, "Actual content here.");
    }

    #[test]
    fn ratio_is_rounded_percentage() {
        assert_eq!(text_html_ratio("aaaa", "aaaaaaaa"), 50);
        assert_eq!(text_html_ratio("", "<html></html>"), 0);
        assert_eq!(text_html_ratio("abc", ""), 0);
    }

    #[test]
    fn density_requires_token_threshold() {
        assert!(keyword_density("widget widget widget").is_empty());
    }

    #[test]
    fn density_ranks_repeated_words() {
        let mut text = String::new();
        for _ in 0..10 {
            text.push_str("widget assembly process ");
        }
        for _ in 0..25 {
            text.push_str("manual quality inspection ");
        }
        let ranked = keyword_density(&text);
        assert!(!ranked.is_empty());
        assert!(ranked.len() <= 10);
        // 105 tokens total; the 25-count words dominate
        assert_eq!(ranked[0].count, 25);
        assert!(ranked[0].density > ranked.last().unwrap().density);
        // All stop words are excluded
        assert!(ranked.iter().all(|k| !STOP_WORDS.contains(k.word.as_str())));
    }

    #[test]
    fn syllable_estimates() {
        assert_eq!(syllable_estimate("cat"), 1);
        assert_eq!(syllable_estimate("widget"), 2);
        assert_eq!(syllable_estimate("table"), 1); // silent e
        assert_eq!(syllable_estimate("e"), 1); // minimum one
        assert_eq!(syllable_estimate("beautiful"), 3);
    }

    #[test]
    fn reading_level_buckets() {
        let simple = "The cat sat. The dog ran. We play all day. It is fun.";
        let level = reading_level(simple).unwrap();
        assert!(level.grade <= 6, "grade was {}", level.grade);
        assert_eq!(level.bucket, ReadingBucket::Basic);

        assert!(reading_level("").is_none());
    }

    #[test]
    fn complex_prose_scores_higher() {
        let dense = "Organizational interdependencies necessitate comprehensive \
                     infrastructural reconfiguration alongside multidimensional \
                     stakeholder prioritization methodologies throughout implementation";
        let level = reading_level(dense).unwrap();
        assert!(level.grade > 14, "grade was {}", level.grade);
        assert_eq!(level.bucket, ReadingBucket::Complex);
    }
}
