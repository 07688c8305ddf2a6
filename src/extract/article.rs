//! Article schema extraction and validation

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;

use crate::types::ArticleData;

use super::schema::{as_string, first_image, node_has_type, person_name_url, StructuredData};

/// Schema types treated as articles.
const ARTICLE_TYPES: &[&str] = &[
    "Article",
    "NewsArticle",
    "BlogPosting",
    "TechArticle",
    "ScholarlyArticle",
];

const HEADLINE_MIN: usize = 30;
const HEADLINE_MAX: usize = 110;

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2})?(\.\d+)?(Z|[+-]\d{2}:\d{2})?)?$").unwrap()
});

/// Extract the first article node and validate it. Issue slugs match the
/// catalogue's article family codes.
pub fn extract_article(data: &StructuredData) -> (Option<ArticleData>, Vec<String>) {
    let articles: Vec<&Value> = data
        .nodes
        .iter()
        .filter(|node| ARTICLE_TYPES.iter().any(|t| node_has_type(node, t)))
        .collect();

    let Some(node) = articles.first() else {
        return (None, Vec::new());
    };

    let mut issues: Vec<String> = Vec::new();
    if articles.len() > 1 {
        issues.push("article_multiple".to_string());
    }

    let headline = as_string(node.get("headline")).or_else(|| as_string(node.get("name")));
    let description =
        as_string(node.get("description")).or_else(|| as_string(node.get("abstract")));
    let (author, author_url) = person_name_url(node.get("author"));
    let (publisher, _) = person_name_url(node.get("publisher"));
    let date_published = as_string(node.get("datePublished"));
    let date_modified = as_string(node.get("dateModified"));
    let word_count = node.get("wordCount").and_then(|v| v.as_u64());
    let has_body = as_string(node.get("articleBody")).is_some();

    let article = ArticleData {
        headline: headline.clone(),
        description: description.clone(),
        date_published: date_published.clone(),
        date_modified: date_modified.clone(),
        image: first_image(node.get("image")),
        author: author.clone(),
        author_url,
        publisher,
        word_count,
        in_language: as_string(node.get("inLanguage")),
        main_entity_of_page: node
            .get("mainEntityOfPage")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => as_string(map.get("@id")),
                _ => None,
            }),
        has_body,
    };

    match &headline {
        None => issues.push("article_missing_headline".to_string()),
        Some(h) if h.chars().count() < HEADLINE_MIN => {
            issues.push("article_headline_too_short".to_string())
        }
        Some(h) if h.chars().count() > HEADLINE_MAX => {
            issues.push("article_headline_too_long".to_string())
        }
        Some(_) => {}
    }

    if description.is_none() {
        issues.push("article_missing_description".to_string());
    }
    if author.is_none() {
        issues.push("article_missing_author".to_string());
    }
    if article.image.is_none() {
        issues.push("article_missing_image".to_string());
    }

    match &date_published {
        None => issues.push("article_missing_date".to_string()),
        Some(raw) => match parse_iso_date(raw) {
            None => issues.push("article_invalid_date".to_string()),
            Some(published) => {
                let now = Utc::now();
                if published > now {
                    issues.push("article_future_date".to_string());
                } else if now - published > Duration::days(365 * 2) && date_modified.is_none() {
                    issues.push("article_outdated".to_string());
                }
            }
        },
    }

    if has_body && word_count.is_none() {
        issues.push("article_missing_word_count".to_string());
    }

    (Some(article), issues)
}

/// A date is valid only when it matches the ISO-8601 shape AND parses to a
/// real calendar date.
pub fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    if !ISO_DATE.is_match(raw) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Date-only, or datetime without zone
    let date_part = &raw[..10.min(raw.len())];
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::schema::extract_structured_data;
    use scraper::Html;

    fn data_from(jsonld: &str) -> StructuredData {
        let html = format!(
            r#"<html><head><script type="application/ld+json">{}</script></head></html>"#,
            jsonld
        );
        extract_structured_data(&Html::parse_document(&html))
    }

    #[test]
    fn complete_article_has_no_issues() {
        let recent = (Utc::now() - Duration::days(30)).format("%Y-%m-%d").to_string();
        let json = format!(
            r#"{{"@type": "BlogPosting",
                "headline": "A headline comfortably between the two bounds",
                "description": "What the post covers",
                "author": {{"name": "Jane", "url": "https://ex.test/jane"}},
                "publisher": {{"name": "ExCo"}},
                "image": ["https://ex.test/hero.jpg"],
                "datePublished": "{}",
                "articleBody": "Body text",
                "wordCount": 420}}"#,
            recent
        );
        let (article, issues) = extract_article(&data_from(&json));
        let article = article.unwrap();
        assert_eq!(article.author.as_deref(), Some("Jane"));
        assert_eq!(article.publisher.as_deref(), Some("ExCo"));
        assert_eq!(article.word_count, Some(420));
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
    }

    #[test]
    fn short_headline_and_missing_fields() {
        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "Article", "headline": "Too short", "datePublished": "2024-01-15"}"#,
        ));
        assert!(issues.contains(&"article_headline_too_short".to_string()));
        assert!(issues.contains(&"article_missing_author".to_string()));
        assert!(issues.contains(&"article_missing_image".to_string()));
        assert!(issues.contains(&"article_missing_description".to_string()));
    }

    #[test]
    fn invalid_and_future_dates() {
        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "Article", "datePublished": "January 5, 2024"}"#,
        ));
        assert!(issues.contains(&"article_invalid_date".to_string()));

        // Shape matches but the date is not real
        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "Article", "datePublished": "2024-13-45"}"#,
        ));
        assert!(issues.contains(&"article_invalid_date".to_string()));

        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "Article", "datePublished": "2999-01-01"}"#,
        ));
        assert!(issues.contains(&"article_future_date".to_string()));
    }

    #[test]
    fn old_article_without_modified_is_outdated() {
        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "NewsArticle", "datePublished": "2019-06-01"}"#,
        ));
        assert!(issues.contains(&"article_outdated".to_string()));

        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "NewsArticle", "datePublished": "2019-06-01",
                "dateModified": "2024-06-01"}"#,
        ));
        assert!(!issues.contains(&"article_outdated".to_string()));
    }

    #[test]
    fn body_without_word_count() {
        let (_, issues) = extract_article(&data_from(
            r#"{"@type": "Article", "articleBody": "text", "datePublished": "2024-01-01"}"#,
        ));
        assert!(issues.contains(&"article_missing_word_count".to_string()));
    }

    #[test]
    fn multiple_articles_flagged() {
        let (_, issues) = extract_article(&data_from(
            r#"[{"@type": "Article", "headline": "First article on this very page here"},
                {"@type": "BlogPosting", "headline": "Second article on this very page"}]"#,
        ));
        assert!(issues.contains(&"article_multiple".to_string()));
    }

    #[test]
    fn iso_date_parser() {
        assert!(parse_iso_date("2024-01-15").is_some());
        assert!(parse_iso_date("2024-01-15T10:30:00Z").is_some());
        assert!(parse_iso_date("2024-01-15T10:30:00+02:00").is_some());
        assert!(parse_iso_date("2024-02-30").is_none()); // not a real date
        assert!(parse_iso_date("15/01/2024").is_none());
    }

    #[test]
    fn no_article_schema_means_no_issues() {
        let (article, issues) =
            extract_article(&data_from(r#"{"@type": "WebSite", "name": "Ex"}"#));
        assert!(article.is_none());
        assert!(issues.is_empty());
    }
}
