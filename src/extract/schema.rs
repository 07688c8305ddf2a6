//! Structured data extraction: JSON-LD and microdata
//!
//! JSON-LD values arrive as objects, arrays, or `@graph` envelopes; the
//! coercion helpers here flatten those shapes so the article and product
//! extractors never deal with raw `serde_json::Value` variance themselves.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

static JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script[type='application/ld+json']").expect("static selector must parse")
});
static ITEMTYPE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[itemtype]").expect("static selector must parse"));

/// All structured data found on a page. `nodes` holds every typed JSON-LD
/// object (with `@graph` flattened) for downstream extractors.
#[derive(Debug, Clone, Default)]
pub struct StructuredData {
    pub types: Vec<String>,
    pub nodes: Vec<Value>,
    pub diagnostics: Vec<String>,
}

/// Parse every JSON-LD script and microdata `itemtype`. Malformed JSON
/// yields a diagnostic, never an abort.
pub fn extract_structured_data(document: &Html) -> StructuredData {
    let mut data = StructuredData::default();

    for (index, script) in document.select(&JSON_LD).enumerate() {
        let raw = script.text().collect::<String>();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => collect_nodes(&value, &mut data),
            Err(e) => data
                .diagnostics
                .push(format!("JSON-LD block {} failed to parse: {}", index + 1, e)),
        }
    }

    for element in document.select(&ITEMTYPE) {
        if let Some(itemtype) = element.value().attr("itemtype") {
            // Tail of the URL path, e.g. https://schema.org/Product -> Product
            let tail = itemtype.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            if !tail.is_empty() {
                data.types.push(tail.to_string());
            }
        }
    }

    data
}

fn collect_nodes(value: &Value, data: &mut StructuredData) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_nodes(item, data);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_nodes(graph, data);
            }
            if map.contains_key("@type") {
                for t in type_names(&map["@type"]) {
                    data.types.push(t);
                }
                data.nodes.push(value.clone());
            }
        }
        _ => {}
    }
}

/// `@type` may be a string or an array of strings.
pub fn type_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether a node's `@type` names (string or array) include `wanted`.
pub fn node_has_type(node: &Value, wanted: &str) -> bool {
    node.get("@type")
        .map(|t| type_names(t).iter().any(|n| n == wanted))
        .unwrap_or(false)
}

/// Coerce a string-ish value (string, or number rendered as text).
pub fn as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a numeric value (number, or a parseable string).
pub fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First image from a string, an array, or an `ImageObject` with `url`.
pub fn first_image(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => (!s.is_empty()).then(|| s.clone()),
        Value::Array(items) => first_image(items.first()),
        Value::Object(map) => as_string(map.get("url")),
        _ => None,
    }
}

/// Person-like field: a plain string, the first entry of an array, or an
/// object with `name` (and optionally `url`).
pub fn person_name_url(value: Option<&Value>) -> (Option<String>, Option<String>) {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => (Some(s.trim().to_string()), None),
        Some(Value::Array(items)) => person_name_url(items.first()),
        Some(Value::Object(map)) => (as_string(map.get("name")), as_string(map.get("url"))),
        _ => (None, None),
    }
}

/// Availability short form: `https://schema.org/InStock` -> `InStock`.
pub fn normalize_availability(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(raw)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(jsonld: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><head><script type="application/ld+json">{}</script></head></html>"#,
            jsonld
        ))
    }

    #[test]
    fn plain_object_with_type() {
        let data = extract_structured_data(&doc(r#"{"@type": "Article", "headline": "Hi"}"#));
        assert_eq!(data.types, vec!["Article"]);
        assert_eq!(data.nodes.len(), 1);
        assert!(data.diagnostics.is_empty());
    }

    #[test]
    fn graph_envelope_is_flattened() {
        let data = extract_structured_data(&doc(
            r#"{"@context": "https://schema.org", "@graph": [
                {"@type": "WebSite", "name": "Ex"},
                {"@type": "Organization", "name": "ExCo"}
            ]}"#,
        ));
        assert_eq!(data.types, vec!["WebSite", "Organization"]);
        assert_eq!(data.nodes.len(), 2);
    }

    #[test]
    fn array_typed_node() {
        let data = extract_structured_data(&doc(r#"{"@type": ["Product", "Vehicle"]}"#));
        assert_eq!(data.types, vec!["Product", "Vehicle"]);
    }

    #[test]
    fn malformed_json_produces_diagnostic() {
        let data = extract_structured_data(&doc(r#"{"@type": "Article", }"#));
        assert!(data.nodes.is_empty());
        assert_eq!(data.diagnostics.len(), 1);
        assert!(data.diagnostics[0].contains("JSON-LD block 1"));
    }

    #[test]
    fn microdata_itemtype_tail() {
        let html = r#"<div itemscope itemtype="https://schema.org/Recipe"></div>"#;
        let data = extract_structured_data(&Html::parse_document(html));
        assert_eq!(data.types, vec!["Recipe"]);
    }

    #[test]
    fn coercion_helpers() {
        assert_eq!(as_string(Some(&json!("  hi  "))).as_deref(), Some("hi"));
        assert_eq!(as_string(Some(&json!(42))).as_deref(), Some("42"));
        assert_eq!(as_number(Some(&json!("19.99"))), Some(19.99));
        assert_eq!(as_number(Some(&json!(5))), Some(5.0));
        assert_eq!(
            first_image(Some(&json!(["a.jpg", "b.jpg"]))).as_deref(),
            Some("a.jpg")
        );
        assert_eq!(
            first_image(Some(&json!({"@type": "ImageObject", "url": "c.jpg"}))).as_deref(),
            Some("c.jpg")
        );
        assert_eq!(normalize_availability("https://schema.org/InStock"), "InStock");
        assert_eq!(normalize_availability("InStock"), "InStock");
    }

    #[test]
    fn person_shapes() {
        assert_eq!(
            person_name_url(Some(&json!("Jane Doe"))),
            (Some("Jane Doe".to_string()), None)
        );
        let (name, url) =
            person_name_url(Some(&json!({"name": "Jane", "url": "https://ex.test/jane"})));
        assert_eq!(name.as_deref(), Some("Jane"));
        assert_eq!(url.as_deref(), Some("https://ex.test/jane"));
        assert_eq!(
            person_name_url(Some(&json!(["First", "Second"]))).0.as_deref(),
            Some("First")
        );
    }
}
