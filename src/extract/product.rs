//! Product schema extraction and validation

use chrono::Utc;
use serde_json::Value;

use crate::types::{ProductData, ProductOffer};

use super::schema::{
    as_number, as_string, first_image, node_has_type, normalize_availability, person_name_url,
    StructuredData,
};

/// Extract the first product node and validate it. Issue slugs match the
/// catalogue's e-commerce family codes.
pub fn extract_product(data: &StructuredData) -> (Option<ProductData>, Vec<String>) {
    let products: Vec<&Value> = data
        .nodes
        .iter()
        .filter(|node| node_has_type(node, "Product"))
        .collect();

    let Some(node) = products.first() else {
        return (None, Vec::new());
    };

    let mut issues: Vec<String> = Vec::new();
    if products.len() > 1 {
        issues.push("product_multiple".to_string());
    }

    let sku = as_string(node.get("sku"))
        .or_else(|| as_string(node.get("gtin")))
        .or_else(|| as_string(node.get("gtin13")))
        .or_else(|| as_string(node.get("gtin12")))
        .or_else(|| as_string(node.get("gtin8")))
        .or_else(|| as_string(node.get("gtin14")))
        .or_else(|| as_string(node.get("mpn")));

    let (brand, _) = person_name_url(node.get("brand"));

    let (rating_value, review_count) = match node.get("aggregateRating") {
        Some(Value::Object(map)) => (
            as_number(map.get("ratingValue")),
            map.get("reviewCount")
                .or_else(|| map.get("ratingCount"))
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok())),
        ),
        _ => (None, None),
    };

    let offers = extract_offers(node.get("offers"));

    let product = ProductData {
        name: as_string(node.get("name")),
        description: as_string(node.get("description")),
        sku,
        brand,
        image: first_image(node.get("image")),
        rating_value,
        review_count,
        condition: as_string(node.get("itemCondition")).map(|c| normalize_availability(&c)),
        offers,
    };

    if product.name.is_none() {
        issues.push("product_missing_name".to_string());
    }
    if product.description.is_none() {
        issues.push("product_missing_description".to_string());
    }
    if product.sku.is_none() {
        issues.push("product_missing_sku".to_string());
    }
    if product.brand.is_none() {
        issues.push("product_missing_brand".to_string());
    }
    if product.image.is_none() {
        issues.push("product_missing_image".to_string());
    }

    if product.offers.is_empty() {
        issues.push("product_missing_offer".to_string());
    } else {
        let today = Utc::now().date_naive();
        let push_once = |issues: &mut Vec<String>, code: &str| {
            if !issues.iter().any(|c| c == code) {
                issues.push(code.to_string());
            }
        };
        for offer in &product.offers {
            match offer.price {
                None => push_once(&mut issues, "product_missing_price"),
                Some(price) if price < 0.0 => push_once(&mut issues, "product_invalid_price"),
                Some(_) => {}
            }
            if offer.currency.is_none() {
                push_once(&mut issues, "product_missing_currency");
            }
            match &offer.availability {
                None => push_once(&mut issues, "product_missing_availability"),
                Some(availability) => {
                    let lowered = availability.to_ascii_lowercase();
                    if lowered.contains("outofstock") || lowered.contains("discontinued") {
                        push_once(&mut issues, "product_out_of_stock");
                    }
                }
            }
            if let Some(valid_until) = &offer.price_valid_until {
                if let Ok(date) = chrono::NaiveDate::parse_from_str(valid_until, "%Y-%m-%d") {
                    if date < today {
                        push_once(&mut issues, "product_price_expired");
                    }
                }
            }
        }
    }

    (Some(product), issues)
}

/// Offers may be a single object, an array, or an `AggregateOffer` carrying
/// `lowPrice`/`highPrice`.
fn extract_offers(value: Option<&Value>) -> Vec<ProductOffer> {
    match value {
        Some(Value::Object(map)) => {
            let is_aggregate = value
                .map(|v| node_has_type(v, "AggregateOffer"))
                .unwrap_or(false)
                || map.contains_key("lowPrice");
            if is_aggregate {
                vec![ProductOffer {
                    price: as_number(map.get("lowPrice")).or_else(|| as_number(map.get("highPrice"))),
                    currency: as_string(map.get("priceCurrency")),
                    availability: as_string(map.get("availability"))
                        .map(|a| normalize_availability(&a)),
                    price_valid_until: as_string(map.get("priceValidUntil")),
                }]
            } else {
                vec![offer_from_object(map)]
            }
        }
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().map(offer_from_object))
            .collect(),
        _ => Vec::new(),
    }
}

fn offer_from_object(map: &serde_json::Map<String, Value>) -> ProductOffer {
    ProductOffer {
        price: as_number(map.get("price")),
        currency: as_string(map.get("priceCurrency")),
        availability: as_string(map.get("availability")).map(|a| normalize_availability(&a)),
        price_valid_until: as_string(map.get("priceValidUntil")),
    }
}
