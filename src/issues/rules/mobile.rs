//! Mobile-friendliness rules over the extractor's mobile analysis

use serde_json::json;

use crate::issues::Emission;
use crate::types::PageRecord;

use super::is_content_page;

/// More fixed elements than this marks the page as cluttered with chrome.
const FIXED_ELEMENT_LIMIT: u32 = 2;

pub fn detect(page: &PageRecord) -> Vec<Emission> {
    if !is_content_page(page) {
        return Vec::new();
    }
    let Some(mobile) = &page.mobile else {
        return Vec::new();
    };

    let mut out = Vec::new();

    if !mobile.has_viewport {
        out.push(Emission::new("mobile_missing_viewport", json!({})));
        // Without a viewport the remaining viewport-derived checks are moot
        return out;
    }

    if mobile.is_zoom_disabled {
        out.push(Emission::new(
            "mobile_zoom_disabled",
            json!({ "viewport": mobile.viewport_content }),
        ));
    }
    if mobile.initial_scale_not_one {
        out.push(Emission::new(
            "mobile_initial_scale",
            json!({ "viewport": mobile.viewport_content }),
        ));
    }
    if mobile.non_responsive_images > 0 {
        out.push(Emission::new(
            "mobile_images_not_responsive",
            json!({ "count": mobile.non_responsive_images }),
        ));
    }
    if mobile.tables_without_wrapper > 0 {
        out.push(Emission::new(
            "mobile_tables_not_responsive",
            json!({ "count": mobile.tables_without_wrapper }),
        ));
    }
    if mobile.fixed_elements > FIXED_ELEMENT_LIMIT {
        out.push(Emission::new(
            "mobile_excessive_fixed_elements",
            json!({ "count": mobile.fixed_elements }),
        ));
    }
    if mobile.small_text_elements > 0 {
        out.push(Emission::new(
            "mobile_small_font",
            json!({ "count": mobile.small_text_elements }),
        ));
    }
    if !mobile.has_apple_touch_icon {
        out.push(Emission::new("mobile_no_touch_icon", json!({})));
    }
    if !mobile.has_manifest {
        out.push(Emission::new("mobile_no_manifest", json!({})));
    }
    if !mobile.has_theme_color {
        out.push(Emission::new("mobile_no_theme_color", json!({})));
    }
    if mobile.phone_numbers_in_body > 0 && !mobile.has_tel_links {
        out.push(Emission::new(
            "mobile_no_tel_links",
            json!({ "phone_numbers": mobile.phone_numbers_in_body }),
        ));
    }
    if mobile.lcp_candidate_lazy_loaded {
        out.push(Emission::new("mobile_lcp_lazy_loaded", json!({})));
    }
    if !mobile.uses_media_queries {
        out.push(Emission::new("mobile_no_media_queries", json!({})));
    }

    out
}
