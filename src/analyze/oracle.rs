//! Performance oracle client
//!
//! Calls the external Lighthouse-style audit service for a single URL. The
//! crawler only runs it for the homepage: mobile and desktop strategies are
//! requested in parallel and combined into one [`PerformanceAudit`].

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::PerformanceAudit;

const ORACLE_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

pub struct PerformanceOracle {
    client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl PerformanceOracle {
    pub fn new(client: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            timeout,
        }
    }

    /// Audit one URL. Mobile and desktop are independent external calls and
    /// run concurrently; either may fail without failing the other.
    pub async fn audit(&self, url: &str) -> Option<PerformanceAudit> {
        let (mobile, desktop) = tokio::join!(self.run_strategy(url, "mobile"), self.run_strategy(url, "desktop"));

        if mobile.is_none() && desktop.is_none() {
            warn!("performance oracle returned nothing for {}", url);
            return None;
        }

        let mut audit = PerformanceAudit {
            url: url.to_string(),
            mobile_score: None,
            desktop_score: None,
            field_lcp_ms: None,
            field_cls: None,
            field_inp_ms: None,
            opportunities: Vec::new(),
            diagnostics: Vec::new(),
        };

        if let Some(body) = &mobile {
            audit.mobile_score = lab_score(body);
            audit.field_lcp_ms = field_percentile(body, "LARGEST_CONTENTFUL_PAINT_MS");
            audit.field_cls =
                field_percentile(body, "CUMULATIVE_LAYOUT_SHIFT_SCORE").map(|v| v / 100.0);
            audit.field_inp_ms = field_percentile(body, "INTERACTION_TO_NEXT_PAINT");
            let (opportunities, diagnostics) = top_findings(body);
            audit.opportunities = opportunities;
            audit.diagnostics = diagnostics;
        }
        if let Some(body) = &desktop {
            audit.desktop_score = lab_score(body);
        }

        Some(audit)
    }

    async fn run_strategy(&self, url: &str, strategy: &str) -> Option<Value> {
        let response = self
            .client
            .get(ORACLE_ENDPOINT)
            .query(&[("url", url), ("strategy", strategy), ("key", &self.api_key)])
            .timeout(self.timeout)
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => r.json().await.ok(),
            Ok(r) => {
                debug!("oracle {} strategy returned {}", strategy, r.status());
                None
            }
            Err(e) => {
                debug!("oracle {} strategy failed: {}", strategy, e);
                None
            }
        }
    }
}

/// Lab performance score as 0-100.
fn lab_score(body: &Value) -> Option<u32> {
    body.pointer("/lighthouseResult/categories/performance/score")
        .and_then(|v| v.as_f64())
        .map(|s| (s * 100.0).round() as u32)
}

/// Field-data percentile for one metric, when the oracle has field data.
fn field_percentile(body: &Value, metric: &str) -> Option<f64> {
    body.pointer(&format!("/loadingExperience/metrics/{}/percentile", metric))
        .and_then(|v| v.as_f64())
}

/// Titles of failed opportunity and diagnostic audits, capped at five each.
fn top_findings(body: &Value) -> (Vec<String>, Vec<String>) {
    let mut opportunities = Vec::new();
    let mut diagnostics = Vec::new();

    if let Some(audits) = body.pointer("/lighthouseResult/audits").and_then(|v| v.as_object()) {
        for audit in audits.values() {
            let score = audit.get("score").and_then(|v| v.as_f64());
            if score.map(|s| s >= 0.9).unwrap_or(true) {
                continue;
            }
            let Some(title) = audit.get("title").and_then(|v| v.as_str()) else {
                continue;
            };
            match audit.pointer("/details/type").and_then(|v| v.as_str()) {
                Some("opportunity") if opportunities.len() < 5 => {
                    opportunities.push(title.to_string())
                }
                Some(_) | None if diagnostics.len() < 5 => diagnostics.push(title.to_string()),
                _ => {}
            }
        }
    }

    (opportunities, diagnostics)
}
