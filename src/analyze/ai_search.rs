//! AI-search readiness scoring
//!
//! Combines robots-policy AI access flags, the `llms.txt`/`ai.txt` probes,
//! the ratio of pages structured well enough for answer engines, and
//! FAQ/HowTo/Speakable schema counts into one 0-100 score.

use std::time::Duration;

use tracing::debug;

use crate::crawl::robots::RobotsPolicy;
use crate::types::{AiSearchAudit, PageRecord};

/// Minimum byte length for a guidance file to count as structurally valid.
const MIN_GUIDANCE_FILE_LEN: usize = 50;

/// A page counts as AI-optimized when it has exactly one h1, at least two
/// h2s, 300+ words, and a title of 20+ characters.
fn is_ai_optimized(page: &PageRecord) -> bool {
    page.h1_count() == 1
        && page.h2_count() >= 2
        && page.word_count >= 300
        && page.title_length() >= 20
}

/// Probe results for the AI guidance files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidanceProbe {
    pub has_llms_txt: bool,
    pub has_ai_txt: bool,
}

/// HTTP prober + pure scorer.
pub struct AiSearchAnalyzer {
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl AiSearchAnalyzer {
    pub fn new(client: reqwest::Client, probe_timeout: Duration) -> Self {
        Self {
            client,
            probe_timeout,
        }
    }

    /// Probe `llms.txt` and `ai.txt`. A file is valid when it returns 2xx,
    /// is at least 50 bytes, and carries a title (`#`) or URL marker.
    pub async fn probe(&self, domain: &str) -> GuidanceProbe {
        GuidanceProbe {
            has_llms_txt: self.probe_file(domain, "llms.txt").await,
            has_ai_txt: self.probe_file(domain, "ai.txt").await,
        }
    }

    async fn probe_file(&self, domain: &str, file: &str) -> bool {
        let url = format!("https://{}/{}", domain, file);
        let response = match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(_) | Err(_) => return false,
        };
        match response.text().await {
            Ok(body) => is_valid_guidance_file(&body),
            Err(e) => {
                debug!("reading {} failed: {}", url, e);
                false
            }
        }
    }

    /// Pure scoring over the collected inputs. Starts at 100 and deducts
    /// per the fixed penalty table.
    pub fn evaluate(
        probe: GuidanceProbe,
        robots: &RobotsPolicy,
        pages: &[PageRecord],
    ) -> AiSearchAudit {
        let blocked = robots.blocked_ai_agents();

        let candidates: Vec<&PageRecord> = pages
            .iter()
            .filter(|p| p.is_indexable && (200..300).contains(&p.status_code))
            .collect();
        let optimized = candidates.iter().filter(|p| is_ai_optimized(p)).count();
        let optimized_page_ratio = if candidates.is_empty() {
            0.0
        } else {
            optimized as f64 / candidates.len() as f64
        };

        let count_schema = |name: &str| {
            pages
                .iter()
                .filter(|p| p.schema_types.iter().any(|t| t == name))
                .count() as u32
        };
        let faq_schema_count = count_schema("FAQPage");
        let howto_schema_count = count_schema("HowTo");
        let speakable_schema_count = count_schema("Speakable");

        let mut penalty: u32 = 0;
        penalty += (blocked.len() as u32 * 5).min(30);
        if !probe.has_llms_txt {
            penalty += 15;
        }
        if !probe.has_ai_txt {
            penalty += 5;
        }
        if optimized_page_ratio < 0.3 {
            penalty += 20;
        } else if optimized_page_ratio < 0.6 {
            penalty += 10;
        }
        if faq_schema_count == 0 {
            penalty += 10;
        }
        if howto_schema_count == 0 {
            penalty += 5;
        }
        if speakable_schema_count == 0 {
            penalty += 5;
        }

        AiSearchAudit {
            score: 100u32.saturating_sub(penalty),
            has_llms_txt: probe.has_llms_txt,
            has_ai_txt: probe.has_ai_txt,
            blocked_ai_bots: blocked,
            optimized_page_ratio,
            faq_schema_count,
            howto_schema_count,
            speakable_schema_count,
        }
    }
}

/// Structural validation: non-empty, long enough, and carrying a title or
/// URL marker.
fn is_valid_guidance_file(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.len() >= MIN_GUIDANCE_FILE_LEN
        && (trimmed.contains('#') || trimmed.contains("http"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimized_page() -> PageRecord {
        let mut page = PageRecord::error_record("https://ex.test/p", 200, None, 10, "");
        page.is_indexable = true;
        page.indexability_reason = None;
        page.title = Some("A descriptive page title".to_string());
        page.h1_tags = vec!["H".to_string()];
        page.h2_tags = vec!["A".to_string(), "B".to_string()];
        page.word_count = 500;
        page
    }

    #[test]
    fn guidance_file_validation() {
        assert!(is_valid_guidance_file(
            "# ex.test\n\nDocs: https://ex.test/docs and more context for agents."
        ));
        assert!(!is_valid_guidance_file(""));
        assert!(!is_valid_guidance_file("# too short"));
        let long_no_marker = "plain words ".repeat(10);
        assert!(!is_valid_guidance_file(&long_no_marker));
    }

    #[test]
    fn perfect_site_scores_high() {
        let mut faq = optimized_page();
        faq.schema_types = vec!["FAQPage".to_string()];
        let mut howto = optimized_page();
        howto.schema_types = vec!["HowTo".to_string()];
        let mut speakable = optimized_page();
        speakable.schema_types = vec!["Speakable".to_string()];

        let audit = AiSearchAnalyzer::evaluate(
            GuidanceProbe { has_llms_txt: true, has_ai_txt: true },
            &RobotsPolicy::permissive(),
            &[faq, howto, speakable],
        );
        assert_eq!(audit.score, 100);
        assert!((audit.optimized_page_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_everything_scores_low() {
        let page = PageRecord::error_record("https://ex.test/p", 200, None, 10, "thin");
        let audit = AiSearchAnalyzer::evaluate(
            GuidanceProbe::default(),
            &RobotsPolicy::permissive(),
            &[page],
        );
        // 15 + 5 + 20 + 10 + 5 + 5 = 60 in penalties
        assert_eq!(audit.score, 40);
    }

    #[test]
    fn blocked_bots_penalty_is_capped() {
        let robots = RobotsPolicy::parse(
            "User-agent: GPTBot\nDisallow: /\n\n\
             User-agent: ChatGPT-User\nDisallow: /\n\n\
             User-agent: Google-Extended\nDisallow: /\n\n\
             User-agent: anthropic-ai\nDisallow: /\n\n\
             User-agent: Claude-Web\nDisallow: /\n\n\
             User-agent: PerplexityBot\nDisallow: /\n\n\
             User-agent: Amazonbot\nDisallow: /\n",
            "SiteauditBot",
        );
        let mut faq = optimized_page();
        faq.schema_types = vec![
            "FAQPage".to_string(),
            "HowTo".to_string(),
            "Speakable".to_string(),
        ];
        let audit = AiSearchAnalyzer::evaluate(
            GuidanceProbe { has_llms_txt: true, has_ai_txt: true },
            &robots,
            &[faq],
        );
        // Seven blocked bots would be 35; the cap holds it at 30
        assert_eq!(audit.score, 70);
        assert_eq!(audit.blocked_ai_bots.len(), 7);
    }

    #[test]
    fn middling_ratio_gets_smaller_penalty() {
        let pages: Vec<PageRecord> = (0..10)
            .map(|i| {
                if i < 4 {
                    let mut p = PageRecord::error_record(
                        &format!("https://ex.test/{}", i),
                        200,
                        None,
                        10,
                        "",
                    );
                    p.is_indexable = true;
                    p.indexability_reason = None;
                    p
                } else {
                    let mut p = optimized_page();
                    p.url = format!("https://ex.test/{}", i);
                    p
                }
            })
            .collect();
        let audit = AiSearchAnalyzer::evaluate(
            GuidanceProbe { has_llms_txt: true, has_ai_txt: true },
            &RobotsPolicy::permissive(),
            &pages,
        );
        assert!((audit.optimized_page_ratio - 0.6).abs() < f64::EPSILON);
        // No ratio penalty at exactly 0.6; only schema penalties remain
        assert_eq!(audit.score, 80);
    }
}
