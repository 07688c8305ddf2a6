//! robots.txt policy for one crawl
//!
//! Fetched once per job. A non-2xx response or network error yields a fully
//! permissive policy. Beyond allow/disallow matching for the configured user
//! agent, the policy surfaces crawl-delay, declared sitemaps (in file order),
//! and access classification for a fixed list of AI crawler user agents.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;
use url::Url;

/// AI crawler user agents classified by the policy.
pub const AI_USER_AGENTS: &[&str] = &[
    "GPTBot",
    "ChatGPT-User",
    "Google-Extended",
    "anthropic-ai",
    "Claude-Web",
    "PerplexityBot",
    "Amazonbot",
    "OAI-SearchBot",
    "cohere-ai",
    "FacebookBot",
];

/// Access state for a named AI user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAccess {
    /// `Allow: /` in a block naming the agent
    Allowed,
    /// `Disallow: /` in a block naming the agent
    Disallowed,
    /// Agent never named, or named without a root rule
    Unmentioned,
}

/// Parsed robots policy for the configured user agent.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    disallow_patterns: Vec<String>,
    allow_patterns: Vec<String>,
    crawl_delay: Option<Duration>,
    sitemaps: Vec<String>,
    ai_access: HashMap<String, AiAccess>,
}

impl RobotsPolicy {
    /// Fetch and parse `https://{domain}/robots.txt`. Any failure is treated
    /// as a fully permissive policy.
    pub async fn fetch(client: &reqwest::Client, domain: &str, user_agent: &str) -> Self {
        let robots_url = format!("https://{}/robots.txt", domain);
        match client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => Self::parse(&body, user_agent),
                Err(e) => {
                    debug!("robots.txt body read failed for {}: {}", domain, e);
                    Self::permissive()
                }
            },
            Ok(response) => {
                debug!(
                    "robots.txt returned {} for {}, treating as permissive",
                    response.status(),
                    domain
                );
                Self::permissive()
            }
            Err(e) => {
                debug!("robots.txt fetch failed for {}: {}", domain, e);
                Self::permissive()
            }
        }
    }

    /// Allow-all policy used when robots.txt is unavailable.
    pub fn permissive() -> Self {
        Self {
            disallow_patterns: Vec::new(),
            allow_patterns: Vec::new(),
            crawl_delay: None,
            sitemaps: Vec::new(),
            ai_access: AI_USER_AGENTS
                .iter()
                .map(|ua| (ua.to_string(), AiAccess::Unmentioned))
                .collect(),
        }
    }

    /// Parse robots.txt content for the given user agent.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let ua_lower = user_agent.to_lowercase();
        let mut disallow = Vec::new();
        let mut allow = Vec::new();
        let mut crawl_delay = None;
        let mut sitemaps = Vec::new();

        let mut current_agent_applies = false;
        let mut found_specific_agent = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if agent == "*" {
                        current_agent_applies = !found_specific_agent;
                    } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                        if !found_specific_agent {
                            // Specific rules replace wildcard rules
                            disallow.clear();
                            allow.clear();
                            crawl_delay = None;
                        }
                        current_agent_applies = true;
                        found_specific_agent = true;
                    } else {
                        current_agent_applies = false;
                    }
                }
                "disallow" if current_agent_applies => {
                    if !value.is_empty() {
                        disallow.push(value.to_string());
                    }
                }
                "allow" if current_agent_applies => {
                    if !value.is_empty() {
                        allow.push(value.to_string());
                    }
                }
                "crawl-delay" if current_agent_applies => {
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay >= 0.0 {
                            crawl_delay = Some(Duration::from_secs_f64(delay));
                        }
                    }
                }
                "sitemap" => {
                    sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        Self {
            disallow_patterns: disallow,
            allow_patterns: allow,
            crawl_delay,
            sitemaps,
            ai_access: classify_ai_access(content),
        }
    }

    /// Whether the configured user agent may fetch this URL.
    pub fn is_allowed(&self, url: &Url) -> bool {
        self.is_path_allowed(url.path())
    }

    /// Longest-match semantics over allow/disallow patterns; allow wins ties.
    pub fn is_path_allowed(&self, path: &str) -> bool {
        let mut longest_allow = 0;
        for pattern in &self.allow_patterns {
            if path_matches(path, pattern) {
                longest_allow = longest_allow.max(pattern.len());
            }
        }

        let mut longest_disallow = 0;
        for pattern in &self.disallow_patterns {
            if path_matches(path, pattern) {
                longest_disallow = longest_disallow.max(pattern.len());
            }
        }

        longest_allow >= longest_disallow
    }

    /// Crawl-delay declared for the configured user agent, if any.
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    /// `Sitemap:` directives in file order.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Access classification for one AI user agent.
    pub fn ai_access(&self, agent: &str) -> AiAccess {
        self.ai_access
            .get(agent)
            .copied()
            .unwrap_or(AiAccess::Unmentioned)
    }

    /// AI agents explicitly disallowed at the root.
    pub fn blocked_ai_agents(&self) -> Vec<String> {
        let mut blocked: Vec<String> = self
            .ai_access
            .iter()
            .filter(|(_, access)| **access == AiAccess::Disallowed)
            .map(|(agent, _)| agent.clone())
            .collect();
        blocked.sort();
        blocked
    }
}

/// Classify root access per named AI agent: a `User-agent` line naming the
/// agent, followed by `Disallow: /` or `Allow: /` before the next blank
/// line, comment, or `User-agent` line.
fn classify_ai_access(content: &str) -> HashMap<String, AiAccess> {
    let mut access: HashMap<String, AiAccess> = AI_USER_AGENTS
        .iter()
        .map(|ua| (ua.to_string(), AiAccess::Unmentioned))
        .collect();

    let lines: Vec<&str> = content.lines().map(|l| l.trim()).collect();

    for agent in AI_USER_AGENTS {
        let agent_lower = agent.to_lowercase();
        'scan: for (idx, line) in lines.iter().enumerate() {
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            if !directive.trim().eq_ignore_ascii_case("user-agent")
                || value.trim().to_lowercase() != agent_lower
            {
                continue;
            }

            for follow in &lines[idx + 1..] {
                if follow.is_empty() || follow.starts_with('#') {
                    break;
                }
                let Some((d, v)) = follow.split_once(':') else {
                    continue;
                };
                let d = d.trim().to_lowercase();
                let v = v.trim();
                match d.as_str() {
                    "user-agent" => break,
                    "disallow" if v == "/" => {
                        access.insert(agent.to_string(), AiAccess::Disallowed);
                        break 'scan;
                    }
                    "allow" if v == "/" => {
                        access.insert(agent.to_string(), AiAccess::Allowed);
                        break 'scan;
                    }
                    _ => {}
                }
            }
        }
    }

    access
}

/// robots.txt pattern matching with `*` wildcards and the `$` end anchor.
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let (pattern, must_end_match) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        let mut pos = 0;

        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            match path[pos..].find(part) {
                Some(found) => {
                    if i == 0 && found != 0 {
                        return false;
                    }
                    pos += found + part.len();
                }
                None => return false,
            }
        }

        if must_end_match {
            return pos == path.len();
        }
        return true;
    }

    if must_end_match {
        return path == pattern;
    }

    path.starts_with(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
User-agent: *
Disallow: /private/
Allow: /private/public/
Crawl-delay: 2

User-agent: SiteauditBot
Disallow: /admin/
Crawl-delay: 1

User-agent: GPTBot
Disallow: /

User-agent: anthropic-ai
Allow: /

Sitemap: https://ex.test/sitemap.xml
Sitemap: https://ex.test/news-sitemap.xml
"#;

    #[test]
    fn specific_agent_overrides_wildcard() {
        let policy = RobotsPolicy::parse(SAMPLE, "SiteauditBot/1.0");
        assert!(!policy.is_path_allowed("/admin/settings"));
        assert!(policy.is_path_allowed("/private/anything"));
        assert_eq!(policy.crawl_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn wildcard_rules_apply_to_unnamed_agents() {
        let policy = RobotsPolicy::parse(SAMPLE, "OtherBot");
        assert!(!policy.is_path_allowed("/private/secret"));
        assert!(policy.is_path_allowed("/private/public/page"));
        assert_eq!(policy.crawl_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn sitemaps_collected_in_order() {
        let policy = RobotsPolicy::parse(SAMPLE, "SiteauditBot");
        assert_eq!(
            policy.sitemaps(),
            &[
                "https://ex.test/sitemap.xml".to_string(),
                "https://ex.test/news-sitemap.xml".to_string(),
            ]
        );
    }

    #[test]
    fn ai_access_classification() {
        let policy = RobotsPolicy::parse(SAMPLE, "SiteauditBot");
        assert_eq!(policy.ai_access("GPTBot"), AiAccess::Disallowed);
        assert_eq!(policy.ai_access("anthropic-ai"), AiAccess::Allowed);
        assert_eq!(policy.ai_access("PerplexityBot"), AiAccess::Unmentioned);
        assert_eq!(policy.blocked_ai_agents(), vec!["GPTBot".to_string()]);
    }

    #[test]
    fn ai_block_ends_at_blank_line() {
        let content = "User-agent: GPTBot\n\nDisallow: /\n";
        let policy = RobotsPolicy::parse(content, "SiteauditBot");
        assert_eq!(policy.ai_access("GPTBot"), AiAccess::Unmentioned);
    }

    #[test]
    fn permissive_allows_everything() {
        let policy = RobotsPolicy::permissive();
        assert!(policy.is_path_allowed("/anything/at/all"));
        assert!(policy.crawl_delay().is_none());
        assert!(policy.sitemaps().is_empty());
    }

    #[test]
    fn wildcard_and_anchor_patterns() {
        assert!(path_matches("/images/cat.jpg", "/images/*.jpg"));
        assert!(path_matches("/page.html", "/page.html$"));
        assert!(!path_matches("/page.html.bak", "/page.html$"));
        assert!(!path_matches("/other/cat.jpg", "/images/"));
    }

    #[test]
    fn url_matching_uses_path() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /admin/\n", "SiteauditBot");
        let blocked = Url::parse("https://ex.test/admin/x").unwrap();
        let fine = Url::parse("https://ex.test/about").unwrap();
        assert!(!policy.is_allowed(&blocked));
        assert!(policy.is_allowed(&fine));
    }
}
