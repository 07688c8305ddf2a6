//! Sitemap reader
//!
//! Resolves sitemap indexes breadth-first, gunzips `.gz` bodies, and yields
//! same-domain URL entries with their metadata, bounded by a total-URL cap.
//! A processed-sitemaps set guarantees termination on cyclic indexes.

use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};
use url::Url;

use super::url::is_internal_host;

/// One `<url>` entry from a sitemap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

/// A parsed sitemap body: either an index of further sitemaps or a URL set.
#[derive(Debug)]
enum SitemapDocument {
    Index(Vec<String>),
    Urls(Vec<SitemapEntry>),
}

/// Breadth-first sitemap fetcher for one project domain.
pub struct SitemapReader {
    client: reqwest::Client,
    domain: String,
    url_cap: usize,
    fetch_timeout: Duration,
}

impl SitemapReader {
    pub fn new(client: reqwest::Client, domain: &str, url_cap: usize, fetch_timeout: Duration) -> Self {
        Self {
            client,
            domain: domain.to_string(),
            url_cap,
            fetch_timeout,
        }
    }

    /// Collect same-domain URL entries from the candidate sitemaps. With no
    /// candidates, the conventional `/sitemap.xml` and `/sitemap_index.xml`
    /// locations are probed.
    pub async fn collect(&self, candidates: &[String]) -> Vec<SitemapEntry> {
        let mut queue: VecDeque<String> = if candidates.is_empty() {
            ["/sitemap.xml", "/sitemap_index.xml"]
                .iter()
                .map(|path| format!("https://{}{}", self.domain, path))
                .collect()
        } else {
            candidates.iter().cloned().collect()
        };

        let mut processed: HashSet<String> = HashSet::new();
        let mut entries: Vec<SitemapEntry> = Vec::new();

        while let Some(sitemap_url) = queue.pop_front() {
            if entries.len() >= self.url_cap {
                debug!("sitemap URL cap ({}) reached", self.url_cap);
                break;
            }
            if !processed.insert(sitemap_url.clone()) {
                continue;
            }

            let Some(bytes) = self.fetch(&sitemap_url).await else {
                continue;
            };

            let body = if sitemap_url.ends_with(".gz") {
                match gunzip(&bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to gunzip sitemap {}: {}", sitemap_url, e);
                        continue;
                    }
                }
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            };

            match parse_sitemap(&body) {
                SitemapDocument::Index(locs) => {
                    debug!("sitemap index {} lists {} sitemaps", sitemap_url, locs.len());
                    queue.extend(locs);
                }
                SitemapDocument::Urls(urls) => {
                    for entry in urls {
                        if entries.len() >= self.url_cap {
                            break;
                        }
                        if self.is_same_domain(&entry.loc) {
                            entries.push(entry);
                        }
                    }
                }
            }
        }

        entries
    }

    fn is_same_domain(&self, loc: &str) -> bool {
        Url::parse(loc)
            .ok()
            .and_then(|u| u.host_str().map(|h| is_internal_host(h, &self.domain)))
            .unwrap_or(false)
    }

    async fn fetch(&self, sitemap_url: &str) -> Option<Vec<u8>> {
        let response = self
            .client
            .get(sitemap_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!("sitemap {} returned {}", sitemap_url, response.status());
            return None;
        }
        response.bytes().await.ok().map(|b| b.to_vec())
    }
}

fn gunzip(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

/// Parse a sitemap body into either an index (sitemap `<loc>`s) or a URL set.
fn parse_sitemap(xml: &str) -> SitemapDocument {
    #[derive(Clone, Copy, PartialEq)]
    enum Field {
        Loc,
        Lastmod,
        Changefreq,
        Priority,
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut is_index = false;
    let mut index_locs: Vec<String> = Vec::new();
    let mut entries: Vec<SitemapEntry> = Vec::new();
    let mut current: Option<SitemapEntry> = None;
    let mut in_index_entry = false;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"sitemap" => in_index_entry = true,
                b"url" => current = Some(SitemapEntry::default()),
                b"loc" => field = Some(Field::Loc),
                b"lastmod" => field = Some(Field::Lastmod),
                b"changefreq" => field = Some(Field::Changefreq),
                b"priority" => field = Some(Field::Priority),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }
                match field {
                    Some(Field::Loc) => {
                        if in_index_entry {
                            index_locs.push(text);
                        } else if let Some(entry) = current.as_mut() {
                            entry.loc = text;
                        }
                    }
                    Some(Field::Lastmod) => {
                        if let Some(entry) = current.as_mut() {
                            entry.lastmod = Some(text);
                        }
                    }
                    Some(Field::Changefreq) => {
                        if let Some(entry) = current.as_mut() {
                            entry.changefreq = Some(text);
                        }
                    }
                    Some(Field::Priority) => {
                        if let Some(entry) = current.as_mut() {
                            entry.priority = text.parse().ok();
                        }
                    }
                    None => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" => {
                    if let Some(entry) = current.take() {
                        if !entry.loc.is_empty() {
                            entries.push(entry);
                        }
                    }
                }
                b"sitemap" => in_index_entry = false,
                b"loc" | b"lastmod" | b"changefreq" | b"priority" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("sitemap XML parse stopped: {}", e);
                break;
            }
            _ => {}
        }
    }

    if is_index {
        SitemapDocument::Index(index_locs)
    } else {
        SitemapDocument::Urls(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://ex.test/</loc>
    <lastmod>2024-05-01</lastmod>
    <changefreq>daily</changefreq>
    <priority>1.0</priority>
  </url>
  <url>
    <loc>https://ex.test/about</loc>
  </url>
  <url>
    <loc>https://elsewhere.test/outside</loc>
  </url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://ex.test/sitemap-posts.xml</loc></sitemap>
  <sitemap><loc>https://ex.test/sitemap-pages.xml</loc></sitemap>
</sitemapindex>"#;

    #[test]
    fn parses_urlset_with_metadata() {
        let SitemapDocument::Urls(entries) = parse_sitemap(URLSET) else {
            panic!("expected url set");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].loc, "https://ex.test/");
        assert_eq!(entries[0].lastmod.as_deref(), Some("2024-05-01"));
        assert_eq!(entries[0].changefreq.as_deref(), Some("daily"));
        assert_eq!(entries[0].priority, Some(1.0));
        assert!(entries[1].lastmod.is_none());
    }

    #[test]
    fn parses_sitemap_index() {
        let SitemapDocument::Index(locs) = parse_sitemap(INDEX) else {
            panic!("expected index");
        };
        assert_eq!(
            locs,
            vec![
                "https://ex.test/sitemap-posts.xml".to_string(),
                "https://ex.test/sitemap-pages.xml".to_string(),
            ]
        );
    }

    #[test]
    fn malformed_xml_yields_no_entries() {
        let SitemapDocument::Urls(entries) = parse_sitemap("<urlset><url><loc>") else {
            panic!("expected url set");
        };
        assert!(entries.is_empty());
    }

    #[test]
    fn gunzip_round_trip() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(URLSET.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        let decoded = gunzip(&compressed).unwrap();
        assert_eq!(decoded, URLSET);
    }

    #[test]
    fn reader_filters_foreign_domains() {
        let reader = SitemapReader::new(
            reqwest::Client::new(),
            "ex.test",
            100,
            Duration::from_secs(1),
        );
        assert!(reader.is_same_domain("https://ex.test/a"));
        assert!(reader.is_same_domain("https://blog.ex.test/a"));
        assert!(!reader.is_same_domain("https://elsewhere.test/a"));
        assert!(!reader.is_same_domain("not a url"));
    }
}
