//! URL normalization and SEO relevance filtering
//!
//! Normalization produces the canonical string used for frontier
//! deduplication and the backref table. The SEO filter rejects URLs that
//! cannot contribute audit signal: binary assets, admin surfaces, and
//! tracking/pagination/session query variants.

use url::Url;

/// File extensions that never resolve to auditable HTML.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "bmp", "tiff", "avif",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "csv", "txt",
    // archives
    "zip", "rar", "gz", "tar", "7z", "bz2",
    // media
    "mp3", "mp4", "avi", "mov", "wmv", "flv", "webm", "mkv", "wav", "ogg",
    // code and data
    "css", "js", "mjs", "json", "xml", "rss", "atom", "map",
    // fonts
    "woff", "woff2", "ttf", "eot", "otf",
    // binaries
    "exe", "dmg", "apk", "msi",
];

/// Path segments (exact, case-insensitive) that mark non-content surfaces.
const EXCLUDED_SEGMENTS: &[&str] = &[
    "admin",
    "wp-admin",
    "wp-login",
    "login",
    "logout",
    "signin",
    "signup",
    "register",
    "cart",
    "checkout",
    "basket",
    "account",
    "my-account",
    "wishlist",
    "compare",
    "search",
    "feed",
    "rss",
    "api",
    "tag",
    "tags",
    "author",
    "print",
    "preview",
    "ajax",
    "cgi-bin",
];

/// Path substrings that mark asset or machinery paths.
const EXCLUDED_PATH_PATTERNS: &[&str] = &[
    "/wp-content/uploads",
    "/wp-includes/",
    "/wp-json/",
    "/cdn-cgi/",
    "/xmlrpc",
];

/// Query keys (exact) whose presence marks a tracking, pagination, session,
/// sort/filter, cache-buster, or search variant of another URL.
const EXCLUDED_QUERY_KEYS: &[&str] = &[
    // click/campaign trackers
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "ref", "source", "share",
    // sessions
    "sessionid", "session_id", "phpsessid", "sid",
    // pagination
    "page", "p", "offset", "limit",
    // sort and filter views
    "sort", "order", "orderby", "filter", "view",
    // cache busters
    "t", "_",
    // on-site search
    "q", "s",
    // misc machinery
    "print", "replytocom",
];

/// Canonicalize a URL for deduplication and comparison.
///
/// Drops the fragment, sorts query parameters ascending by key, strips the
/// trailing slash unless the path is exactly `/`. The host is lower-cased by
/// the parser; `www.` is preserved in the URL (stripped only for domain
/// comparison). Returns `None` for unparseable or non-HTTP URLs.
pub fn normalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;

    url.set_fragment(None);

    if let Some(query) = url.query() {
        let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
        params.sort_unstable();
        if params.is_empty() {
            url.set_query(None);
        } else {
            let joined = params.join("&");
            url.set_query(Some(&joined));
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// Strip a leading `www.` for domain comparison.
pub fn domain_key(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// True when `host` is the project domain itself or any subdomain of it.
/// Used for internal/external link classification.
pub fn is_internal_host(host: &str, project_domain: &str) -> bool {
    let host = domain_key(host).to_ascii_lowercase();
    let domain = domain_key(project_domain).to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// True when `host` is in crawl scope: the project domain exactly, or a
/// subdomain when `follow_subdomains` is set.
pub fn host_in_scope(host: &str, project_domain: &str, follow_subdomains: bool) -> bool {
    let host = domain_key(host).to_ascii_lowercase();
    let domain = domain_key(project_domain).to_ascii_lowercase();
    if host == domain {
        return true;
    }
    follow_subdomains && host.ends_with(&format!(".{}", domain))
}

/// Why a URL was rejected by the SEO filter, or `None` when it is worth
/// crawling. Checks run in a fixed order: extension, path segment, path
/// pattern, query key. All path comparisons are lower-case; fragments are
/// ignored (normalization already dropped them).
pub fn seo_skip_reason(url: &Url) -> Option<&'static str> {
    let path = url.path().to_ascii_lowercase();

    if let Some(ext) = path.rsplit('/').next().and_then(|seg| seg.rsplit_once('.')) {
        if EXCLUDED_EXTENSIONS.contains(&ext.1) {
            return Some("non-HTML file extension");
        }
    }

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if EXCLUDED_SEGMENTS.contains(&segment) {
            return Some("excluded path segment");
        }
    }

    for pattern in EXCLUDED_PATH_PATTERNS {
        if path.contains(pattern) {
            return Some("excluded path pattern");
        }
    }

    if let Some(query) = url.query() {
        for pair in query.split('&') {
            let key = pair.split('=').next().unwrap_or("").to_ascii_lowercase();
            if key.starts_with("utm_") || EXCLUDED_QUERY_KEYS.contains(&key.as_str()) {
                return Some("excluded query parameter");
            }
        }
    }

    None
}

/// Whether a URL is worth crawling for audit signal.
pub fn is_seo_relevant(url: &Url) -> bool {
    seo_skip_reason(url).is_none()
}
