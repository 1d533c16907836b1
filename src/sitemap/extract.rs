use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Namespace fragment every sitemap-protocol root element declares.
pub const SITEMAP_NAMESPACE_DOMAIN: &str = "sitemaps.org";

static LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<loc>(.*?)</loc>").expect("valid loc regex"));
static LASTMOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<lastmod>(.*?)</lastmod>").expect("valid lastmod regex"));
// `\s[^>]*` keeps `<urlset` and `<sitemapindex` from matching the block openers.
static URL_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<url(?:\s[^>]*)?>(.*?)</url>").expect("valid url block regex")
});
static SITEMAP_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<sitemap(?:\s[^>]*)?>(.*?)</sitemap>").expect("valid sitemap block regex")
});
static URL_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<url[\s>]").expect("valid url open regex"));
static SITEMAP_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<sitemap[\s>]").expect("valid sitemap open regex"));
static TAG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<([A-Za-z_][\w.:-]*)").expect("valid tag name regex"));
static XMLNS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)xmlns(?::[\w.-]+)?\s*=\s*["']([^"']*)["']"#).expect("valid xmlns regex")
});

/// Root element of a sitemap document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    UrlSet,
    SitemapIndex,
    Unknown,
}

impl RootKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RootKind::UrlSet => "urlset",
            RootKind::SitemapIndex => "sitemapindex",
            RootKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `<url>` entry with its optional `<lastmod>` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlEntry {
    pub url: String,
    pub lastmod: Option<String>,
}

/// Extraction interface used by the feed manager and the change detector.
///
/// Implementations must be total: malformed input yields empty results,
/// `RootKind::Unknown` and `false`, never a panic or an error.
pub trait SitemapExtractor: Send + Sync {
    /// Every `<loc>` value in document order, duplicates kept.
    fn locations(&self, xml: &str) -> Vec<String>;

    /// `(loc, lastmod)` pairs found inside `<url>` blocks only.
    fn url_entries(&self, xml: &str) -> Vec<UrlEntry>;

    /// `<loc>` values found inside `<sitemap>` blocks of an index.
    fn child_sitemaps(&self, xml: &str) -> Vec<String>;

    fn classify_root(&self, xml: &str) -> RootKind;

    /// True for a `urlset` with at least one `<url>` or a `sitemapindex` with at
    /// least one `<sitemap>`, whose root declares the sitemap-protocol namespace.
    fn is_valid_sitemap(&self, xml: &str) -> bool;
}

/// Permissive tag-pair scanner. Not a conformant XML parser: it only matches
/// `<loc>`, `<lastmod>`, `<url>` and `<sitemap>` pairs and inspects the root tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor;

impl RegexExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SitemapExtractor for RegexExtractor {
    fn locations(&self, xml: &str) -> Vec<String> {
        collect_locs(xml)
    }

    fn url_entries(&self, xml: &str) -> Vec<UrlEntry> {
        URL_BLOCK_RE
            .captures_iter(xml)
            .filter_map(|caps| {
                let block = caps.get(1)?.as_str();
                let url = first_text(&LOC_RE, block)?;
                let lastmod = first_text(&LASTMOD_RE, block);
                Some(UrlEntry { url, lastmod })
            })
            .collect()
    }

    fn child_sitemaps(&self, xml: &str) -> Vec<String> {
        SITEMAP_BLOCK_RE
            .captures_iter(xml)
            .filter_map(|caps| first_text(&LOC_RE, caps.get(1)?.as_str()))
            .collect()
    }

    fn classify_root(&self, xml: &str) -> RootKind {
        let Some(tag) = root_start_tag(xml) else {
            return RootKind::Unknown;
        };
        let Some(name) = TAG_NAME_RE.captures(tag).and_then(|c| c.get(1)) else {
            return RootKind::Unknown;
        };
        let name = name.as_str().to_lowercase();
        // `<sm:urlset>` classifies the same as `<urlset>`
        let local = name.rsplit(':').next().unwrap_or(&name);
        match local {
            "urlset" => RootKind::UrlSet,
            "sitemapindex" => RootKind::SitemapIndex,
            _ => RootKind::Unknown,
        }
    }

    fn is_valid_sitemap(&self, xml: &str) -> bool {
        let Some(tag) = root_start_tag(xml) else {
            return false;
        };
        let has_namespace = XMLNS_RE
            .captures_iter(tag)
            .filter_map(|c| c.get(1))
            .any(|ns| ns.as_str().to_lowercase().contains(SITEMAP_NAMESPACE_DOMAIN));
        if !has_namespace {
            return false;
        }

        match self.classify_root(xml) {
            RootKind::UrlSet => URL_OPEN_RE.is_match(xml),
            RootKind::SitemapIndex => SITEMAP_OPEN_RE.is_match(xml),
            RootKind::Unknown => false,
        }
    }
}

fn collect_locs(fragment: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(fragment)
        .filter_map(|caps| {
            let text = caps.get(1)?.as_str().trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .collect()
}

fn first_text(re: &Regex, fragment: &str) -> Option<String> {
    re.captures_iter(fragment)
        .filter_map(|caps| {
            let text = caps.get(1)?.as_str().trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .next()
}

/// Returns the first element start tag (`<name ...>`), skipping the XML
/// declaration, processing instructions, comments and doctype.
fn root_start_tag(xml: &str) -> Option<&str> {
    let mut rest = xml.trim_start_matches('\u{feff}').trim_start();

    loop {
        if let Some(after) = rest.strip_prefix("<?") {
            let end = after.find("?>")?;
            rest = after[end + 2..].trim_start();
        } else if let Some(after) = rest.strip_prefix("<!--") {
            let end = after.find("-->")?;
            rest = after[end + 3..].trim_start();
        } else if let Some(after) = rest.strip_prefix("<!") {
            let end = after.find('>')?;
            rest = after[end + 1..].trim_start();
        } else if rest.starts_with('<') {
            let end = rest.find('>')?;
            return Some(&rest[..=end]);
        } else {
            return None;
        }
    }
}
