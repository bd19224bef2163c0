//! Shared data model for crawl records
//!
//! A successful page visit produces exactly one [`PageData`] record. Records
//! are immutable once the extractor emits them; sinks serialize them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// An outbound link discovered on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLink {
    /// Absolute link target
    pub url: Url,
    /// Rendered anchor text, if any
    pub text: Option<String>,
    /// Conjunction of the page-level follow policy and the link's own
    /// `rel` directive; `nofollow` at either level wins
    pub follow: bool,
}

impl PageLink {
    pub fn new(url: Url, text: Option<String>, follow: bool) -> Self {
        Self { url, text, follow }
    }
}

/// Indexing directives for a page, merged from `X-Robots-Tag` headers and
/// `meta[name=robots]` tags.
///
/// Both fields default to `true` when no source states otherwise. The first
/// definite value per field wins across sources; `none` forces both false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsDirectives {
    /// May this page be indexed?
    pub index_page: bool,
    /// May links on this page be followed?
    pub follow_links: bool,
}

impl Default for RobotsDirectives {
    fn default() -> Self {
        Self {
            index_page: true,
            follow_links: true,
        }
    }
}

/// Structured content extracted from one rendered page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    /// The page's declared canonical URL, or the visited URL when no
    /// `link[rel=canonical]` resolves
    pub canonical_url: Url,
    /// Media type of the response (`content-type` without parameters)
    pub mime_type: Option<String>,
    /// Full rendered HTML
    pub content: Option<String>,
    /// Document title as reported by the browser
    pub title: Option<String>,
    /// First of: `meta[name=description]`, `twitter:description`,
    /// `og:description`
    pub description: Option<String>,
    /// Outbound anchors plus feed entries for XML pages
    pub links: Vec<PageLink>,
    /// `link[rel=alternate]` targets with an Atom/RSS/XML type
    pub feeds: Vec<Url>,
    /// `link[rel=sitemap]` targets
    pub sitemaps: Vec<Url>,
    /// `innerText` of every `main, [role=main]` element, or the body text
    /// when no such element exists
    pub main_element_texts: Vec<String>,
    /// `innerText` of every `h1`..`h6`
    pub headers: Vec<String>,
    /// Merged robots directives, when any source provided one
    pub robots: Option<RobotsDirectives>,
    /// When the page was extracted
    pub crawled_at: DateTime<Utc>,
}

impl PageData {
    /// Effective robots directives, defaulting both flags to true.
    pub fn effective_robots(&self) -> RobotsDirectives {
        self.robots.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> PageData {
        PageData {
            canonical_url: Url::parse("https://example.com/a/").unwrap(),
            mime_type: Some("text/html".to_string()),
            content: Some("<html></html>".to_string()),
            title: Some("Example".to_string()),
            description: None,
            links: vec![PageLink::new(
                Url::parse("https://example.com/a/x").unwrap(),
                Some("X".to_string()),
                true,
            )],
            feeds: Vec::new(),
            sitemaps: Vec::new(),
            main_element_texts: vec!["body text".to_string()],
            headers: vec!["Heading".to_string()],
            robots: None,
            crawled_at: Utc::now(),
        }
    }

    #[test]
    fn page_data_serializes_camel_case() {
        let json = serde_json::to_value(sample_page()).unwrap();
        assert!(json.get("canonicalUrl").is_some());
        assert!(json.get("mainElementTexts").is_some());
        assert!(json.get("crawledAt").is_some());
        assert!(json.get("canonical_url").is_none());
    }

    #[test]
    fn effective_robots_defaults_to_permissive() {
        let page = sample_page();
        let robots = page.effective_robots();
        assert!(robots.index_page);
        assert!(robots.follow_links);
    }

    #[test]
    fn robots_directives_serialize_camel_case() {
        let json = serde_json::to_value(RobotsDirectives {
            index_page: false,
            follow_links: true,
        })
        .unwrap();
        assert_eq!(json["indexPage"], false);
        assert_eq!(json["followLinks"], true);
    }
}
