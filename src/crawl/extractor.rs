//! Page extraction
//!
//! Turns one rendered page plus its navigation response into a [`PageData`]
//! record. Metadata that lives in markup (canonical link, description,
//! robots meta, feed and sitemap references) is read from the rendered HTML;
//! everything that depends on CSS-aware rendering (anchor text, main-element
//! and heading text) comes from a single script evaluated in the page.

pub mod feeds;

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::types::{PageData, PageLink};

use super::browser::LoadedPage;
use super::{robots, CrawlError};

/// Snapshot script: everything the extractor needs from the live DOM in one
/// round trip. `innerText` is used deliberately; it is CSS-aware and excludes
/// hidden text.
const SNAPSHOT_SCRIPT: &str = r#"
    (() => {
        const text = (el) => typeof el.innerText === 'string' ? el.innerText : '';
        const links = Array.from(document.querySelectorAll('a[href]')).map((a) => ({
            href: a.href,
            text: typeof a.innerText === 'string' ? a.innerText : null,
            rel: a.getAttribute('rel'),
        }));
        const mains = Array.from(document.querySelectorAll('main, *[role=main]')).map(text);
        const headings = Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6')).map(text);
        const body = document.body ? text(document.body) : '';
        return { links, mains, headings, body };
    })()
"#;

/// Feed media types recognized on `link[rel=alternate]`.
const FEED_TYPES: &[&str] = &[
    "application/atom+xml",
    "application/rss+xml",
    "application/xml",
];

/// DOM state captured by [`SNAPSHOT_SCRIPT`].
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DomSnapshot {
    #[serde(default)]
    pub links: Vec<RawAnchor>,
    #[serde(default)]
    pub mains: Vec<String>,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub body: String,
}

/// One `a[href]` element as seen by the browser.
#[derive(Debug, Deserialize)]
pub(crate) struct RawAnchor {
    /// DOM-resolved href, already absolute for resolvable links
    pub href: String,
    pub text: Option<String>,
    pub rel: Option<String>,
}

/// Markup-level metadata pulled from the rendered HTML.
#[derive(Debug, Default)]
pub(crate) struct DocumentMeta {
    pub canonical_href: Option<String>,
    pub description: Option<String>,
    /// `meta[name=robots]` content values in document order
    pub robots_meta: Vec<String>,
    pub feed_hrefs: Vec<String>,
    pub sitemap_hrefs: Vec<String>,
}

/// Extracts [`PageData`] records from loaded pages.
#[derive(Debug, Default)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Produce the record for a successfully loaded page.
    pub async fn extract(
        &self,
        loaded: &LoadedPage,
        page_url: &Url,
    ) -> Result<PageData, CrawlError> {
        let response = loaded.response();
        let mime_type = response.media_type();

        let html = loaded.rendered_html().await?;
        let meta = document_meta(&html);

        let canonical_url = meta
            .canonical_href
            .as_deref()
            .and_then(|href| page_url.join(href).ok())
            .unwrap_or_else(|| page_url.clone());

        // Header values come before meta tags; the first definite value for
        // each directive wins.
        let header_directives = response.header_values("x-robots-tag");
        let robots = robots::merge_sources(
            header_directives
                .iter()
                .map(String::as_str)
                .chain(meta.robots_meta.iter().map(String::as_str)),
        );
        let page_follow = robots.map(|r| r.follow_links).unwrap_or(true);

        let title = loaded.title().await?.filter(|t| !t.is_empty());
        let snapshot: DomSnapshot = loaded.evaluate(SNAPSHOT_SCRIPT).await?;

        let mut links = build_links(&snapshot.links, page_follow);

        // XML content types additionally carry feed entries in the raw body.
        // application/xml is tried as both Atom and RSS.
        if let Some(media_type) = mime_type.as_deref() {
            let try_atom = matches!(media_type, "application/atom+xml" | "application/xml");
            let try_rss = matches!(media_type, "application/rss+xml" | "application/xml");
            if try_atom || try_rss {
                if let Some(body) = loaded.response_body().await? {
                    if try_atom {
                        match feeds::atom_entry_links(&body, &canonical_url) {
                            Ok(found) => links.extend(
                                found.into_iter().map(|url| PageLink::new(url, None, true)),
                            ),
                            Err(e) => warn!("Malformed Atom document at {}: {}", page_url, e),
                        }
                    }
                    if try_rss {
                        match feeds::rss_item_links(&body, &canonical_url) {
                            Ok(found) => links.extend(
                                found.into_iter().map(|url| PageLink::new(url, None, true)),
                            ),
                            Err(e) => warn!("Malformed RSS document at {}: {}", page_url, e),
                        }
                    }
                }
            }
        }

        let main_element_texts = if snapshot.mains.is_empty() {
            vec![snapshot.body]
        } else {
            snapshot.mains
        };

        Ok(PageData {
            canonical_url,
            mime_type,
            content: Some(html),
            title,
            description: meta.description,
            links,
            feeds: resolve_all(&meta.feed_hrefs, page_url),
            sitemaps: resolve_all(&meta.sitemap_hrefs, page_url),
            main_element_texts,
            headers: snapshot.headings,
            robots,
            crawled_at: Utc::now(),
        })
    }
}

/// Pull markup-level metadata out of the rendered HTML.
pub(crate) fn document_meta(html: &str) -> DocumentMeta {
    let document = Html::parse_document(html);

    let canonical_href = select_first(&document, "link[rel=\"canonical\"]")
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string);

    // First non-empty of the three description conventions.
    let description = [
        "meta[name=\"description\"]",
        "meta[name=\"twitter:description\"]",
        "meta[property=\"og:description\"]",
    ]
    .iter()
    .find_map(|css| {
        select_first(&document, css)
            .and_then(|el| el.value().attr("content"))
            .map(str::to_string)
    });

    let robots_meta = select_all(&document, "meta[name=\"robots\"]")
        .into_iter()
        .filter_map(|el| el.value().attr("content").map(str::to_string))
        .collect();

    let feed_hrefs = select_all(&document, "link[rel=\"alternate\"]")
        .into_iter()
        .filter(|el| {
            el.value()
                .attr("type")
                .map(|t| FEED_TYPES.contains(&t.trim().to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter_map(|el| el.value().attr("href").map(str::to_string))
        .collect();

    let sitemap_hrefs = select_all(&document, "link[rel=\"sitemap\"]")
        .into_iter()
        .filter_map(|el| el.value().attr("href").map(str::to_string))
        .collect();

    DocumentMeta {
        canonical_href,
        description,
        robots_meta,
        feed_hrefs,
        sitemap_hrefs,
    }
}

/// Assemble page links from the DOM snapshot.
///
/// Anchors whose href is not absolute are skipped. The per-link `rel`
/// directive overrides the page-level follow policy; `nofollow` at either
/// level wins.
pub(crate) fn build_links(anchors: &[RawAnchor], page_follow: bool) -> Vec<PageLink> {
    anchors
        .iter()
        .filter_map(|anchor| {
            let url = Url::parse(&anchor.href).ok()?;
            let text = anchor
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let follow = match anchor.rel.as_deref().and_then(robots::link_follow_override) {
                Some(link_follow) => page_follow && link_follow,
                None => page_follow,
            };
            Some(PageLink::new(url, text, follow))
        })
        .collect()
}

fn resolve_all(hrefs: &[String], base: &Url) -> Vec<Url> {
    hrefs
        .iter()
        .filter_map(|href| base.join(href).ok())
        .collect()
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(href: &str, text: Option<&str>, rel: Option<&str>) -> RawAnchor {
        RawAnchor {
            href: href.to_string(),
            text: text.map(str::to_string),
            rel: rel.map(str::to_string),
        }
    }

    #[test]
    fn canonical_href_is_extracted() {
        let meta = document_meta(
            r#"<html><head><link rel="canonical" href="https://example.com/a/"></head></html>"#,
        );
        assert_eq!(meta.canonical_href.as_deref(), Some("https://example.com/a/"));
    }

    #[test]
    fn description_prefers_meta_name_description() {
        let meta = document_meta(
            r#"<html><head>
                <meta property="og:description" content="og">
                <meta name="description" content="plain">
                <meta name="twitter:description" content="twitter">
            </head></html>"#,
        );
        assert_eq!(meta.description.as_deref(), Some("plain"));
    }

    #[test]
    fn description_falls_back_to_twitter_then_og() {
        let twitter = document_meta(
            r#"<head><meta name="twitter:description" content="tw">
               <meta property="og:description" content="og"></head>"#,
        );
        assert_eq!(twitter.description.as_deref(), Some("tw"));

        let og = document_meta(r#"<head><meta property="og:description" content="og"></head>"#);
        assert_eq!(og.description.as_deref(), Some("og"));
    }

    #[test]
    fn robots_meta_collected_in_document_order() {
        let meta = document_meta(
            r#"<head>
                <meta name="robots" content="noindex">
                <meta name="robots" content="nofollow">
            </head>"#,
        );
        assert_eq!(meta.robots_meta, vec!["noindex", "nofollow"]);
    }

    #[test]
    fn feed_links_require_a_feed_type() {
        let meta = document_meta(
            r#"<head>
                <link rel="alternate" type="application/atom+xml" href="/feed.atom">
                <link rel="alternate" type="application/rss+xml" href="/feed.rss">
                <link rel="alternate" type="text/html" href="/en/">
                <link rel="alternate" href="/untyped">
            </head>"#,
        );
        assert_eq!(meta.feed_hrefs, vec!["/feed.atom", "/feed.rss"]);
    }

    #[test]
    fn sitemap_links_are_extracted() {
        let meta = document_meta(r#"<head><link rel="sitemap" href="/sitemap.xml"></head>"#);
        assert_eq!(meta.sitemap_hrefs, vec!["/sitemap.xml"]);
    }

    #[test]
    fn build_links_skips_relative_hrefs() {
        let links = build_links(&[anchor("/relative", None, None)], true);
        assert!(links.is_empty());
    }

    #[test]
    fn build_links_keeps_page_follow_by_default() {
        let links = build_links(&[anchor("https://example.com/x", Some("X"), None)], true);
        assert_eq!(links.len(), 1);
        assert!(links[0].follow);
        assert_eq!(links[0].text.as_deref(), Some("X"));
    }

    #[test]
    fn rel_nofollow_wins_over_page_follow() {
        let links = build_links(
            &[anchor("https://example.com/x", None, Some("nofollow"))],
            true,
        );
        assert!(!links[0].follow);
    }

    #[test]
    fn page_nofollow_wins_over_rel_follow() {
        let links = build_links(
            &[anchor("https://example.com/x", None, Some("follow"))],
            false,
        );
        assert!(!links[0].follow);
    }

    #[test]
    fn blank_anchor_text_becomes_none() {
        let links = build_links(&[anchor("https://example.com/x", Some("   "), None)], true);
        assert_eq!(links[0].text, None);
    }

    #[test]
    fn snapshot_deserializes_from_browser_json() {
        let snapshot: DomSnapshot = serde_json::from_value(serde_json::json!({
            "links": [{"href": "https://example.com/a", "text": "A", "rel": null}],
            "mains": ["main text"],
            "headings": ["H1"],
            "body": "whole body"
        }))
        .unwrap();
        assert_eq!(snapshot.links.len(), 1);
        assert_eq!(snapshot.mains, vec!["main text"]);
    }

    #[test]
    fn snapshot_tolerates_missing_fields() {
        let snapshot: DomSnapshot = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(snapshot.links.is_empty());
        assert!(snapshot.body.is_empty());
    }
}
