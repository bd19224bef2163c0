//! URL scope filtering
//!
//! A crawl stays on-site through a list of [`UrlFilter`]s consulted with OR
//! semantics: a URL is in scope when any filter matches it.

use url::Url;

use crate::config::FilterConfig;

/// Matches URLs under one authority and path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilter {
    authority: String,
    path_prefix: String,
}

impl UrlFilter {
    /// Create a filter for an authority and path prefix.
    pub fn new(authority: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            authority: authority.into().to_ascii_lowercase(),
            path_prefix: path_prefix.into(),
        }
    }

    /// Build the filters for a root URL.
    ///
    /// The prefix is the root's path up to and including the last `/`. Two
    /// filters are produced, one for the root's host and one for its `www.`
    /// twin, unless the host is `localhost` or already carries the prefix.
    pub fn for_root(root: &Url) -> Vec<UrlFilter> {
        let path = root.path();
        let prefix = match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "/",
        };

        let authority = root.authority();
        let mut filters = vec![UrlFilter::new(authority, prefix)];

        let host = root.host_str().unwrap_or_default();
        if host != "localhost" && !host.starts_with("www.") {
            filters.push(UrlFilter::new(format!("www.{}", authority), prefix));
        }

        filters
    }

    /// Does this filter admit the URL?
    ///
    /// Scheme must be http or https, the authority must match
    /// case-insensitively, and the path-and-query must start with the
    /// configured prefix (case-sensitive).
    pub fn matches(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if !url.authority().eq_ignore_ascii_case(&self.authority) {
            return false;
        }

        let path = url.path();
        match url.query() {
            // The prefix may extend past the path into the query string.
            Some(query) if self.path_prefix.len() > path.len() => {
                let mut path_and_query = String::with_capacity(path.len() + query.len() + 1);
                path_and_query.push_str(path);
                path_and_query.push('?');
                path_and_query.push_str(query);
                path_and_query.starts_with(&self.path_prefix)
            }
            _ => path.starts_with(&self.path_prefix),
        }
    }

    /// Authority this filter matches.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path prefix this filter matches.
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }
}

impl From<&FilterConfig> for UrlFilter {
    fn from(config: &FilterConfig) -> Self {
        UrlFilter::new(config.authority.clone(), config.path_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn matches_same_authority_and_prefix() {
        let filter = UrlFilter::new("example.com", "/a/");
        assert!(filter.matches(&url("https://example.com/a/x")));
        assert!(filter.matches(&url("http://example.com/a/")));
    }

    #[test]
    fn rejects_other_authority() {
        let filter = UrlFilter::new("example.com", "/a/");
        assert!(!filter.matches(&url("https://other.com/a/x")));
    }

    #[test]
    fn rejects_path_outside_prefix() {
        let filter = UrlFilter::new("example.com", "/a/");
        assert!(!filter.matches(&url("https://example.com/b/y")));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let filter = UrlFilter::new("example.com", "/");
        assert!(!filter.matches(&url("ftp://example.com/a")));
        assert!(!filter.matches(&url("mailto:me@example.com")));
    }

    #[test]
    fn authority_match_is_case_insensitive() {
        let filter = UrlFilter::new("Example.COM", "/");
        assert!(filter.matches(&url("https://example.com/x")));
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let filter = UrlFilter::new("example.com", "/Docs/");
        assert!(filter.matches(&url("https://example.com/Docs/intro")));
        assert!(!filter.matches(&url("https://example.com/docs/intro")));
    }

    #[test]
    fn prefix_can_reach_into_query() {
        let filter = UrlFilter::new("example.com", "/page?id=");
        assert!(filter.matches(&url("https://example.com/page?id=7")));
        assert!(!filter.matches(&url("https://example.com/page?other=7")));
    }

    #[test]
    fn authority_includes_port() {
        let filter = UrlFilter::new("example.com:8080", "/");
        assert!(filter.matches(&url("https://example.com:8080/x")));
        assert!(!filter.matches(&url("https://example.com/x")));
    }

    #[test]
    fn for_root_derives_prefix_from_parent_directory() {
        let filters = UrlFilter::for_root(&url("https://example.com/a/b/file"));
        assert_eq!(filters[0].path_prefix(), "/a/b/");
    }

    #[test]
    fn for_root_adds_www_twin() {
        let filters = UrlFilter::for_root(&url("https://example.com/"));
        let authorities: Vec<_> = filters.iter().map(|f| f.authority()).collect();
        assert_eq!(authorities, vec!["example.com", "www.example.com"]);
        assert!(filters.iter().all(|f| f.path_prefix() == "/"));
    }

    #[test]
    fn for_root_skips_www_twin_for_www_host() {
        let filters = UrlFilter::for_root(&url("https://www.example.com/"));
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].authority(), "www.example.com");
    }

    #[test]
    fn for_root_skips_www_twin_for_localhost() {
        let filters = UrlFilter::for_root(&url("http://localhost:8080/site/"));
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].authority(), "localhost:8080");
    }

    #[test]
    fn www_twin_admits_www_links() {
        let filters = UrlFilter::for_root(&url("https://example.com/"));
        let www_link = url("https://www.example.com/page");
        assert!(filters.iter().any(|f| f.matches(&www_link)));
    }
}
